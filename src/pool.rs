//! Timed TCP connect layer
//!
//! One pool per backend, holding the probe addresses for both address
//! families. Every open carries a hard deadline; the remaining budget is
//! recomputed before each blocking step and rounded to whole milliseconds.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Probe connection endpoint for a backend's IPv4/IPv6 addresses
#[derive(Debug)]
pub struct TcpPool {
    ipv4: Option<SocketAddr>,
    ipv6: Option<SocketAddr>,
}

impl TcpPool {
    /// Create a pool; at least one address family must be configured
    pub fn new(ipv4: Option<SocketAddr>, ipv6: Option<SocketAddr>) -> Self {
        assert!(
            ipv4.is_some() || ipv6.is_some(),
            "tcp pool needs at least one address"
        );
        Self { ipv4, ipv6 }
    }

    /// Open a connection before `deadline` elapses
    ///
    /// IPv6 is attempted first, then IPv4, each within whatever budget is
    /// left. Returns the stream together with the peer address actually
    /// connected.
    pub async fn open(&self, deadline: Instant) -> io::Result<(TcpStream, SocketAddr)> {
        let mut last_err = io::Error::new(io::ErrorKind::AddrNotAvailable, "no address configured");
        for addr in [self.ipv6, self.ipv4].iter().flatten() {
            let Some(budget) = remaining_budget(deadline) else {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "connect budget exhausted"));
            };
            match timeout(budget, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let peer = stream.peer_addr()?;
                    return Ok((stream, peer));
                }
                Ok(Err(e)) => {
                    debug!(addr = %addr, error = %e, "Probe connect failed");
                    last_err = e;
                }
                Err(_) => {
                    last_err = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
                }
            }
        }
        Err(last_err)
    }
}

/// Budget left until `deadline`, rounded to the nearest millisecond
///
/// Returns `None` once the rounded budget is no longer positive, which
/// callers treat as "abort the attempt".
pub(crate) fn remaining_budget(deadline: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    let ms = (left.as_secs_f64() * 1e3).round() as u64;
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_remaining_budget_rounds_to_ms() {
        let budget = remaining_budget(Instant::now() + Duration::from_millis(500)).unwrap();
        assert!(budget >= Duration::from_millis(499) && budget <= Duration::from_millis(500));
    }

    #[test]
    fn test_remaining_budget_exhausted() {
        assert!(remaining_budget(Instant::now()).is_none());
        // Sub-half-millisecond leftovers round down to nothing
        assert!(remaining_budget(Instant::now() + Duration::from_micros(100)).is_none());
    }

    #[tokio::test]
    async fn test_open_connects_ipv4() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pool = TcpPool::new(Some(addr), None);
        let (_stream, peer) = pool
            .open(Instant::now() + Duration::from_secs(2))
            .await
            .unwrap();
        assert!(peer.is_ipv4());
    }

    #[tokio::test]
    async fn test_open_refused() {
        // Bind then drop to get a port that refuses connections
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let pool = TcpPool::new(Some(addr), None);
        assert!(pool.open(Instant::now() + Duration::from_secs(2)).await.is_err());
    }

    #[tokio::test]
    async fn test_open_expired_deadline() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let pool = TcpPool::new(Some(addr), None);
        let err = pool.open(Instant::now()).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    #[should_panic]
    fn test_pool_requires_address() {
        TcpPool::new(None, None);
    }
}
