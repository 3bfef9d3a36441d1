//! Single probe attempt against a backend
//!
//! One attempt, never retried: connect, send the prebuilt request, read
//! until EOF, parse the status line. Every blocking step is bounded by
//! whatever is left of the probe's wall-clock budget. The executor takes
//! no locks and never touches the backend or the scheduler; its verdicts
//! travel back in a `PokeOutcome` and are folded into the history by the
//! caller.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::timeout;

use crate::pool::remaining_budget;

use super::history::{Criterion, BITMAPS};
use super::target::Target;

/// Response line capture size
const RESP_BUF: usize = 128;
/// Scratch size for draining the rest of the response
const DRAIN_BUF: usize = 8192;

/// Verdicts collected by one probe attempt
#[derive(Debug, Default)]
pub(crate) struct PokeOutcome {
    flags: u8,
    /// Response time in seconds, set only when a response arrived
    pub last: Option<f64>,
    /// First response line, for logging and status parsing
    pub resp: String,
}

impl PokeOutcome {
    pub fn set(&mut self, criterion: Criterion) {
        self.flags |= 1 << criterion as u8;
    }

    pub fn is_set(&self, criterion: Criterion) -> bool {
        self.flags & (1 << criterion as u8) != 0
    }

    /// The criteria this attempt satisfied, in table order
    pub fn criteria(&self) -> impl Iterator<Item = Criterion> + '_ {
        BITMAPS
            .iter()
            .map(|desc| desc.criterion)
            .filter(|&criterion| self.is_set(criterion))
    }
}

/// Poke one backend, once
///
/// A probe that cannot finish within budget is a silent miss: the outcome
/// simply carries no success verdicts. The connection is dropped on every
/// return path.
pub(crate) async fn poke(vt: &Target) -> PokeOutcome {
    let mut out = PokeOutcome::default();

    let t_start = Instant::now();
    let deadline = t_start + Duration::from_secs_f64(vt.spec.timeout);

    // Got no connection: failed
    let Ok((mut stream, peer)) = vt.pool.open(deadline).await else {
        return out;
    };

    match peer {
        SocketAddr::V4(_) => out.set(Criterion::GoodIpv4),
        SocketAddr::V6(_) => out.set(Criterion::GoodIpv6),
    }

    // Spent too long getting the connection
    let Some(budget) = remaining_budget(deadline) else {
        return out;
    };

    match timeout(budget, stream.write_all(&vt.req)).await {
        Ok(Ok(())) => out.set(Criterion::GoodXmit),
        Ok(Err(_)) | Err(_) => {
            out.set(Criterion::ErrXmit);
            return out;
        }
    }

    // Capture the head of the response, then drain until EOF so the
    // measured time covers the whole response.
    let mut resp = [0u8; RESP_BUF];
    let mut filled = 0usize;
    let mut drain = [0u8; DRAIN_BUF];
    let mut total = 0usize;
    loop {
        let Some(budget) = remaining_budget(deadline) else {
            return out;
        };
        let dst: &mut [u8] = if filled < RESP_BUF {
            &mut resp[filled..]
        } else {
            &mut drain
        };
        match timeout(budget, stream.read(dst)).await {
            Err(_) => return out,
            Ok(Err(_)) => {
                out.set(Criterion::ErrRecv);
                return out;
            }
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if filled < RESP_BUF {
                    filled += n;
                }
                total += n;
            }
        }
    }

    if total == 0 {
        return out;
    }

    // So we have a good receive...
    out.last = Some(t_start.elapsed().as_secs_f64());
    out.set(Criterion::GoodRecv);

    let line = status_line(&resp[..filled]);
    if let Some(status) = parse_status(&line) {
        if status == vt.spec.expected_status {
            out.set(Criterion::Happy);
        }
    }
    out.resp = line;
    out
}

/// First line of the response, cut at the first CR or LF
fn status_line(buf: &[u8]) -> String {
    let end = buf
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

/// Parse `HTTP/<version> <status>[ <reason>]` and return the status code
///
/// The version field accepts anything that scans as a float; the reason
/// phrase is optional and ignored.
fn parse_status(line: &str) -> Option<u32> {
    let rest = line.strip_prefix("HTTP/")?;
    let rest = rest.trim_start();

    let version_end = rest
        .find(|c: char| !matches!(c, '0'..='9' | '.' | '+' | '-' | 'e' | 'E'))
        .unwrap_or(rest.len());
    let (version, rest) = rest.split_at(version_end);
    if version.is_empty() || version.parse::<f64>().is_err() {
        return None;
    }

    let rest = rest.trim_start();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let digits = &rest[..digits_end];
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u32>().ok()
}
