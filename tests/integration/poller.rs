//! End-to-end poller scenarios against live listeners

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use argus::backend::Backend;
use argus::probe::{Poller, PollerOpts, ProbeSpec};

use crate::{serve_counting, wait_until};

fn fast_spec() -> ProbeSpec {
    ProbeSpec {
        timeout: 1.0,
        interval: 0.05,
        ..ProbeSpec::default()
    }
}

#[tokio::test]
async fn test_backend_recovers_on_expected_status() {
    let (addr, _accepted) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-ok", Some(addr), None);

    // Defaults: threshold 3, initial 2 -> sick right after seeding
    poller.insert(&backend, fast_spec(), None);
    assert!(!backend.is_healthy());
    let seeded_stamp = backend.health_changed();
    assert!(seeded_stamp.is_some());

    poller.control(&backend, true);

    // One good probe lifts good to 3 and the backend back to healthy
    let recovered = wait_until(Duration::from_secs(3), || backend.is_healthy()).await;
    assert!(recovered, "backend never became healthy");
    assert_ne!(backend.health_changed(), seeded_stamp);
    assert_eq!(backend.happy_bitmap() & 0b111, 0b111);

    poller.remove(&backend);
    poller.shutdown();
}

#[tokio::test]
async fn test_backend_stays_sick_on_wrong_status() {
    let (addr, accepted) = serve_counting(b"HTTP/1.1 500 Err\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-500", Some(addr), None);

    poller.insert(&backend, fast_spec(), None);
    assert!(!backend.is_healthy());

    poller.control(&backend, true);

    // Wait for at least two failing probes; the seeded happy bits age out
    // of the newest window positions and the backend stays sick
    let probed = wait_until(Duration::from_secs(3), || {
        accepted.load(Ordering::SeqCst) >= 2 && backend.happy_bitmap() & 0b11 == 0
    })
    .await;
    assert!(probed, "server never saw two recorded failing probes");
    assert!(!backend.is_healthy());

    poller.remove(&backend);
    poller.shutdown();
}

#[tokio::test]
async fn test_initial_at_threshold_is_healthy_from_the_start() {
    // No server needed: health must be reported before any probe runs
    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-seeded", Some("127.0.0.1:9".parse().unwrap()), None);

    let spec = ProbeSpec {
        initial: Some(3),
        interval: 60.0,
        ..ProbeSpec::default()
    };
    poller.insert(&backend, spec, None);
    assert!(backend.is_healthy());
    assert_eq!(backend.happy_bitmap(), 0b111);

    poller.remove(&backend);
    poller.shutdown();
}

#[tokio::test]
async fn test_disable_stops_probing() {
    let (addr, accepted) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-toggled", Some(addr), None);
    poller.insert(&backend, fast_spec(), None);

    // Never enabled: the dispatcher must not probe it
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 0);

    poller.control(&backend, true);
    poller.control(&backend, false);

    // At most one probe may have squeezed in between the two calls, and
    // afterwards the count must not move again
    tokio::time::sleep(Duration::from_millis(150)).await;
    let settled = accepted.load(Ordering::SeqCst);
    assert!(settled <= 1, "disabled backend kept being probed");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(accepted.load(Ordering::SeqCst), settled);

    poller.remove(&backend);
    poller.shutdown();
}

#[tokio::test]
async fn test_many_backends_probe_independently() {
    let (addr_ok, _ok_count) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;
    let (addr_err, _err_count) = serve_counting(b"HTTP/1.1 503 Unavailable\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let mut healthy_backends = Vec::new();
    let mut sick_backends = Vec::new();
    for i in 0..4 {
        let backend = Backend::new(format!("ok-{i}"), Some(addr_ok), None);
        poller.insert(&backend, fast_spec(), None);
        poller.control(&backend, true);
        healthy_backends.push(backend);

        let backend = Backend::new(format!("err-{i}"), Some(addr_err), None);
        poller.insert(&backend, fast_spec(), None);
        poller.control(&backend, true);
        sick_backends.push(backend);
    }

    let all_classified = wait_until(Duration::from_secs(5), || {
        healthy_backends.iter().all(|b| b.is_healthy())
            && sick_backends.iter().all(|b| !b.is_healthy())
    })
    .await;
    assert!(all_classified, "backends not classified independently");

    for backend in healthy_backends.iter().chain(&sick_backends) {
        poller.remove(backend);
    }
    poller.shutdown();
}

#[tokio::test]
async fn test_status_render_via_public_api() {
    let (addr, _accepted) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend: Arc<Backend> = Backend::new("web-status", Some(addr), None);
    poller.insert(&backend, fast_spec(), None);
    poller.control(&backend, true);

    let recovered = wait_until(Duration::from_secs(3), || backend.is_healthy()).await;
    assert!(recovered);

    let mut buf = Vec::new();
    poller.status(&mut buf, &backend, true).unwrap();
    let out = String::from_utf8(buf).unwrap();
    assert!(out.contains("Current states"));
    assert!(out.contains("Good IPv4"));
    assert!(out.contains("Happy"));

    poller.remove(&backend);
    poller.shutdown();
}
