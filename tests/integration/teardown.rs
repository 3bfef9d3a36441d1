//! Removal and teardown scenarios, including removal with probes in flight

use std::time::{Duration, Instant};

use argus::backend::Backend;
use argus::probe::{Poller, PollerOpts, ProbeSpec};

use crate::{serve_counting, serve_stalling, wait_until};

#[tokio::test]
async fn test_remove_while_probe_in_flight_returns_promptly() {
    // The probe will sit in its read loop for most of a second
    let addr = serve_stalling(Duration::from_millis(800)).await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-stalled", Some(addr), None);
    let spec = ProbeSpec {
        timeout: 1.0,
        interval: 60.0,
        ..ProbeSpec::default()
    };
    poller.insert(&backend, spec, None);
    poller.control(&backend, true);

    // Give the dispatcher time to start the probe, then remove mid-flight
    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    poller.remove(&backend);
    assert!(
        started.elapsed() < Duration::from_millis(200),
        "remove must not wait for the in-flight probe"
    );
    assert!(!backend.has_probe());
    assert!(backend.is_healthy(), "removed backends read as healthy");

    // The in-flight probe finishes on its own; nothing to observe but the
    // absence of crashes and the detached backend staying untouched
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert!(backend.is_healthy());
    assert!(!backend.has_probe());

    poller.shutdown();
}

#[tokio::test]
async fn test_detached_backend_sees_no_further_updates() {
    let (addr, accepted) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-detached", Some(addr), None);
    let spec = ProbeSpec {
        timeout: 1.0,
        interval: 0.05,
        ..ProbeSpec::default()
    };
    poller.insert(&backend, spec, None);
    poller.control(&backend, true);

    let recovered = wait_until(Duration::from_secs(3), || backend.is_healthy()).await;
    assert!(recovered);
    let bitmap_at_removal = {
        poller.remove(&backend);
        backend.happy_bitmap()
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        backend.happy_bitmap(),
        bitmap_at_removal,
        "probe results leaked into a removed backend"
    );
    let _ = accepted;
    poller.shutdown();
}

#[tokio::test]
async fn test_repeated_insert_remove_with_inflight_probes() {
    let addr = serve_stalling(Duration::from_millis(50)).await;

    let poller = Poller::new(PollerOpts::default());
    for round in 0u64..40 {
        let backend = Backend::new(format!("churn-{round}"), Some(addr), None);
        let spec = ProbeSpec {
            timeout: 0.5,
            interval: 0.01,
            ..ProbeSpec::default()
        };
        poller.insert(&backend, spec, None);
        poller.control(&backend, true);

        // Vary how deep into the probe cycle the removal lands
        tokio::time::sleep(Duration::from_millis(round % 9)).await;
        poller.remove(&backend);
        assert!(!backend.has_probe());
        assert!(backend.is_healthy());
    }
    poller.shutdown();
}

#[tokio::test]
async fn test_reinsert_after_remove() {
    let (addr, _accepted) = serve_counting(b"HTTP/1.1 200 OK\r\n\r\n").await;

    let poller = Poller::new(PollerOpts::default());
    let backend = Backend::new("web-reborn", Some(addr), None);
    let spec = ProbeSpec {
        timeout: 1.0,
        interval: 0.05,
        ..ProbeSpec::default()
    };

    poller.insert(&backend, spec.clone(), None);
    poller.control(&backend, true);
    assert!(wait_until(Duration::from_secs(3), || backend.is_healthy()).await);
    poller.remove(&backend);

    // A fresh probe starts from seeded state again
    poller.insert(&backend, spec, None);
    assert!(!backend.is_healthy(), "re-seeded backend starts below threshold");
    poller.control(&backend, true);
    assert!(wait_until(Duration::from_secs(3), || backend.is_healthy()).await);

    poller.remove(&backend);
    poller.shutdown();
}
