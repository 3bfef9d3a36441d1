//! Prometheus metrics for the argus health poller
//!
//! Counters and gauges updated by the poller and the admin surface,
//! scraped over a small GET-only HTTP endpoint that runs until the
//! poller shuts down.

use std::convert::Infallible;
use std::sync::OnceLock;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Global metrics registry
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Get the global metrics instance
pub fn metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

/// Argus metrics collection
pub struct Metrics {
    /// Registry for all metrics
    pub registry: Registry,

    /// Probes recorded per backend and result
    pub probes_total: IntCounterVec,
    /// Health state transitions per backend and direction
    pub health_transitions_total: IntCounterVec,
    /// Current backend health (1 healthy, 0 sick)
    pub backend_healthy: IntGaugeVec,
    /// Probe jobs rejected because the queue was full
    pub queue_rejected_total: IntCounter,
    /// Admin connections accepted
    pub admin_connections_total: IntCounter,
}

impl Metrics {
    /// Create a new metrics collection
    pub fn new() -> Self {
        let registry = Registry::new();

        let probes_total = IntCounterVec::new(
            Opts::new("argus_probes_total", "Total number of probes by result"),
            &["backend", "result"], // happy, unhappy
        )
        .unwrap();

        let health_transitions_total = IntCounterVec::new(
            Opts::new(
                "argus_health_transitions_total",
                "Total number of backend health transitions",
            ),
            &["backend", "direction"], // back_healthy, went_sick
        )
        .unwrap();

        let backend_healthy = IntGaugeVec::new(
            Opts::new("argus_backend_healthy", "Backend health state (1 healthy)"),
            &["backend"],
        )
        .unwrap();

        let queue_rejected_total = IntCounter::new(
            "argus_queue_rejected_total",
            "Total number of probe jobs rejected due to a full queue",
        )
        .unwrap();

        let admin_connections_total = IntCounter::new(
            "argus_admin_connections_total",
            "Total number of admin connections accepted",
        )
        .unwrap();

        registry.register(Box::new(probes_total.clone())).unwrap();
        registry
            .register(Box::new(health_transitions_total.clone()))
            .unwrap();
        registry.register(Box::new(backend_healthy.clone())).unwrap();
        registry
            .register(Box::new(queue_rejected_total.clone()))
            .unwrap();
        registry
            .register(Box::new(admin_connections_total.clone()))
            .unwrap();

        Self {
            registry,
            probes_total,
            health_transitions_total,
            backend_healthy,
            queue_rejected_total,
            admin_connections_total,
        }
    }

    /// Record a finished probe
    pub fn record_probe(&self, backend: &str, happy: bool) {
        let result = if happy { "happy" } else { "unhappy" };
        self.probes_total.with_label_values(&[backend, result]).inc();
    }

    /// Record a health state transition
    pub fn record_transition(&self, backend: &str, direction: &str) {
        self.health_transitions_total
            .with_label_values(&[backend, direction])
            .inc();
    }

    /// Publish the backend's current health state
    pub fn set_backend_healthy(&self, backend: &str, healthy: bool) {
        self.backend_healthy
            .with_label_values(&[backend])
            .set(healthy as i64);
    }

    /// Record a probe job rejected by the full queue
    pub fn record_queue_rejected(&self) {
        self.queue_rejected_total.inc();
    }

    /// Record an accepted admin connection
    pub fn record_admin_connection(&self) {
        self.admin_connections_total.inc();
    }

    /// Get metrics as Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Serve the Prometheus scrape endpoint until cancelled
pub async fn serve_metrics(addr: String, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Metrics endpoint listening");

    loop {
        let stream = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Metrics endpoint shutting down");
                return Ok(());
            }
            accepted = listener.accept() => accepted?.0,
        };
        tokio::spawn(async move {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(respond));
            if let Err(e) = conn.await {
                debug!(error = %e, "Metrics connection error");
            }
        });
    }
}

/// Route one scrape request
async fn respond(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::GET {
        return Ok(plain(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n".to_string()));
    }
    if req.uri().path() != "/metrics" {
        return Ok(plain(StatusCode::NOT_FOUND, "not found\n".to_string()));
    }
    let mut resp = plain(StatusCode::OK, metrics().gather());
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(prometheus::TEXT_FORMAT));
    Ok(resp)
}

fn plain(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from(body)));
    *resp.status_mut() = status;
    resp
}
