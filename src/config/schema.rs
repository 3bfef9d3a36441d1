use std::net::SocketAddr;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_admin_port")]
    pub admin_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_listen_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_admin_port() -> u16 {
    6082
}

fn default_metrics_port() -> u16 {
    9102
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_port: default_admin_port(),
            metrics_port: default_metrics_port(),
        }
    }
}

/// Probe dispatcher / worker pool configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    /// Number of worker tasks executing probes
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of queued probe jobs
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    256
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_depth: default_queue_depth(),
        }
    }
}

/// A single upstream backend and its probe parameters
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    #[serde(default)]
    pub ipv4: Option<SocketAddr>,
    #[serde(default)]
    pub ipv6: Option<SocketAddr>,
    /// Host header for synthesized probe requests
    #[serde(default)]
    pub host_header: Option<String>,
    #[serde(default)]
    pub probe: ProbeConfig,
}

impl BackendConfig {
    /// Validate that the backend can be probed at all
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("backend name must not be empty".to_string());
        }
        if self.ipv4.is_none() && self.ipv6.is_none() {
            return Err(format!(
                "backend '{}' has neither an IPv4 nor an IPv6 address",
                self.name
            ));
        }
        Ok(())
    }
}

/// Probe parameters as written in the config file
///
/// Absent values mean "use the built-in default"; the values are sanitized
/// when the probe is inserted.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeConfig {
    /// URL path probed with a synthesized GET request
    #[serde(default)]
    pub url: Option<String>,
    /// Raw request overriding URL-based synthesis
    #[serde(default)]
    pub request: Option<String>,
    /// Per-probe wall-clock budget in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Seconds between scheduled probes
    #[serde(default)]
    pub interval: Option<f64>,
    /// Number of recent probes considered for health classification
    #[serde(default)]
    pub window: Option<u32>,
    /// Minimum happy probes within the window for healthy status
    #[serde(default)]
    pub threshold: Option<u32>,
    /// Synthetic happy probes seeded at insert time
    #[serde(default)]
    pub initial: Option<u32>,
    /// HTTP status a happy probe must return
    #[serde(default)]
    pub expected_status: Option<u32>,
}
