//! Probe parameters and their sanitization

use crate::config::ProbeConfig;

/// Immutable parameters for one backend's probe
///
/// Construct with struct update syntax over `Default` and leave unset
/// fields at zero/`None`; `normalize` fills in defaults and clamps the
/// window arithmetic before the spec is used.
#[derive(Debug, Clone, Default)]
pub struct ProbeSpec {
    /// URL path, synthesized into a GET request; empty means `/`
    pub url: String,
    /// Raw request bytes overriding URL-based synthesis
    pub request: Option<String>,
    /// Per-probe wall-clock budget in seconds
    pub timeout: f64,
    /// Seconds between scheduled probes
    pub interval: f64,
    /// Number of recent probes considered, in [1, 64]
    pub window: u32,
    /// Happy probes within the window required for healthy status
    pub threshold: u32,
    /// Synthetic happy probes seeded at insert time
    pub initial: Option<u32>,
    /// HTTP status a happy probe must return
    pub expected_status: u32,
}

impl ProbeSpec {
    /// Apply defaults and clamp inconsistent values
    ///
    /// Out-of-range window/threshold/initial combinations are corrected
    /// silently; misconfiguration must never keep a probe from running.
    pub(crate) fn normalize(&mut self) {
        if self.url.is_empty() {
            self.url = "/".to_string();
        }
        if self.timeout <= 0.0 {
            self.timeout = 2.0;
        }
        if self.interval <= 0.0 {
            self.interval = 5.0;
        }
        if self.window == 0 {
            self.window = 8;
        }
        self.window = self.window.min(64);
        if self.threshold == 0 {
            self.threshold = 3;
        }
        self.threshold = self.threshold.min(self.window);
        if self.expected_status == 0 {
            self.expected_status = 200;
        }

        let initial = self
            .initial
            .unwrap_or_else(|| self.threshold.saturating_sub(1));
        self.initial = Some(initial.min(self.threshold));
    }

    /// Seed count after normalization
    pub(crate) fn initial(&self) -> u32 {
        self.initial.unwrap_or(0)
    }
}

impl From<&ProbeConfig> for ProbeSpec {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            url: config.url.clone().unwrap_or_default(),
            request: config.request.clone(),
            timeout: config.timeout.unwrap_or(0.0),
            interval: config.interval.unwrap_or(0.0),
            window: config.window.unwrap_or(0),
            threshold: config.threshold.unwrap_or(0),
            initial: config.initial,
            expected_status: config.expected_status.unwrap_or(0),
        }
    }
}
