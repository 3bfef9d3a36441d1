//! Upstream backend representation
//!
//! A backend carries its display name, its probe addresses, and a small
//! lock-protected health block. The poller owns the probe state; the
//! backend only references it and receives `healthy` / `health_changed`
//! updates.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::RwLock;

use crate::probe::Target;

/// Health fields written by the poller
#[derive(Debug, Default)]
pub(crate) struct BackendHealth {
    pub healthy: bool,
    pub health_changed: Option<SystemTime>,
    pub probe: Option<Arc<Target>>,
    /// Latest happy bitmap, published after every probe
    pub happy: u64,
}

/// An upstream origin server
#[derive(Debug)]
pub struct Backend {
    pub display_name: String,
    pub ipv4: Option<SocketAddr>,
    pub ipv6: Option<SocketAddr>,
    pub(crate) health: RwLock<BackendHealth>,
}

impl Backend {
    /// Create a new backend; backends start out healthy
    pub fn new(
        display_name: impl Into<String>,
        ipv4: Option<SocketAddr>,
        ipv6: Option<SocketAddr>,
    ) -> Arc<Self> {
        Arc::new(Self {
            display_name: display_name.into(),
            ipv4,
            ipv6,
            health: RwLock::new(BackendHealth {
                healthy: true,
                ..BackendHealth::default()
            }),
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.health.read().healthy
    }

    /// When the backend last changed health state, if it ever did
    pub fn health_changed(&self) -> Option<SystemTime> {
        self.health.read().health_changed
    }

    /// Latest happy bitmap published by the poller
    pub fn happy_bitmap(&self) -> u64 {
        self.health.read().happy
    }

    pub fn has_probe(&self) -> bool {
        self.health.read().probe.is_some()
    }

    pub(crate) fn probe(&self) -> Option<Arc<Target>> {
        self.health.read().probe.clone()
    }
}

/// All configured backends, keyed by display name
#[derive(Debug, Default)]
pub struct BackendSet {
    backends: DashMap<String, Arc<Backend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, backend: Arc<Backend>) {
        self.backends.insert(backend.display_name.clone(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends.get(name).map(|b| b.value().clone())
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Backend>> {
        self.backends.remove(name).map(|(_, b)| b)
    }

    /// Backend names in stable (sorted) order for rendering
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
