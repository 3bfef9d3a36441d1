use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use argus::admin::AdminServer;
use argus::backend::{Backend, BackendSet};
use argus::config::{self, Config};
use argus::metrics::serve_metrics;
use argus::probe::{Poller, PollerOpts, ProbeSpec};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = load_or_default_config();

    let poller = Arc::new(Poller::new(PollerOpts::from(&config.poller)));
    let backends = Arc::new(BackendSet::new());

    // Attach and enable a probe for every configured backend
    for backend_config in &config.backends {
        if let Err(e) = backend_config.validate() {
            error!("{}", e);
            continue;
        }
        let backend = Backend::new(
            backend_config.name.clone(),
            backend_config.ipv4,
            backend_config.ipv6,
        );
        let spec = ProbeSpec::from(&backend_config.probe);
        poller.insert(&backend, spec, backend_config.host_header.as_deref());
        poller.control(&backend, true);
        backends.insert(backend);
        info!(backend = %backend_config.name, "Backend registered");
    }

    if backends.is_empty() {
        warn!("No backends configured; nothing to probe");
    }

    let cancel = CancellationToken::new();

    // Start metrics endpoint in background
    let metrics_addr = format!(
        "{}:{}",
        config.server.listen_addr, config.server.metrics_port
    );
    let metrics_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_metrics(metrics_addr, metrics_cancel).await {
            error!(error = %e, "Metrics endpoint failed");
        }
    });

    // Start admin server in background
    let admin_addr = format!("{}:{}", config.server.listen_addr, config.server.admin_port);
    let admin = AdminServer::new(backends.clone(), poller.clone());
    let admin_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = admin.serve(admin_addr, admin_cancel).await {
            error!(error = %e, "Admin server failed");
        }
    });

    shutdown_signal().await?;
    info!("Shutdown signal received");

    // Tear down probes before stopping the poller; in-flight probes hand
    // their targets back on completion
    for name in backends.names() {
        if let Some(backend) = backends.get(&name) {
            if poller.enabled(&backend) {
                poller.control(&backend, false);
            }
            poller.remove(&backend);
        }
    }
    cancel.cancel();
    poller.shutdown();

    info!("Argus shutdown complete");
    Ok(())
}

/// Resolve once SIGINT or, on unix, SIGTERM arrives
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut term =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Search the default locations for a config file
///
/// A missing file is normal (fresh installs run with defaults); a file
/// that exists but does not parse is only skipped with a warning.
fn load_or_default_config() -> Config {
    for path in ["config/argus.toml", "argus.toml"] {
        if !Path::new(path).exists() {
            continue;
        }
        match config::load_config(path) {
            Ok(config) => {
                info!(path, "Loaded configuration");
                return config;
            }
            Err(e) => warn!(path, error = %e, "Skipping unreadable config"),
        }
    }
    info!("No usable config file found, using defaults");
    Config::default()
}
