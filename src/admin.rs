//! Line-based admin interface
//!
//! A small TCP listener exposing the poller's control surface at runtime:
//!
//! - `backend.list`: one row per backend with probe state and health
//! - `backend.health <name> [-v]`: probe status render, `-v` for details
//! - `backend.enable <name>` / `backend.disable <name>`: probe control
//! - `ping`, `help`, `quit`
//!
//! Commands are dispatched one at a time, regardless of how many admin
//! connections are open.

use std::fmt::Write as _;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::backend::BackendSet;
use crate::metrics::metrics;
use crate::probe::{write_status, Poller};

const HELP: &str = "Available commands:
  ping
  backend.list
  backend.health <name> [-v]
  backend.enable <name>
  backend.disable <name>
  quit
";

enum Reply {
    Text(String),
    Quit,
}

pub struct AdminServer {
    backends: Arc<BackendSet>,
    poller: Arc<Poller>,
    /// Serializes command dispatch across connections
    cli_lock: Mutex<()>,
}

impl AdminServer {
    pub fn new(backends: Arc<BackendSet>, poller: Arc<Poller>) -> Arc<Self> {
        Arc::new(Self {
            backends,
            poller,
            cli_lock: Mutex::new(()),
        })
    }

    /// Accept admin connections until cancelled
    pub async fn serve(
        self: Arc<Self>,
        addr: String,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %addr, "Admin server listening");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Admin server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(v) => v,
                        Err(e) => {
                            error!(error = %e, "Failed to accept admin connection");
                            continue;
                        }
                    };
                    debug!(peer = %peer, "Admin connection");
                    metrics().record_admin_connection();
                    let server = self.clone();
                    tokio::spawn(async move { server.handle_conn(stream).await });
                }
            }
        }
    }

    async fn handle_conn(self: Arc<Self>, stream: TcpStream) {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let reply = {
                let _cli = self.cli_lock.lock();
                self.dispatch(line.trim())
            };
            match reply {
                Reply::Text(text) => {
                    if writer.write_all(text.as_bytes()).await.is_err() {
                        return;
                    }
                }
                Reply::Quit => return,
            }
        }
    }

    fn dispatch(&self, line: &str) -> Reply {
        let mut words = line.split_whitespace();
        let command = match words.next() {
            Some(c) => c,
            None => return Reply::Text(String::new()),
        };

        match command {
            "ping" => Reply::Text("PONG\n".to_string()),
            "help" => Reply::Text(HELP.to_string()),
            "quit" => Reply::Quit,
            "backend.list" => Reply::Text(self.render_list()),
            "backend.health" => {
                let Some(name) = words.next() else {
                    return Reply::Text("Usage: backend.health <name> [-v]\n".to_string());
                };
                let details = words.next() == Some("-v");
                self.render_health(name, details)
            }
            "backend.enable" => self.set_probe_state(words.next(), true),
            "backend.disable" => self.set_probe_state(words.next(), false),
            _ => Reply::Text(format!("Unknown command '{}'. Try 'help'.\n", command)),
        }
    }

    fn render_list(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<24} {:<12} Health", "Backend name", "Probe");
        for name in self.backends.names() {
            let Some(backend) = self.backends.get(&name) else {
                continue;
            };
            let probe = if backend.has_probe() {
                let mut buf = Vec::new();
                match write_status(&mut buf, &backend, false) {
                    Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
                    Err(_) => "-".to_string(),
                }
            } else {
                "no probe".to_string()
            };
            let health = if backend.is_healthy() { "healthy" } else { "sick" };
            let _ = writeln!(out, "{:<24} {:<12} {}", name, probe, health);
        }
        out
    }

    fn render_health(&self, name: &str, details: bool) -> Reply {
        let Some(backend) = self.backends.get(name) else {
            return Reply::Text(format!("No backend named '{}'\n", name));
        };
        let mut buf = Vec::new();
        if let Err(e) = write_status(&mut buf, &backend, details) {
            return Reply::Text(format!("Status render failed: {}\n", e));
        }
        let mut text = String::from_utf8_lossy(&buf).into_owned();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Reply::Text(text)
    }

    fn set_probe_state(&self, name: Option<&str>, enable: bool) -> Reply {
        let verb = if enable { "enable" } else { "disable" };
        let Some(name) = name else {
            return Reply::Text(format!("Usage: backend.{} <name>\n", verb));
        };
        let Some(backend) = self.backends.get(name) else {
            return Reply::Text(format!("No backend named '{}'\n", name));
        };
        if !backend.has_probe() {
            return Reply::Text(format!("Backend '{}' has no probe\n", name));
        }
        if self.poller.enabled(&backend) == enable {
            return Reply::Text(format!("Probe for '{}' already {}d\n", name, verb));
        }
        self.poller.control(&backend, enable);
        Reply::Text(format!("Probe for '{}' {}d\n", name, verb))
    }
}
