//! Probe scheduling and lifecycle
//!
//! One dispatcher task owns the due-time heap and hands due targets to the
//! worker tasks. The scheduler lock guards the heap, every target's
//! scheduling fields, and backend attach/detach; removal of a backend
//! whose probe is still in flight hands ownership of the target to the
//! running task instead of waiting for it.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::metrics::metrics;
use crate::pool::TcpPool;

use super::executor::{poke, PokeOutcome};
use super::heap::{DueHeap, NOIDX};
use super::history::Criterion;
use super::spec::ProbeSpec;
use super::status::write_status;
use super::target::Target;
use super::worker::{JobQueue, Priority};

/// Upper bound on the dispatcher's idle wait, so a stray signal is never
/// the only thing that can unblock it
const IDLE_WAIT: Duration = Duration::from_millis(8192);

#[derive(Debug, Clone)]
pub struct PollerOpts {
    /// Number of worker tasks executing probes
    pub workers: usize,
    /// Maximum number of queued probe jobs
    pub queue_depth: usize,
}

impl Default for PollerOpts {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 256,
        }
    }
}

impl From<&crate::config::PollerConfig> for PollerOpts {
    fn from(config: &crate::config::PollerConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            queue_depth: config.queue_depth.max(1),
        }
    }
}

/// The health poller
///
/// Constructed once; spawns its dispatcher and worker tasks on the current
/// runtime and runs until `shutdown`.
pub struct Poller {
    core: Arc<Core>,
}

struct Core {
    sched: Mutex<DueHeap>,
    notify: Notify,
    epoch: Instant,
    queue: JobQueue,
    cancel: CancellationToken,
}

impl Poller {
    /// Create the poller and spawn its background tasks
    pub fn new(opts: PollerOpts) -> Self {
        let core = Arc::new(Core {
            sched: Mutex::new(DueHeap::default()),
            notify: Notify::new(),
            epoch: Instant::now(),
            queue: JobQueue::new(opts.queue_depth),
            cancel: CancellationToken::new(),
        });

        for _ in 0..opts.workers {
            let core = core.clone();
            tokio::spawn(async move { worker_loop(core).await });
        }
        let dispatcher_core = core.clone();
        tokio::spawn(async move { dispatcher(dispatcher_core).await });

        info!(workers = opts.workers, queue_depth = opts.queue_depth, "Poller started");
        Self { core }
    }

    /// Attach a probe to a backend
    ///
    /// Seeds the history with `initial` synthetic happy probes so a fresh
    /// backend does not falsely appear sick, then publishes the probe on
    /// the backend. The probe is not scheduled until `control(_, true)`.
    pub fn insert(&self, backend: &Arc<Backend>, spec: ProbeSpec, host: Option<&str>) {
        assert!(
            backend.probe().is_none(),
            "backend '{}' already has a probe",
            backend.display_name
        );

        let pool = Arc::new(TcpPool::new(backend.ipv4, backend.ipv6));
        let vt = Target::new(spec, pool, host);
        vt.attach(backend);

        for _ in 0..vt.spec.initial() {
            vt.start_poke();
            let mut seeded = PokeOutcome::default();
            seeded.set(Criterion::Happy);
            self.core.has_poked(&vt, seeded);
        }

        backend.health.write().probe = Some(vt.clone());
        self.core.has_poked(&vt, PokeOutcome::default());
        debug!(backend = %backend.display_name, "Probe inserted");
    }

    /// Detach and tear down a backend's probe
    ///
    /// If a probe task is in flight the target is doomed and the task
    /// drops it on exit; otherwise the last reference is dropped here,
    /// after the lock is released.
    pub fn remove(&self, backend: &Arc<Backend>) {
        let vt = {
            let mut sched = self.core.sched.lock();
            let mut health = backend.health.write();

            // A backend without a probe is always routable
            health.healthy = true;
            let Some(vt) = health.probe.take() else {
                return;
            };
            vt.detach();
            if vt.heap_idx() != NOIDX {
                sched.delete(vt.heap_idx());
            }
            if vt.running() != 0 {
                vt.set_running(-1);
                None
            } else {
                Some(vt)
            }
        };
        drop(vt);
        debug!(backend = %backend.display_name, "Probe removed");
    }

    /// Enable or disable a backend's probe
    ///
    /// Enabling schedules the probe immediately and wakes the dispatcher;
    /// disabling takes it off the heap. An in-flight probe always runs to
    /// completion. Toggling a probe to the state it is already in is a
    /// programming error.
    pub fn control(&self, backend: &Arc<Backend>, enable: bool) {
        let Some(vt) = backend.probe() else {
            debug_assert!(false, "control on a backend without a probe");
            return;
        };
        debug!(backend = %backend.display_name, enable, "Probe control");

        let mut sched = self.core.sched.lock();
        if enable {
            vt.set_due_ms(self.core.now_ms());
            sched.insert(vt);
            self.core.notify.notify_one();
        } else {
            assert_ne!(vt.heap_idx(), NOIDX, "probe already disabled");
            sched.delete(vt.heap_idx());
        }
    }

    /// Whether the backend's probe is currently scheduled
    pub fn enabled(&self, backend: &Backend) -> bool {
        let Some(vt) = backend.probe() else {
            return false;
        };
        let _sched = self.core.sched.lock();
        vt.heap_idx() != NOIDX
    }

    /// Render probe status for a backend
    pub fn status<W: io::Write>(
        &self,
        writer: &mut W,
        backend: &Backend,
        details: bool,
    ) -> io::Result<()> {
        write_status(writer, backend, details)
    }

    /// Stop the dispatcher and worker tasks
    pub fn shutdown(&self) {
        self.core.cancel.cancel();
    }
}

impl Core {
    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn due_deadline(&self, due_ms: u64) -> Instant {
        self.epoch + Duration::from_millis(due_ms)
    }

    /// Record a finished (or seeded) probe and drive the backend's health
    ///
    /// Folds the outcome into the history, then, under the scheduler lock
    /// and only while a backend is still attached, compares `good` against
    /// the threshold, stamps `health_changed` on transitions, emits the
    /// health log line, and publishes the happy bitmap.
    fn has_poked(&self, vt: &Target, outcome: PokeOutcome) {
        let summary = vt.apply_outcome(&outcome);

        let _sched = self.sched.lock();
        let Some(backend) = vt.backend() else {
            return;
        };
        let mut health = backend.health.write();

        let label = if summary.good >= vt.spec.threshold {
            if health.healthy {
                "Still healthy"
            } else {
                health.health_changed = Some(SystemTime::now());
                health.healthy = true;
                metrics().record_transition(&backend.display_name, "back_healthy");
                "Back healthy"
            }
        } else if health.healthy {
            health.health_changed = Some(SystemTime::now());
            health.healthy = false;
            metrics().record_transition(&backend.display_name, "went_sick");
            "Went sick"
        } else {
            "Still sick"
        };

        info!(
            target: "argus::health",
            "{} {} {} {} {} {} {:.6} {:.6} {}",
            backend.display_name,
            label,
            summary.bits,
            summary.good,
            vt.spec.threshold,
            vt.spec.window,
            summary.last,
            summary.avg,
            summary.resp,
        );

        health.happy = summary.happy;
        metrics().record_probe(&backend.display_name, summary.bits.ends_with('H'));
        metrics().set_backend_healthy(&backend.display_name, health.healthy);
    }
}

/// Dispatcher loop: wake at the earliest due time, reschedule the target
/// one interval out, and submit it at the front of the job queue
async fn dispatcher(core: Arc<Core>) {
    enum Step {
        Submit(Arc<Target>),
        Wait(Instant),
    }

    loop {
        if core.cancel.is_cancelled() {
            return;
        }

        let step = {
            let mut sched = core.sched.lock();
            loop {
                let now = core.now_ms();
                let Some(root) = sched.root() else {
                    break Step::Wait(Instant::now() + IDLE_WAIT);
                };
                if root.due_ms() > now {
                    break Step::Wait(core.due_deadline(root.due_ms()));
                }

                let vt = sched.delete(0);
                let interval_ms = (vt.spec.interval * 1e3).round() as u64;
                vt.set_due_ms(now + interval_ms);
                if vt.running() != 0 {
                    // Previous probe still in flight; try again next cycle
                    sched.insert(vt);
                    continue;
                }
                vt.set_running(1);
                sched.insert(vt.clone());
                break Step::Submit(vt);
            }
        };

        match step {
            Step::Submit(vt) => {
                if core.queue.submit(vt.clone(), Priority::Front).is_err() {
                    warn!("Probe job queue full, probe skipped until next cycle");
                    metrics().record_queue_rejected();
                    let _sched = core.sched.lock();
                    if vt.running() == 1 {
                        vt.set_running(0);
                    }
                }
            }
            Step::Wait(deadline) => {
                tokio::select! {
                    _ = core.cancel.cancelled() => return,
                    _ = core.notify.notified() => {}
                    _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)) => {}
                }
            }
        }
    }
}

async fn worker_loop(core: Arc<Core>) {
    while let Some(vt) = core.queue.next(&core.cancel).await {
        probe_task(&core, vt).await;
    }
}

/// One probe cycle for one target
async fn probe_task(core: &Core, vt: Arc<Target>) {
    vt.start_poke();
    let outcome = poke(&vt).await;
    core.has_poked(&vt, outcome);

    {
        let _sched = core.sched.lock();
        if vt.running() >= 0 {
            vt.set_running(0);
        }
        // A doomed target keeps running == -1; this task holds the last
        // reference and drops it on return.
    }
}
