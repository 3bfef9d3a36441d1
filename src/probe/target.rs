//! Per-backend probe target state

use std::sync::atomic::{AtomicI8, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::pool::TcpPool;

use super::executor::PokeOutcome;
use super::heap::NOIDX;
use super::history::{Criterion, History};
use super::request::build_request;
use super::spec::ProbeSpec;

/// Probe state for one backend
///
/// The history has its own short-held lock; the scheduling and lifecycle
/// fields below it are plain atomics written only while the poller lock is
/// held, so the executor can run without touching any lock at all.
#[derive(Debug)]
pub(crate) struct Target {
    pub(crate) spec: ProbeSpec,
    pub(crate) pool: Arc<TcpPool>,
    /// Prebuilt request bytes sent on every probe
    pub(crate) req: Bytes,
    pub(crate) history: Mutex<History>,
    backend: Mutex<Option<Weak<Backend>>>,
    /// Due time in milliseconds since the poller epoch
    due_ms: AtomicU64,
    /// Position in the due-time heap, NOIDX while off the heap
    heap_idx: AtomicUsize,
    /// 0 idle, 1 scheduled or executing, -1 doomed by removal
    running: AtomicI8,
}

/// Snapshot handed from the aggregation step to logging and the health
/// transition
#[derive(Debug)]
pub(crate) struct PokeSummary {
    pub bits: String,
    pub good: u32,
    pub last: f64,
    pub avg: f64,
    pub happy: u64,
    pub resp: String,
}

impl Target {
    pub fn new(mut spec: ProbeSpec, pool: Arc<TcpPool>, host: Option<&str>) -> Arc<Self> {
        spec.normalize();
        let req = build_request(&spec, host);
        Arc::new(Self {
            spec,
            pool,
            req,
            history: Mutex::new(History::default()),
            backend: Mutex::new(None),
            due_ms: AtomicU64::new(0),
            heap_idx: AtomicUsize::new(NOIDX),
            running: AtomicI8::new(0),
        })
    }

    pub fn due_ms(&self) -> u64 {
        self.due_ms.load(Ordering::Relaxed)
    }

    pub fn set_due_ms(&self, due_ms: u64) {
        self.due_ms.store(due_ms, Ordering::Relaxed);
    }

    pub fn heap_idx(&self) -> usize {
        self.heap_idx.load(Ordering::Relaxed)
    }

    pub fn set_heap_idx(&self, idx: usize) {
        self.heap_idx.store(idx, Ordering::Relaxed);
    }

    pub fn running(&self) -> i8 {
        self.running.load(Ordering::Relaxed)
    }

    pub fn set_running(&self, running: i8) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn attach(&self, backend: &Arc<Backend>) {
        *self.backend.lock() = Some(Arc::downgrade(backend));
    }

    pub fn detach(&self) {
        self.backend.lock().take();
    }

    /// The backend this target reports to, if still attached
    pub fn backend(&self) -> Option<Arc<Backend>> {
        self.backend.lock().as_ref()?.upgrade()
    }

    /// Open a new history slot for the probe about to run
    pub fn start_poke(&self) {
        self.history.lock().shift();
    }

    /// Fold a finished probe into the history
    ///
    /// Merges the outcome's verdicts into the newest slot, updates the
    /// response time average, and recounts `good` over the window.
    pub fn apply_outcome(&self, outcome: &PokeOutcome) -> PokeSummary {
        let mut history = self.history.lock();
        for criterion in outcome.criteria() {
            history.set(criterion);
        }
        if let Some(last) = outcome.last {
            history.last = last;
        }
        if !outcome.resp.is_empty() {
            history.resp = outcome.resp.clone();
        }
        history.update_avg();
        history.recount(self.spec.window);

        PokeSummary {
            bits: history.summary(),
            good: history.good,
            last: history.last,
            avg: history.avg,
            happy: history.bitmap(Criterion::Happy),
            resp: history.resp.clone(),
        }
    }
}
