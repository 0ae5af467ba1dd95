use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// State shared by the orchestrator, its download workers and the watcher for one run
#[derive(Debug)]
pub struct PipelineState {
    active_finalizations: AtomicUsize,
    stop_requested: AtomicBool,
    started: Instant,
    time_limit: Option<Duration>,
}

impl PipelineState {
    /// `time_limit` of `None` means the run is never stopped because of its duration
    pub fn new(time_limit: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            active_finalizations: AtomicUsize::new(0),
            stop_requested: AtomicBool::new(false),
            started: Instant::now(),
            time_limit,
        })
    }

    /// Convert the user facing limit, where zero or less means unbounded
    pub fn time_limit_from_minutes(minutes: i64) -> Option<Duration> {
        u64::try_from(minutes)
            .ok()
            .filter(|&m| m > 0)
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }

    pub fn active_finalizations(&self) -> usize {
        self.active_finalizations.load(Ordering::SeqCst)
    }

    /// Count one more download as running until the returned token is dropped
    pub fn begin_finalization(self: &Arc<Self>) -> FinalizationToken {
        self.active_finalizations.fetch_add(1, Ordering::SeqCst);
        FinalizationToken(self.clone())
    }

    /// Flip the stop request, returning the new value
    pub fn toggle_stop(&self) -> bool {
        !self.stop_requested.fetch_xor(true, Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn time_limit_reached(&self) -> bool {
        self.time_limit.is_some_and(|limit| self.elapsed() > limit)
    }

    /// Whether no new download should be started
    pub fn should_stop(&self) -> bool {
        self.stop_requested() || self.time_limit_reached()
    }
}

/// Proof that a download counts towards the finalization cap.
/// Dropping it releases the slot, including when the worker panics.
#[derive(Debug)]
pub struct FinalizationToken(Arc<PipelineState>);

impl Drop for FinalizationToken {
    fn drop(&mut self) {
        self.0.active_finalizations.fetch_sub(1, Ordering::SeqCst);
    }
}
