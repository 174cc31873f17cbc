//! Batching coordinator.

use super::config::{duration_millis, BatcherConfig};
use super::future::{self, Pending};
use super::window::{SealedBy, Submission, Window};
use super::{timer, worker};
use crate::{Error, ErrorContext, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Work function shared by every window: one call per batch.
pub type WorkFn<P, R> = Arc<dyn Fn(Vec<P>) -> BoxFuture<'static, Result<R>> + Send + Sync>;

/// Synchronous check applied to each parameter before it may join a batch.
pub type PrefilterFn<P> = Arc<dyn Fn(&P) -> Result<()> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatcherSnapshot {
    pub timeout_ms: u64,
    pub window_open: bool,
    pub open_window_id: Option<u64>,
    /// Submissions waiting in the open window.
    pub pending: usize,
    pub windows_opened: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
}

#[derive(Debug, Default)]
struct Stats {
    windows_opened: AtomicU64,
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
}

/// Everything guarded by the coordinator lock.
struct Slot<P, R> {
    /// The window accepting submissions, if any.
    current: Option<Arc<Window<P, R>>>,
    /// Drained signals of sealed windows whose worker may still be running.
    draining: Vec<CancellationToken>,
}

impl<P, R> Slot<P, R> {
    /// Seal `window` and remember it until its drain completes.
    fn seal(&mut self, window: &Window<P, R>, by: SealedBy) -> bool {
        self.draining.retain(|t| !t.is_cancelled());
        let sealed = window.seal(by);
        if sealed {
            self.draining.push(window.drained_token());
        }
        sealed
    }
}

/// State shared between the coordinator and the tasks it spawns per window.
pub(crate) struct Shared<P, R> {
    config: BatcherConfig,
    pub(crate) work: WorkFn<P, R>,
    slot: Mutex<Slot<P, R>>,
    next_window_id: AtomicU64,
    stats: Stats,
}

impl<P, R> Shared<P, R>
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    // Critical sections never run user code, so a poisoned lock still guards
    // consistent state.
    fn lock_slot(&self) -> MutexGuard<'_, Slot<P, R>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append to the open window, opening one (with its timer and worker) if needed.
    fn submit(self: &Arc<Self>, param: P) -> Pending<R> {
        let mut slot = self.lock_slot();
        let window = match slot.current.as_ref() {
            Some(window) => Arc::clone(window),
            None => {
                let window = self.open_window();
                slot.current = Some(Arc::clone(&window));
                window
            }
        };
        let (completer, pending) = future::slot(window.id());
        window.append(Submission { param, completer });
        pending
    }

    fn open_window(self: &Arc<Self>) -> Arc<Window<P, R>> {
        let id = self.next_window_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (window, intake) = Window::open(id);
        worker::spawn(Arc::clone(self), intake);
        timer::spawn(Arc::clone(self), Arc::clone(&window), self.config.timeout);
        self.stats.windows_opened.fetch_add(1, Ordering::Relaxed);
        debug!(
            window_id = id,
            timeout_ms = duration_millis(self.config.timeout),
            "batch window opened"
        );
        window
    }

    /// Seal `window`, forgetting it first if it is still the open one.
    ///
    /// A window that is no longer current was already sealed by whoever
    /// replaced it, so the seal below is then a no-op.
    pub(crate) fn seal_window(&self, window: &Arc<Window<P, R>>, by: SealedBy) -> bool {
        let mut slot = self.lock_slot();
        if slot.current.as_ref().is_some_and(|w| Arc::ptr_eq(w, window)) {
            slot.current = None;
        }
        slot.seal(window, by)
    }

    /// Seal and forget whatever window is open, then return the drained
    /// signals of every window sealed so far that has not finished draining.
    fn seal_current(&self, by: SealedBy) -> Vec<CancellationToken> {
        let mut slot = self.lock_slot();
        if let Some(window) = slot.current.take() {
            slot.seal(&window, by);
        }
        slot.draining.retain(|t| !t.is_cancelled());
        slot.draining.clone()
    }

    pub(crate) fn record_outcome(&self, outcome: &Result<R>) {
        let counter = if outcome.is_ok() {
            &self.stats.batches_completed
        } else {
            &self.stats.batches_failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Coalesces concurrent [`run`](Batcher::run) calls into one work invocation
/// per time window and fans the single outcome back out to every caller.
///
/// The work function may run concurrently with itself: a window can still be
/// draining while the next one is already accepting submissions.
///
/// All methods must be called from within a tokio runtime.
pub struct Batcher<P, R = ()> {
    shared: Arc<Shared<P, R>>,
    prefilter: Option<PrefilterFn<P>>,
}

impl<P, R> Batcher<P, R>
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    /// Batch every `run` call made within `timeout` of a window opening.
    /// A zero timeout disables batching.
    pub fn new<F, Fut>(timeout: Duration, work: F) -> Self
    where
        F: Fn(Vec<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        Self::from_parts(
            BatcherConfig::new().with_timeout(timeout),
            box_work(work),
            None,
        )
    }

    pub fn builder() -> BatcherBuilder<P, R> {
        BatcherBuilder::new()
    }

    fn from_parts(
        config: BatcherConfig,
        work: WorkFn<P, R>,
        prefilter: Option<PrefilterFn<P>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                work,
                slot: Mutex::new(Slot {
                    current: None,
                    draining: Vec::new(),
                }),
                next_window_id: AtomicU64::new(0),
                stats: Stats::default(),
            }),
            prefilter,
        }
    }

    /// Install a check run on every parameter before it joins a batch. A
    /// rejection is returned straight to that caller.
    ///
    /// Setup only: this needs `&mut self`, so it cannot race with `run`.
    /// The filter itself must be safe to call concurrently.
    pub fn prefilter<F>(&mut self, filter: F)
    where
        F: Fn(&P) -> Result<()> + Send + Sync + 'static,
    {
        self.prefilter = Some(Arc::new(filter));
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.shared.config
    }

    /// Run the work function for `param`, possibly in one batch with other
    /// concurrent calls, and return the outcome of that batch.
    pub async fn run(&self, param: P) -> Result<R> {
        if let Some(filter) = &self.prefilter {
            filter(&param)?;
        }

        if !self.shared.config.is_batching_enabled() {
            let outcome = worker::call_work(
                Arc::clone(&self.shared.work),
                vec![param],
                ErrorContext::new(),
            )
            .await;
            self.shared.record_outcome(&outcome);
            return outcome;
        }

        let pending = self.shared.submit(param);
        pending.wait().await
    }

    /// Seal the open window now and wait until every window sealed so far,
    /// by this call, a timer or another `flush`, has been processed and every
    /// caller in it has its outcome. Returns at once when nothing is open or
    /// draining. Intended for shutdown.
    pub async fn flush(&self) {
        // Lock is released before waiting.
        let draining = self.shared.seal_current(SealedBy::Flush);
        join_all(draining.iter().map(|t| t.cancelled())).await;
    }

    pub fn snapshot(&self) -> BatcherSnapshot {
        let (open_window_id, pending) = {
            let slot = self.shared.lock_slot();
            match slot.current.as_ref() {
                Some(w) => (Some(w.id()), w.len()),
                None => (None, 0),
            }
        };
        let stats = &self.shared.stats;
        BatcherSnapshot {
            timeout_ms: duration_millis(self.shared.config.timeout),
            window_open: open_window_id.is_some(),
            open_window_id,
            pending,
            windows_opened: stats.windows_opened.load(Ordering::Relaxed),
            batches_completed: stats.batches_completed.load(Ordering::Relaxed),
            batches_failed: stats.batches_failed.load(Ordering::Relaxed),
        }
    }
}

fn box_work<P, R, F, Fut>(work: F) -> WorkFn<P, R>
where
    F: Fn(Vec<P>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    Arc::new(move |batch| work(batch).boxed())
}

/// Builder for [`Batcher`].
pub struct BatcherBuilder<P, R = ()> {
    config: BatcherConfig,
    work: Option<WorkFn<P, R>>,
    prefilter: Option<PrefilterFn<P>>,
}

impl<P, R> BatcherBuilder<P, R>
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            config: BatcherConfig::default(),
            work: None,
            prefilter: None,
        }
    }

    pub fn with_config(mut self, config: BatcherConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn with_work<F, Fut>(mut self, work: F) -> Self
    where
        F: Fn(Vec<P>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        self.work = Some(box_work(work));
        self
    }

    pub fn with_prefilter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&P) -> Result<()> + Send + Sync + 'static,
    {
        self.prefilter = Some(Arc::new(filter));
        self
    }

    pub fn build(self) -> Result<Batcher<P, R>> {
        let work = self.work.ok_or_else(|| {
            Error::configuration_with_context(
                "a work function is required",
                ErrorContext::new().with_source("batcher_builder"),
            )
        })?;
        Ok(Batcher::from_parts(self.config, work, self.prefilter))
    }
}

impl<P, R> Default for BatcherBuilder<P, R>
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
