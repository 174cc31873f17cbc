//! Batch window: intake queue plus a seal that fires once.

use super::future::Completer;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, warn};

/// A parameter waiting for its batch, together with the slot its outcome goes to.
pub(crate) struct Submission<P, R> {
    pub(crate) param: P,
    pub(crate) completer: Completer<R>,
}

/// Who closed a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SealedBy {
    Timer,
    Flush,
}

impl SealedBy {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SealedBy::Timer => "timer",
            SealedBy::Flush => "flush",
        }
    }
}

/// Runs its action at most once, however many callers race on it.
#[derive(Debug, Default)]
pub(crate) struct SealGuard {
    fired: AtomicBool,
}

impl SealGuard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `action` if this is the first call. Returns whether it ran.
    pub(crate) fn run_once(&self, action: impl FnOnce()) -> bool {
        if self.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        action();
        true
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

/// An open (or sealed, not yet drained) batch.
///
/// Appends are only legal while the coordinator lock shows this window as
/// current; sealing and forgetting happen under the same lock, so a sealed
/// window never grows.
pub(crate) struct Window<P, R> {
    id: u64,
    intake: mpsc::UnboundedSender<Submission<P, R>>,
    guard: SealGuard,
    sealed: CancellationToken,
    drained: CancellationToken,
    len: AtomicUsize,
}

/// Worker-side half of a window.
///
/// Dropping it marks the window drained, including on unwind.
pub(crate) struct Intake<P, R> {
    id: u64,
    rx: mpsc::UnboundedReceiver<Submission<P, R>>,
    sealed: CancellationToken,
    _drained: DropGuard,
}

impl<P, R> Window<P, R> {
    pub(crate) fn open(id: u64) -> (Arc<Self>, Intake<P, R>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sealed = CancellationToken::new();
        let drained = CancellationToken::new();
        let window = Arc::new(Self {
            id,
            intake: tx,
            guard: SealGuard::new(),
            sealed: sealed.clone(),
            drained: drained.clone(),
            len: AtomicUsize::new(0),
        });
        let intake = Intake {
            id,
            rx,
            sealed,
            _drained: drained.drop_guard(),
        };
        (window, intake)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Number of submissions appended so far.
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.guard.has_fired()
    }

    pub(crate) fn append(&self, submission: Submission<P, R>) {
        debug_assert!(!self.is_sealed(), "append to sealed window {}", self.id);
        if self.intake.send(submission).is_err() {
            // Worker is gone; the dropped completer reports a runtime error to the caller.
            warn!(window_id = self.id, "batch worker no longer accepting submissions");
            return;
        }
        self.len.fetch_add(1, Ordering::AcqRel);
    }

    /// Stop accepting and wake the worker. Only the first call has any effect.
    pub(crate) fn seal(&self, by: SealedBy) -> bool {
        self.guard.run_once(|| {
            self.sealed.cancel();
            debug!(
                window_id = self.id,
                sealed_by = by.as_str(),
                batch_size = self.len(),
                "batch window sealed"
            );
        })
    }

    pub(crate) async fn wait_sealed(&self) {
        self.sealed.cancelled().await
    }

    /// Fires once the worker has delivered every outcome (or died).
    pub(crate) fn drained_token(&self) -> CancellationToken {
        self.drained.clone()
    }
}

impl<P, R> Intake<P, R> {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Collect submissions until the window is sealed, in arrival order.
    pub(crate) async fn collect(&mut self) -> Vec<Submission<P, R>> {
        let mut batch = Vec::new();
        loop {
            tokio::select! {
                biased;
                _ = self.sealed.cancelled() => break,
                next = self.rx.recv() => match next {
                    Some(submission) => batch.push(submission),
                    None => break,
                },
            }
        }
        // Anything sent before the seal is still buffered.
        self.rx.close();
        while let Some(submission) = self.rx.recv().await {
            batch.push(submission);
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::future::slot;
    use std::time::Duration;

    fn submit(window: &Window<u32, ()>, param: u32) {
        let (completer, _pending) = slot(window.id());
        window.append(Submission { param, completer });
    }

    #[test]
    fn test_seal_guard_runs_once() {
        let guard = SealGuard::new();
        let mut runs = 0;
        assert!(guard.run_once(|| runs += 1));
        assert!(!guard.run_once(|| runs += 1));
        assert!(!guard.run_once(|| runs += 1));
        assert_eq!(runs, 1);
        assert!(guard.has_fired());
    }

    #[test]
    fn test_seal_guard_concurrent() {
        use std::sync::atomic::AtomicU32;
        use std::thread;

        let guard = Arc::new(SealGuard::new());
        let runs = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];
        for _ in 0..16 {
            let g = Arc::clone(&guard);
            let r = Arc::clone(&runs);
            handles.push(thread::spawn(move || {
                g.run_once(|| {
                    r.fetch_add(1, Ordering::SeqCst);
                });
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_seal_is_idempotent() {
        let (window, _intake) = Window::<u32, ()>::open(1);
        assert!(!window.is_sealed());
        assert!(window.seal(SealedBy::Flush));
        assert!(!window.seal(SealedBy::Timer));
        assert!(window.is_sealed());
    }

    #[tokio::test]
    async fn test_collect_returns_fifo_after_seal() {
        let (window, mut intake) = Window::<u32, ()>::open(3);
        submit(&window, 1);
        submit(&window, 2);
        submit(&window, 3);
        assert_eq!(window.len(), 3);
        window.seal(SealedBy::Flush);

        let params: Vec<u32> = intake.collect().await.into_iter().map(|s| s.param).collect();
        assert_eq!(params, vec![1, 2, 3]);
        assert_eq!(intake.id(), 3);
    }

    #[tokio::test]
    async fn test_collect_waits_for_seal() {
        let (window, mut intake) = Window::<u32, ()>::open(1);
        submit(&window, 10);

        let collector = tokio::spawn(async move { intake.collect().await.len() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!collector.is_finished());

        submit(&window, 20);
        window.seal(SealedBy::Timer);
        assert_eq!(collector.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dropping_intake_marks_drained() {
        let (window, intake) = Window::<u32, ()>::open(1);
        drop(intake);
        let drained = window.drained_token();
        tokio::time::timeout(Duration::from_secs(1), drained.cancelled())
            .await
            .expect("drained signal should fire");
    }
}
