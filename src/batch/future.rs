//! One-shot outcome slot.

use crate::{Error, ErrorContext, Result};
use tokio::sync::oneshot;

/// Write half of a result slot. Consumed on delivery, so it can fire once.
#[derive(Debug)]
pub(crate) struct Completer<R> {
    tx: oneshot::Sender<Result<R>>,
}

/// Read half of a result slot, held by the caller that submitted the work.
#[derive(Debug)]
pub(crate) struct Pending<R> {
    rx: oneshot::Receiver<Result<R>>,
    window_id: u64,
}

pub(crate) fn slot<R>(window_id: u64) -> (Completer<R>, Pending<R>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Pending { rx, window_id })
}

impl<R> Completer<R> {
    /// Deliver the outcome. Returns false if the caller stopped waiting.
    pub(crate) fn complete(self, outcome: Result<R>) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

impl<R> Pending<R> {
    /// Wait for the outcome.
    ///
    /// A dropped completer means the worker died before delivering (the work
    /// function panicked); that surfaces as a runtime error rather than a hang.
    pub(crate) async fn wait(self) -> Result<R> {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::runtime_with_context(
                "batch worker terminated before delivering an outcome",
                ErrorContext::new()
                    .with_window_id(self.window_id)
                    .with_source("worker"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slot_delivers_value() {
        let (completer, pending) = slot::<u32>(1);
        assert!(completer.complete(Ok(42)));
        assert_eq!(pending.wait().await, Ok(42));
    }

    #[tokio::test]
    async fn test_slot_delivers_error() {
        let (completer, pending) = slot::<()>(1);
        completer.complete(Err(Error::work("boom")));
        assert!(pending.wait().await.unwrap_err().is_work_failure());
    }

    #[tokio::test]
    async fn test_dropped_completer_is_runtime_error() {
        let (completer, pending) = slot::<()>(9);
        drop(completer);
        let err = pending.wait().await.unwrap_err();
        assert!(matches!(err, Error::Runtime { .. }));
        assert_eq!(err.context().window_id, Some(9));
    }

    #[test]
    fn test_complete_after_reader_dropped() {
        let (completer, pending) = slot::<()>(1);
        drop(pending);
        assert!(!completer.complete(Ok(())));
    }
}
