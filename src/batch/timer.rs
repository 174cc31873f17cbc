//! Per-window timer.

use super::batcher::Shared;
use super::window::{SealedBy, Window};
use std::sync::Arc;
use std::time::Duration;

/// Seal `window` after `timeout` unless something else seals it first.
pub(crate) fn spawn<P, R>(shared: Arc<Shared<P, R>>, window: Arc<Window<P, R>>, timeout: Duration)
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                shared.seal_window(&window, SealedBy::Timer);
            }
            // flushed early
            _ = window.wait_sealed() => {}
        }
    });
}
