//! Per-window drain task.

use super::batcher::{Shared, WorkFn};
use super::config::duration_millis;
use super::future::Completer;
use super::window::Intake;
use crate::{Error, ErrorContext, Result};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Drain `intake` once it is sealed, run the work function once and hand the
/// outcome to every submission.
pub(crate) fn spawn<P, R>(shared: Arc<Shared<P, R>>, mut intake: Intake<P, R>)
where
    P: Send + 'static,
    R: Clone + Send + 'static,
{
    tokio::spawn(async move {
        let window_id = intake.id();
        let submissions = intake.collect().await;
        if submissions.is_empty() {
            return;
        }

        let batch_size = submissions.len();
        let (params, completers): (Vec<P>, Vec<Completer<R>>) = submissions
            .into_iter()
            .map(|s| (s.param, s.completer))
            .unzip();

        let start = Instant::now();
        let outcome = call_work(
            Arc::clone(&shared.work),
            params,
            ErrorContext::new().with_window_id(window_id),
        )
        .await;
        shared.record_outcome(&outcome);

        match &outcome {
            Ok(_) => debug!(
                window_id,
                batch_size,
                duration_ms = duration_millis(start.elapsed()),
                "batch drained"
            ),
            Err(e) => warn!(
                window_id,
                batch_size,
                duration_ms = duration_millis(start.elapsed()),
                error = %e,
                "batch work failed"
            ),
        }

        let mut abandoned = 0usize;
        for completer in completers {
            if !completer.complete(outcome.clone()) {
                abandoned += 1;
            }
        }
        if abandoned > 0 {
            debug!(window_id, abandoned, "callers stopped waiting before delivery");
        }
        // `intake` drops here and marks the window drained.
    });
}

/// Invoke the work function once, turning a panic into `Error::Runtime`.
pub(crate) async fn call_work<P, R>(
    work: WorkFn<P, R>,
    params: Vec<P>,
    context: ErrorContext,
) -> Result<R>
where
    P: Send + 'static,
    R: Send + 'static,
{
    let batch_size = params.len();
    match AssertUnwindSafe(async move { work(params).await })
        .catch_unwind()
        .await
    {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::runtime_with_context(
            "work function panicked",
            context
                .with_details(format!("batch_size={}", batch_size))
                .with_source("worker"),
        )),
    }
}
