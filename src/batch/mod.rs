//! # Call Batching Module
//!
//! Coalesces independent, concurrent calls into a single invocation of an
//! expensive or rate-limited work function, then hands the one outcome back to
//! every caller that took part.
//!
//! ## Overview
//!
//! Batching is useful for:
//! - Amortizing per-call overhead (network round trips, bulk writes)
//! - Staying under provider rate limits without callers coordinating
//! - Draining pending work on shutdown with a single `flush`
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Batcher`] | Coordinator: routes calls into time-bounded windows |
//! | [`BatcherBuilder`] | Builds a batcher from config, work function and prefilter |
//! | [`BatcherConfig`] | Window timeout, loadable from YAML/JSON |
//! | [`BatcherSnapshot`] | Point-in-time view of windows and outcomes |
//!
//! ## Lifecycle
//!
//! The first `run` while no window is open creates one, together with a timer
//! and a worker task. Later calls join it until the timer or an explicit
//! `flush` seals it. The worker then runs the work function once over all
//! parameters in arrival order and delivers the same outcome to each caller.
//! A zero timeout turns batching off: every call runs alone, inline.
//!
//! ## Example
//!
//! ```rust
//! use resilience_batcher::batch::Batcher;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> resilience_batcher::Result<()> {
//! let batcher = Batcher::new(Duration::from_millis(20), |ids: Vec<u64>| async move {
//!     // one bulk call for every id collected in the window
//!     println!("saving {} records", ids.len());
//!     Ok(())
//! });
//!
//! batcher.run(1).await?;
//! batcher.flush().await;
//! # Ok(())
//! # }
//! ```

mod batcher;
mod config;
mod future;
mod timer;
mod window;
mod worker;

pub use batcher::{Batcher, BatcherBuilder, BatcherSnapshot, PrefilterFn, WorkFn};
pub use config::BatcherConfig;
