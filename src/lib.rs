//! # resilience-batcher
//!
//! Batching resiliency pattern for async Rust.
//!
//! Independent callers that invoke the same logical operation within a short
//! time window are coalesced into one invocation of the underlying work
//! function; the single outcome is fanned back out to every caller.
//!
//! ## Key Features
//!
//! - **Time-bounded windows**: each window accepts calls for a fixed timeout
//! - **Exactly-once drain**: one work call per window, however the window closes
//! - **Explicit flush**: seal the open window and wait for its outcome on shutdown
//! - **Prefilter**: reject bad parameters before they can join a batch
//! - **Snapshots**: window and outcome counters via [`batch::BatcherSnapshot`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_batcher::{Batcher, Error};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> resilience_batcher::Result<()> {
//!     let mut batcher = Batcher::new(Duration::from_millis(50), |rows: Vec<String>| async move {
//!         // bulk insert `rows`
//!         Ok(())
//!     });
//!     batcher.prefilter(|row: &String| {
//!         if row.is_empty() {
//!             Err(Error::rejected("empty row"))
//!         } else {
//!             Ok(())
//!         }
//!     });
//!
//!     let batcher = Arc::new(batcher);
//!     let handles: Vec<_> = (0..3)
//!         .map(|i| {
//!             let b = Arc::clone(&batcher);
//!             tokio::spawn(async move { b.run(format!("row-{i}")).await })
//!         })
//!         .collect();
//!     for h in handles {
//!         h.await.expect("task panicked")?;
//!     }
//!
//!     batcher.flush().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`batch`] | Coordinator, windows, timers and workers |
//! | [`error`] | Error type and structured context |

pub mod batch;

pub use batch::{Batcher, BatcherBuilder, BatcherConfig, BatcherSnapshot};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
