//! Cartorio Persist
//!
//! Turns frequent "data changed" events into a minimal number of durable
//! writes:
//! - **Debounce**: `trigger_save` restarts a timer; only the payload present
//!   when it fires is written
//! - **Single-flight**: at most one underlying save runs at a time
//! - **Queue-latest**: saves requested while one is in flight collapse into a
//!   single queued payload, sent as soon as the running save settles
//!
//! # Example
//!
//! ```rust,ignore
//! use cartorio_persist::{saver_fn, SaveError, SaveQueue, SaveQueueConfig};
//!
//! # async fn example() {
//! let queue = SaveQueue::builder(saver_fn(|fields: String| async move {
//!     store_fields(fields).await.map_err(SaveError::from_display)
//! }))
//! .config(SaveQueueConfig::default())
//! .build();
//!
//! queue.trigger_save("draft v1".to_string());
//! queue.trigger_save("draft v2".to_string());
//! queue.settled().await; // "draft v2" written once
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod queue;
pub mod saver;

pub use error::SaveError;
pub use queue::{ErrorCallback, SaveQueue, SaveQueueBuilder, SaveQueueConfig, SaveQueueState};
pub use saver::{saver_fn, FnSaver, Saver};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
