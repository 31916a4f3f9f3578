//! Cartorio Stream
//!
//! Consumes the fragment stream of a generative backend and keeps a live,
//! cancellable view of two channels:
//! - **thinking**: the optional reasoning text, with elapsed thinking time
//! - **content**: the final visible output
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ Analyzing ──exhausted──▶ Completed
//!                    │  │
//!                    │  └──upstream failure──▶ Error
//!                    └──stop──▶ Completed (partial content) | Idle (nothing yet)
//! ```
//!
//! Starting again while `Analyzing` cancels the running attempt before any
//! of the new attempt's resets are applied, so fragments of two attempts
//! never mix.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartorio_stream::{AnalysisRequest, InputDocument, StreamAggregator};
//!
//! # async fn example(backend: impl cartorio_stream::GenerativeBackend + 'static) {
//! let aggregator = StreamAggregator::new(backend);
//! aggregator.start(AnalysisRequest::new(vec![InputDocument::new("rg.jpg", "image/jpeg", bytes)]));
//! let state = aggregator.finished().await;
//! println!("{}", state.content);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod aggregator;
pub mod backend;
pub mod error;
pub mod request;

pub use aggregator::{StreamAggregator, StreamState, StreamStatus};
pub use backend::{Fragment, FragmentStream, GenerativeBackend};
pub use error::{BackendError, ErrorCategory, StreamFailure};
pub use request::{AnalysisRequest, InputDocument};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
