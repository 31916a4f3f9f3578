//! Cartorio Pipeline
//!
//! Follows a document through the remote processing pipeline:
//!
//! ```text
//! idle(0) → classifying(25) → extracting(50) → mapping(75) → generating(90) → completed(100)
//!                └──────────────┴─────────────┴────────────┴──────→ error(0)
//! ```
//!
//! State changes come only from push notifications on the document's status
//! channel. Progress is a pure function of the stage.
//!
//! Notifications may arrive out of order. [`StageOrdering::LastWins`] applies
//! whatever arrived last; [`StageOrdering::Monotonic`] refuses to move
//! backward and keeps terminal stages until the next start.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod machine;
pub mod notification;
pub mod stage;

pub use error::PipelineError;
pub use machine::{PipelineConfig, ProcessingMachine, ProcessingState};
pub use notification::{
    EventFilter, NotificationCallback, PipelineTrigger, PushChannel, StatusNotification, StatusRecord,
};
pub use stage::{Stage, StageOrdering, UnknownStage};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
