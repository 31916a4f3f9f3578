//! Testing utilities for the Cartorio workspace
//!
//! In-memory fakes for every contract the coordination crates consume, plus
//! a few fixtures.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

mod backend;
mod clock;
mod push;
mod saver;
mod source;

pub use backend::{FragmentFeed, ScriptedBackend};
pub use clock::ManualClock;
pub use push::{ManualPushChannel, RecordingTrigger};
pub use saver::RecordingSaver;
pub use source::ScriptedSource;

use cartorio_stream::{AnalysisRequest, InputDocument};

/// Request with one small JPEG-typed document
pub fn document_request() -> AnalysisRequest {
    AnalysisRequest::new(vec![InputDocument::new(
        "rg-frente.jpg",
        "image/jpeg",
        vec![0xFF, 0xD8, 0xFF, 0xE0],
    )])
}

/// Yield to the scheduler enough times for spawned tasks to catch up
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}
