//! Cartorio Core
//!
//! Ties the coordination primitives together for the notary-office client:
//! - loads and validates configuration
//! - bootstraps the session and its profile exactly once per sign-in
//! - gives each open document its pipeline tracker, analysis stream and
//!   field save queue, and tears them down together
//! - installs the tracing subscriber
//!
//! # Example
//!
//! ```rust,ignore
//! use cartorio_core::prelude::*;
//!
//! # async fn example(deps: WorkspaceDeps) -> cartorio_core::Result<()> {
//! let config = CartorioConfig::load("cartorio.toml")?;
//! let workspace = DocumentWorkspace::open("6f1c3a52-8f43-4d8e-9a55-0c1d2b3e4f50", &deps, &config)?;
//!
//! workspace.process().await;
//! println!("{}%", workspace.pipeline().state().progress_percent());
//! workspace.dispose();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod session;
pub mod telemetry;
pub mod workspace;

pub use config::CartorioConfig;
pub use error::{CartorioError, ConfigError, Result};
pub use session::{AuthEvent, AuthState, Profile, SessionBootstrapper};
pub use telemetry::LogFormat;
pub use workspace::{DocumentId, DocumentWorkspace, ExtractedFields, WorkspaceDeps};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Cartorio Core
    pub use crate::{
        AuthEvent, AuthState, CartorioConfig, CartorioError, DocumentId, DocumentWorkspace,
        ExtractedFields, LogFormat, Profile, SessionBootstrapper, WorkspaceDeps,
    };
    pub use cartorio_context::{Session, UserId};
    pub use cartorio_pipeline::{ProcessingState, Stage};
    pub use cartorio_stream::{AnalysisRequest, InputDocument, StreamState, StreamStatus};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
