//! Cartorio Context
//!
//! Small shared pieces every coordination unit is constructed with instead of
//! reaching for ambient globals:
//! - [`Clock`] for wall-clock timestamps (`lastSavedAt`, `cachedAt`)
//! - [`Session`] describing the signed-in user
//! - [`InitGuard`] for check-and-set "already initialized" races
//! - [`Subscription`] as the explicit disposal handle for push channels
//!
//! # Example
//!
//! ```rust
//! use cartorio_context::{InitGuard, Subscription};
//!
//! let guard = InitGuard::new();
//! assert!(guard.try_begin());
//! assert!(!guard.try_begin());
//!
//! let mut sub = Subscription::new("document-status:42", || {});
//! sub.unsubscribe();
//! assert!(!sub.is_active());
//! ```

#![warn(unreachable_pub)]

pub mod clock;
pub mod guard;
pub mod session;
pub mod subscription;

pub use clock::{Clock, SharedClock, SystemClock};
pub use guard::InitGuard;
pub use session::{Session, UserId};
pub use subscription::Subscription;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
