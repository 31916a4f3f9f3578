//! Cartorio Fetch
//!
//! Cheap, resilient retrieval of one keyed resource (a user profile, for
//! instance) from an eventually consistent upstream store:
//!
//! ```text
//! fetch(key) ─▶ TtlCache ──hit──▶ value
//!                  │ miss/expired/corrupt
//!                  ▼
//!            ResourceSource ◀─ retry with fixed delay list
//!                  │ ok
//!                  ▼
//!            TtlCache.write ─▶ value
//! ```
//!
//! Exhausted retries yield `None`, never an error.
//!
//! # Example
//!
//! ```rust,ignore
//! use cartorio_fetch::{CachedFetcher, FetchConfig, MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example(source: impl cartorio_fetch::ResourceSource<Profile> + 'static) {
//! let fetcher = CachedFetcher::new(source, Arc::new(MemoryStore::default()), FetchConfig::default());
//! let profile = fetcher.fetch("user-1", false).await;
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod fetcher;
pub mod retry;
pub mod source;
pub mod store;

pub use cache::{CachedResource, TtlCache};
pub use error::SourceError;
pub use fetcher::{CachedFetcher, FetchConfig};
pub use retry::RetryPolicy;
pub use source::ResourceSource;
pub use store::{KeyValueStore, MemoryStore, SharedStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
