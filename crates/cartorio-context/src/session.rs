//! Signed-in session
//!
//! The session is passed explicitly to whatever needs it. Token handling
//! itself belongs to the auth provider; only identity and expiry are kept.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an authenticated user
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Create user id
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authenticated session as handed out by the auth provider
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// User the session belongs to
    pub user_id: UserId,
    /// Bearer token for upstream calls
    pub access_token: String,
    /// Expiry, if the provider reported one
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Create session without expiry
    #[inline]
    #[must_use]
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
            expires_at: None,
        }
    }

    /// With expiry
    #[inline]
    #[must_use]
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the session has expired according to `clock`
    #[inline]
    #[must_use]
    pub fn is_expired(&self, clock: &dyn Clock) -> bool {
        self.expires_at.is_some_and(|at| clock.now() >= at)
    }
}

// Keeps the token out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
