//! Fixed stage table

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Pipeline stage, in processing order
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Not started
    #[default]
    Idle,
    /// Detecting the document type
    Classifying,
    /// Reading fields from the document
    Extracting,
    /// Mapping fields onto the target form
    Mapping,
    /// Producing the output document
    Generating,
    /// Done
    Completed,
    /// Failed; reachable from any non-idle stage
    Error,
}

impl Stage {
    /// Every stage, ordered
    pub const ALL: [Self; 7] = [
        Self::Idle,
        Self::Classifying,
        Self::Extracting,
        Self::Mapping,
        Self::Generating,
        Self::Completed,
        Self::Error,
    ];

    /// Progress percentage shown for this stage
    #[inline]
    #[must_use]
    pub const fn progress(self) -> u8 {
        match self {
            Self::Idle | Self::Error => 0,
            Self::Classifying => 25,
            Self::Extracting => 50,
            Self::Mapping => 75,
            Self::Generating => 90,
            Self::Completed => 100,
        }
    }

    /// Position in the forward order; `Error` ranks with `Completed`
    #[inline]
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Classifying => 1,
            Self::Extracting => 2,
            Self::Mapping => 3,
            Self::Generating => 4,
            Self::Completed | Self::Error => 5,
        }
    }

    /// `Completed` or `Error`
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::Extracting => "extracting",
            Self::Mapping => "mapping",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage name not in the table
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown pipeline stage: {0:?}")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// How late or out-of-order notifications are applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOrdering {
    /// Apply whatever arrived last
    #[default]
    LastWins,
    /// Never move backward; terminal stages stick until reset
    Monotonic,
}

impl StageOrdering {
    /// Whether a notification for `next` may replace `current`
    #[must_use]
    pub const fn admits(self, current: Stage, next: Stage) -> bool {
        match self {
            Self::LastWins => true,
            Self::Monotonic => {
                if current.is_terminal() {
                    false
                } else {
                    matches!(next, Stage::Error) || next.rank() >= current.rank()
                }
            }
        }
    }
}
