//! Severity and confidence levels

use serde::{Deserialize, Serialize};

/// Road-surface severity of a reading or cluster.
///
/// Ordered: `Low < Medium < High`. `Low` means "no defect" and is never
/// persisted as a new cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low = 0,
    Medium = 1,
    High = 2,
}

impl Severity {
    /// Map color used by the dashboard and the upload acknowledgement.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Low => "green",
            Self::Medium => "orange",
            Self::High => "red",
        }
    }

    /// True when a reading at this level should be written to the store.
    pub const fn is_defect(self) -> bool {
        !matches!(self, Self::Low)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Trust level derived from how many readings contributed to a cluster.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Readings needed for `High` confidence.
    pub const HIGH_MIN_OCCURRENCES: u32 = 5;
    /// Readings needed for `Medium` confidence.
    pub const MEDIUM_MIN_OCCURRENCES: u32 = 2;

    pub const fn from_occurrences(count: u32) -> Self {
        if count >= Self::HIGH_MIN_OCCURRENCES {
            Self::High
        } else if count >= Self::MEDIUM_MIN_OCCURRENCES {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Medium => write!(f, "Medium"),
            Self::High => write!(f, "High"),
        }
    }
}
