//! Activity kinds, their metric payloads, and the append-only log record.
//!
//! Metrics are a tagged enum rather than a loose key-bag so the scoring
//! policy can match exhaustively and unknown kinds fail at compile time.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AscendError;

/// The three tracked activity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Mood,
    Health,
    Coding,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 3] =
        [ActivityKind::Mood, ActivityKind::Health, ActivityKind::Coding];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Mood => "mood",
            ActivityKind::Health => "health",
            ActivityKind::Coding => "coding",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = AscendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mood" => Ok(ActivityKind::Mood),
            "health" => Ok(ActivityKind::Health),
            "coding" => Ok(ActivityKind::Coding),
            other => Err(AscendError::UnknownKind(other.to_string())),
        }
    }
}

/// A logged meal. The healthiness score lives in [-1, 1] and may be filled
/// in later by the advisory scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Health components carried by one log. All optional: the live path logs
/// meals, water, sleep, and exercise as separate entries through the day.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meal: Option<Meal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_hours: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water_liters: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercise_minutes: Option<f64>,
}

/// Kind-specific metrics carried by one activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActivityMetrics {
    Coding {
        #[serde(default)]
        lines_added: u64,
        #[serde(default)]
        lines_removed: u64,
        #[serde(default)]
        minutes: f64,
    },
    Health(HealthMetrics),
    Mood {
        text: String,
        /// Sentiment in [-1, 1]. Out-of-range values are clamped by the
        /// scoring policy, never rejected.
        sentiment: f64,
    },
}

impl ActivityMetrics {
    pub fn kind(&self) -> ActivityKind {
        match self {
            ActivityMetrics::Coding { .. } => ActivityKind::Coding,
            ActivityMetrics::Health { .. } => ActivityKind::Health,
            ActivityMetrics::Mood { .. } => ActivityKind::Mood,
        }
    }
}

/// One row of the append-only activity log.
///
/// Invariant: `processed_at` is set iff `processed` is true. Only the
/// settlement transaction flips the pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLog {
    pub id: i64,
    pub subject_id: i64,
    pub occurred_at: DateTime<Utc>,
    pub metrics: ActivityMetrics,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
}

impl ActivityLog {
    pub fn kind(&self) -> ActivityKind {
        self.metrics.kind()
    }
}
