//! Subjects - the tracked individuals who own all logs, events, and levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A tracked individual. Every activity log, XP event, and level row is
/// exclusively owned by one subject.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    /// Processing timezone as minutes east of UTC. Settlement windows are
    /// calendar days in this offset.
    pub tz_offset_minutes: i32,
    /// Inactive subjects are skipped by the batch sweep.
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Subject {
    /// Convenience for tests and bootstrap code.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            tz_offset_minutes: 0,
            active: true,
            created_at: Utc::now(),
        }
    }
}
