//! Level ledger math - 100 XP per level, uncapped, never decreasing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::XP_PER_LEVEL;

/// The per-subject cumulative ledger row. One row per subject, created
/// lazily on the first XP award.
///
/// Invariant after every update: `current_level == total_xp / 100 + 1`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Level {
    pub subject_id: i64,
    pub current_level: u32,
    pub total_xp: u64,
    pub last_updated: DateTime<Utc>,
}

/// Level derived from a cumulative XP total.
pub fn level_for(total_xp: u64) -> u32 {
    (total_xp / XP_PER_LEVEL) as u32 + 1
}

/// XP accumulated inside the current level.
pub fn xp_into_level(total_xp: u64) -> u64 {
    total_xp % XP_PER_LEVEL
}

/// XP still needed to reach the next level.
pub fn xp_to_next_level(total_xp: u64) -> u64 {
    XP_PER_LEVEL - xp_into_level(total_xp)
}
