//! Settlement outcomes, award modes, and the immutable XP event record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityKind;

/// How a kind's logs turn into XP events.
///
/// Exactly one mode is declared per kind per deployment; the idempotency
/// guard covers both paths so the two can never double-award a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AwardMode {
    /// One aggregate award per settlement window, granted by the sweep.
    #[default]
    Daily,
    /// One award per log, granted immediately on append.
    Instant,
}

/// An append-only XP ledger entry. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct XpEvent {
    pub id: i64,
    pub subject_id: i64,
    pub xp_type: ActivityKind,
    pub amount: u32,
    pub timestamp: DateTime<Utc>,
    /// Rationale string - populated by the advisory scorer when it
    /// succeeded, by the deterministic rule otherwise.
    pub details: Option<String>,
    /// Window identity backing the idempotency guard.
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Set for instant awards; unique so one log can never pay out twice.
    pub source_log_id: Option<i64>,
}

/// Result of one settlement pass for a (subject, kind, window).
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// A new XP event was created and the level ledger updated.
    Awarded {
        event_id: i64,
        xp: u32,
        new_level: u32,
        total_xp: u64,
    },
    /// An event for this window already exists - a defined no-op.
    AlreadyAwarded,
    /// No unprocessed logs existed in the window.
    Empty,
}

impl SettlementOutcome {
    pub fn is_awarded(&self) -> bool {
        matches!(self, SettlementOutcome::Awarded { .. })
    }
}

/// Tally of one batch sweep across all active subjects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Active subjects visited.
    pub subjects: usize,
    pub awarded: usize,
    pub already_awarded: usize,
    pub empty: usize,
    /// Subject/window passes that errored and were skipped. The sweep
    /// never aborts on a single subject's failure.
    pub failed: usize,
}

impl SweepSummary {
    pub fn record(&mut self, outcome: &SettlementOutcome) {
        match outcome {
            SettlementOutcome::Awarded { .. } => self.awarded += 1,
            SettlementOutcome::AlreadyAwarded => self.already_awarded += 1,
            SettlementOutcome::Empty => self.empty += 1,
        }
    }
}
