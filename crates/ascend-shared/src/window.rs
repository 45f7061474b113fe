//! Settlement windows - the time buckets XP awards settle over.
//!
//! The default window is one calendar day in the subject's processing
//! timezone. Instant awards use a degenerate single-instant window so the
//! XP event row still carries a window identity for the report queries.

use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A half-open time bucket `[start, end)` that unprocessed logs aggregate
/// over. `start == end` marks an instant (single-log) window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SettlementWindow {
    /// The calendar day containing `ts` in the given processing timezone.
    ///
    /// Offsets outside the valid +/-24h range fall back to UTC rather than
    /// failing a settlement pass over a bad subject row.
    pub fn day_of(ts: DateTime<Utc>, tz_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(tz_offset_minutes * 60)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset is valid"));
        let local_day = ts.with_timezone(&offset).date_naive();
        let start_local = local_day
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time");
        let start = offset
            .from_local_datetime(&start_local)
            .single()
            .expect("fixed offsets have no DST gaps")
            .with_timezone(&Utc);
        Self {
            start,
            end: start + Duration::days(1),
        }
    }

    /// The degenerate window for a single instantly-awarded log.
    pub fn instant(occurred_at: DateTime<Utc>) -> Self {
        Self {
            start: occurred_at,
            end: occurred_at,
        }
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        if self.is_instant() {
            ts == self.start
        } else {
            ts >= self.start && ts < self.end
        }
    }

    /// Whether the bucket is complete - the batch sweep only settles
    /// windows that have ended, leaving the open day to keep accumulating.
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}
