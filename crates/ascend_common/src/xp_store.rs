//! The append-only XP event ledger and the idempotency guard queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::str::FromStr;

use ascend_shared::activity::ActivityKind;
use ascend_shared::settlement::XpEvent;
use ascend_shared::window::SettlementWindow;

fn map_event(row: &Row) -> rusqlite::Result<XpEvent> {
    let kind_str: String = row.get(2)?;
    let xp_type = ActivityKind::from_str(&kind_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(XpEvent {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        xp_type,
        amount: row.get::<_, i64>(3)? as u32,
        timestamp: row.get(4)?,
        details: row.get(5)?,
        window_start: row.get(6)?,
        window_end: row.get(7)?,
        source_log_id: row.get(8)?,
    })
}

const EVENT_COLUMNS: &str =
    "id, subject_id, xp_type, amount, timestamp, details, window_start, window_end, source_log_id";

/// Guard for batch awards: has this (subject, kind, window) already paid?
pub fn window_award_exists(
    conn: &Connection,
    subject_id: i64,
    kind: ActivityKind,
    window_start: DateTime<Utc>,
) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM xp_events
            WHERE subject_id = ?1 AND xp_type = ?2 AND window_start = ?3
              AND source_log_id IS NULL
        )",
        params![subject_id, kind.as_str(), window_start],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Guard for instant awards: has this log already paid?
pub fn instant_award_exists(conn: &Connection, source_log_id: i64) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM xp_events WHERE source_log_id = ?1)",
        [source_log_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Insert one ledger entry. Callers run this inside the settlement
/// transaction; it is never used on its own.
#[allow(clippy::too_many_arguments)]
pub fn insert_event(
    conn: &Connection,
    subject_id: i64,
    kind: ActivityKind,
    amount: u32,
    timestamp: DateTime<Utc>,
    details: Option<&str>,
    window: &SettlementWindow,
    source_log_id: Option<i64>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO xp_events
         (subject_id, xp_type, amount, timestamp, details, window_start, window_end, source_log_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            subject_id,
            kind.as_str(),
            amount as i64,
            timestamp,
            details,
            window.start,
            window.end,
            source_log_id,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Events whose own timestamp falls inside a window, newest last. This is
/// what the report reads.
pub fn events_in_window(
    conn: &Connection,
    subject_id: i64,
    window: &SettlementWindow,
) -> Result<Vec<XpEvent>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {EVENT_COLUMNS} FROM xp_events
         WHERE subject_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
         ORDER BY timestamp, id"
    ))?;
    let events = stmt
        .query_map(params![subject_id, window.start, window.end], map_event)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(events)
}

/// Per-kind XP totals for a window - the report's breakdown lines.
pub fn totals_by_kind(
    conn: &Connection,
    subject_id: i64,
    window: &SettlementWindow,
) -> Result<Vec<(ActivityKind, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT xp_type, SUM(amount) FROM xp_events
         WHERE subject_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
         GROUP BY xp_type ORDER BY xp_type",
    )?;
    let rows = stmt.query_map(params![subject_id, window.start, window.end], |row| {
        let kind: String = row.get(0)?;
        let total: i64 = row.get(1)?;
        Ok((kind, total))
    })?;
    let mut totals = Vec::new();
    for row in rows {
        let (kind, total) = row?;
        totals.push((ActivityKind::from_str(&kind)?, total as u64));
    }
    Ok(totals)
}
