//! The append-only activity log store.
//!
//! Rows are created by the live path and mutated in exactly one way: the
//! settlement transaction flips `processed`/`processed_at` together.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use ascend_shared::activity::{ActivityKind, ActivityLog, ActivityMetrics};
use ascend_shared::window::SettlementWindow;

fn map_log(row: &Row) -> rusqlite::Result<ActivityLog> {
    let metrics_json: String = row.get(3)?;
    let metrics: ActivityMetrics = serde_json::from_str(&metrics_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ActivityLog {
        id: row.get(0)?,
        subject_id: row.get(1)?,
        occurred_at: row.get(2)?,
        metrics,
        processed: row.get::<_, i64>(4)? != 0,
        processed_at: row.get(5)?,
    })
}

const LOG_COLUMNS: &str = "id, subject_id, occurred_at, metrics, processed, processed_at";

/// Append one log. The kind column is denormalized from the metrics tag so
/// the sweep queries stay indexed.
pub fn append(
    conn: &Connection,
    subject_id: i64,
    metrics: &ActivityMetrics,
    occurred_at: DateTime<Utc>,
) -> Result<ActivityLog> {
    let kind = metrics.kind();
    let metrics_json = serde_json::to_string(metrics)?;
    conn.execute(
        "INSERT INTO activity_logs (subject_id, kind, occurred_at, metrics, processed)
         VALUES (?1, ?2, ?3, ?4, 0)",
        params![subject_id, kind.as_str(), occurred_at, metrics_json],
    )?;
    Ok(ActivityLog {
        id: conn.last_insert_rowid(),
        subject_id,
        occurred_at,
        metrics: metrics.clone(),
        processed: false,
        processed_at: None,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<ActivityLog>> {
    let log = conn
        .query_row(
            &format!("SELECT {LOG_COLUMNS} FROM activity_logs WHERE id = ?1"),
            [id],
            map_log,
        )
        .optional()?;
    Ok(log)
}

/// Unprocessed logs for a subject and kind inside a window, in
/// `occurred_at` order (the order any advisory context is built in).
pub fn unprocessed_in_window(
    conn: &Connection,
    subject_id: i64,
    kind: ActivityKind,
    window: &SettlementWindow,
) -> Result<Vec<ActivityLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOG_COLUMNS} FROM activity_logs
         WHERE subject_id = ?1 AND kind = ?2 AND processed = 0
           AND occurred_at >= ?3 AND occurred_at < ?4
         ORDER BY occurred_at, id"
    ))?;
    let logs = stmt
        .query_map(
            params![subject_id, kind.as_str(), window.start, window.end],
            map_log,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// Every unprocessed log for a subject and kind - the sweep derives its
/// backlog of settleable windows from these.
pub fn unprocessed(conn: &Connection, subject_id: i64, kind: ActivityKind) -> Result<Vec<ActivityLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOG_COLUMNS} FROM activity_logs
         WHERE subject_id = ?1 AND kind = ?2 AND processed = 0
         ORDER BY occurred_at, id"
    ))?;
    let logs = stmt
        .query_map(params![subject_id, kind.as_str()], map_log)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// All logs (processed or not) for a subject and kind inside a window.
/// Used for day-total context such as the water goal bonus.
pub fn logs_in_window(
    conn: &Connection,
    subject_id: i64,
    kind: ActivityKind,
    window: &SettlementWindow,
) -> Result<Vec<ActivityLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LOG_COLUMNS} FROM activity_logs
         WHERE subject_id = ?1 AND kind = ?2
           AND occurred_at >= ?3 AND occurred_at < ?4
         ORDER BY occurred_at, id"
    ))?;
    let logs = stmt
        .query_map(
            params![subject_id, kind.as_str(), window.start, window.end],
            map_log,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(logs)
}

/// Flip `processed` on consumed logs. Only the settlement transaction
/// calls this; the `AND processed = 0` guard means a row can be consumed
/// at most once and the return value reports how many actually flipped.
pub fn mark_processed(
    conn: &Connection,
    ids: &[i64],
    processed_at: DateTime<Utc>,
) -> Result<usize> {
    let mut stmt = conn.prepare(
        "UPDATE activity_logs SET processed = 1, processed_at = ?1
         WHERE id = ?2 AND processed = 0",
    )?;
    let mut changed = 0;
    for id in ids {
        changed += stmt.execute(params![processed_at, id])?;
    }
    Ok(changed)
}
