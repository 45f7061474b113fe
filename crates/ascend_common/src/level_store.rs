//! The per-subject level ledger row.
//!
//! `apply_xp` is only ever called inside the settlement transaction - the
//! read-modify-write here and the event insert must be one atomic unit or
//! two settlements for different kinds can lose updates on `total_xp`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use ascend_shared::leveling::{level_for, Level};

fn map_level(row: &Row) -> rusqlite::Result<Level> {
    Ok(Level {
        subject_id: row.get(0)?,
        current_level: row.get::<_, i64>(1)? as u32,
        total_xp: row.get::<_, i64>(2)? as u64,
        last_updated: row.get(3)?,
    })
}

pub fn get(conn: &Connection, subject_id: i64) -> Result<Option<Level>> {
    let level = conn
        .query_row(
            "SELECT subject_id, current_level, total_xp, last_updated
             FROM levels WHERE subject_id = ?1",
            [subject_id],
            map_level,
        )
        .optional()?;
    Ok(level)
}

/// Read-or-create the row, add the award, recompute the level. Never
/// decreases `total_xp` - there is no reversal path by design.
pub fn apply_xp(
    conn: &Connection,
    subject_id: i64,
    amount: u32,
    now: DateTime<Utc>,
) -> Result<Level> {
    let current = get(conn, subject_id)?;
    let total_xp = current.as_ref().map(|l| l.total_xp).unwrap_or(0) + amount as u64;
    let current_level = level_for(total_xp);

    match current {
        Some(_) => {
            conn.execute(
                "UPDATE levels SET current_level = ?2, total_xp = ?3, last_updated = ?4
                 WHERE subject_id = ?1",
                params![subject_id, current_level as i64, total_xp as i64, now],
            )?;
        }
        None => {
            conn.execute(
                "INSERT INTO levels (subject_id, current_level, total_xp, last_updated)
                 VALUES (?1, ?2, ?3, ?4)",
                params![subject_id, current_level as i64, total_xp as i64, now],
            )?;
        }
    }

    Ok(Level {
        subject_id,
        current_level,
        total_xp,
        last_updated: now,
    })
}
