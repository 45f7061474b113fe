//! Subject rows - creation and the active roster the sweep iterates.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use ascend_shared::subject::Subject;

fn map_subject(row: &Row) -> rusqlite::Result<Subject> {
    Ok(Subject {
        id: row.get(0)?,
        name: row.get(1)?,
        tz_offset_minutes: row.get(2)?,
        active: row.get::<_, i64>(3)? != 0,
        created_at: row.get(4)?,
    })
}

pub fn create(conn: &Connection, name: &str, tz_offset_minutes: i32) -> Result<Subject> {
    let created_at = Utc::now();
    conn.execute(
        "INSERT INTO subjects (name, tz_offset_minutes, active, created_at)
         VALUES (?1, ?2, 1, ?3)",
        params![name, tz_offset_minutes, created_at],
    )?;
    Ok(Subject {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        tz_offset_minutes,
        active: true,
        created_at,
    })
}

pub fn get(conn: &Connection, id: i64) -> Result<Option<Subject>> {
    let subject = conn
        .query_row(
            "SELECT id, name, tz_offset_minutes, active, created_at
             FROM subjects WHERE id = ?1",
            [id],
            map_subject,
        )
        .optional()?;
    Ok(subject)
}

/// The roster the batch sweep visits.
pub fn list_active(conn: &Connection) -> Result<Vec<Subject>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, tz_offset_minutes, active, created_at
         FROM subjects WHERE active = 1 ORDER BY id",
    )?;
    let subjects = stmt
        .query_map([], map_subject)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(subjects)
}

pub fn set_active(conn: &Connection, id: i64, active: bool) -> Result<()> {
    conn.execute(
        "UPDATE subjects SET active = ?2 WHERE id = ?1",
        params![id, active],
    )?;
    Ok(())
}
