//! The atomic settlement commit.
//!
//! All four settlement effects happen inside one immediate transaction on
//! the single connection: the guard re-check, the XP event insert, the
//! level read-modify-write, and the processed flips.
//! Either all four land or none do - partial application (XP awarded but
//! logs left unprocessed) is the bug this module exists to prevent.
//!
//! Scoring and any advisory consult happen *before* this runs; nothing in
//! here performs network I/O or can block on anything but the database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};

use ascend_shared::activity::ActivityKind;
use ascend_shared::settlement::SettlementOutcome;
use ascend_shared::window::SettlementWindow;

use crate::{activity_store, level_store, xp_store};

/// One fully-scored settlement, ready to commit.
#[derive(Debug, Clone)]
pub struct SettlementRequest {
    pub subject_id: i64,
    pub kind: ActivityKind,
    pub window: SettlementWindow,
    /// Scored XP - already clamped by the scoring policy.
    pub amount: u32,
    pub details: Option<String>,
    /// The unprocessed logs this award consumes.
    pub log_ids: Vec<i64>,
    /// Set for instant awards; switches the guard from the window key to
    /// the unique source log.
    pub source_log_id: Option<i64>,
    pub now: DateTime<Utc>,
}

/// Run the settlement transaction. Returns `AlreadyAwarded` when the guard
/// fires or when every requested log was consumed by a concurrent pass.
pub fn commit_settlement(
    conn: &mut Connection,
    req: &SettlementRequest,
) -> Result<SettlementOutcome> {
    if req.log_ids.is_empty() {
        return Ok(SettlementOutcome::Empty);
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to open settlement transaction")?;

    // Guard re-check inside the transaction. The pre-check the engine does
    // is just a fast path; this one is the authoritative answer.
    let already = match req.source_log_id {
        Some(log_id) => xp_store::instant_award_exists(&tx, log_id)?,
        None => xp_store::window_award_exists(&tx, req.subject_id, req.kind, req.window.start)?,
    };
    if already {
        return Ok(SettlementOutcome::AlreadyAwarded);
    }

    // Consume the logs first: if another pass got here in between, zero
    // rows flip and this pass backs off without writing anything.
    let consumed = activity_store::mark_processed(&tx, &req.log_ids, req.now)?;
    if consumed == 0 {
        return Ok(SettlementOutcome::AlreadyAwarded);
    }

    let event_id = xp_store::insert_event(
        &tx,
        req.subject_id,
        req.kind,
        req.amount,
        req.now,
        req.details.as_deref(),
        &req.window,
        req.source_log_id,
    )?;

    let level = level_store::apply_xp(&tx, req.subject_id, req.amount, req.now)?;

    tx.commit().context("Failed to commit settlement")?;

    Ok(SettlementOutcome::Awarded {
        event_id,
        xp: req.amount,
        new_level: level.current_level,
        total_xp: level.total_xp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, DbLocation};
    use crate::subject_store;
    use ascend_shared::activity::ActivityMetrics;
    use tempfile::tempdir;

    async fn test_db() -> (Db, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Db::open(DbLocation::Custom(dir.path().join("test.db")))
            .await
            .unwrap();
        (db, dir)
    }

    fn mood(text: &str, sentiment: f64) -> ActivityMetrics {
        ActivityMetrics::Mood {
            text: text.into(),
            sentiment,
        }
    }

    #[tokio::test]
    async fn test_commit_is_atomic_and_idempotent() {
        let (db, _dir) = test_db().await;
        db.execute(|conn| {
            let subject = subject_store::create(conn, "kai", 0)?;
            let now = Utc::now();
            let window = SettlementWindow::day_of(now, 0);

            let a = activity_store::append(conn, subject.id, &mood("up early", 0.3), now)?;
            let b = activity_store::append(conn, subject.id, &mood("good run", 0.7), now)?;

            let req = SettlementRequest {
                subject_id: subject.id,
                kind: ActivityKind::Mood,
                window,
                amount: 22,
                details: Some("average sentiment +0.50 across 2 entries".into()),
                log_ids: vec![a.id, b.id],
                source_log_id: None,
                now,
            };

            let first = commit_settlement(conn, &req)?;
            assert!(first.is_awarded());

            // Every consumed log is processed with a timestamp.
            for id in [a.id, b.id] {
                let log = activity_store::get(conn, id)?.unwrap();
                assert!(log.processed);
                assert!(log.processed_at.is_some());
            }

            // Second attempt for the same window: defined no-op.
            let second = commit_settlement(conn, &req)?;
            assert_eq!(second, SettlementOutcome::AlreadyAwarded);

            let level = crate::level_store::get(conn, subject.id)?.unwrap();
            assert_eq!(level.total_xp, 22);
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_no_trace() {
        let (db, _dir) = test_db().await;
        db.execute(|conn| {
            let subject = subject_store::create(conn, "kai", 0)?;
            let now = Utc::now();
            let window = SettlementWindow::day_of(now, 0);
            let log = activity_store::append(conn, subject.id, &mood("quiet day", 0.0), now)?;

            // A source_log_id that violates the foreign key makes the
            // event insert blow up after the logs were already flipped -
            // the whole transaction must roll back.
            let req = SettlementRequest {
                subject_id: subject.id,
                kind: ActivityKind::Mood,
                window,
                amount: 8,
                details: None,
                log_ids: vec![log.id],
                source_log_id: Some(999_999),
                now,
            };
            assert!(commit_settlement(conn, &req).is_err());

            // No orphan event, no level movement, log still unprocessed.
            let log = activity_store::get(conn, log.id)?.unwrap();
            assert!(!log.processed);
            assert!(log.processed_at.is_none());
            assert!(crate::level_store::get(conn, subject.id)?.is_none());
            let events = xp_store::events_in_window(conn, subject.id, &window)?;
            assert!(events.is_empty());
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_instant_guard_keyed_on_source_log() {
        let (db, _dir) = test_db().await;
        db.execute(|conn| {
            let subject = subject_store::create(conn, "kai", 0)?;
            let now = Utc::now();
            let log = activity_store::append(conn, subject.id, &mood("note", 0.2), now)?;

            let req = SettlementRequest {
                subject_id: subject.id,
                kind: ActivityKind::Mood,
                window: SettlementWindow::instant(now),
                amount: 9,
                details: None,
                log_ids: vec![log.id],
                source_log_id: Some(log.id),
                now,
            };
            assert!(commit_settlement(conn, &req)?.is_awarded());
            assert_eq!(commit_settlement(conn, &req)?, SettlementOutcome::AlreadyAwarded);

            // A different log settles fine - instant awards are unique per
            // log, not per window.
            let other = activity_store::append(conn, subject.id, &mood("later", 0.4), now)?;
            let req2 = SettlementRequest {
                log_ids: vec![other.id],
                source_log_id: Some(other.id),
                ..req
            };
            assert!(commit_settlement(conn, &req2)?.is_awarded());
            Ok(())
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_empty_request_is_empty_outcome() {
        let (db, _dir) = test_db().await;
        db.execute(|conn| {
            let subject = subject_store::create(conn, "kai", 0)?;
            let now = Utc::now();
            let req = SettlementRequest {
                subject_id: subject.id,
                kind: ActivityKind::Health,
                window: SettlementWindow::day_of(now, 0),
                amount: 0,
                details: None,
                log_ids: vec![],
                source_log_id: None,
                now,
            };
            assert_eq!(commit_settlement(conn, &req)?, SettlementOutcome::Empty);
            Ok(())
        })
        .await
        .unwrap();
    }
}
