//! Sweeper lifecycle and batch-sweep isolation.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tempfile::tempdir;

use ascend_common::config::SweepSettings;
use ascend_common::{subject_store, xp_store, Config, Db, DbLocation};
use ascend_shared::activity::ActivityMetrics;
use ascend_shared::window::SettlementWindow;
use ascendd::engine::SettlementEngine;
use ascendd::sweeper::Sweeper;

async fn test_engine() -> (Arc<SettlementEngine>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let db = Db::open(DbLocation::Custom(dir.path().join("test.db")))
        .await
        .unwrap();
    (
        Arc::new(SettlementEngine::new(db, Config::default(), None)),
        dir,
    )
}

#[tokio::test]
async fn test_one_bad_subject_does_not_stop_the_sweep() {
    let (engine, _dir) = test_engine().await;
    let yesterday = Utc::now() - Duration::days(1);

    let healthy = engine
        .db()
        .execute(|conn| subject_store::create(conn, "healthy", 0))
        .await
        .unwrap();
    let broken = engine
        .db()
        .execute(|conn| subject_store::create(conn, "broken", 0))
        .await
        .unwrap();

    engine
        .log_activity(
            healthy.id,
            ActivityMetrics::Mood {
                text: "fine day".into(),
                sentiment: 0.2,
            },
            yesterday,
        )
        .await
        .unwrap();

    // Corrupt row for the other subject: unreadable metrics make every
    // pass over it fail.
    let broken_id = broken.id;
    engine
        .db()
        .execute(move |conn| {
            conn.execute(
                "INSERT INTO activity_logs (subject_id, kind, occurred_at, metrics, processed)
                 VALUES (?1, 'mood', ?2, 'not json at all', 0)",
                rusqlite::params![broken_id, yesterday],
            )?;
            Ok(())
        })
        .await
        .unwrap();

    let summary = engine.run_settlement_sweep().await.unwrap();
    assert_eq!(summary.subjects, 2);
    assert_eq!(summary.awarded, 1);
    assert_eq!(summary.failed, 1);

    // The healthy subject settled despite the broken one.
    let healthy_id = healthy.id;
    let window = SettlementWindow::day_of(yesterday, 0);
    let events = engine
        .db()
        .execute(move |conn| xp_store::events_in_window(conn, healthy_id, &window))
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_sweeper_start_stop_restart() {
    let (engine, _dir) = test_engine().await;
    let mut sweeper = Sweeper::new(
        Arc::clone(&engine),
        SweepSettings {
            enabled: true,
            interval_minutes: 60,
        },
    );

    assert!(!sweeper.is_running());
    sweeper.start();
    assert!(sweeper.is_running());

    // Double-start is ignored, not a second loop.
    sweeper.start();
    assert!(sweeper.is_running());

    sweeper.stop().await;
    assert!(!sweeper.is_running());

    // Restartable: the stop/start contract holds across cycles.
    sweeper.start();
    assert!(sweeper.is_running());
    sweeper.stop().await;
    assert!(!sweeper.is_running());

    // Stopping an idle sweeper is a no-op.
    sweeper.stop().await;
}

#[tokio::test]
async fn test_disabled_sweeper_never_starts() {
    let (engine, _dir) = test_engine().await;
    let mut sweeper = Sweeper::new(
        engine,
        SweepSettings {
            enabled: false,
            interval_minutes: 60,
        },
    );
    sweeper.start();
    assert!(!sweeper.is_running());
    sweeper.stop().await;
}

#[tokio::test]
async fn test_sweeper_settles_backlog_on_start() {
    let (engine, _dir) = test_engine().await;
    let yesterday = Utc::now() - Duration::days(1);

    let subject = engine
        .db()
        .execute(|conn| subject_store::create(conn, "kai", 0))
        .await
        .unwrap();
    engine
        .log_activity(
            subject.id,
            ActivityMetrics::Coding {
                lines_added: 200,
                lines_removed: 40,
                minutes: 130.0,
            },
            yesterday,
        )
        .await
        .unwrap();

    let mut sweeper = Sweeper::new(
        Arc::clone(&engine),
        SweepSettings {
            enabled: true,
            interval_minutes: 60,
        },
    );
    sweeper.start();

    // The first tick fires immediately; give it a moment to land.
    let subject_id = subject.id;
    let window = SettlementWindow::day_of(yesterday, 0);
    let mut settled = false;
    for _ in 0..50 {
        tokio::time::sleep(StdDuration::from_millis(20)).await;
        let events = engine
            .db()
            .execute(move |conn| xp_store::events_in_window(conn, subject_id, &window))
            .await
            .unwrap();
        if !events.is_empty() {
            settled = true;
            break;
        }
    }
    sweeper.stop().await;
    assert!(settled, "sweeper should settle the backlog on its first tick");
}
