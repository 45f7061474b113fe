//! Daily report assembly.
//!
//! Reads the XP ledger and level row for one window and renders a plain
//! breakdown. Narrative lines come from the advisor when one is available;
//! every section has a deterministic fallback, so the report never fails
//! because a model did.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::warn;

use ascend_common::{level_store, xp_store, Db};
use ascend_shared::activity::ActivityKind;
use ascend_shared::leveling::Level;
use ascend_shared::settlement::XpEvent;
use ascend_shared::subject::Subject;
use ascend_shared::window::SettlementWindow;

use crate::advisor::AdvisoryScorer;

#[derive(Debug, Clone)]
pub struct DailyReport {
    pub subject_id: i64,
    pub window: SettlementWindow,
    /// Per-kind XP sums for the window.
    pub totals: Vec<(ActivityKind, u64)>,
    pub total_xp: u64,
    pub level: Option<Level>,
    /// One narrative line per kind that had awards.
    pub sections: Vec<String>,
}

impl DailyReport {
    pub fn render(&self) -> String {
        let mut lines = vec!["Daily Report".to_string(), "-".repeat(30)];

        if self.totals.is_empty() {
            lines.push("No XP earned in this window.".to_string());
        } else {
            lines.push("XP breakdown:".to_string());
            for (kind, total) in &self.totals {
                lines.push(format!("- {kind}: +{total} XP"));
            }
            lines.push(format!("Total XP: +{}", self.total_xp));
        }

        for section in &self.sections {
            lines.push(section.clone());
        }

        match &self.level {
            Some(level) => lines.push(format!(
                "Current level: {} | Total XP: {}",
                level.current_level, level.total_xp
            )),
            None => lines.push("Current level: 1 | Total XP: 0".to_string()),
        }

        lines.join("\n")
    }
}

/// Assemble the report for the day containing `day` in the subject's
/// processing timezone.
pub async fn build_daily_report(
    db: &Db,
    advisor: Option<&Arc<dyn AdvisoryScorer>>,
    subject: &Subject,
    day: DateTime<Utc>,
) -> Result<DailyReport> {
    let window = SettlementWindow::day_of(day, subject.tz_offset_minutes);
    let subject_id = subject.id;

    let (events, totals, level) = db
        .execute(move |conn| {
            let events = xp_store::events_in_window(conn, subject_id, &window)?;
            let totals = xp_store::totals_by_kind(conn, subject_id, &window)?;
            let level = level_store::get(conn, subject_id)?;
            Ok((events, totals, level))
        })
        .await?;

    let total_xp = totals.iter().map(|(_, xp)| *xp).sum();

    let mut sections = Vec::new();
    for kind in ActivityKind::ALL {
        let kind_events: Vec<&XpEvent> =
            events.iter().filter(|e| e.xp_type == kind).collect();
        if kind_events.is_empty() {
            sections.push(format!("{kind}: no activity today"));
            continue;
        }
        let xp: u64 = kind_events.iter().map(|e| e.amount as u64).sum();
        let details = kind_events
            .iter()
            .filter_map(|e| e.details.as_deref())
            .collect::<Vec<_>>()
            .join("; ");
        let line = narrate_section(advisor, kind, &details).await;
        sections.push(format!("{kind}: +{xp} XP - {line}"));
    }

    Ok(DailyReport {
        subject_id,
        window,
        totals,
        total_xp,
        level,
        sections,
    })
}

async fn narrate_section(
    advisor: Option<&Arc<dyn AdvisoryScorer>>,
    kind: ActivityKind,
    details: &str,
) -> String {
    let fallback = if details.is_empty() {
        "activity logged".to_string()
    } else {
        details.to_string()
    };
    let Some(advisor) = advisor else {
        return fallback;
    };
    match advisor.narrate(kind, details).await {
        Ok(line) => line,
        Err(e) => {
            warn!("Report narration failed for {kind}, using details: {e:#}");
            fallback
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascend_common::{subject_store, DbLocation};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_empty_window_reports_no_xp() {
        let dir = tempdir().unwrap();
        let db = Db::open(DbLocation::Custom(dir.path().join("test.db")))
            .await
            .unwrap();
        let subject = db
            .execute(|conn| subject_store::create(conn, "kai", 0))
            .await
            .unwrap();

        let report = build_daily_report(&db, None, &subject, Utc::now())
            .await
            .unwrap();
        let text = report.render();
        assert!(text.contains("No XP earned"));
        assert!(text.contains("Current level: 1 | Total XP: 0"));
    }

    #[tokio::test]
    async fn test_report_groups_and_sums() {
        let dir = tempdir().unwrap();
        let db = Db::open(DbLocation::Custom(dir.path().join("test.db")))
            .await
            .unwrap();
        let subject = db
            .execute(|conn| subject_store::create(conn, "kai", 0))
            .await
            .unwrap();
        let subject_id = subject.id;

        db.execute(move |conn| {
            let now = Utc::now();
            let window = SettlementWindow::day_of(now, 0);
            xp_store::insert_event(
                conn,
                subject_id,
                ActivityKind::Health,
                29,
                now,
                Some("9.5/10 day points"),
                &window,
                None,
            )?;
            xp_store::insert_event(
                conn,
                subject_id,
                ActivityKind::Coding,
                20,
                now,
                Some("150 lines changed, 150 min of focus"),
                &window,
                None,
            )?;
            level_store::apply_xp(conn, subject_id, 49, now)?;
            Ok(())
        })
        .await
        .unwrap();

        let report = build_daily_report(&db, None, &subject, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.total_xp, 49);
        let text = report.render();
        assert!(text.contains("- health: +29 XP"));
        assert!(text.contains("- coding: +20 XP"));
        assert!(text.contains("Total XP: +49"));
        assert!(text.contains("mood: no activity today"));
        assert!(text.contains("Current level: 1 | Total XP: 49"));
    }
}
