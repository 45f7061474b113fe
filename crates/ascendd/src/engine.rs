//! The settlement engine - turns raw activity logs into exactly-once XP
//! awards and level updates.
//!
//! Two paths feed it: live appends (instant mode settles the one new log
//! immediately) and the periodic sweep (daily mode settles completed
//! windows). Both funnel into the same atomic commit in
//! `ascend_common::settle`, and the idempotency guard there is what keeps
//! them from ever double-paying a window.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use ascend_common::settle::{self, SettlementRequest};
use ascend_common::{activity_store, subject_store, xp_store, Config, Db};
use ascend_shared::activity::{ActivityKind, ActivityLog, ActivityMetrics, HealthMetrics, Meal};
use ascend_shared::scoring::{CodingRollup, HealthRollup, Score};
use ascend_shared::settlement::{AwardMode, SettlementOutcome, SweepSummary};
use ascend_shared::subject::Subject;
use ascend_shared::window::SettlementWindow;

use crate::advisor::{AdvisoryReply, AdvisoryRequest, AdvisoryScorer};

pub struct SettlementEngine {
    db: Db,
    config: Config,
    advisor: Option<Arc<dyn AdvisoryScorer>>,
}

impl SettlementEngine {
    pub fn new(db: Db, config: Config, advisor: Option<Arc<dyn AdvisoryScorer>>) -> Self {
        Self {
            db,
            config,
            advisor,
        }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn advisor(&self) -> Option<&Arc<dyn AdvisoryScorer>> {
        self.advisor.as_ref()
    }

    fn advisor_timeout(&self) -> Duration {
        Duration::from_secs(self.config.advisor.timeout_secs)
    }

    async fn subject(&self, subject_id: i64) -> Result<Subject> {
        self.db
            .execute(move |conn| subject_store::get(conn, subject_id))
            .await?
            .ok_or_else(|| anyhow!("Unknown subject {subject_id}"))
    }

    /// The live path: append one log and, when the kind is in instant
    /// mode, settle it on the spot.
    pub async fn log_activity(
        &self,
        subject_id: i64,
        metrics: ActivityMetrics,
        occurred_at: DateTime<Utc>,
    ) -> Result<(ActivityLog, Option<SettlementOutcome>)> {
        let subject = self.subject(subject_id).await?;
        let log = {
            let metrics = metrics.clone();
            self.db
                .execute(move |conn| activity_store::append(conn, subject_id, &metrics, occurred_at))
                .await?
        };
        debug!(
            "Logged {} activity {} for subject {}",
            log.kind(),
            log.id,
            subject_id
        );

        let outcome = match self.config.modes.for_kind(log.kind()) {
            AwardMode::Instant => Some(self.settle_instant(&subject, &log).await?),
            AwardMode::Daily => None,
        };
        Ok((log, outcome))
    }

    /// Append a mood entry, analyzing sentiment via the advisor when one
    /// is available. Analysis failure degrades to neutral, never errors.
    pub async fn log_mood_entry(
        &self,
        subject_id: i64,
        text: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<(ActivityLog, Option<SettlementOutcome>)> {
        let sentiment = self.advisory_sentiment(&text).await.unwrap_or(0.0);
        self.log_activity(
            subject_id,
            ActivityMetrics::Mood { text, sentiment },
            occurred_at,
        )
        .await
    }

    /// Append a meal, scoring healthiness via the advisor when available.
    pub async fn log_meal(
        &self,
        subject_id: i64,
        description: String,
        occurred_at: DateTime<Utc>,
    ) -> Result<(ActivityLog, Option<SettlementOutcome>)> {
        let score = self.advisory_meal_score(&description).await;
        let metrics = ActivityMetrics::Health(HealthMetrics {
            meal: Some(Meal { description, score }),
            ..Default::default()
        });
        self.log_activity(subject_id, metrics, occurred_at).await
    }

    /// Settle one window of one kind for one subject. Idempotent: a
    /// window that already paid returns `AlreadyAwarded`, a window with no
    /// unprocessed logs returns `Empty`.
    pub async fn settle_window(
        &self,
        subject: &Subject,
        kind: ActivityKind,
        window: SettlementWindow,
    ) -> Result<SettlementOutcome> {
        let subject_id = subject.id;

        // Fast-path guard; the commit re-checks inside the transaction.
        let already = self
            .db
            .execute(move |conn| xp_store::window_award_exists(conn, subject_id, kind, window.start))
            .await?;
        if already {
            debug!(
                "Already awarded {kind} for subject {subject_id}, window {} - skipping",
                window.start
            );
            return Ok(SettlementOutcome::AlreadyAwarded);
        }

        let logs = self
            .db
            .execute(move |conn| {
                activity_store::unprocessed_in_window(conn, subject_id, kind, &window)
            })
            .await?;
        if logs.is_empty() {
            return Ok(SettlementOutcome::Empty);
        }

        // Score (and consult the advisor) strictly before the transaction.
        let (amount, details) = self.score_window(kind, &logs).await;

        let request = SettlementRequest {
            subject_id,
            kind,
            window,
            amount,
            details: Some(details),
            log_ids: logs.iter().map(|l| l.id).collect(),
            source_log_id: None,
            now: Utc::now(),
        };
        let outcome = self.commit(request).await?;
        if let SettlementOutcome::Awarded { xp, .. } = &outcome {
            info!(
                "Awarded {xp} XP ({kind}) to subject {subject_id} for window starting {}",
                window.start
            );
        }
        Ok(outcome)
    }

    /// The idempotent batch entrypoint the scheduler calls. Settles every
    /// completed window with unprocessed logs, for every active subject.
    /// One subject's failure never stops the others.
    pub async fn run_settlement_sweep(&self) -> Result<SweepSummary> {
        let subjects = self
            .db
            .execute(|conn| subject_store::list_active(conn))
            .await?;
        let mut summary = SweepSummary {
            subjects: subjects.len(),
            ..Default::default()
        };

        for subject in subjects {
            if let Err(e) = self.sweep_subject(&subject, &mut summary).await {
                warn!(
                    "Sweep failed for subject {} ({}): {e:#}",
                    subject.id, subject.name
                );
                summary.failed += 1;
            }
        }

        info!(
            "Sweep complete: {} awarded, {} already awarded, {} empty, {} failed across {} subjects",
            summary.awarded, summary.already_awarded, summary.empty, summary.failed, summary.subjects
        );
        Ok(summary)
    }

    async fn sweep_subject(&self, subject: &Subject, summary: &mut SweepSummary) -> Result<()> {
        let now = Utc::now();
        for kind in ActivityKind::ALL {
            let subject_id = subject.id;
            let backlog = self
                .db
                .execute(move |conn| activity_store::unprocessed(conn, subject_id, kind))
                .await?;
            if backlog.is_empty() {
                continue;
            }

            match self.config.modes.for_kind(kind) {
                AwardMode::Daily => {
                    // Settle every completed window the backlog spans; the
                    // still-open day keeps accumulating.
                    let mut windows: BTreeMap<DateTime<Utc>, SettlementWindow> = BTreeMap::new();
                    for log in &backlog {
                        let window =
                            SettlementWindow::day_of(log.occurred_at, subject.tz_offset_minutes);
                        windows.insert(window.start, window);
                    }
                    for window in windows.into_values() {
                        if !window.has_ended(now) {
                            continue;
                        }
                        match self.settle_window(subject, kind, window).await {
                            Ok(outcome) => summary.record(&outcome),
                            Err(e) => {
                                warn!(
                                    "Settlement failed for subject {} {kind} window {}: {e:#}",
                                    subject.id, window.start
                                );
                                summary.failed += 1;
                            }
                        }
                    }
                }
                AwardMode::Instant => {
                    // Stragglers whose live award never landed.
                    for log in &backlog {
                        match self.settle_instant(subject, log).await {
                            Ok(outcome) => summary.record(&outcome),
                            Err(e) => {
                                warn!(
                                    "Instant settlement failed for log {} (subject {}): {e:#}",
                                    log.id, subject.id
                                );
                                summary.failed += 1;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn settle_instant(
        &self,
        subject: &Subject,
        log: &ActivityLog,
    ) -> Result<SettlementOutcome> {
        let score = self.score_instant(subject, log).await?;
        let request = SettlementRequest {
            subject_id: log.subject_id,
            kind: log.kind(),
            window: SettlementWindow::instant(log.occurred_at),
            amount: score.xp,
            details: Some(score.details),
            log_ids: vec![log.id],
            source_log_id: Some(log.id),
            now: Utc::now(),
        };
        let outcome = self.commit(request).await?;
        if let SettlementOutcome::Awarded { xp, .. } = &outcome {
            info!(
                "Instant award: {xp} XP ({}) to subject {} for log {}",
                log.kind(),
                log.subject_id,
                log.id
            );
        }
        Ok(outcome)
    }

    async fn commit(&self, request: SettlementRequest) -> Result<SettlementOutcome> {
        self.db
            .execute(move |conn| settle::commit_settlement(conn, &request))
            .await
    }

    /// Deterministic score for one instantly-awarded log.
    async fn score_instant(&self, subject: &Subject, log: &ActivityLog) -> Result<Score> {
        let scoring = &self.config.scoring;
        match &log.metrics {
            ActivityMetrics::Coding { .. } => {
                Ok(scoring.score_coding(&CodingRollup::from_metrics([&log.metrics])))
            }
            ActivityMetrics::Health(health) => {
                // The water goal bonus needs the whole day's total,
                // including this log.
                let day = SettlementWindow::day_of(log.occurred_at, subject.tz_offset_minutes);
                let subject_id = log.subject_id;
                let day_logs = self
                    .db
                    .execute(move |conn| {
                        activity_store::logs_in_window(conn, subject_id, ActivityKind::Health, &day)
                    })
                    .await?;
                let day_water: f64 = day_logs
                    .iter()
                    .filter_map(|l| match &l.metrics {
                        ActivityMetrics::Health(h) => h.water_liters,
                        _ => None,
                    })
                    .map(|liters| liters.max(0.0))
                    .sum();
                Ok(scoring.score_health_instant(health, day_water))
            }
            ActivityMetrics::Mood { text, sentiment } => {
                Ok(scoring.score_mood_instant(text, *sentiment))
            }
        }
    }

    /// Deterministic window score, refined by the advisor when one is
    /// available and answers in time. Advisory output is clamped into the
    /// deterministic rule's bounds; advisory failure is logged and eaten.
    async fn score_window(&self, kind: ActivityKind, logs: &[ActivityLog]) -> (u32, String) {
        let scoring = &self.config.scoring;
        let metrics = logs.iter().map(|l| &l.metrics);
        let deterministic = match kind {
            ActivityKind::Coding => scoring.score_coding(&CodingRollup::from_metrics(metrics)),
            ActivityKind::Health => scoring.score_health_daily(&HealthRollup::from_metrics(metrics)),
            ActivityKind::Mood => {
                let sentiments: Vec<f64> = logs
                    .iter()
                    .filter_map(|l| match &l.metrics {
                        ActivityMetrics::Mood { sentiment, .. } => Some(*sentiment),
                        _ => None,
                    })
                    .collect();
                scoring.score_mood_daily(&sentiments)
            }
        };

        let cap = scoring.advisory_cap(kind, AwardMode::Daily);
        match self.consult_advisor(kind, &deterministic, cap, logs).await {
            Some(reply) => (reply.xp.min(cap), reply.details),
            None => (deterministic.xp, deterministic.details),
        }
    }

    async fn consult_advisor(
        &self,
        kind: ActivityKind,
        deterministic: &Score,
        cap: u32,
        logs: &[ActivityLog],
    ) -> Option<AdvisoryReply> {
        let advisor = self.advisor.as_ref()?;
        let journal = if kind == ActivityKind::Mood {
            logs.iter()
                .filter_map(|l| match &l.metrics {
                    ActivityMetrics::Mood { text, .. } => Some((l.occurred_at, text.clone())),
                    _ => None,
                })
                .collect()
        } else {
            Vec::new()
        };
        let request = AdvisoryRequest {
            kind,
            mode: AwardMode::Daily,
            baseline_xp: deterministic.xp,
            cap,
            metrics_summary: deterministic.details.clone(),
            journal,
        };

        match tokio::time::timeout(self.advisor_timeout(), advisor.score(&request)).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(e)) => {
                warn!("Advisory scorer failed, using deterministic rule: {e:#}");
                None
            }
            Err(_) => {
                warn!(
                    "Advisory scorer timed out after {}s, using deterministic rule",
                    self.config.advisor.timeout_secs
                );
                None
            }
        }
    }

    async fn advisory_sentiment(&self, text: &str) -> Option<f64> {
        let advisor = self.advisor.as_ref()?;
        match tokio::time::timeout(self.advisor_timeout(), advisor.sentiment(text)).await {
            Ok(Ok(value)) => Some(value.clamp(-1.0, 1.0)),
            Ok(Err(e)) => {
                warn!("Sentiment analysis failed, treating entry as neutral: {e:#}");
                None
            }
            Err(_) => {
                warn!("Sentiment analysis timed out, treating entry as neutral");
                None
            }
        }
    }

    async fn advisory_meal_score(&self, description: &str) -> Option<f64> {
        let advisor = self.advisor.as_ref()?;
        match tokio::time::timeout(self.advisor_timeout(), advisor.meal_score(description)).await {
            Ok(Ok(value)) => Some(value.clamp(-1.0, 1.0)),
            Ok(Err(e)) => {
                warn!("Meal scoring failed, leaving meal unscored: {e:#}");
                None
            }
            Err(_) => {
                warn!("Meal scoring timed out, leaving meal unscored");
                None
            }
        }
    }
}
