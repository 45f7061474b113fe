//! Deterministic scoring policy.
//!
//! Calculates XP from concrete metrics, not vibes. The advisory scorer may
//! override these numbers with something more contextual, but its output is
//! clamped into the same bounds and any advisory failure falls back here.
//!
//! All thresholds live in `ScoringConfig` so deployments can tune them
//! without touching the rules.

use serde::{Deserialize, Serialize};

use crate::activity::{ActivityKind, ActivityMetrics, HealthMetrics};
use crate::settlement::AwardMode;

/// A scored activity: the XP amount plus a human-readable rationale.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub xp: u32,
    pub details: String,
}

/// Coding rule: weighted blend of focused minutes and churned lines,
/// capped, with a flat bonus for long sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodingRules {
    pub minutes_weight: f64,
    pub lines_weight: f64,
    /// Minutes and lines both count per this many units.
    pub per_unit: f64,
    pub cap: u32,
    pub session_bonus: u32,
    pub session_bonus_minutes: f64,
}

impl Default for CodingRules {
    fn default() -> Self {
        Self {
            minutes_weight: 0.7,
            lines_weight: 0.3,
            per_unit: 10.0,
            cap: 50,
            session_bonus: 5,
            session_bonus_minutes: 120.0,
        }
    }
}

/// Per-log XP tiers for instant health mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstantHealthRules {
    pub sleep_full_min_hours: f64,
    pub sleep_full_max_hours: f64,
    pub sleep_short_hours: f64,
    pub sleep_minimal_hours: f64,
    pub sleep_full_xp: u32,
    pub sleep_short_xp: u32,
    pub sleep_minimal_xp: u32,
    pub sleep_floor_xp: u32,
    pub exercise_long_minutes: f64,
    pub exercise_light_minutes: f64,
    pub exercise_long_xp: u32,
    pub exercise_goal_xp: u32,
    pub exercise_light_xp: u32,
    pub exercise_floor_xp: u32,
    pub water_xp_per_liter: f64,
    pub water_min_xp: u32,
    pub water_max_xp: u32,
    pub water_goal_bonus: u32,
    pub meal_base_xp: f64,
    pub meal_span_xp: f64,
    pub meal_min_xp: u32,
    pub meal_max_xp: u32,
}

impl Default for InstantHealthRules {
    fn default() -> Self {
        Self {
            sleep_full_min_hours: 7.0,
            sleep_full_max_hours: 9.0,
            sleep_short_hours: 6.0,
            sleep_minimal_hours: 5.0,
            sleep_full_xp: 20,
            sleep_short_xp: 12,
            sleep_minimal_xp: 8,
            sleep_floor_xp: 5,
            exercise_long_minutes: 60.0,
            exercise_light_minutes: 15.0,
            exercise_long_xp: 25,
            exercise_goal_xp: 20,
            exercise_light_xp: 15,
            exercise_floor_xp: 10,
            water_xp_per_liter: 3.0,
            water_min_xp: 2,
            water_max_xp: 8,
            water_goal_bonus: 2,
            meal_base_xp: 10.0,
            meal_span_xp: 5.0,
            meal_min_xp: 5,
            meal_max_xp: 15,
        }
    }
}

/// Health rule: daily aggregate scores goal components on a 10-point scale;
/// instant mode scores each sub-activity on its own small scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthRules {
    pub sleep_goal_hours: f64,
    pub water_goal_liters: f64,
    pub exercise_goal_minutes: f64,
    /// Points granted per goal component met.
    pub component_points: f64,
    /// Meal contributes `(score + 1) * meal_point_scale` points.
    pub meal_point_scale: f64,
    pub points_cap: f64,
    pub xp_per_point: f64,
    pub instant: InstantHealthRules,
}

impl Default for HealthRules {
    fn default() -> Self {
        Self {
            sleep_goal_hours: 7.0,
            water_goal_liters: 2.0,
            exercise_goal_minutes: 30.0,
            component_points: 2.5,
            meal_point_scale: 1.25,
            points_cap: 10.0,
            xp_per_point: 3.0,
            instant: InstantHealthRules::default(),
        }
    }
}

/// Mood rule: daily aggregate maps an overall-performance rating into
/// [0, daily_cap]; instant entries score sentiment plus small bonuses for
/// substance and for acknowledging a rough day.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoodRules {
    pub daily_cap: u32,
    /// XP per point of the advisor's 0-10 day rating.
    pub rating_scale: f64,
    pub instant_cap: u32,
    /// Sentiment-derived base spans [0, instant_base_max].
    pub instant_base_max: u32,
    pub long_entry_chars: usize,
    pub long_entry_bonus: u32,
    /// Entries at or below this sentiment earn the reflection bonus.
    pub reflection_sentiment: f64,
    pub reflection_bonus: u32,
}

impl Default for MoodRules {
    fn default() -> Self {
        Self {
            daily_cap: 30,
            rating_scale: 3.0,
            instant_cap: 20,
            instant_base_max: 15,
            long_entry_chars: 140,
            long_entry_bonus: 2,
            reflection_sentiment: -0.3,
            reflection_bonus: 3,
        }
    }
}

/// The full scoring policy configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub coding: CodingRules,
    pub health: HealthRules,
    pub mood: MoodRules,
}

/// Coding activity aggregated over a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodingRollup {
    pub lines_added: u64,
    pub lines_removed: u64,
    pub minutes: f64,
}

impl CodingRollup {
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a ActivityMetrics>) -> Self {
        let mut rollup = Self::default();
        for m in metrics {
            if let ActivityMetrics::Coding {
                lines_added,
                lines_removed,
                minutes,
            } = m
            {
                rollup.lines_added += lines_added;
                rollup.lines_removed += lines_removed;
                rollup.minutes += minutes.max(0.0);
            }
        }
        rollup
    }
}

/// Health activity aggregated over a window: sleep is the day's longest
/// logged block, water and exercise accumulate, meal scores average.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthRollup {
    pub sleep_hours: f64,
    pub water_liters: f64,
    pub exercise_minutes: f64,
    pub meal_score: Option<f64>,
    pub meals: usize,
}

impl HealthRollup {
    pub fn from_metrics<'a>(metrics: impl IntoIterator<Item = &'a ActivityMetrics>) -> Self {
        let mut rollup = Self::default();
        let mut score_sum = 0.0;
        let mut scored_meals = 0usize;
        for m in metrics {
            if let ActivityMetrics::Health(health) = m {
                if let Some(hours) = health.sleep_hours {
                    rollup.sleep_hours = rollup.sleep_hours.max(hours.max(0.0));
                }
                if let Some(liters) = health.water_liters {
                    rollup.water_liters += liters.max(0.0);
                }
                if let Some(minutes) = health.exercise_minutes {
                    rollup.exercise_minutes += minutes.max(0.0);
                }
                if let Some(meal) = &health.meal {
                    rollup.meals += 1;
                    if let Some(score) = meal.score {
                        score_sum += score.clamp(-1.0, 1.0);
                        scored_meals += 1;
                    }
                }
            }
        }
        if scored_meals > 0 {
            rollup.meal_score = Some(score_sum / scored_meals as f64);
        }
        rollup
    }
}

impl ScoringConfig {
    /// Coding XP for a window rollup. Bound [0, cap + session_bonus].
    pub fn score_coding(&self, rollup: &CodingRollup) -> Score {
        let rules = &self.coding;
        let minutes = rollup.minutes.max(0.0);
        let lines = rollup.lines_added + rollup.lines_removed;
        let raw = rules.minutes_weight * (minutes / rules.per_unit)
            + rules.lines_weight * (lines as f64 / rules.per_unit);
        let mut xp = raw.round().clamp(0.0, rules.cap as f64) as u32;
        let mut details = format!(
            "{} lines changed, {} min of focus",
            lines,
            minutes.round() as i64
        );
        if minutes >= rules.session_bonus_minutes {
            xp += rules.session_bonus;
            details.push_str(", long session bonus");
        }
        Score { xp, details }
    }

    /// Daily-aggregate health XP. Bound [0, points_cap * xp_per_point].
    pub fn score_health_daily(&self, rollup: &HealthRollup) -> Score {
        let rules = &self.health;
        let mut points = 0.0;
        if rollup.sleep_hours >= rules.sleep_goal_hours {
            points += rules.component_points;
        }
        if rollup.water_liters >= rules.water_goal_liters {
            points += rules.component_points;
        }
        if rollup.exercise_minutes >= rules.exercise_goal_minutes {
            points += rules.component_points;
        }
        if let Some(score) = rollup.meal_score {
            points += (score.clamp(-1.0, 1.0) + 1.0) * rules.meal_point_scale;
        }
        let capped = points.min(rules.points_cap);
        let xp = (capped * rules.xp_per_point).round() as u32;
        let details = format!(
            "{capped:.1}/{:.0} day points: sleep {:.1}h, water {:.1}L, exercise {:.0} min, {} meals",
            rules.points_cap,
            rollup.sleep_hours,
            rollup.water_liters,
            rollup.exercise_minutes,
            rollup.meals
        );
        Score { xp, details }
    }

    /// Instant health XP for one log: every present sub-activity scores on
    /// its own scale and the contributions sum.
    ///
    /// `day_water_total` is the subject's water total for the day including
    /// this log, used for the daily-goal bonus.
    pub fn score_health_instant(&self, health: &HealthMetrics, day_water_total: f64) -> Score {
        let rules = &self.health.instant;
        let mut xp = 0u32;
        let mut parts: Vec<String> = Vec::new();

        if let Some(hours) = health.sleep_hours {
            let hours = hours.max(0.0);
            let sleep_xp = if hours >= rules.sleep_full_min_hours
                && hours <= rules.sleep_full_max_hours
            {
                rules.sleep_full_xp
            } else if hours >= rules.sleep_short_hours {
                rules.sleep_short_xp
            } else if hours >= rules.sleep_minimal_hours {
                rules.sleep_minimal_xp
            } else {
                rules.sleep_floor_xp
            };
            xp += sleep_xp;
            parts.push(format!("sleep {hours:.1}h +{sleep_xp}"));
        }

        if let Some(minutes) = health.exercise_minutes {
            if minutes > 0.0 {
                let exercise_xp = if minutes >= rules.exercise_long_minutes {
                    rules.exercise_long_xp
                } else if minutes >= self.health.exercise_goal_minutes {
                    rules.exercise_goal_xp
                } else if minutes >= rules.exercise_light_minutes {
                    rules.exercise_light_xp
                } else {
                    rules.exercise_floor_xp
                };
                xp += exercise_xp;
                parts.push(format!("exercise {:.0} min +{exercise_xp}", minutes));
            }
        }

        if let Some(liters) = health.water_liters {
            if liters > 0.0 {
                let mut water_xp = ((liters * rules.water_xp_per_liter).round() as u32)
                    .clamp(rules.water_min_xp, rules.water_max_xp);
                let mut note = format!("water {liters:.2}L +{water_xp}");
                if day_water_total >= self.health.water_goal_liters {
                    water_xp += rules.water_goal_bonus;
                    note.push_str(", day goal reached");
                }
                xp += water_xp;
                parts.push(note);
            }
        }

        if let Some(meal) = &health.meal {
            let score = meal.score.unwrap_or(0.0).clamp(-1.0, 1.0);
            let meal_xp = ((rules.meal_base_xp + rules.meal_span_xp * score).round() as u32)
                .clamp(rules.meal_min_xp, rules.meal_max_xp);
            xp += meal_xp;
            parts.push(format!("meal ({score:+.1}) +{meal_xp}"));
        }

        let details = if parts.is_empty() {
            "no scoreable components".to_string()
        } else {
            parts.join(", ")
        };
        Score { xp, details }
    }

    /// Deterministic fallback for daily mood: XP from average sentiment.
    /// Bound [0, daily_cap].
    pub fn score_mood_daily(&self, sentiments: &[f64]) -> Score {
        if sentiments.is_empty() {
            return Score {
                xp: 0,
                details: "no mood entries".to_string(),
            };
        }
        let avg = sentiments
            .iter()
            .map(|s| s.clamp(-1.0, 1.0))
            .sum::<f64>()
            / sentiments.len() as f64;
        let half = self.mood.daily_cap as f64 / 2.0;
        let xp = (((avg + 1.0) * half).round() as u32).min(self.mood.daily_cap);
        Score {
            xp,
            details: format!(
                "average sentiment {avg:+.2} across {} entries",
                sentiments.len()
            ),
        }
    }

    /// Convert the advisor's 0-10 day rating into daily mood XP.
    pub fn mood_rating_to_xp(&self, rating: f64) -> u32 {
        let rating = rating.clamp(0.0, 10.0);
        ((rating * self.mood.rating_scale).round() as u32).min(self.mood.daily_cap)
    }

    /// Instant mood XP for one entry. Bound [0, instant_cap]. Rewards
    /// substance and honest low days, not just positivity.
    pub fn score_mood_instant(&self, text: &str, sentiment: f64) -> Score {
        let rules = &self.mood;
        let s = sentiment.clamp(-1.0, 1.0);
        let mut xp = (((s + 1.0) / 2.0) * rules.instant_base_max as f64).round() as u32;
        let mut parts = vec![format!("sentiment {s:+.2}")];
        if text.chars().count() >= rules.long_entry_chars {
            xp += rules.long_entry_bonus;
            parts.push("substantial entry".to_string());
        }
        if s <= rules.reflection_sentiment {
            xp += rules.reflection_bonus;
            parts.push("reflection on a hard day".to_string());
        }
        Score {
            xp: xp.min(rules.instant_cap),
            details: parts.join(", "),
        }
    }

    /// Upper bound for a kind+mode. Advisory XP is clamped into
    /// [0, advisory_cap] before it can reach the ledger.
    pub fn advisory_cap(&self, kind: ActivityKind, mode: AwardMode) -> u32 {
        match (kind, mode) {
            (ActivityKind::Coding, _) => self.coding.cap + self.coding.session_bonus,
            (ActivityKind::Health, AwardMode::Daily) => {
                (self.health.points_cap * self.health.xp_per_point).round() as u32
            }
            (ActivityKind::Health, AwardMode::Instant) => {
                let i = &self.health.instant;
                i.sleep_full_xp
                    + i.exercise_long_xp
                    + i.water_max_xp
                    + i.water_goal_bonus
                    + i.meal_max_xp
            }
            (ActivityKind::Mood, AwardMode::Daily) => self.mood.daily_cap,
            (ActivityKind::Mood, AwardMode::Instant) => self.mood.instant_cap,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Meal;

    fn config() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[test]
    fn test_coding_two_log_scenario() {
        // 120+30 lines over 150 minutes: 0.7*15 + 0.3*15 = 15, +5 bonus.
        let rollup = CodingRollup {
            lines_added: 120,
            lines_removed: 30,
            minutes: 150.0,
        };
        let score = config().score_coding(&rollup);
        assert_eq!(score.xp, 20);
        assert!(score.details.contains("long session bonus"));
    }

    #[test]
    fn test_coding_bounds() {
        let rollup = CodingRollup {
            lines_added: 100_000,
            lines_removed: 100_000,
            minutes: 10_000.0,
        };
        assert_eq!(config().score_coding(&rollup).xp, 55);

        let idle = CodingRollup::default();
        assert_eq!(config().score_coding(&idle).xp, 0);
    }

    #[test]
    fn test_coding_negative_minutes_clamped() {
        let rollup = CodingRollup {
            lines_added: 0,
            lines_removed: 0,
            minutes: -90.0,
        };
        assert_eq!(config().score_coding(&rollup).xp, 0);
    }

    #[test]
    fn test_coding_rollup_sums_logs() {
        let logs = [
            ActivityMetrics::Coding {
                lines_added: 120,
                lines_removed: 0,
                minutes: 100.0,
            },
            ActivityMetrics::Coding {
                lines_added: 0,
                lines_removed: 30,
                minutes: 50.0,
            },
        ];
        let rollup = CodingRollup::from_metrics(&logs);
        assert_eq!(rollup.lines_added, 120);
        assert_eq!(rollup.lines_removed, 30);
        assert_eq!(rollup.minutes, 150.0);
    }

    #[test]
    fn test_health_daily_scenario() {
        // 2.5 + 2.5 + 2.5 + (0.6+1)*1.25 = 9.5 points -> 29 XP.
        let rollup = HealthRollup {
            sleep_hours: 8.0,
            water_liters: 2.5,
            exercise_minutes: 40.0,
            meal_score: Some(0.6),
            meals: 1,
        };
        assert_eq!(config().score_health_daily(&rollup).xp, 29);
    }

    #[test]
    fn test_health_daily_cap() {
        let rollup = HealthRollup {
            sleep_hours: 9.0,
            water_liters: 3.0,
            exercise_minutes: 90.0,
            meal_score: Some(1.0),
            meals: 3,
        };
        // 2.5*3 + 2.5 = 10 points exactly at the cap.
        assert_eq!(config().score_health_daily(&rollup).xp, 30);
    }

    #[test]
    fn test_health_daily_empty() {
        assert_eq!(config().score_health_daily(&HealthRollup::default()).xp, 0);
    }

    #[test]
    fn test_health_rollup_aggregation() {
        let logs = [
            ActivityMetrics::Health(HealthMetrics {
                sleep_hours: Some(8.0),
                ..Default::default()
            }),
            ActivityMetrics::Health(HealthMetrics {
                water_liters: Some(0.5),
                meal: Some(Meal {
                    description: "oatmeal with berries".into(),
                    score: Some(0.8),
                }),
                ..Default::default()
            }),
            ActivityMetrics::Health(HealthMetrics {
                water_liters: Some(2.0),
                exercise_minutes: Some(45.0),
                meal: Some(Meal {
                    description: "grilled chicken salad".into(),
                    score: Some(0.4),
                }),
                ..Default::default()
            }),
        ];
        let rollup = HealthRollup::from_metrics(&logs);
        assert_eq!(rollup.sleep_hours, 8.0);
        assert_eq!(rollup.water_liters, 2.5);
        assert_eq!(rollup.exercise_minutes, 45.0);
        assert_eq!(rollup.meals, 2);
        let score = rollup.meal_score.unwrap();
        assert!((score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_health_instant_meal_only() {
        let health = HealthMetrics {
            meal: Some(Meal {
                description: "salmon and quinoa".into(),
                score: Some(0.6),
            }),
            ..Default::default()
        };
        // 10 + 5*0.6 = 13.
        assert_eq!(config().score_health_instant(&health, 0.0).xp, 13);
    }

    #[test]
    fn test_health_instant_water_goal_bonus() {
        let health = HealthMetrics {
            water_liters: Some(1.0),
            ..Default::default()
        };
        let cfg = config();
        // Below the day goal: just the scaled base.
        assert_eq!(cfg.score_health_instant(&health, 1.0).xp, 3);
        // This glass pushes the day total past 2L.
        assert_eq!(cfg.score_health_instant(&health, 2.25).xp, 5);
    }

    #[test]
    fn test_health_instant_sleep_tiers() {
        let cfg = config();
        let sleep = |hours: f64| HealthMetrics {
            sleep_hours: Some(hours),
            ..Default::default()
        };
        assert_eq!(cfg.score_health_instant(&sleep(8.0), 0.0).xp, 20);
        assert_eq!(cfg.score_health_instant(&sleep(6.5), 0.0).xp, 12);
        assert_eq!(cfg.score_health_instant(&sleep(5.0), 0.0).xp, 8);
        assert_eq!(cfg.score_health_instant(&sleep(3.0), 0.0).xp, 5);
        // Oversleeping falls out of the full band.
        assert_eq!(cfg.score_health_instant(&sleep(11.0), 0.0).xp, 12);
    }

    #[test]
    fn test_mood_daily_fallback() {
        let cfg = config();
        assert_eq!(cfg.score_mood_daily(&[]).xp, 0);
        assert_eq!(cfg.score_mood_daily(&[-1.0, -1.0]).xp, 0);
        assert_eq!(cfg.score_mood_daily(&[0.0]).xp, 15);
        assert_eq!(cfg.score_mood_daily(&[1.0, 1.0, 1.0]).xp, 30);
        // Out-of-range sentiment is clamped, not rejected.
        assert_eq!(cfg.score_mood_daily(&[5.0]).xp, 30);
    }

    #[test]
    fn test_mood_daily_fallback_is_deterministic() {
        let cfg = config();
        let sentiments = [0.3, -0.2, 0.7, 0.1];
        assert_eq!(
            cfg.score_mood_daily(&sentiments),
            cfg.score_mood_daily(&sentiments)
        );
    }

    #[test]
    fn test_mood_rating_conversion() {
        let cfg = config();
        assert_eq!(cfg.mood_rating_to_xp(0.0), 0);
        assert_eq!(cfg.mood_rating_to_xp(7.0), 21);
        assert_eq!(cfg.mood_rating_to_xp(10.0), 30);
        assert_eq!(cfg.mood_rating_to_xp(99.0), 30);
    }

    #[test]
    fn test_mood_instant_rewards_reflection() {
        let cfg = config();
        let rough = cfg.score_mood_instant("rough day, everything broke", -0.6);
        // Base round(0.2*15)=3 plus the reflection bonus.
        assert_eq!(rough.xp, 6);
        assert!(rough.details.contains("reflection"));

        let long_text = "a".repeat(200);
        let long = cfg.score_mood_instant(&long_text, 0.0);
        assert_eq!(long.xp, 8 + 2);
    }

    #[test]
    fn test_mood_instant_cap() {
        let cfg = config();
        let long_text = "b".repeat(300);
        let best = cfg.score_mood_instant(&long_text, 1.0);
        assert_eq!(best.xp, 17);
        assert!(best.xp <= cfg.mood.instant_cap);
    }

    #[test]
    fn test_advisory_caps_match_rule_bounds() {
        let cfg = config();
        assert_eq!(cfg.advisory_cap(ActivityKind::Coding, AwardMode::Daily), 55);
        assert_eq!(cfg.advisory_cap(ActivityKind::Health, AwardMode::Daily), 30);
        assert_eq!(cfg.advisory_cap(ActivityKind::Mood, AwardMode::Daily), 30);
        assert_eq!(cfg.advisory_cap(ActivityKind::Mood, AwardMode::Instant), 20);
    }
}
