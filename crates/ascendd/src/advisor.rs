//! Advisory scorer - the optional LLM consult behind a narrow seam.
//!
//! The engine injects an `AdvisoryScorer` and treats every error as "use
//! the deterministic rule instead". Nothing here can fail a settlement:
//! parse problems, out-of-range replies, and timeouts all collapse into an
//! `Err` the caller logs and falls back from.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ascend_common::config::AdvisorSettings;
use ascend_shared::activity::ActivityKind;
use ascend_shared::settlement::AwardMode;

use crate::ollama;

/// What the engine hands the advisor for one settlement.
#[derive(Debug, Clone)]
pub struct AdvisoryRequest {
    pub kind: ActivityKind,
    pub mode: AwardMode,
    /// The deterministic rule's answer - context, and the floor of trust.
    pub baseline_xp: u32,
    /// Hard upper bound; replies are clamped into [0, cap] by the engine.
    pub cap: u32,
    /// Compact description of the window's metrics.
    pub metrics_summary: String,
    /// For mood: the literal journal lines with timestamps.
    pub journal: Vec<(DateTime<Utc>, String)>,
}

/// A successful advisory reply.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryReply {
    pub xp: u32,
    pub details: String,
}

/// Narrow capability the settlement engine consults. Swap it for a stub in
/// tests; the engine works identically without one.
#[async_trait]
pub trait AdvisoryScorer: Send + Sync {
    /// Contextual XP for a settlement window.
    async fn score(&self, request: &AdvisoryRequest) -> Result<AdvisoryReply>;

    /// Emotional tone of a journal entry, in [-1, 1].
    async fn sentiment(&self, text: &str) -> Result<f64>;

    /// Nutritional healthiness of a meal, in [-1, 1].
    async fn meal_score(&self, description: &str) -> Result<f64>;

    /// One short narrative sentence for a report section.
    async fn narrate(&self, kind: ActivityKind, xp_details: &str) -> Result<String>;
}

/// Advisory scorer backed by a local Ollama server.
pub struct OllamaAdvisor {
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaAdvisor {
    pub fn new(settings: &AdvisorSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            model: settings.model.clone(),
            timeout_secs: settings.timeout_secs,
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        ollama::generate_with_timeout(&self.base_url, &self.model, prompt, self.timeout_secs).await
    }
}

#[async_trait]
impl AdvisoryScorer for OllamaAdvisor {
    async fn score(&self, request: &AdvisoryRequest) -> Result<AdvisoryReply> {
        match request.kind {
            ActivityKind::Mood if !request.journal.is_empty() => {
                let prompt = build_mood_day_prompt(&request.journal);
                let reply = self.generate(&prompt).await?;
                let (rating, rationale) = parse_number_reply(&reply)?;
                if !(0.0..=10.0).contains(&rating) {
                    return Err(anyhow!("day rating {rating} outside 0-10"));
                }
                let xp = ((rating / 10.0) * request.cap as f64).round() as u32;
                Ok(AdvisoryReply {
                    xp,
                    details: rationale
                        .unwrap_or_else(|| format!("day rated {rating:.0}/10")),
                })
            }
            _ => {
                let prompt = build_xp_prompt(request);
                let reply = self.generate(&prompt).await?;
                let (xp, rationale) = parse_number_reply(&reply)?;
                if xp < 0.0 {
                    return Err(anyhow!("negative XP reply: {xp}"));
                }
                Ok(AdvisoryReply {
                    xp: xp.round() as u32,
                    details: rationale.unwrap_or_else(|| request.metrics_summary.clone()),
                })
            }
        }
    }

    async fn sentiment(&self, text: &str) -> Result<f64> {
        let prompt = format!(
            "On a scale from -1 (very negative) to 1 (very positive), rate the \
             emotional tone of this journal entry.\n\
             Only return a number. No words. Example: -0.6\n\n\
             Entry: \"{text}\"\n"
        );
        let reply = self.generate(&prompt).await?;
        let (value, _) = parse_number_reply(&reply)?;
        if !(-1.0..=1.0).contains(&value) {
            return Err(anyhow!("sentiment {value} outside [-1, 1]"));
        }
        Ok(value)
    }

    async fn meal_score(&self, description: &str) -> Result<f64> {
        let prompt = format!(
            "Rate the nutritional healthiness of this meal on a scale from -1 \
             (very unhealthy) to 1 (very healthy).\n\
             Only return the number. No text.\n\n\
             Meal: \"{description}\"\n"
        );
        let reply = self.generate(&prompt).await?;
        let (value, _) = parse_number_reply(&reply)?;
        if !(-1.0..=1.0).contains(&value) {
            return Err(anyhow!("meal score {value} outside [-1, 1]"));
        }
        Ok(value)
    }

    async fn narrate(&self, kind: ActivityKind, xp_details: &str) -> Result<String> {
        let voice = match kind {
            ActivityKind::Mood => "a grounded, encouraging accountability partner",
            ActivityKind::Health => "a direct, supportive health coach",
            ActivityKind::Coding => "a pragmatic senior developer",
        };
        let prompt = format!(
            "You are {voice}. In one or two short sentences, summarize today's \
             {kind} activity for a daily report. Be realistic, not hyped.\n\n\
             Activity details: {xp_details}\n"
        );
        let reply = self.generate(&prompt).await?;
        let line = reply.trim();
        if line.is_empty() {
            return Err(anyhow!("empty narrative reply"));
        }
        Ok(line.to_string())
    }
}

/// The original end-of-day mood rating prompt: timestamped journal lines,
/// a 0-10 emotional-performance rating, number first.
fn build_mood_day_prompt(journal: &[(DateTime<Utc>, String)]) -> String {
    let mut prompt = String::from(
        "You are an emotional coach tracking my mental state.\n\n\
         Here are my mood logs for the day:\n",
    );
    for (at, text) in journal {
        prompt.push_str(&format!("- [{}] \"{}\"\n", at.format("%H:%M"), text));
    }
    prompt.push_str(
        "\nBased on my emotional awareness, resilience, and progress today, \
         rate my emotional performance on a scale from 0 to 10.\n\
         First line: only the number.\n\
         Second line: one short sentence explaining the rating.\n",
    );
    prompt
}

fn build_xp_prompt(request: &AdvisoryRequest) -> String {
    format!(
        "You are scoring one day of {kind} activity for a habit tracker.\n\
         A deterministic rule scored it {baseline} XP out of a maximum of {cap}.\n\
         Considering the details below, award between 0 and {cap} XP.\n\
         First line: only the number.\n\
         Second line: one short sentence of rationale.\n\n\
         Details: {summary}\n",
        kind = request.kind,
        baseline = request.baseline_xp,
        cap = request.cap,
        summary = request.metrics_summary,
    )
}

/// Pull the leading number out of a model reply, tolerating markdown junk
/// around it. The remaining lines become the rationale.
fn parse_number_reply(reply: &str) -> Result<(f64, Option<String>)> {
    let trimmed = reply.trim();
    let mut lines = trimmed.lines();
    let first = lines
        .next()
        .ok_or_else(|| anyhow!("empty reply"))?;

    let number = extract_number(first)
        .ok_or_else(|| anyhow!("no number in reply: {first:?}"))?;

    let rationale = lines.collect::<Vec<_>>().join(" ");
    let rationale = rationale.trim();
    let rationale = if rationale.is_empty() {
        None
    } else {
        Some(rationale.to_string())
    };
    Ok((number, rationale))
}

/// First parseable number in a line, ignoring surrounding decoration.
fn extract_number(line: &str) -> Option<f64> {
    let mut start = None;
    let bytes: Vec<char> = line.chars().collect();
    for (i, c) in bytes.iter().enumerate() {
        if c.is_ascii_digit() || *c == '-' || *c == '+' {
            start = Some(i);
            break;
        }
    }
    let start = start?;
    let mut end = start;
    while end < bytes.len()
        && (bytes[end].is_ascii_digit()
            || bytes[end] == '.'
            || bytes[end] == '-'
            || bytes[end] == '+')
    {
        end += 1;
    }
    let candidate: String = bytes[start..end].iter().collect();
    candidate.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_bare_number() {
        let (n, rationale) = parse_number_reply("7").unwrap();
        assert_eq!(n, 7.0);
        assert!(rationale.is_none());
    }

    #[test]
    fn test_parse_number_with_rationale() {
        let (n, rationale) = parse_number_reply("8\nSteady reflection all day.").unwrap();
        assert_eq!(n, 8.0);
        assert_eq!(rationale.unwrap(), "Steady reflection all day.");
    }

    #[test]
    fn test_parse_tolerates_decoration() {
        let (n, _) = parse_number_reply("**-0.6**").unwrap();
        assert_eq!(n, -0.6);
        let (n, _) = parse_number_reply("Rating: 9/10").unwrap();
        assert_eq!(n, 9.0);
    }

    #[test]
    fn test_parse_rejects_wordy_reply() {
        assert!(parse_number_reply("I cannot rate this.").is_err());
        assert!(parse_number_reply("").is_err());
    }

    #[test]
    fn test_mood_prompt_lists_journal() {
        let journal = vec![
            (
                Utc.with_ymd_and_hms(2025, 3, 14, 8, 30, 0).unwrap(),
                "slow start".to_string(),
            ),
            (
                Utc.with_ymd_and_hms(2025, 3, 14, 21, 0, 0).unwrap(),
                "finished the week strong".to_string(),
            ),
        ];
        let prompt = build_mood_day_prompt(&journal);
        assert!(prompt.contains("[08:30] \"slow start\""));
        assert!(prompt.contains("[21:00] \"finished the week strong\""));
        assert!(prompt.contains("0 to 10"));
    }

    #[test]
    fn test_xp_prompt_carries_baseline_and_cap() {
        let request = AdvisoryRequest {
            kind: ActivityKind::Coding,
            mode: AwardMode::Daily,
            baseline_xp: 15,
            cap: 55,
            metrics_summary: "150 lines changed, 150 min of focus".into(),
            journal: vec![],
        };
        let prompt = build_xp_prompt(&request);
        assert!(prompt.contains("15 XP"));
        assert!(prompt.contains("0 and 55"));
        assert!(prompt.contains("150 lines changed"));
    }
}
