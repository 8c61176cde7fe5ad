use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use mindora_core::maintenance::experience_score;
use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics, Statistics};
use thiserror::Error;

use crate::config::SimulationConfig;
use crate::simulate::SessionRow;

const CONFIDENCE_Z: f64 = 1.96; // 95% CI
const NO_GUESS: &str = "no_guess";

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("no sessions were recorded")]
    Empty,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub struct AnalyticsCollector {
    run_id: String,
    latency_budget_ms: f64,
    turns: Vec<f64>,
    successful_turns: Vec<f64>,
    decision_ms: Vec<f64>,
    successes: usize,
    reasons: BTreeMap<String, ReasonTally>,
    learned: BTreeMap<String, usize>,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct ReasonTally {
    pub count: usize,
    pub correct: usize,
}

impl AnalyticsCollector {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            run_id: config.run_id.clone(),
            latency_budget_ms: config.engine.tuning.latency_budget_ms,
            turns: Vec::new(),
            successful_turns: Vec::new(),
            decision_ms: Vec::new(),
            successes: 0,
            reasons: BTreeMap::new(),
            learned: BTreeMap::new(),
        }
    }

    pub fn record_session(&mut self, row: &SessionRow) {
        let turns = row.turns as f64;
        self.turns.push(turns);
        self.decision_ms.push(row.avg_decision_ms);
        if row.success {
            self.successes += 1;
            self.successful_turns.push(turns);
        }

        let reason = row.reason.map(|r| r.as_str()).unwrap_or(NO_GUESS);
        let tally = self.reasons.entry(reason.to_string()).or_default();
        tally.count += 1;
        if row.success {
            tally.correct += 1;
        }

        if let Some(label) = row.learned.as_ref() {
            *self.learned.entry(label.clone()).or_insert(0) += 1;
        }
    }

    pub fn finalize(self) -> Result<AnalyticsSummary, AnalyticsError> {
        if self.turns.is_empty() {
            return Err(AnalyticsError::Empty);
        }

        let sessions = self.turns.len();
        let success_rate = self.successes as f64 / sessions as f64;
        let turns = TurnStats::from_samples(&self.turns);
        let successful_turns = if self.successful_turns.is_empty() {
            None
        } else {
            Some(TurnStats::from_samples(&self.successful_turns))
        };
        let avg_decision_ms = self.decision_ms.iter().mean();

        Ok(AnalyticsSummary {
            run_id: self.run_id,
            sessions,
            successes: self.successes,
            success_rate,
            experience_score: experience_score(success_rate * 100.0, turns.mean),
            turns,
            successful_turns,
            reasons: self.reasons,
            learned: self.learned,
            avg_decision_ms,
            latency_budget_ms: self.latency_budget_ms,
            over_budget: avg_decision_ms > self.latency_budget_ms,
        })
    }
}

/// Distribution of turns per session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TurnStats {
    pub mean: f64,
    pub median: f64,
    pub p90: f64,
    pub min: f64,
    pub max: f64,
    pub ci95: (f64, f64),
}

impl TurnStats {
    fn from_samples(samples: &[f64]) -> Self {
        let mut data = Data::new(samples.to_vec());
        let mean = samples.iter().mean();
        Self {
            mean,
            median: data.quantile(0.5),
            p90: data.percentile(90),
            min: samples.iter().copied().fold(f64::INFINITY, f64::min),
            max: samples.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            ci95: confidence_interval(samples, mean),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AnalyticsSummary {
    pub run_id: String,
    pub sessions: usize,
    pub successes: usize,
    pub success_rate: f64,
    pub experience_score: f64,
    pub turns: TurnStats,
    pub successful_turns: Option<TurnStats>,
    pub reasons: BTreeMap<String, ReasonTally>,
    pub learned: BTreeMap<String, usize>,
    pub avg_decision_ms: f64,
    pub latency_budget_ms: f64,
    pub over_budget: bool,
}

impl AnalyticsSummary {
    pub fn write_markdown(&self, path: impl AsRef<Path>) -> Result<(), AnalyticsError> {
        fs::write(path.as_ref(), self.render_markdown()).map_err(|e| AnalyticsError::Io {
            context: "writing summary markdown",
            source: e,
        })
    }

    pub fn render_markdown(&self) -> String {
        let mut rows = String::new();
        rows.push_str(&format!("# Simulation Summary: {}\n\n", self.run_id));
        rows.push_str(&format!(
            "- Sessions: {} ({} correct, {:.1}% success)\n",
            self.sessions,
            self.successes,
            self.success_rate * 100.0
        ));
        rows.push_str(&format!("- Experience score: {:.1}\n", self.experience_score));
        rows.push_str(&format!(
            "- Avg decision latency: {:.3} ms (budget {:.0} ms, over budget: {})\n\n",
            self.avg_decision_ms,
            self.latency_budget_ms,
            if self.over_budget { "Yes" } else { "No" }
        ));

        rows.push_str("## Turns per Session\n\n");
        rows.push_str("| Sessions | Mean | Median | P90 | Min | Max | 95% CI |\n");
        rows.push_str("|----------|------|--------|-----|-----|-----|--------|\n");
        push_turn_row(&mut rows, "All", &self.turns);
        if let Some(stats) = self.successful_turns.as_ref() {
            push_turn_row(&mut rows, "Correct", stats);
        }

        rows.push_str("\n## Guess Reasons\n\n");
        rows.push_str("| Reason | Count | Correct | Precision |\n");
        rows.push_str("|--------|-------|---------|-----------|\n");
        for (reason, tally) in &self.reasons {
            let precision = if tally.count == 0 {
                0.0
            } else {
                tally.correct as f64 / tally.count as f64
            };
            rows.push_str(&format!(
                "| {reason} | {count} | {correct} | {precision:.1}% |\n",
                count = tally.count,
                correct = tally.correct,
                precision = precision * 100.0,
            ));
        }

        if !self.learned.is_empty() {
            rows.push_str("\n## Learning\n\n");
            for (label, count) in &self.learned {
                rows.push_str(&format!("- {label}: {count}\n"));
            }
        }
        rows
    }
}

fn push_turn_row(rows: &mut String, label: &str, stats: &TurnStats) {
    rows.push_str(&format!(
        "| {label} | {mean:.2} | {median:.1} | {p90:.1} | {min:.0} | {max:.0} | [{low:.2}, {high:.2}] |\n",
        mean = stats.mean,
        median = stats.median,
        p90 = stats.p90,
        min = stats.min,
        max = stats.max,
        low = stats.ci95.0,
        high = stats.ci95.1,
    ));
}

fn confidence_interval(points: &[f64], mean: f64) -> (f64, f64) {
    if points.len() < 2 {
        return (mean, mean);
    }
    let std_error = points.iter().std_dev() / (points.len() as f64).sqrt();
    let margin = CONFIDENCE_Z * std_error;
    (mean - margin, mean + margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindora_bot::{GuessReason, SessionStatus};

    fn config() -> SimulationConfig {
        let yaml = r#"
run_id: "analytics_test"
corpus: "corpus.json"
sessions:
  count: 4
outputs:
  jsonl: "out/sessions.jsonl"
  summary_md: "out/summary.md"
"#;
        serde_yaml::from_str(yaml).expect("parse")
    }

    fn row(turns: usize, success: bool, reason: Option<GuessReason>) -> SessionRow {
        SessionRow {
            run_id: "analytics_test".to_string(),
            session_index: 0,
            session_id: "s".to_string(),
            target: "ent_a".to_string(),
            target_name: "A".to_string(),
            guess: reason.map(|_| "ent_a".to_string()),
            guess_name: None,
            success,
            status: if reason.is_some() {
                SessionStatus::Guessing
            } else {
                SessionStatus::Failure
            },
            reason,
            turns,
            confidence: 0.9,
            candidates_left: 1,
            entropy_bits: 0.0,
            avg_decision_ms: 2.0,
            learned: success.then(|| "inserted".to_string()),
        }
    }

    #[test]
    fn summarises_turns_and_reasons() {
        let mut collector = AnalyticsCollector::new(&config());
        collector.record_session(&row(4, true, Some(GuessReason::EarlyRead)));
        collector.record_session(&row(6, true, Some(GuessReason::HardThreshold)));
        collector.record_session(&row(8, false, Some(GuessReason::HardThreshold)));
        collector.record_session(&row(10, false, None));

        let summary = collector.finalize().expect("finalize");
        assert_eq!(summary.sessions, 4);
        assert_eq!(summary.successes, 2);
        assert!((summary.success_rate - 0.5).abs() < 1e-9);
        assert!((summary.turns.mean - 7.0).abs() < 1e-9);
        assert!((summary.turns.median - 7.0).abs() < 1e-9);
        assert_eq!(summary.turns.min, 4.0);
        assert_eq!(summary.turns.max, 10.0);
        assert!(summary.turns.p90 >= 8.0 && summary.turns.p90 <= 10.0);
        assert!(summary.turns.ci95.0 < 7.0 && summary.turns.ci95.1 > 7.0);

        let hard = summary.reasons.get("hard_threshold").expect("hard tally");
        assert_eq!((hard.count, hard.correct), (2, 1));
        assert_eq!(summary.reasons.get(NO_GUESS).map(|t| t.count), Some(1));
        assert_eq!(summary.learned.get("inserted"), Some(&2));

        // 0.5 * 40 - 2 * 7 + 60
        assert!((summary.experience_score - 66.0).abs() < 1e-9);
        assert!(!summary.over_budget);
    }

    #[test]
    fn markdown_lists_reasons() {
        let mut collector = AnalyticsCollector::new(&config());
        collector.record_session(&row(5, true, Some(GuessReason::LastCandidate)));
        let markdown = collector.finalize().expect("finalize").render_markdown();
        assert!(markdown.contains("# Simulation Summary: analytics_test"));
        assert!(markdown.contains("| last_candidate | 1 | 1 | 100.0% |"));
        assert!(markdown.contains("100.0% success"));
    }

    #[test]
    fn empty_run_is_an_error() {
        let collector = AnalyticsCollector::new(&config());
        assert!(matches!(collector.finalize(), Err(AnalyticsError::Empty)));
    }
}
