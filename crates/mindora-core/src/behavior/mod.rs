//! Behavioral profiling of how a player answers, independent of what they answer.

mod intent;

pub use intent::{NEUTRAL_SIMILARITY, popularity_weight, predict};

use crate::model::Answer;
use serde::{Deserialize, Serialize};
use std::fmt;

const IMPULSIVE_LATENCY_MS: f64 = 1_500.0;
const DECISIVE_LATENCY_MS: f64 = 2_000.0;
const HESITATION_LATENCY_MS: u64 = 3_000;
const UNCERTAIN_RATIO: f64 = 0.40;
const HESITATION_RATIO: f64 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    Impulsive,
    Decisive,
    Uncertain,
    Random,
    #[default]
    Logical,
}

impl Archetype {
    pub const fn as_str(self) -> &'static str {
        match self {
            Archetype::Impulsive => "impulsive",
            Archetype::Decisive => "decisive",
            Archetype::Uncertain => "uncertain",
            Archetype::Random => "random",
            Archetype::Logical => "logical",
        }
    }
}

impl fmt::Display for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorProfile {
    pub avg_latency_ms: f64,
    pub hesitation_count: usize,
    pub uncertainty_count: usize,
    pub archetype: Archetype,
}

impl Default for BehaviorProfile {
    fn default() -> Self {
        Self {
            avg_latency_ms: 0.0,
            hesitation_count: 0,
            uncertainty_count: 0,
            archetype: Archetype::Logical,
        }
    }
}

/// Classifies the answering style of `history`. The first matching rule wins.
pub fn analyze(history: &[Answer]) -> BehaviorProfile {
    if history.is_empty() {
        return BehaviorProfile::default();
    }

    let total = history.len() as f64;
    let latency_sum: u64 = history.iter().map(Answer::latency_or_default).sum();
    let avg_latency_ms = latency_sum as f64 / total;
    let hesitation_count = history
        .iter()
        .filter(|answer| answer.latency_or_default() > HESITATION_LATENCY_MS)
        .count();
    let uncertainty_count = history
        .iter()
        .filter(|answer| answer.value.is_uncertain())
        .count();

    let archetype = if avg_latency_ms < IMPULSIVE_LATENCY_MS && uncertainty_count == 0 {
        Archetype::Impulsive
    } else if avg_latency_ms < DECISIVE_LATENCY_MS {
        Archetype::Decisive
    } else if uncertainty_count as f64 / total > UNCERTAIN_RATIO {
        Archetype::Uncertain
    } else if hesitation_count as f64 / total > HESITATION_RATIO {
        Archetype::Random
    } else {
        Archetype::Logical
    };

    BehaviorProfile {
        avg_latency_ms,
        hesitation_count,
        uncertainty_count,
        archetype,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AnswerValue;

    fn answer(value: AnswerValue, latency_ms: u64) -> Answer {
        Answer::new("q", "f", value).with_latency(latency_ms)
    }

    #[test]
    fn empty_history_is_logical() {
        assert_eq!(analyze(&[]).archetype, Archetype::Logical);
    }

    #[test]
    fn fast_certain_answers_are_impulsive() {
        let history = vec![answer(AnswerValue::Yes, 800), answer(AnswerValue::No, 1_200)];
        assert_eq!(analyze(&history).archetype, Archetype::Impulsive);
    }

    #[test]
    fn fast_answers_with_doubt_are_decisive() {
        let history = vec![
            answer(AnswerValue::Yes, 1_000),
            answer(AnswerValue::Probably, 1_400),
        ];
        assert_eq!(analyze(&history).archetype, Archetype::Decisive);
    }

    #[test]
    fn slow_hedging_is_uncertain() {
        let history = vec![
            answer(AnswerValue::DontKnow, 2_500),
            answer(AnswerValue::ProbablyNot, 2_500),
            answer(AnswerValue::Yes, 2_500),
        ];
        let profile = analyze(&history);
        assert_eq!(profile.uncertainty_count, 2);
        assert_eq!(profile.archetype, Archetype::Uncertain);
    }

    #[test]
    fn long_pauses_are_random() {
        let history = vec![
            answer(AnswerValue::Yes, 4_000),
            answer(AnswerValue::No, 2_100),
            answer(AnswerValue::Yes, 2_100),
        ];
        let profile = analyze(&history);
        assert_eq!(profile.hesitation_count, 1);
        assert_eq!(profile.archetype, Archetype::Random);
    }

    #[test]
    fn missing_latency_defaults_to_one_second() {
        let history = vec![Answer::new("q", "f", AnswerValue::Yes)];
        let profile = analyze(&history);
        assert_eq!(profile.avg_latency_ms, 1_000.0);
        assert_eq!(profile.archetype, Archetype::Impulsive);
    }
}
