//! Information-theoretic question selection.
//!
//! Each unasked question is scored by how evenly it splits the weighted candidate set,
//! adjusted for quality, follow-up relevance, topic repetition, usage and opener cooldown.

mod curriculum;

pub use curriculum::{IDENTITY_KEYS, Phase, phase_pool};

use crate::config::EngineConfig;
use mindora_core::model::{AnswerValue, Leaning, Question, QuestionId, ScoreMap, SharedEntity};
use rand::Rng;
use std::collections::{HashMap, HashSet};

/// Everything the selector needs to know about the session besides the question pool.
#[derive(Debug, Clone, Copy)]
pub struct SelectionInput<'a> {
    pub candidates: &'a [SharedEntity],
    /// Current fused confidence per candidate.
    pub scores: &'a ScoreMap,
    pub asked_ids: &'a HashSet<QuestionId>,
    pub asked_feature_keys: &'a HashSet<String>,
    /// The previous question and the answer it received.
    pub last: Option<(&'a Question, AnswerValue)>,
    pub cooldown: &'a HashSet<QuestionId>,
    pub entropy_multiplier: f64,
    pub novelty_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredQuestion {
    pub question: Question,
    pub entropy: f64,
    pub score: f64,
}

/// Binary Shannon entropy of a yes-share, in bits.
pub fn binary_entropy(p: f64) -> f64 {
    if p <= 0.0 || p >= 1.0 {
        return 0.0;
    }
    -p * p.log2() - (1.0 - p) * (1.0 - p).log2()
}

/// Feature keys whose value is already settled for at least `auto_lock_share` of the
/// weighted candidates. Only applied while more than two candidates remain.
pub fn resolved_keys(
    pool: &[Question],
    candidates: &[SharedEntity],
    scores: &ScoreMap,
    config: &EngineConfig,
) -> HashSet<String> {
    let mut resolved = HashSet::new();
    if candidates.len() <= config.auto_lock_min_candidates {
        return resolved;
    }

    let keys: HashSet<&str> = pool.iter().map(|q| q.feature_key.as_str()).collect();
    for key in keys {
        let mut counts: HashMap<AnswerValue, f64> = HashMap::new();
        for entity in candidates {
            let value = entity.feature(key).unwrap_or(AnswerValue::DontKnow);
            let weight = scores.get(&entity.id).copied().unwrap_or(1.0);
            *counts.entry(value).or_insert(0.0) += weight;
        }
        let total: f64 = counts.values().sum();
        if total > 0.0 && counts.values().any(|w| w / total >= config.auto_lock_share) {
            resolved.insert(key.to_string());
        }
    }
    resolved
}

/// Entropy of the weighted yes/no split on `feature_key`, clamped to zero below the floor.
pub fn split_entropy(
    feature_key: &str,
    candidates: &[SharedEntity],
    scores: &ScoreMap,
    config: &EngineConfig,
) -> f64 {
    let (mut yes, mut no) = (0.0, 0.0);
    for entity in candidates {
        let weight = scores.get(&entity.id).copied().unwrap_or(0.0) + 0.5 * entity.prior();
        match entity.feature(feature_key).map(AnswerValue::leaning) {
            Some(Leaning::Yes) => yes += weight,
            Some(Leaning::No) => no += weight,
            _ => {
                yes += weight * 0.5;
                no += weight * 0.5;
            }
        }
    }
    let total = yes + no;
    if total <= 0.0 {
        return 0.0;
    }
    let entropy = binary_entropy(yes / total);
    if entropy < config.entropy_floor { 0.0 } else { entropy }
}

/// Bonus for questions that split the popular candidates evenly.
pub fn popularity_split_bonus(
    feature_key: &str,
    candidates: &[SharedEntity],
    scores: &ScoreMap,
    config: &EngineConfig,
) -> f64 {
    let (mut popular_yes, mut popular_total) = (0.0, 0.0);
    for entity in candidates
        .iter()
        .filter(|entity| entity.prior() > config.popular_threshold)
    {
        let weight = scores.get(&entity.id).copied().unwrap_or(1.0);
        popular_total += weight;
        match entity.feature(feature_key) {
            Some(AnswerValue::Yes | AnswerValue::Probably) => popular_yes += weight,
            Some(AnswerValue::DontKnow) => popular_yes += weight * 0.5,
            _ => {}
        }
    }
    if popular_total <= 0.0 {
        return 0.0;
    }
    let share = popular_yes / popular_total;
    config.popularity_split_bonus * (1.0 - 2.0 * (0.5 - share).abs())
}

#[derive(Debug, Clone, Copy)]
pub struct EntropySelector<'c> {
    config: &'c EngineConfig,
}

impl<'c> EntropySelector<'c> {
    pub fn new(config: &'c EngineConfig) -> Self {
        Self { config }
    }

    fn relevance(&self, question: &Question, input: &SelectionInput<'_>) -> f64 {
        let Some((last, value)) = input.last else {
            return 1.0;
        };
        let mut relevance = 1.0;
        if input.asked_ids.len() < self.config.topic_repeat_window && question.shares_tag_with(&last.tags)
        {
            relevance *= self.config.topic_repeat_penalty;
        }
        if question.shares_tag_with(last.follow_up_tags(value)) {
            relevance *= self.config.follow_up_boost;
        }
        relevance
    }

    /// Scores every eligible question in `pool`, best first.
    pub fn rank<R: Rng>(
        &self,
        pool: &[Question],
        input: &SelectionInput<'_>,
        rng: &mut R,
    ) -> Vec<ScoredQuestion> {
        let config = self.config;
        let resolved = resolved_keys(pool, input.candidates, input.scores, config);
        let noise_ceiling = if input.asked_ids.is_empty() {
            config.opening_noise
        } else {
            config.turn_noise
        } * input.novelty_multiplier;

        let mut ranked: Vec<ScoredQuestion> = pool
            .iter()
            .filter(|q| !input.asked_ids.contains(&q.id))
            .filter(|q| !input.asked_feature_keys.contains(&q.feature_key))
            .filter(|q| !resolved.contains(&q.feature_key))
            .map(|question| {
                let entropy =
                    split_entropy(&question.feature_key, input.candidates, input.scores, config);
                let bonus = popularity_split_bonus(
                    &question.feature_key,
                    input.candidates,
                    input.scores,
                    config,
                );
                let usage = question.usage_count as f64 * config.usage_penalty;
                let cooldown = if input.cooldown.contains(&question.id) {
                    config.cooldown_penalty
                } else {
                    0.0
                };
                let noise = if noise_ceiling > 0.0 && noise_ceiling.is_finite() {
                    rng.gen_range(0.0..noise_ceiling)
                } else {
                    0.0
                };
                let score = entropy
                    * question.effective_quality()
                    * self.relevance(question, input)
                    * input.entropy_multiplier
                    + bonus
                    - usage
                    - cooldown
                    + noise;
                ScoredQuestion {
                    question: question.clone(),
                    entropy,
                    score,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    /// Best-scoring informative question, else the most informative one left.
    pub fn select<R: Rng>(
        &self,
        pool: &[Question],
        input: &SelectionInput<'_>,
        rng: &mut R,
    ) -> Option<ScoredQuestion> {
        let ranked = self.rank(pool, input, rng);
        let viable_floor = self.config.viable_entropy;
        if ranked.iter().any(|q| q.entropy > viable_floor) {
            return ranked.into_iter().find(|q| q.entropy > viable_floor);
        }
        ranked
            .into_iter()
            .reduce(|best, next| if next.entropy > best.entropy { next } else { best })
    }
}
