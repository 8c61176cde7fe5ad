//! Multi-signal confidence fusion and the ask/guess decision.

use crate::config::{EngineConfig, FusionWeights};
use mindora_core::behavior::Archetype;
use mindora_core::model::{ScoreMap, SharedEntity};
use serde::{Deserialize, Serialize};

/// Per-candidate signal values and the fused result of one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rule: f64,
    pub bayesian: f64,
    /// Value fed into the similarity slot of the fusion.
    pub similarity: f64,
    pub fuzzy: f64,
    pub pattern: f64,
    pub intent: f64,
    pub assist: f64,
    pub boost: f64,
    #[serde(rename = "final")]
    pub final_score: f64,
}

/// Weighted sum of the signals plus the pattern bonus and the entity's learned boost.
pub fn fuse(signals: &ScoreBreakdown, weights: &FusionWeights, config: &EngineConfig) -> f64 {
    let mut score = signals.rule * weights.rule
        + signals.similarity * weights.similarity
        + signals.fuzzy * weights.fuzzy
        + signals.pattern * weights.pattern
        + signals.assist * weights.assist;
    if signals.pattern > config.pattern_bonus_threshold {
        score += config.pattern_bonus;
    }
    score += signals.boost;
    if score.is_finite() {
        score.min(config.confidence_cap)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuessKind {
    Hard,
    Soft,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuessReason {
    EarlyRead,
    HardThreshold,
    SoftThreshold,
    LastCandidate,
    PoolExhausted,
}

impl GuessReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            GuessReason::EarlyRead => "early_read",
            GuessReason::HardThreshold => "hard_threshold",
            GuessReason::SoftThreshold => "soft_threshold",
            GuessReason::LastCandidate => "last_candidate",
            GuessReason::PoolExhausted => "pool_exhausted",
        }
    }

    pub const fn kind(self) -> GuessKind {
        match self {
            GuessReason::HardThreshold | GuessReason::LastCandidate => GuessKind::Hard,
            _ => GuessKind::Soft,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Guess {
    pub entity: SharedEntity,
    pub confidence: f64,
    pub reason: GuessReason,
}

impl Guess {
    pub fn new(entity: SharedEntity, confidence: f64, reason: GuessReason) -> Self {
        Self {
            entity,
            confidence,
            reason,
        }
    }

    pub fn kind(&self) -> GuessKind {
        self.reason.kind()
    }
}

#[derive(Debug, Clone)]
pub enum Decision {
    Ask,
    Guess(Guess),
}

impl Decision {
    pub fn is_ask(&self) -> bool {
        matches!(self, Decision::Ask)
    }
}

/// Hard and soft thresholds after the archetype adjustment.
pub fn thresholds(archetype: Archetype, config: &EngineConfig) -> (f64, f64) {
    let discount = if archetype == Archetype::Decisive {
        config.decisive_discount
    } else {
        0.0
    };
    (
        config.hard_threshold - discount,
        config.soft_threshold - discount,
    )
}

/// Picks the leader and decides whether to commit to it. `turn` counts answers received.
pub fn decide(
    candidates: &[SharedEntity],
    confidence: &ScoreMap,
    turn: usize,
    archetype: Archetype,
    config: &EngineConfig,
) -> Decision {
    let leader = candidates
        .iter()
        .map(|entity| (entity, confidence.get(&entity.id).copied().unwrap_or(0.0)))
        .fold(None::<(&SharedEntity, f64)>, |best, (entity, score)| match best {
            Some((_, top)) if top >= score => best,
            _ => Some((entity, score)),
        });
    let Some((entity, top)) = leader else {
        return Decision::Ask;
    };

    let (hard, soft) = thresholds(archetype, config);
    let reason = if turn <= config.early_read_max_turn && top > config.early_read_threshold {
        Some(GuessReason::EarlyRead)
    } else if top > hard && turn > config.hard_min_turn {
        Some(GuessReason::HardThreshold)
    } else if top > soft && turn > config.soft_min_turn {
        Some(GuessReason::SoftThreshold)
    } else {
        None
    };

    match reason {
        Some(reason) => Decision::Guess(Guess::new(entity.clone(), top, reason)),
        None => Decision::Ask,
    }
}
