use crate::fusion::{Guess, ScoreBreakdown};
use mindora_core::behavior::BehaviorProfile;
use mindora_core::belief::BeliefMetrics;
use mindora_core::learning::TeachOutcome;
use mindora_core::model::{Answer, EntityId, Question, QuestionId, ScoreMap, SharedEntity};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Playing,
    Guessing,
    Failure,
}

/// Repeat-play memory carried between sessions of the same player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMemory {
    pub theme: String,
    pub play_count: u32,
}

/// Optional adaptive context supplied when a session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub memory: Option<SessionMemory>,
    /// Openers used recently by this player; penalised when picking the first question.
    #[serde(default)]
    pub recent_openers: HashSet<QuestionId>,
}

impl SessionContext {
    pub fn theme(&self) -> Option<&str> {
        self.memory.as_ref().map(|memory| memory.theme.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("session already finished with status {0:?}")]
    Finished(SessionStatus),
}

/// Where the next question came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Phase,
    Widened,
    Copilot,
}

/// Learning applied after the player names the entity a wrong guess missed.
#[derive(Debug, Clone, PartialEq)]
pub struct WrongGuessOutcome {
    pub taught: TeachOutcome,
    /// Distinguishing question stored for the taught and the wrongly guessed entity.
    pub distinction: Option<Question>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub status: SessionStatus,
    pub next_question: Option<Question>,
    pub source: Option<QuestionSource>,
    pub guess: Option<Guess>,
    pub metrics: BeliefMetrics,
}

/// Per-session inference state. Candidates only ever shrink.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: String,
    pub history: Vec<Answer>,
    pub candidates: Vec<SharedEntity>,
    /// Normalized posterior over the active candidates, seeding the next update.
    pub posterior: ScoreMap,
    /// Fused confidence per active candidate.
    pub confidence: ScoreMap,
    pub breakdown: HashMap<EntityId, ScoreBreakdown>,
    pub profile: BehaviorProfile,
    pub turn: usize,
    /// Leader confidence after the latest turn.
    pub top_confidence: f64,
    pub confidence_log: Vec<f64>,
    pub status: SessionStatus,
    pub context: SessionContext,
    pub last_latency_ms: Option<f64>,
    /// Most recent question handed to the player, including generated ones.
    pub last_question: Option<Question>,
}

impl SessionState {
    pub fn is_playing(&self) -> bool {
        self.status == SessionStatus::Playing
    }

    pub fn asked_ids(&self) -> HashSet<QuestionId> {
        self.history.iter().map(|a| a.question_id.clone()).collect()
    }

    pub fn asked_feature_keys(&self) -> HashSet<String> {
        self.history.iter().map(|a| a.feature_key.clone()).collect()
    }

    pub fn leader(&self) -> Option<&SharedEntity> {
        self.candidates.first()
    }

    pub fn theme(&self) -> &str {
        self.context.theme().unwrap_or(crate::copilot::DEFAULT_THEME)
    }
}
