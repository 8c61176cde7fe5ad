//! Optional AI assistant consulted when the deterministic engine is unsure or out of questions.

mod http;

pub use http::{HttpCopilot, HttpCopilotConfig, clean_response, parse_distinction, parse_guess, parse_questions};

use async_trait::async_trait;
use mindora_core::behavior::BehaviorProfile;
use mindora_core::model::{Answer, Entity, EntityId, Question, SharedEntity};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_THEME: &str = "general";

#[derive(Debug, Error)]
pub enum CopilotError {
    #[error("copilot is not configured")]
    Unavailable,
    #[error("copilot transport failed: {0}")]
    Transport(String),
    #[error("copilot returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("copilot response is malformed: {0}")]
    Malformed(String),
    #[error("copilot did not answer within {0} ms")]
    Timeout(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct QuestionRequest<'a> {
    pub candidates: &'a [SharedEntity],
    pub history: &'a [Answer],
    pub profile: &'a BehaviorProfile,
    pub theme: &'a str,
}

#[derive(Debug, Clone, Copy)]
pub struct GuessRequest<'a> {
    pub candidates: &'a [SharedEntity],
    pub history: &'a [Answer],
    pub theme: &'a str,
}

/// A candidate the assistant believes in, with its already-discounted confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessAssist {
    pub entity_id: EntityId,
    pub confidence: f64,
}

#[async_trait]
pub trait Copilot: Send + Sync {
    fn name(&self) -> &'static str;

    /// New yes/no questions that separate the remaining candidates.
    async fn generate_questions(
        &self,
        request: QuestionRequest<'_>,
    ) -> Result<Vec<Question>, CopilotError>;

    /// The candidate the assistant finds most likely, if any.
    async fn assist_guess(
        &self,
        request: GuessRequest<'_>,
    ) -> Result<Option<GuessAssist>, CopilotError>;

    /// A question true for `correct_name` and false for the wrongly guessed entity.
    async fn differentiate(
        &self,
        _wrong: &Entity,
        _correct_name: &str,
        _theme: &str,
    ) -> Result<Vec<Question>, CopilotError> {
        Ok(Vec::new())
    }
}

/// Stands in when no assistant is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCopilot;

#[async_trait]
impl Copilot for NoopCopilot {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn generate_questions(
        &self,
        _request: QuestionRequest<'_>,
    ) -> Result<Vec<Question>, CopilotError> {
        Ok(Vec::new())
    }

    async fn assist_guess(
        &self,
        _request: GuessRequest<'_>,
    ) -> Result<Option<GuessAssist>, CopilotError> {
        Ok(None)
    }
}

/// Live assistant when an API key is present in the environment, otherwise the no-op.
pub fn copilot_from_env() -> Arc<dyn Copilot> {
    match HttpCopilotConfig::from_env() {
        Some(config) => match HttpCopilot::new(config) {
            Ok(copilot) => {
                info!(target: "mindora_bot::copilot", model = copilot.model(), "http copilot enabled");
                Arc::new(copilot)
            }
            Err(err) => {
                tracing::warn!(target: "mindora_bot::copilot", error = %err, "http copilot unavailable, using noop");
                Arc::new(NoopCopilot)
            }
        },
        None => Arc::new(NoopCopilot),
    }
}
