//! Post-session learning: confirmed guesses, user-taught entities and distinguishing questions.

use crate::model::{Answer, AnswerValue, Entity, EntityId, Question};
use crate::pattern::{LearnOutcome, SharedPatterns};
use crate::store::{Snapshot, SnapshotStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{Level, event};
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 60;
pub const MIN_NAME_LEN: usize = 2;
pub const TAUGHT_BOOST: f64 = 2.0;
pub const TAUGHT_POPULARITY_GAIN: f64 = 0.5;
pub const TAUGHT_THEME: &str = "user_taught";
pub const FALLBACK_CATEGORY: &str = "cat_other";
const CONFIRMED_CONFIDENCE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum LearningError {
    #[error("taught name {0:?} must be 2-60 characters after cleanup")]
    InvalidName(String),
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),
    #[error("distinguishing question text is empty")]
    EmptyQuestion,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone)]
pub struct TeachRequest {
    pub name: String,
    pub description: String,
    pub history: Vec<Answer>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TeachOutcome {
    pub entity_id: EntityId,
    pub created: bool,
    pub pattern: LearnOutcome,
}

#[derive(Debug, Clone)]
pub struct DistinctionRequest {
    pub new_entity: EntityId,
    pub wrong_entity: EntityId,
    pub question_text: String,
    pub answer_for_new: AnswerValue,
    pub answer_for_wrong: AnswerValue,
}

/// Trims, strips angle brackets and caps length. Rejects names shorter than two characters.
pub fn sanitize_name(raw: &str) -> Result<String, LearningError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|ch| *ch != '<' && *ch != '>')
        .take(MAX_NAME_LEN)
        .collect();
    let cleaned = cleaned.trim().to_string();
    if cleaned.chars().count() < MIN_NAME_LEN {
        return Err(LearningError::InvalidName(raw.to_string()));
    }
    Ok(cleaned)
}

/// Applies session outcomes to the persisted snapshot and the shared pattern store.
#[derive(Clone)]
pub struct Learner {
    store: Arc<dyn SnapshotStore>,
    patterns: SharedPatterns,
}

impl Learner {
    pub fn new(store: Arc<dyn SnapshotStore>, patterns: SharedPatterns) -> Self {
        Self { store, patterns }
    }

    pub fn patterns(&self) -> &SharedPatterns {
        &self.patterns
    }

    /// Records the answer sequence that led to a confirmed guess.
    pub fn confirm_guess(
        &self,
        entity_id: &EntityId,
        history: &[Answer],
        theme: Option<&str>,
    ) -> Result<LearnOutcome, LearningError> {
        let outcome = self
            .patterns
            .write()
            .learn(history, entity_id, CONFIRMED_CONFIDENCE, theme);

        let mut snapshot = self.store.load()?;
        if let Some(entity) = snapshot.entity_mut(entity_id) {
            let success = entity.guess_success_rate.unwrap_or(0.5);
            entity.guess_success_rate = Some((success + 1.0) / 2.0);
        }
        self.persist_patterns(snapshot)?;

        event!(
            target: "mindora_core::learning",
            Level::INFO,
            entity = %entity_id,
            answers = history.len(),
            outcome = ?outcome,
            "guess confirmed"
        );
        Ok(outcome)
    }

    /// Reinforces a known entity by name or creates it from the session's answers.
    pub fn teach(&self, request: TeachRequest) -> Result<TeachOutcome, LearningError> {
        let name = sanitize_name(&request.name)?;
        let mut snapshot = self.store.load()?;

        let (entity_id, created) = match snapshot.entity_by_name_mut(&name) {
            Some(entity) => {
                entity.learning_boost += TAUGHT_BOOST;
                entity.popularity = (entity.popularity + TAUGHT_POPULARITY_GAIN).min(1.0);
                (entity.id.clone(), false)
            }
            None => {
                let id = EntityId::new(format!("ent_user_{}", Uuid::new_v4().simple()));
                let mut entity = Entity::new(id.clone(), name.clone(), FALLBACK_CATEGORY)
                    .with_description(request.description.trim());
                entity.learning_boost = TAUGHT_BOOST;
                for answer in &request.history {
                    if answer.value != AnswerValue::DontKnow {
                        entity.features.insert(answer.feature_key.clone(), answer.value);
                    }
                }
                snapshot.entities.push(entity);
                (id, true)
            }
        };

        let pattern = self.patterns.write().learn(
            &request.history,
            &entity_id,
            CONFIRMED_CONFIDENCE,
            Some(TAUGHT_THEME),
        );
        self.persist_patterns(snapshot)?;

        event!(
            target: "mindora_core::learning",
            Level::INFO,
            entity = %entity_id,
            name = %name,
            created,
            "entity taught"
        );
        Ok(TeachOutcome {
            entity_id,
            created,
            pattern,
        })
    }

    /// Adds a question that separates `new_entity` from the entity wrongly guessed.
    pub fn learn_distinction(&self, request: DistinctionRequest) -> Result<Question, LearningError> {
        let text = request.question_text.trim();
        if text.is_empty() {
            return Err(LearningError::EmptyQuestion);
        }

        let mut snapshot = self.store.load()?;
        for id in [&request.new_entity, &request.wrong_entity] {
            if snapshot.entity_mut(id).is_none() {
                return Err(LearningError::UnknownEntity(id.clone()));
            }
        }

        let question_id = format!("q_custom_{}", Uuid::new_v4().simple());
        let feature_key = format!("feat_{question_id}");
        let question = Question::new(question_id, text, feature_key.clone()).with_tags(["custom"]);

        if let Some(entity) = snapshot.entity_mut(&request.new_entity) {
            entity.features.insert(feature_key.clone(), request.answer_for_new);
        }
        if let Some(entity) = snapshot.entity_mut(&request.wrong_entity) {
            entity.features.insert(feature_key.clone(), request.answer_for_wrong);
        }
        snapshot.questions.push(question.clone());
        self.store.save(&snapshot)?;

        event!(
            target: "mindora_core::learning",
            Level::INFO,
            question = %question.id,
            feature = %feature_key,
            new_entity = %request.new_entity,
            wrong_entity = %request.wrong_entity,
            "distinguishing question learned"
        );
        Ok(question)
    }

    fn persist_patterns(&self, mut snapshot: Snapshot) -> Result<(), LearningError> {
        snapshot.patterns = self.patterns.read().to_vec();
        self.store.save(&snapshot)?;
        Ok(())
    }
}
