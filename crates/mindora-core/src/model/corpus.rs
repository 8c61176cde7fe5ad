//! Read-mostly feature store shared by concurrent sessions.

use super::category::Category;
use super::entity::{Entity, SharedEntity};
use super::ids::EntityId;
use super::question::Question;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entities: Vec<SharedEntity>,
    by_id: HashMap<EntityId, usize>,
    questions: Vec<Question>,
    categories: Vec<Category>,
}

impl Corpus {
    pub fn new(entities: Vec<Entity>, questions: Vec<Question>, categories: Vec<Category>) -> Self {
        let entities: Vec<SharedEntity> = entities.into_iter().map(Arc::new).collect();
        let by_id = entities
            .iter()
            .enumerate()
            .map(|(idx, entity)| (entity.id.clone(), idx))
            .collect();
        Self {
            entities,
            by_id,
            questions,
            categories,
        }
    }

    pub fn entities(&self) -> &[SharedEntity] {
        &self.entities
    }

    pub fn entity(&self, id: &EntityId) -> Option<&SharedEntity> {
        self.by_id.get(id).map(|&idx| &self.entities[idx])
    }

    /// All questions, archived ones included.
    pub fn all_questions(&self) -> &[Question] {
        &self.questions
    }

    /// Questions eligible for selection.
    pub fn active_questions(&self) -> Vec<Question> {
        self.questions
            .iter()
            .filter(|q| !q.archived)
            .cloned()
            .collect()
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Distinct feature keys probed by at least one active question.
    pub fn feature_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .questions
            .iter()
            .filter(|q| !q.archived)
            .map(|q| q.feature_key.as_str())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
