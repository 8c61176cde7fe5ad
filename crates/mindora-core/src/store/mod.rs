//! Whole-snapshot persistence. Callers do a synchronous load-mutate-save round trip.

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::model::{Category, Corpus, Entity, EntityId, Question};
use crate::pattern::{PATTERN_CAPACITY, Pattern, PatternStore};
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the engine persists between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub patterns: Vec<Pattern>,
}

impl Snapshot {
    pub fn corpus(&self) -> Corpus {
        Corpus::new(
            self.entities.clone(),
            self.questions.clone(),
            self.categories.clone(),
        )
    }

    pub fn pattern_store(&self) -> PatternStore {
        PatternStore::from_patterns(PATTERN_CAPACITY, self.patterns.clone())
    }

    pub fn entity_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| &entity.id == id)
    }

    pub fn entity_by_name_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities
            .iter_mut()
            .find(|entity| entity.name.eq_ignore_ascii_case(name))
    }
}

/// Durable storage for a [`Snapshot`].
pub trait SnapshotStore: Send + Sync {
    /// Loads the current snapshot. An absent store yields an empty snapshot.
    fn load(&self) -> Result<Snapshot, StoreError>;

    /// Replaces the stored snapshot. Readers observe either the old or the new one.
    fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}
