use super::answer::AnswerValue;
use super::ids::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const DEFAULT_POPULARITY: f64 = 0.5;

/// Entities are read-only once loaded; sessions share them behind an `Arc`.
pub type SharedEntity = Arc<Entity>;

/// A guessable target with sparse attribute data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    #[serde(alias = "category_id")]
    pub category: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "is_public_figure")]
    pub public_figure: bool,
    /// Missing keys are unknown and treated permissively by every scorer.
    #[serde(default)]
    pub features: BTreeMap<String, AnswerValue>,
    #[serde(default = "default_popularity")]
    pub popularity: f64,
    /// Additive reinforcement grown by confirmed teachings. Unbounded.
    #[serde(default)]
    pub learning_boost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guess_success_rate: Option<f64>,
}

fn default_popularity() -> f64 {
    DEFAULT_POPULARITY
}

impl Entity {
    pub fn new(id: impl Into<EntityId>, name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            public_figure: false,
            features: BTreeMap::new(),
            popularity: DEFAULT_POPULARITY,
            learning_boost: 0.0,
            guess_success_rate: None,
        }
    }

    pub fn with_feature(mut self, key: impl Into<String>, value: AnswerValue) -> Self {
        self.features.insert(key.into(), value);
        self
    }

    pub fn with_popularity(mut self, popularity: f64) -> Self {
        self.popularity = popularity.clamp(0.0, 1.0);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn feature(&self, key: &str) -> Option<AnswerValue> {
        self.features.get(key).copied()
    }

    /// Popularity prior clamped to [0, 1]; non-finite data falls back to the default.
    pub fn prior(&self) -> f64 {
        if self.popularity.is_finite() {
            self.popularity.clamp(0.0, 1.0)
        } else {
            DEFAULT_POPULARITY
        }
    }

    pub fn shared(self) -> SharedEntity {
        Arc::new(self)
    }
}
