use super::matcher::{cosine_similarity, encode_history};
use crate::model::{Answer, EntityId, ScoreMap};
use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub const PATTERN_CAPACITY: usize = 50;
/// Matching needs at least this many answers.
pub const MIN_HISTORY: usize = 3;
/// Combined similarity + usage score a pattern must exceed to count as a match.
pub const MATCH_THRESHOLD: f64 = 0.8;
/// Similarity above which a learned session reinforces an existing pattern.
pub const MERGE_SIMILARITY: f64 = 0.85;
pub const MIN_LEARN_CONFIDENCE: f64 = 0.80;
const USAGE_BONUS: f64 = 0.05;

/// Pattern store shared by concurrent sessions. Writers race with "last write wins".
pub type SharedPatterns = Arc<RwLock<PatternStore>>;

/// A confirmed answer vector tied to the entity it led to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(alias = "entityId")]
    pub entity_id: EntityId,
    pub vector: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, alias = "usageCount")]
    pub usage_count: u32,
    #[serde(alias = "lastUsed")]
    pub last_used: DateTime<Utc>,
}

impl Pattern {
    /// Similarity to `current` plus a logarithmic bonus for frequently used patterns.
    pub fn match_score(&self, current: &[f64]) -> f64 {
        let prefix_len = current.len().min(self.vector.len());
        let similarity = cosine_similarity(current, &self.vector[..prefix_len]);
        similarity + (self.usage_count as f64 + 1.0).ln() * USAGE_BONUS
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LearnOutcome {
    Skipped { confidence: f64 },
    Reinforced { pattern_id: String },
    Inserted {
        pattern_id: String,
        evicted: Option<String>,
    },
}

/// Fixed-capacity store evicting the least-recently-used pattern.
///
/// Recency is refreshed when a pattern is inserted or reinforced; matching does not touch it.
#[derive(Debug)]
pub struct PatternStore {
    entries: LruCache<String, Pattern>,
}

impl PatternStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Rebuilds a store from persisted patterns, oldest first, so recency order survives a reload.
    pub fn from_patterns(capacity: usize, mut patterns: Vec<Pattern>) -> Self {
        patterns.sort_by_key(|pattern| pattern.last_used);
        let mut store = Self::new(capacity);
        for pattern in patterns {
            store.entries.push(pattern.id.clone(), pattern);
        }
        store
    }

    pub fn shared(self) -> SharedPatterns {
        Arc::new(RwLock::new(self))
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Pattern> {
        self.entries.peek(&id.to_string())
    }

    /// Patterns from most to least recently used.
    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.entries.iter().map(|(_, pattern)| pattern)
    }

    /// The entry that would be evicted next.
    pub fn least_recent(&self) -> Option<&Pattern> {
        self.entries.peek_lru().map(|(_, pattern)| pattern)
    }

    /// Snapshot in persistence order (least recent first).
    pub fn to_vec(&self) -> Vec<Pattern> {
        let mut patterns: Vec<Pattern> = self.iter().cloned().collect();
        patterns.reverse();
        patterns
    }

    /// Best match score per entity for the current history. Empty below three answers.
    pub fn find_matches(&self, history: &[Answer]) -> ScoreMap {
        let mut matches = ScoreMap::new();
        if history.len() < MIN_HISTORY {
            return matches;
        }

        let current = encode_history(history);
        for pattern in self.iter() {
            let score = pattern.match_score(&current);
            if score > MATCH_THRESHOLD {
                let best = matches.entry(pattern.entity_id.clone()).or_insert(0.0);
                *best = best.max(score);
            }
        }
        matches
    }

    /// Records a confirmed session. Low-confidence sessions are ignored.
    pub fn learn(
        &mut self,
        history: &[Answer],
        entity_id: &EntityId,
        confidence: f64,
        theme: Option<&str>,
    ) -> LearnOutcome {
        if !(confidence >= MIN_LEARN_CONFIDENCE) {
            debug!(
                target: "mindora_core::learning",
                confidence,
                entity = %entity_id,
                "skipping low confidence pattern"
            );
            return LearnOutcome::Skipped { confidence };
        }

        let vector = encode_history(history);
        let now = Utc::now();

        let merge_target = self
            .entries
            .iter()
            .filter(|(_, pattern)| &pattern.entity_id == entity_id)
            .map(|(id, pattern)| (id.clone(), cosine_similarity(&vector, &pattern.vector)))
            .filter(|(_, similarity)| *similarity > MERGE_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id);

        if let Some(id) = merge_target {
            if let Some(pattern) = self.entries.get_mut(&id) {
                pattern.usage_count = pattern.usage_count.saturating_add(1);
                pattern.last_used = now;
            }
            return LearnOutcome::Reinforced { pattern_id: id };
        }

        let id = format!("pat_{}", Uuid::new_v4().simple());
        let pattern = Pattern {
            id: id.clone(),
            entity_id: entity_id.clone(),
            vector,
            theme: theme.map(str::to_string),
            usage_count: 1,
            last_used: now,
        };

        let evicted = if self.entries.len() >= self.capacity() {
            self.entries.pop_lru().map(|(evicted_id, _)| evicted_id)
        } else {
            None
        };
        self.entries.put(id.clone(), pattern);

        debug!(
            target: "mindora_core::learning",
            entity = %entity_id,
            pattern = %id,
            evicted = ?evicted,
            size = self.entries.len(),
            "learned new pattern"
        );

        LearnOutcome::Inserted {
            pattern_id: id,
            evicted,
        }
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(PATTERN_CAPACITY)
    }
}
