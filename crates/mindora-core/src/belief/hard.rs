//! Hard elimination on exact yes/no answers.

use crate::model::{Answer, Entity, SharedEntity};

/// Returns true when the entity's recorded value is the exact opposite of a hard answer.
///
/// Graded answers and missing data never contradict.
pub fn contradicts(entity: &Entity, answer: &Answer) -> bool {
    let Some(opposite) = answer.value.opposite() else {
        return false;
    };
    entity.feature(&answer.feature_key) == Some(opposite)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleFilter;

impl RuleFilter {
    /// Keeps every candidate that does not contradict the answer. Order is preserved.
    pub fn filter(candidates: &[SharedEntity], answer: &Answer) -> Vec<SharedEntity> {
        if !answer.value.is_hard() {
            return candidates.to_vec();
        }
        candidates
            .iter()
            .filter(|entity| !contradicts(entity, answer))
            .cloned()
            .collect()
    }
}
