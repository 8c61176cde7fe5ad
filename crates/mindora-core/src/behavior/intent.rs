use super::{Archetype, BehaviorProfile};
use crate::model::{ScoreMap, SharedEntity};

/// Stand-in for the semantic similarity signal when none is available.
pub const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Share of the intent score taken from popularity for a given archetype.
pub const fn popularity_weight(archetype: Archetype) -> f64 {
    match archetype {
        Archetype::Decisive => 0.7,
        Archetype::Uncertain => 0.3,
        _ => 0.5,
    }
}

/// Blends popularity with the similarity signal. Decisive players lean on
/// well-known entities, uncertain ones on whatever the similarity says.
pub fn predict(
    candidates: &[SharedEntity],
    profile: &BehaviorProfile,
    similarity: Option<&ScoreMap>,
) -> ScoreMap {
    let weight = popularity_weight(profile.archetype);
    candidates
        .iter()
        .map(|entity| {
            let similar = similarity
                .and_then(|scores| scores.get(&entity.id).copied())
                .unwrap_or(NEUTRAL_SIMILARITY);
            let score = entity.popularity * weight + similar * (1.0 - weight);
            (entity.id.clone(), score)
        })
        .collect()
}
