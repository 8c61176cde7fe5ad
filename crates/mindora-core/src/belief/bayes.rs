use crate::model::{Answer, AnswerValue, Entity, ScoreMap, SharedEntity};

/// Heuristic likelihood `1 - |entity weight - answer weight|`.
///
/// Not a calibrated probability and it assumes feature independence.
pub fn likelihood(entity: &Entity, answer: &Answer) -> f64 {
    let entity_weight = AnswerValue::weight_of(entity.feature(&answer.feature_key));
    1.0 - (entity_weight - answer.value.weight()).abs()
}

/// Scales the map in place so it sums to one. An all-zero map is left as is.
pub fn normalize(scores: &mut ScoreMap) -> f64 {
    let total: f64 = scores.values().sum();
    if total > 0.0 && total.is_finite() {
        for value in scores.values_mut() {
            *value /= total;
        }
    }
    total
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BayesianUpdater;

impl BayesianUpdater {
    /// Posterior over `candidates` after observing `answer`.
    ///
    /// `priors` should be last turn's posterior so evidence accumulates; candidates
    /// without an entry fall back to their popularity.
    pub fn update(candidates: &[SharedEntity], priors: &ScoreMap, answer: &Answer) -> ScoreMap {
        let mut posterior: ScoreMap = candidates
            .iter()
            .map(|entity| {
                let prior = priors
                    .get(&entity.id)
                    .copied()
                    .filter(|p| p.is_finite() && *p >= 0.0)
                    .unwrap_or_else(|| entity.prior());
                (entity.id.clone(), prior * likelihood(entity, answer))
            })
            .collect();
        normalize(&mut posterior);
        posterior
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityId;

    fn pool() -> Vec<SharedEntity> {
        vec![
            Entity::new("a", "A", "cat").with_feature("real", AnswerValue::Yes).shared(),
            Entity::new("b", "B", "cat").with_feature("real", AnswerValue::Probably).shared(),
            Entity::new("c", "C", "cat").shared(),
        ]
    }

    fn uniform(pool: &[SharedEntity]) -> ScoreMap {
        pool.iter()
            .map(|e| (e.id.clone(), 1.0 / pool.len() as f64))
            .collect()
    }

    #[test]
    fn likelihood_is_similarity_of_weights() {
        let entity = Entity::new("a", "A", "cat").with_feature("real", AnswerValue::Yes);
        let yes = Answer::new("q", "real", AnswerValue::Yes);
        let no = Answer::new("q", "real", AnswerValue::No);
        let probably = Answer::new("q", "real", AnswerValue::Probably);
        assert_eq!(likelihood(&entity, &yes), 1.0);
        assert_eq!(likelihood(&entity, &no), 0.0);
        assert_eq!(likelihood(&entity, &probably), 0.75);
    }

    #[test]
    fn posterior_sums_to_one() {
        let pool = pool();
        let answer = Answer::new("q", "real", AnswerValue::Yes);
        let posterior = BayesianUpdater::update(&pool, &uniform(&pool), &answer);
        let total: f64 = posterior.values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(posterior[&EntityId::from("a")] > posterior[&EntityId::from("b")]);
        assert!(posterior[&EntityId::from("b")] > posterior[&EntityId::from("c")]);
    }

    #[test]
    fn evidence_accumulates_across_turns() {
        let pool = pool();
        let answer = Answer::new("q", "real", AnswerValue::Yes);
        let first = BayesianUpdater::update(&pool, &uniform(&pool), &answer);
        let second = BayesianUpdater::update(&pool, &first, &answer);
        let a = EntityId::from("a");
        assert!(second[&a] > first[&a]);
    }

    #[test]
    fn zero_mass_stays_zero() {
        let pool = vec![Entity::new("a", "A", "cat").with_feature("real", AnswerValue::No).shared()];
        let answer = Answer::new("q", "real", AnswerValue::Yes);
        let posterior = BayesianUpdater::update(&pool, &uniform(&pool), &answer);
        assert_eq!(posterior[&EntityId::from("a")], 0.0);
    }

    #[test]
    fn missing_prior_uses_popularity() {
        let pool = vec![
            Entity::new("a", "A", "cat").with_popularity(0.9).shared(),
            Entity::new("b", "B", "cat").with_popularity(0.1).shared(),
        ];
        let answer = Answer::new("q", "real", AnswerValue::DontKnow);
        let posterior = BayesianUpdater::update(&pool, &ScoreMap::new(), &answer);
        assert!((posterior[&EntityId::from("a")] - 0.9).abs() < 1e-9);
    }
}
