//! Graded agreement between the answer history and each candidate, averaged over the
//! whole history rather than accumulated like the posterior.

use crate::model::{Answer, AnswerValue, ScoreMap, SharedEntity};

/// Score given to candidates with no comparable data.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Membership of an entity value in the user's answer.
pub fn membership(answer: AnswerValue, entity: AnswerValue) -> f64 {
    use AnswerValue::*;

    match (answer, entity) {
        (a, e) if a == e => 1.0,
        (DontKnow, _) => 0.5,
        (Yes, No) | (No, Yes) => 0.0,
        (Probably, Yes) | (ProbablyNot, No) => 0.75,
        (Probably, No) | (ProbablyNot, Yes) => 0.25,
        _ => 0.5,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyScorer;

impl FuzzyScorer {
    /// Mean membership over answered features the candidate has data for.
    pub fn score(candidates: &[SharedEntity], history: &[Answer]) -> ScoreMap {
        candidates
            .iter()
            .map(|entity| {
                let (sum, count) = history
                    .iter()
                    .filter_map(|answer| {
                        entity
                            .feature(&answer.feature_key)
                            .map(|value| membership(answer.value, value))
                    })
                    .fold((0.0, 0usize), |(sum, count), m| (sum + m, count + 1));
                let score = if count == 0 {
                    NEUTRAL_SCORE
                } else {
                    sum / count as f64
                };
                (entity.id.clone(), score)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, EntityId};

    #[test]
    fn membership_table() {
        use AnswerValue::*;
        assert_eq!(membership(Yes, Yes), 1.0);
        assert_eq!(membership(Yes, No), 0.0);
        assert_eq!(membership(Probably, Yes), 0.75);
        assert_eq!(membership(ProbablyNot, No), 0.75);
        assert_eq!(membership(Probably, No), 0.25);
        assert_eq!(membership(DontKnow, DontKnow), 1.0);
        assert_eq!(membership(DontKnow, Yes), 0.5);
        assert_eq!(membership(Yes, Probably), 0.5);
    }

    #[test]
    fn exact_history_match_scores_one() {
        let entity = Entity::new("a", "A", "cat")
            .with_feature("real", AnswerValue::Yes)
            .with_feature("male", AnswerValue::No)
            .shared();
        let history = vec![
            Answer::new("q1", "real", AnswerValue::Yes),
            Answer::new("q2", "male", AnswerValue::No),
            Answer::new("q3", "unknown_key", AnswerValue::Yes),
        ];
        let scores = FuzzyScorer::score(&[entity], &history);
        assert_eq!(scores[&EntityId::from("a")], 1.0);
    }

    #[test]
    fn matching_dont_know_value_counts_as_exact() {
        let entity = Entity::new("a", "A", "cat")
            .with_feature("real", AnswerValue::Yes)
            .with_feature("beard", AnswerValue::DontKnow)
            .shared();
        let history = vec![
            Answer::new("q1", "real", AnswerValue::Yes),
            Answer::new("q2", "beard", AnswerValue::DontKnow),
        ];
        let scores = FuzzyScorer::score(&[entity], &history);
        assert_eq!(scores[&EntityId::from("a")], 1.0);
    }

    #[test]
    fn no_data_defaults_to_neutral() {
        let entity = Entity::new("a", "A", "cat").shared();
        let history = vec![Answer::new("q1", "real", AnswerValue::Yes)];
        let scores = FuzzyScorer::score(&[entity], &history);
        assert_eq!(scores[&EntityId::from("a")], NEUTRAL_SCORE);
    }

    #[test]
    fn scores_stay_in_unit_interval() {
        let entity = Entity::new("a", "A", "cat")
            .with_feature("real", AnswerValue::No)
            .with_feature("male", AnswerValue::Probably)
            .shared();
        for value in AnswerValue::ALL {
            let history = vec![
                Answer::new("q1", "real", value),
                Answer::new("q2", "male", value),
            ];
            let score = FuzzyScorer::score(&[entity.clone()], &history)[&EntityId::from("a")];
            assert!((0.0..=1.0).contains(&score));
        }
    }
}
