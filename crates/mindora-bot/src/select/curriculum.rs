use mindora_core::model::Question;

/// Feature keys treated as identity probes regardless of tags.
pub const IDENTITY_KEYS: [&str; 7] = [
    "is_real",
    "is_person",
    "is_youtuber",
    "is_actor",
    "is_singer",
    "is_athlete",
    "is_fictional",
];

const CORE_TAGS: [&str; 2] = ["core", "identity"];
const ATTRIBUTE_TAGS: [&str; 4] = ["profession", "hobby", "appearance", "core"];

/// Difficulty ladder keyed by the number of answers received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Core,
    Attributes,
    Open,
}

impl Phase {
    pub const fn for_turn(turn: usize) -> Self {
        match turn {
            0..=3 => Phase::Core,
            4..=8 => Phase::Attributes,
            _ => Phase::Open,
        }
    }

    pub fn admits(self, question: &Question) -> bool {
        match self {
            Phase::Core => {
                CORE_TAGS.iter().any(|tag| question.has_tag(tag))
                    || IDENTITY_KEYS.contains(&question.feature_key.as_str())
            }
            Phase::Attributes => ATTRIBUTE_TAGS.iter().any(|tag| question.has_tag(tag)),
            Phase::Open => true,
        }
    }
}

/// Questions of the phase for `turn`. Falls back to the whole pool when the phase has none.
pub fn phase_pool(pool: &[Question], turn: usize) -> Vec<Question> {
    let phase = Phase::for_turn(turn);
    let phased: Vec<Question> = pool.iter().filter(|q| phase.admits(q)).cloned().collect();
    if phased.is_empty() {
        pool.to_vec()
    } else {
        phased
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<Question> {
        vec![
            Question::new("q1", "Is it real?", "is_real"),
            Question::new("q2", "Is it an actor?", "acts").with_tags(["profession"]),
            Question::new("q3", "Does it wear glasses?", "glasses").with_tags(["appearance"]),
            Question::new("q4", "Born before 1980?", "born_pre_1980").with_tags(["era"]),
        ]
    }

    #[test]
    fn phases_follow_turn_count() {
        assert_eq!(Phase::for_turn(0), Phase::Core);
        assert_eq!(Phase::for_turn(3), Phase::Core);
        assert_eq!(Phase::for_turn(4), Phase::Attributes);
        assert_eq!(Phase::for_turn(8), Phase::Attributes);
        assert_eq!(Phase::for_turn(9), Phase::Open);
    }

    #[test]
    fn core_phase_keeps_identity_keys() {
        let ids: Vec<_> = phase_pool(&pool(), 0).into_iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0].as_str(), "q1");
    }

    #[test]
    fn attribute_phase_selects_tagged_questions() {
        assert_eq!(phase_pool(&pool(), 5).len(), 2);
        assert_eq!(phase_pool(&pool(), 12).len(), 4);
    }

    #[test]
    fn empty_phase_falls_back_to_full_pool() {
        let pool = vec![Question::new("q4", "Born before 1980?", "born").with_tags(["era"])];
        assert_eq!(phase_pool(&pool, 0).len(), 1);
    }
}
