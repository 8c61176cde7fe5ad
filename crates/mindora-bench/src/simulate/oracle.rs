use crate::config::LatencyRange;
use mindora_core::model::{Answer, AnswerValue, Entity, Question, SharedEntity};
use rand::Rng;

/// A truthful player thinking of `target`.
///
/// Unknown features are answered DontKnow. With probability `noise` a hard answer
/// is softened to its Probably form, never flipped.
#[derive(Debug, Clone)]
pub struct SimulatedPlayer {
    target: SharedEntity,
    noise: f64,
    latency: LatencyRange,
}

impl SimulatedPlayer {
    pub fn new(target: SharedEntity, noise: f64, latency: LatencyRange) -> Self {
        Self {
            target,
            noise: noise.clamp(0.0, 1.0),
            latency,
        }
    }

    pub fn target(&self) -> &Entity {
        &self.target
    }

    pub fn truthful_value(&self, question: &Question) -> AnswerValue {
        self.target
            .feature(&question.feature_key)
            .unwrap_or(AnswerValue::DontKnow)
    }

    pub fn answer<R: Rng>(&self, question: &Question, rng: &mut R) -> Answer {
        let mut value = self.truthful_value(question);
        if self.noise > 0.0 && rng.gen_bool(self.noise) {
            value = soften(value);
        }
        let latency_ms = rng.gen_range(self.latency.min..=self.latency.max);
        Answer::new(question.id.clone(), question.feature_key.clone(), value).with_latency(latency_ms)
    }

    pub fn confirms(&self, guess: &Entity) -> bool {
        guess.id == self.target.id
    }
}

fn soften(value: AnswerValue) -> AnswerValue {
    match value {
        AnswerValue::Yes => AnswerValue::Probably,
        AnswerValue::No => AnswerValue::ProbablyNot,
        other => other,
    }
}
