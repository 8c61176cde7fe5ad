//! Turn-by-turn orchestration of a guessing session.
//!
//! A turn runs the self-tuning checks, appends the answer, profiles the player,
//! updates belief (rule filter, Bayesian posterior, fuzzy history match, pattern
//! recall, predictive intent), fuses the signals, prunes weak candidates and then
//! either commits to a guess or selects the next question.

mod state;

pub use state::{
    QuestionSource, SessionContext, SessionMemory, SessionState, SessionStatus, TurnError,
    TurnOutcome, WrongGuessOutcome,
};

use crate::config::{EngineConfig, WeightOverrides};
use crate::copilot::{Copilot, GuessAssist, GuessRequest, QuestionRequest};
use crate::fusion::{Decision, Guess, GuessReason, ScoreBreakdown, decide, fuse};
use crate::optimizer::{HealthTracker, SelfTuner};
use crate::select::{EntropySelector, IDENTITY_KEYS, SelectionInput, phase_pool};
use mindora_core::behavior::{analyze, predict};
use mindora_core::belief::{BayesianUpdater, BeliefMetrics, FuzzyScorer, RuleFilter, normalize};
use mindora_core::learning::{DistinctionRequest, Learner, LearningError, TeachRequest};
use mindora_core::model::{Answer, AnswerValue, Entity, Question, ScoreMap, SharedEntity};
use mindora_core::pattern::SharedPatterns;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Level, event, warn};
use uuid::Uuid;

enum TurnProgress {
    Done(TurnOutcome),
    PoolExhausted,
}

/// Shared inference engine. Sessions hold their own [`SessionState`].
pub struct SessionEngine {
    config: EngineConfig,
    patterns: SharedPatterns,
    health: Arc<HealthTracker>,
    rng: Mutex<StdRng>,
}

impl SessionEngine {
    pub fn new(config: EngineConfig, patterns: SharedPatterns) -> Self {
        Self {
            config,
            patterns,
            health: Arc::new(HealthTracker::new()),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Mutex::new(StdRng::seed_from_u64(seed));
        self
    }

    pub fn with_health(mut self, health: Arc<HealthTracker>) -> Self {
        self.health = health;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn patterns(&self) -> &SharedPatterns {
        &self.patterns
    }

    /// Seeds the posterior from popularity plus regional and repeat-play boosts.
    pub fn initialize_session(
        &self,
        candidates: &[SharedEntity],
        context: Option<SessionContext>,
    ) -> SessionState {
        let context = context.unwrap_or_default();
        let config = &self.config;
        let regional = context
            .region
            .as_deref()
            .map(|region| config.boosted_categories(region))
            .unwrap_or(&[]);
        let streak = context
            .memory
            .as_ref()
            .filter(|memory| memory.play_count > 1)
            .map(|memory| config.streak_boost * memory.play_count.min(config.streak_cap) as f64)
            .unwrap_or(0.0);

        let mut posterior: ScoreMap = candidates
            .iter()
            .map(|entity| {
                let mut boost = streak;
                if regional.iter().any(|category| *category == entity.category) {
                    boost += config.region_boost;
                }
                let prior = (entity.prior() + boost).max(config.prior_floor);
                (entity.id.clone(), prior)
            })
            .collect();
        normalize(&mut posterior);

        let mut ordered = candidates.to_vec();
        sort_by_score(&mut ordered, &posterior, &ScoreMap::new());

        SessionState {
            id: Uuid::new_v4().to_string(),
            history: Vec::new(),
            candidates: ordered,
            posterior,
            confidence: ScoreMap::new(),
            breakdown: HashMap::new(),
            profile: Default::default(),
            turn: 0,
            top_confidence: 0.0,
            confidence_log: Vec::new(),
            status: SessionStatus::Playing,
            context,
            last_latency_ms: None,
            last_question: None,
        }
    }

    /// First question of a session, from the core phase with recent openers cooled down.
    pub fn opening_question(&self, state: &SessionState, pool: &[Question]) -> Option<Question> {
        let asked_ids = state.asked_ids();
        let asked_keys = state.asked_feature_keys();
        let input = SelectionInput {
            candidates: &state.candidates,
            scores: &state.posterior,
            asked_ids: &asked_ids,
            asked_feature_keys: &asked_keys,
            last: None,
            cooldown: &state.context.recent_openers,
            entropy_multiplier: 1.0,
            novelty_multiplier: 1.0,
        };
        let selector = EntropySelector::new(&self.config);
        let mut rng = self.rng.lock();
        selector
            .select(&phase_pool(pool, state.turn), &input, &mut *rng)
            .or_else(|| selector.select(pool, &input, &mut *rng))
            .map(|scored| scored.question)
    }

    /// Applies one answer. Falls back to a forced guess when no question is left.
    pub fn evaluate_turn(
        &self,
        state: &mut SessionState,
        answer: Answer,
        pool: &[Question],
    ) -> Result<TurnOutcome, TurnError> {
        match self.run_turn(state, answer, pool, None)? {
            TurnProgress::Done(outcome) => Ok(outcome),
            TurnProgress::PoolExhausted => Ok(self.force_guess(state)),
        }
    }

    /// Like [`evaluate_turn`](Self::evaluate_turn) but consults `copilot` for a guess
    /// hint and, once the pool is exhausted, for fresh questions. Copilot failures and
    /// timeouts degrade to the deterministic path.
    pub async fn evaluate_turn_assisted(
        &self,
        state: &mut SessionState,
        answer: Answer,
        pool: &[Question],
        copilot: &dyn Copilot,
    ) -> Result<TurnOutcome, TurnError> {
        if !state.is_playing() {
            return Err(TurnError::Finished(state.status));
        }

        let gate = self.config.copilot;
        let timeout = Duration::from_millis(gate.timeout_ms);
        let assist = if gate.allows(state.history.len() + 1, state.candidates.len()) {
            let mut history = state.history.clone();
            history.push(answer.clone());
            let request = GuessRequest {
                candidates: &state.candidates,
                history: &history,
                theme: state.theme(),
            };
            match tokio::time::timeout(timeout, copilot.assist_guess(request)).await {
                Ok(Ok(assist)) => assist,
                Ok(Err(err)) => {
                    warn!(target: "mindora_bot::copilot", copilot = copilot.name(), error = %err, "guess assist failed");
                    None
                }
                Err(_) => {
                    warn!(target: "mindora_bot::copilot", copilot = copilot.name(), timeout_ms = gate.timeout_ms, "guess assist timed out");
                    None
                }
            }
        } else {
            None
        };

        if let TurnProgress::Done(outcome) = self.run_turn(state, answer, pool, assist.as_ref())? {
            return Ok(outcome);
        }

        if gate.allows(state.history.len(), state.candidates.len()) {
            let request = QuestionRequest {
                candidates: &state.candidates,
                history: &state.history,
                profile: &state.profile,
                theme: state.theme(),
            };
            let generated = match tokio::time::timeout(timeout, copilot.generate_questions(request)).await {
                Ok(Ok(questions)) => questions,
                Ok(Err(err)) => {
                    warn!(target: "mindora_bot::copilot", copilot = copilot.name(), error = %err, "question generation failed");
                    Vec::new()
                }
                Err(_) => {
                    warn!(target: "mindora_bot::copilot", copilot = copilot.name(), timeout_ms = gate.timeout_ms, "question generation timed out");
                    Vec::new()
                }
            };

            let asked_ids = state.asked_ids();
            let asked_keys = state.asked_feature_keys();
            if let Some(question) = generated
                .into_iter()
                .find(|q| !asked_ids.contains(&q.id) && !asked_keys.contains(&q.feature_key))
            {
                state.last_question = Some(question.clone());
                return Ok(TurnOutcome {
                    status: state.status,
                    next_question: Some(question),
                    source: Some(QuestionSource::Copilot),
                    guess: None,
                    metrics: BeliefMetrics::from_posterior(&state.posterior),
                });
            }
        }

        Ok(self.force_guess(state))
    }

    /// Teaches the entity the player had in mind after `wrong` was guessed, then asks
    /// `copilot` for a question separating the two. Copilot failures, timeouts and empty
    /// replies leave only the pattern learned by the teach step.
    pub async fn handle_wrong_guess(
        &self,
        state: &SessionState,
        wrong: &Entity,
        correct: TeachRequest,
        copilot: &dyn Copilot,
        learner: &Learner,
    ) -> Result<WrongGuessOutcome, LearningError> {
        let correct_name = correct.name.clone();
        let taught = learner.teach(TeachRequest {
            history: state.history.clone(),
            ..correct
        })?;
        if taught.entity_id == wrong.id {
            return Ok(WrongGuessOutcome {
                taught,
                distinction: None,
            });
        }

        let timeout_ms = self.config.copilot.timeout_ms;
        let differentiate = copilot.differentiate(wrong, &correct_name, state.theme());
        let suggested = match tokio::time::timeout(Duration::from_millis(timeout_ms), differentiate).await {
            Ok(Ok(questions)) => questions.into_iter().next(),
            Ok(Err(err)) => {
                warn!(target: "mindora_bot::copilot", copilot = copilot.name(), error = %err, "differentiate failed");
                None
            }
            Err(_) => {
                warn!(target: "mindora_bot::copilot", copilot = copilot.name(), timeout_ms, "differentiate timed out");
                None
            }
        };

        let distinction = match suggested {
            Some(question) => match learner.learn_distinction(DistinctionRequest {
                new_entity: taught.entity_id.clone(),
                wrong_entity: wrong.id.clone(),
                question_text: question.text,
                answer_for_new: AnswerValue::Yes,
                answer_for_wrong: AnswerValue::No,
            }) {
                Ok(stored) => Some(stored),
                Err(LearningError::EmptyQuestion) => None,
                Err(err) => return Err(err),
            },
            None => None,
        };

        Ok(WrongGuessOutcome {
            taught,
            distinction,
        })
    }

    /// Feeds a finished session into the running health metrics.
    pub fn record_outcome(&self, state: &SessionState, success: bool) {
        self.health.record(state.turn, success);
    }

    fn run_turn(
        &self,
        state: &mut SessionState,
        answer: Answer,
        pool: &[Question],
        assist: Option<&GuessAssist>,
    ) -> Result<TurnProgress, TurnError> {
        if !state.is_playing() {
            return Err(TurnError::Finished(state.status));
        }

        let started = Instant::now();
        let config = &self.config;
        let overrides = SelfTuner::new(&config.tuning).overrides(
            self.health.metrics(state.turn),
            &state.confidence_log,
            state.last_latency_ms,
        );
        let weights = config.weights.with_overrides(&overrides);

        state.history.push(answer.clone());
        state.turn += 1;
        state.profile = analyze(&state.history);

        let survivors = RuleFilter::filter(&state.candidates, &answer);
        let posterior = BayesianUpdater::update(&survivors, &state.posterior, &answer);
        let fuzzy = FuzzyScorer::score(&survivors, &state.history);
        let patterns = if state.turn >= config.pattern_min_turn {
            self.patterns.read().find_matches(&state.history)
        } else {
            ScoreMap::new()
        };
        let intent = predict(&survivors, &state.profile, None);

        let mut breakdown = HashMap::with_capacity(survivors.len());
        let mut confidence = ScoreMap::with_capacity(survivors.len());
        for entity in &survivors {
            let bayesian = posterior.get(&entity.id).copied().unwrap_or(0.0);
            let mut signals = ScoreBreakdown {
                rule: 1.0,
                bayesian,
                similarity: bayesian,
                fuzzy: fuzzy.get(&entity.id).copied().unwrap_or(0.5),
                pattern: patterns.get(&entity.id).copied().unwrap_or(0.0),
                intent: intent.get(&entity.id).copied().unwrap_or(0.5),
                assist: assist
                    .filter(|hint| hint.entity_id == entity.id)
                    .map_or(0.0, |hint| hint.confidence),
                boost: entity.learning_boost,
                final_score: 0.0,
            };
            signals.final_score = fuse(&signals, &weights, config);
            confidence.insert(entity.id.clone(), signals.final_score);
            breakdown.insert(entity.id.clone(), signals);
        }

        let mut active: Vec<SharedEntity> = survivors
            .into_iter()
            .filter(|entity| confidence.get(&entity.id).copied().unwrap_or(0.0) > config.elimination_floor)
            .collect();
        let mut posterior: ScoreMap = active
            .iter()
            .map(|entity| (entity.id.clone(), posterior.get(&entity.id).copied().unwrap_or(0.0)))
            .collect();
        normalize(&mut posterior);
        sort_by_score(&mut active, &confidence, &intent);
        confidence.retain(|id, _| posterior.contains_key(id));
        breakdown.retain(|id, _| posterior.contains_key(id));

        state.top_confidence = active
            .first()
            .and_then(|leader| confidence.get(&leader.id).copied())
            .unwrap_or(0.0);
        state.confidence_log.push(state.top_confidence);
        state.candidates = active;
        state.posterior = posterior;
        state.confidence = confidence;
        state.breakdown = breakdown;

        let metrics = BeliefMetrics::from_posterior(&state.posterior);
        let progress = if state.candidates.is_empty() {
            state.status = SessionStatus::Failure;
            TurnProgress::Done(TurnOutcome {
                status: state.status,
                next_question: None,
                source: None,
                guess: None,
                metrics,
            })
        } else {
            let decision = match state.candidates.as_slice() {
                [only] => Decision::Guess(Guess::new(
                    only.clone(),
                    state.top_confidence,
                    GuessReason::LastCandidate,
                )),
                _ => decide(
                    &state.candidates,
                    &state.confidence,
                    state.turn,
                    state.profile.archetype,
                    config,
                ),
            };
            match decision {
                Decision::Guess(guess) => {
                    state.status = SessionStatus::Guessing;
                    TurnProgress::Done(TurnOutcome {
                        status: state.status,
                        next_question: None,
                        source: None,
                        guess: Some(guess),
                        metrics,
                    })
                }
                Decision::Ask => match self.next_question(state, pool, overrides) {
                    Some((question, source)) => {
                        state.last_question = Some(question.clone());
                        TurnProgress::Done(TurnOutcome {
                            status: state.status,
                            next_question: Some(question),
                            source: Some(source),
                            guess: None,
                            metrics,
                        })
                    }
                    None => TurnProgress::PoolExhausted,
                },
            }
        };

        let latency = started.elapsed();
        state.last_latency_ms = Some(latency.as_secs_f64() * 1_000.0);
        log_turn(state, &progress, &metrics, latency);
        Ok(progress)
    }

    fn next_question(
        &self,
        state: &SessionState,
        pool: &[Question],
        overrides: WeightOverrides,
    ) -> Option<(Question, QuestionSource)> {
        let asked_ids = state.asked_ids();
        let asked_keys = state.asked_feature_keys();
        let last = last_asked(state, pool);
        let input = SelectionInput {
            candidates: &state.candidates,
            scores: &state.confidence,
            asked_ids: &asked_ids,
            asked_feature_keys: &asked_keys,
            last,
            cooldown: &state.context.recent_openers,
            entropy_multiplier: overrides.entropy_multiplier(),
            novelty_multiplier: overrides.novelty_multiplier(),
        };
        let selector = EntropySelector::new(&self.config);
        let mut rng = self.rng.lock();

        let phased: Vec<Question> = phase_pool(pool, state.turn)
            .into_iter()
            .filter(|q| !asked_ids.contains(&q.id))
            .collect();
        let phased = if phased.is_empty() {
            pool.iter().filter(|q| !asked_ids.contains(&q.id)).cloned().collect()
        } else {
            phased
        };
        if let Some(scored) = selector.select(&phased, &input, &mut *rng) {
            return Some((scored.question, QuestionSource::Phase));
        }
        selector
            .select(pool, &input, &mut *rng)
            .map(|scored| (scored.question, QuestionSource::Widened))
    }

    fn force_guess(&self, state: &mut SessionState) -> TurnOutcome {
        let metrics = BeliefMetrics::from_posterior(&state.posterior);
        match state.leader().cloned() {
            Some(leader) => {
                state.status = SessionStatus::Guessing;
                let guess = Guess::new(leader, state.top_confidence, GuessReason::PoolExhausted);
                TurnOutcome {
                    status: state.status,
                    next_question: None,
                    source: None,
                    guess: Some(guess),
                    metrics,
                }
            }
            None => {
                state.status = SessionStatus::Failure;
                TurnOutcome {
                    status: state.status,
                    next_question: None,
                    source: None,
                    guess: None,
                    metrics,
                }
            }
        }
    }
}

/// A question the caller can always show, preferring identity probes. Used when a turn errors.
pub fn fallback_question(state: &SessionState, pool: &[Question]) -> Option<Question> {
    let asked_ids = state.asked_ids();
    let asked_keys = state.asked_feature_keys();
    let unasked: Vec<&Question> = pool
        .iter()
        .filter(|q| !q.archived)
        .filter(|q| !asked_ids.contains(&q.id) && !asked_keys.contains(&q.feature_key))
        .collect();
    unasked
        .iter()
        .find(|q| IDENTITY_KEYS.contains(&q.feature_key.as_str()))
        .or_else(|| unasked.first())
        .map(|q| (*q).clone())
}

/// The question behind the latest answer: the one handed out last, then the pool by id,
/// then the pool by feature key.
fn last_asked<'a>(state: &'a SessionState, pool: &'a [Question]) -> Option<(&'a Question, AnswerValue)> {
    let answer = state.history.last()?;
    state
        .last_question
        .as_ref()
        .filter(|q| q.id == answer.question_id)
        .or_else(|| pool.iter().find(|q| q.id == answer.question_id))
        .or_else(|| pool.iter().find(|q| q.feature_key == answer.feature_key))
        .map(|q| (q, answer.value))
}

/// Descending by score, ties broken by the secondary map.
fn sort_by_score(entities: &mut [SharedEntity], primary: &ScoreMap, secondary: &ScoreMap) {
    let key = |entity: &SharedEntity, map: &ScoreMap| map.get(&entity.id).copied().unwrap_or(0.0);
    entities.sort_by(|a, b| {
        key(b, primary)
            .total_cmp(&key(a, primary))
            .then_with(|| key(b, secondary).total_cmp(&key(a, secondary)))
    });
}

fn log_turn(state: &SessionState, progress: &TurnProgress, metrics: &BeliefMetrics, latency: Duration) {
    if !tracing::enabled!(target: "mindora_bot::turn", Level::INFO) {
        return;
    }

    let (outcome, question, reason) = match progress {
        TurnProgress::Done(TurnOutcome {
            guess: Some(guess), ..
        }) => ("guess", None, Some(guess.reason.as_str())),
        TurnProgress::Done(TurnOutcome {
            next_question: Some(question),
            ..
        }) => ("ask", Some(question.id.as_str()), None),
        TurnProgress::Done(_) => ("failure", None, None),
        TurnProgress::PoolExhausted => ("exhausted", None, None),
    };
    let answer = state.history.last();
    let leader = state.leader().map(|entity| entity.id.as_str()).unwrap_or("-");

    event!(
        target: "mindora_bot::turn",
        Level::INFO,
        session = %state.id,
        turn = state.turn,
        feature = answer.map(|a| a.feature_key.as_str()).unwrap_or("-"),
        answer = answer.map(|a| a.value.as_str()).unwrap_or("-"),
        archetype = state.profile.archetype.as_str(),
        candidates = metrics.candidate_count,
        leader,
        confidence = state.top_confidence,
        entropy_bits = metrics.entropy_bits,
        leader_mass = metrics.leader_mass,
        outcome,
        next_question = question.unwrap_or("-"),
        reason = reason.unwrap_or("-"),
        latency_us = latency.as_micros() as u64,
    );
}
