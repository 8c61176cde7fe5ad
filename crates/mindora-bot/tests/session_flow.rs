use async_trait::async_trait;
use mindora_bot::copilot::{Copilot, CopilotError, GuessAssist, GuessRequest, QuestionRequest};
use mindora_bot::session::QuestionSource;
use mindora_bot::{
    EngineConfig, GuessReason, NoopCopilot, SessionContext, SessionEngine, SessionMemory,
    SessionStatus, TurnError, fallback_question,
};
use mindora_core::learning::{Learner, TeachRequest};
use mindora_core::model::{Answer, AnswerValue, Entity, EntityId, Question, QuestionId, SharedEntity};
use mindora_core::pattern::{LearnOutcome, PatternStore};
use mindora_core::store::{MemoryStore, Snapshot, SnapshotStore};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn engine() -> SessionEngine {
    SessionEngine::new(EngineConfig::default(), PatternStore::default().shared()).with_seed(42)
}

fn answer(question: &Question, value: AnswerValue) -> Answer {
    Answer::new(question.id.clone(), question.feature_key.clone(), value).with_latency(2_500)
}

fn entity(id: &str, features: &[(&str, AnswerValue)]) -> SharedEntity {
    features
        .iter()
        .fold(Entity::new(id, id.to_uppercase(), "cat_other"), |entity, (key, value)| {
            entity.with_feature(*key, *value)
        })
        .shared()
}

#[test]
fn fly_answer_removes_flying_candidates() {
    let engine = engine();
    let candidates = vec![
        entity("eagle", &[("can_fly", AnswerValue::Yes)]),
        entity("dog", &[("can_fly", AnswerValue::No)]),
        entity("bat", &[]),
    ];
    let pool = vec![
        Question::new("q_fly", "Can it fly?", "can_fly").with_tags(["core"]),
        Question::new("q_legs", "Does it have four legs?", "four_legs").with_tags(["core"]),
    ];
    let mut state = engine.initialize_session(&candidates, None);
    let outcome = engine
        .evaluate_turn(&mut state, answer(&pool[0], AnswerValue::No), &pool)
        .unwrap();

    let ids: Vec<&str> = state.candidates.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, ["dog", "bat"]);
    assert_eq!(outcome.status, SessionStatus::Playing);
    assert_eq!(outcome.next_question.unwrap().id.as_str(), "q_legs");
    let total: f64 = state.posterior.values().sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn empty_candidate_set_after_filter_is_failure() {
    let engine = engine();
    let candidates = vec![
        entity("a", &[("f1", AnswerValue::Yes), ("f2", AnswerValue::Yes)]),
        entity("b", &[("f1", AnswerValue::Yes), ("f2", AnswerValue::Yes)]),
    ];
    let pool = vec![
        Question::new("q1", "F1?", "f1"),
        Question::new("q2", "F2?", "f2"),
    ];
    let mut state = engine.initialize_session(&candidates, None);

    let first = engine
        .evaluate_turn(&mut state, answer(&pool[0], AnswerValue::Yes), &pool)
        .unwrap();
    let next = first.next_question.expect("second question");
    assert_eq!(next.id.as_str(), "q2");

    let second = engine
        .evaluate_turn(&mut state, answer(&next, AnswerValue::No), &pool)
        .unwrap();
    assert_eq!(second.status, SessionStatus::Failure);
    assert!(second.next_question.is_none());
    assert!(second.guess.is_none());
    assert!(state.candidates.is_empty());

    let err = engine
        .evaluate_turn(&mut state, answer(&pool[0], AnswerValue::Yes), &pool)
        .unwrap_err();
    assert_eq!(err, TurnError::Finished(SessionStatus::Failure));
    assert_eq!(state.turn, 2);
}

#[test]
fn single_survivor_is_guessed_immediately() {
    let engine = engine();
    let candidates = vec![
        entity("a", &[("f1", AnswerValue::Yes)]),
        entity("b", &[("f1", AnswerValue::No)]),
    ];
    let pool = vec![Question::new("q1", "F1?", "f1"), Question::new("q2", "F2?", "f2")];
    let mut state = engine.initialize_session(&candidates, None);
    let outcome = engine
        .evaluate_turn(&mut state, answer(&pool[0], AnswerValue::Yes), &pool)
        .unwrap();

    let guess = outcome.guess.expect("guess");
    assert_eq!(guess.entity.id, EntityId::from("a"));
    assert_eq!(guess.reason, GuessReason::LastCandidate);
    assert_eq!(state.status, SessionStatus::Guessing);
    assert!(outcome.next_question.is_none());
}

#[test]
fn asked_feature_keys_are_never_repeated() {
    let engine = engine();
    let candidates: Vec<SharedEntity> = (0..6)
        .map(|idx| {
            let flag = |bit: usize| {
                if idx & bit == 0 { AnswerValue::No } else { AnswerValue::Yes }
            };
            entity(
                &format!("e{idx}"),
                &[("a", flag(1)), ("b", flag(2)), ("c", flag(4)), ("is_real", AnswerValue::Yes)],
            )
        })
        .collect();
    let pool = vec![
        Question::new("qa", "A?", "a").with_tags(["core"]),
        Question::new("qa2", "Also A?", "a").with_tags(["core"]),
        Question::new("qb", "B?", "b").with_tags(["profession"]),
        Question::new("qb2", "Also B?", "b"),
        Question::new("qc", "C?", "c"),
        Question::new("qr", "Real?", "is_real"),
    ];

    let mut state = engine.initialize_session(&candidates, None);
    let mut question = engine.opening_question(&state, &pool).expect("opening");
    let mut asked_keys = HashSet::new();
    for _ in 0..pool.len() {
        assert!(asked_keys.insert(question.feature_key.clone()), "repeated {}", question.feature_key);
        let outcome = engine
            .evaluate_turn(&mut state, answer(&question, AnswerValue::DontKnow), &pool)
            .unwrap();
        match outcome.next_question {
            Some(next) => question = next,
            None => break,
        }
    }
    assert_ne!(state.status, SessionStatus::Playing);
}

#[test]
fn exhausted_pool_forces_guess_of_leader() {
    let engine = engine();
    let candidates = vec![entity("a", &[]), entity("b", &[]), entity("c", &[])];
    let pool = vec![Question::new("q1", "F1?", "f1")];
    let mut state = engine.initialize_session(&candidates, None);
    let outcome = engine
        .evaluate_turn(&mut state, answer(&pool[0], AnswerValue::DontKnow), &pool)
        .unwrap();
    let guess = outcome.guess.expect("forced guess");
    assert_eq!(guess.reason, GuessReason::PoolExhausted);
    assert_eq!(Some(&guess.entity), state.leader());
}

#[test]
fn opening_question_skips_recent_openers() {
    let engine = engine();
    let candidates = vec![
        entity("a", &[("is_real", AnswerValue::Yes), ("is_person", AnswerValue::Yes)]),
        entity("b", &[("is_real", AnswerValue::No), ("is_person", AnswerValue::No)]),
    ];
    let pool = vec![
        Question::new("q_real", "Is it real?", "is_real"),
        Question::new("q_person", "Is it a person?", "is_person"),
    ];
    let mut context = SessionContext::default();
    context.recent_openers.insert(QuestionId::from("q_real"));
    let state = engine.initialize_session(&candidates, Some(context));
    for _ in 0..10 {
        let opener = engine.opening_question(&state, &pool).unwrap();
        assert_eq!(opener.id.as_str(), "q_person");
    }
}

#[test]
fn priors_include_region_and_streak_boosts() {
    let engine = engine();
    let candidates = vec![
        Entity::new("srk", "Shah Rukh Khan", "cat_bollywood").shared(),
        Entity::new("mario", "Mario", "cat_games").shared(),
    ];
    let context = SessionContext {
        region: Some("IN".into()),
        memory: Some(SessionMemory {
            theme: "celebrities".into(),
            play_count: 5,
        }),
        ..SessionContext::default()
    };
    let state = engine.initialize_session(&candidates, Some(context));
    let srk = state.posterior[&EntityId::from("srk")];
    let mario = state.posterior[&EntityId::from("mario")];
    assert!((srk + mario - 1.0).abs() < 1e-9);
    // 0.5 + 0.15 streak + 0.10 region vs 0.5 + 0.15 streak
    assert!((srk - 0.75 / 1.4).abs() < 1e-9);
    assert_eq!(state.leader().unwrap().id.as_str(), "srk");
    assert_eq!(state.theme(), "celebrities");
}

fn yes_unknown_no(keys: &[String]) -> Vec<SharedEntity> {
    let yes: Vec<(&str, AnswerValue)> = keys.iter().map(|key| (key.as_str(), AnswerValue::Yes)).collect();
    let no: Vec<(&str, AnswerValue)> = keys.iter().map(|key| (key.as_str(), AnswerValue::No)).collect();
    vec![entity("a", &yes), entity("b", &[]), entity("c", &no)]
}

#[test]
fn learned_pattern_contributes_to_fusion() {
    let patterns = PatternStore::default().shared();
    let engine = SessionEngine::new(EngineConfig::default(), patterns.clone()).with_seed(9);
    let pool: Vec<Question> = (0..5)
        .map(|idx| Question::new(format!("q{idx}"), format!("F{idx}?"), format!("f{idx}")))
        .collect();
    let keys: Vec<String> = pool.iter().map(|q| q.feature_key.clone()).collect();
    let candidates = yes_unknown_no(&keys);
    let history: Vec<Answer> = pool[..3]
        .iter()
        .map(|q| answer(q, AnswerValue::DontKnow))
        .collect();
    patterns.write().learn(&history, &EntityId::from("b"), 1.0, None);

    let mut state = engine.initialize_session(&candidates, None);
    for step in history {
        let outcome = engine.evaluate_turn(&mut state, step, &pool).unwrap();
        if outcome.guess.is_some() {
            break;
        }
    }
    let pattern = state.breakdown[&EntityId::from("b")].pattern;
    assert!(pattern > 0.95, "pattern signal {pattern}");
    assert_eq!(state.turn, 3);
    assert_eq!(state.leader().unwrap().id.as_str(), "b");
}

#[test]
fn fallback_prefers_unasked_identity_question() {
    let engine = engine();
    let candidates = vec![entity("a", &[]), entity("b", &[])];
    let pool = vec![
        Question::new("q_color", "Is it red?", "red"),
        Question::new("q_real", "Is it real?", "is_real"),
    ];
    let mut state = engine.initialize_session(&candidates, None);
    assert_eq!(fallback_question(&state, &pool).unwrap().id.as_str(), "q_real");
    state.history.push(answer(&pool[1], AnswerValue::Yes));
    assert_eq!(fallback_question(&state, &pool).unwrap().id.as_str(), "q_color");
}

struct FailingCopilot;

#[async_trait]
impl Copilot for FailingCopilot {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn generate_questions(&self, _: QuestionRequest<'_>) -> Result<Vec<Question>, CopilotError> {
        Err(CopilotError::Transport("connection refused".into()))
    }

    async fn assist_guess(&self, _: GuessRequest<'_>) -> Result<Option<GuessAssist>, CopilotError> {
        Err(CopilotError::Unavailable)
    }

    async fn differentiate(&self, _: &Entity, _: &str, _: &str) -> Result<Vec<Question>, CopilotError> {
        Err(CopilotError::Api {
            status: 503,
            body: "overloaded".into(),
        })
    }
}

struct SlowCopilot;

#[async_trait]
impl Copilot for SlowCopilot {
    fn name(&self) -> &'static str {
        "slow"
    }

    async fn generate_questions(&self, _: QuestionRequest<'_>) -> Result<Vec<Question>, CopilotError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![Question::new("late", "Too late?", "late")])
    }

    async fn assist_guess(&self, _: GuessRequest<'_>) -> Result<Option<GuessAssist>, CopilotError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(None)
    }
}

struct ScriptedCopilot;

#[async_trait]
impl Copilot for ScriptedCopilot {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate_questions(&self, _: QuestionRequest<'_>) -> Result<Vec<Question>, CopilotError> {
        Ok(vec![
            Question::new("ai_gen_1", "Does it glow?", "glows").with_tags(["generated", "ai"]),
        ])
    }

    async fn assist_guess(&self, request: GuessRequest<'_>) -> Result<Option<GuessAssist>, CopilotError> {
        Ok(request.candidates.last().map(|entity| GuessAssist {
            entity_id: entity.id.clone(),
            confidence: 0.8,
        }))
    }

    async fn differentiate(
        &self,
        _wrong: &Entity,
        correct_name: &str,
        _theme: &str,
    ) -> Result<Vec<Question>, CopilotError> {
        Ok(vec![
            Question::new("ai_diff_1", format!("Is it known as {correct_name}?"), "ai_diff_1"),
            Question::new("ai_diff_2", "Does it have stripes?", "ai_diff_2"),
        ])
    }
}

fn three_turn_setup() -> (Vec<SharedEntity>, Vec<Question>) {
    let pool: Vec<Question> = (0..3)
        .map(|idx| Question::new(format!("q{idx}"), format!("F{idx}?"), format!("f{idx}")))
        .collect();
    let keys: Vec<String> = pool.iter().map(|q| q.feature_key.clone()).collect();
    (yes_unknown_no(&keys), pool)
}

async fn play_assisted(
    engine: &SessionEngine,
    copilot: &dyn Copilot,
) -> (mindora_bot::SessionState, mindora_bot::TurnOutcome) {
    let (candidates, pool) = three_turn_setup();
    let mut state = engine.initialize_session(&candidates, None);
    let mut last = None;
    for question in &pool {
        let outcome = engine
            .evaluate_turn_assisted(&mut state, answer(question, AnswerValue::DontKnow), &pool, copilot)
            .await
            .unwrap();
        last = Some(outcome);
        if !state.is_playing() {
            break;
        }
    }
    (state, last.expect("at least one turn"))
}

#[tokio::test]
async fn failing_copilot_degrades_to_forced_guess() {
    let engine = engine();
    let (state, outcome) = play_assisted(&engine, &FailingCopilot).await;
    assert_eq!(state.turn, 3);
    assert_eq!(outcome.guess.expect("guess").reason, GuessReason::PoolExhausted);
}

#[tokio::test]
async fn slow_copilot_is_cut_off_by_timeout() {
    let mut config = EngineConfig::default();
    config.copilot.timeout_ms = 20;
    let engine = SessionEngine::new(config, PatternStore::default().shared()).with_seed(1);
    let (state, outcome) = play_assisted(&engine, &SlowCopilot).await;
    assert_eq!(state.status, SessionStatus::Guessing);
    assert_eq!(outcome.guess.expect("guess").reason, GuessReason::PoolExhausted);
}

#[tokio::test]
async fn noop_copilot_matches_deterministic_path() {
    let engine = engine();
    let (_, outcome) = play_assisted(&engine, &NoopCopilot).await;
    assert_eq!(outcome.guess.expect("guess").reason, GuessReason::PoolExhausted);
}

#[tokio::test]
async fn copilot_supplies_questions_and_assist_signal() {
    let engine = engine();
    let (state, outcome) = play_assisted(&engine, &ScriptedCopilot).await;
    assert_eq!(state.status, SessionStatus::Playing);
    assert_eq!(outcome.source, Some(QuestionSource::Copilot));
    assert_eq!(outcome.next_question.unwrap().id.as_str(), "ai_gen_1");
    let assisted = state.breakdown[&EntityId::from("c")].assist;
    assert_eq!(assisted, 0.8);
    assert_eq!(state.last_question.as_ref().map(|q| q.id.as_str()), Some("ai_gen_1"));
}

fn wrong_guess_setup() -> (SessionEngine, Arc<MemoryStore>, Learner, mindora_bot::SessionState) {
    let lion = Entity::new("lion", "Lion", "cat_animals").with_feature("is_animal", AnswerValue::Yes);
    let store = Arc::new(MemoryStore::new(Snapshot {
        entities: vec![lion],
        ..Snapshot::default()
    }));
    let patterns = PatternStore::default().shared();
    let learner = Learner::new(store.clone(), patterns.clone());
    let engine = SessionEngine::new(EngineConfig::default(), patterns).with_seed(3);

    let corpus = store.load().unwrap().corpus();
    let mut state = engine.initialize_session(corpus.entities(), None);
    state.history = vec![
        Answer::new("q_animal", "is_animal", AnswerValue::Yes),
        Answer::new("q_pet", "is_pet", AnswerValue::No),
        Answer::new("q_big", "is_big", AnswerValue::Yes),
    ];
    (engine, store, learner, state)
}

fn tiger() -> TeachRequest {
    TeachRequest {
        name: "Tiger".into(),
        description: "Striped big cat".into(),
        history: Vec::new(),
    }
}

#[tokio::test]
async fn wrong_guess_teaches_entity_and_stores_distinction() {
    let (engine, store, learner, state) = wrong_guess_setup();
    let wrong = state.leader().cloned().expect("lion is the only candidate");

    let outcome = engine
        .handle_wrong_guess(&state, &wrong, tiger(), &ScriptedCopilot, &learner)
        .await
        .unwrap();
    assert!(outcome.taught.created);
    assert!(matches!(outcome.taught.pattern, LearnOutcome::Inserted { .. }));
    let question = outcome.distinction.expect("distinguishing question");
    assert_eq!(question.text, "Is it known as Tiger?");

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.questions.len(), 1);
    let find = |id: &EntityId| snapshot.entities.iter().find(|e| &e.id == id);
    let taught = find(&outcome.taught.entity_id).expect("tiger stored");
    assert_eq!(taught.feature("is_big"), Some(AnswerValue::Yes));
    assert_eq!(taught.feature(&question.feature_key), Some(AnswerValue::Yes));
    let lion = find(&EntityId::from("lion")).expect("lion kept");
    assert_eq!(lion.feature(&question.feature_key), Some(AnswerValue::No));
    assert_eq!(snapshot.patterns.len(), 1);
}

#[tokio::test]
async fn wrong_guess_without_copilot_help_keeps_pattern_learning() {
    for copilot in [&FailingCopilot as &dyn Copilot, &NoopCopilot] {
        let (engine, store, learner, state) = wrong_guess_setup();
        let wrong = state.leader().cloned().expect("lion is the only candidate");

        let outcome = engine
            .handle_wrong_guess(&state, &wrong, tiger(), copilot, &learner)
            .await
            .unwrap();
        assert!(outcome.taught.created);
        assert!(outcome.distinction.is_none());

        let snapshot = store.load().unwrap();
        assert!(snapshot.questions.is_empty());
        assert_eq!(snapshot.entities.len(), 2);
        assert_eq!(snapshot.patterns.len(), 1);
    }
}

#[tokio::test]
async fn naming_the_guessed_entity_skips_distinction() {
    let (engine, store, learner, state) = wrong_guess_setup();
    let wrong = state.leader().cloned().expect("lion is the only candidate");
    let request = TeachRequest {
        name: "lion".into(),
        description: String::new(),
        history: Vec::new(),
    };

    let outcome = engine
        .handle_wrong_guess(&state, &wrong, request, &ScriptedCopilot, &learner)
        .await
        .unwrap();
    assert!(!outcome.taught.created);
    assert_eq!(outcome.taught.entity_id, EntityId::from("lion"));
    assert!(outcome.distinction.is_none());
    assert!(store.load().unwrap().questions.is_empty());
}
