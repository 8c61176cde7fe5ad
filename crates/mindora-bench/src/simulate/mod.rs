mod oracle;

pub use oracle::SimulatedPlayer;

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use mindora_bot::{
    Copilot, GuessReason, HealthTracker, NoopCopilot, SessionContext, SessionEngine, SessionMemory,
    SessionState, SessionStatus, TurnError, copilot_from_env,
};
use mindora_core::belief::BeliefMetrics;
use mindora_core::learning::{Learner, LearningError, TeachRequest};
use mindora_core::model::{EntityId, QuestionId, SharedEntity};
use mindora_core::pattern::LearnOutcome;
use mindora_core::store::{JsonFileStore, MemoryStore, SnapshotStore, StoreError};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use thiserror::Error;
use tokio::runtime::{Builder, Runtime};
use tracing::{Level, event};

use crate::analytics::{AnalyticsCollector, AnalyticsError};
use crate::config::{ResolvedOutputs, SimulationConfig};
use crate::logging::TELEMETRY_FILE;
use crate::telemetry::{
    TelemetryError, TelemetryOutputs, append_highlights_to_markdown, write_summary_outputs,
};

const RECENT_OPENER_WINDOW: usize = 3;

/// Plays simulated sessions against one engine and a private copy of the corpus.
pub struct SimulationRunner {
    config: SimulationConfig,
    outputs: ResolvedOutputs,
    store: Arc<MemoryStore>,
    learner: Learner,
    engine: SessionEngine,
    copilot: Arc<dyn Copilot>,
    runtime: Runtime,
    targets: Vec<EntityId>,
}

/// Summary details returned after a run.
pub struct RunSummary {
    pub sessions_played: usize,
    pub successes: usize,
    pub rows_written: usize,
    pub jsonl_path: PathBuf,
    pub summary_path: PathBuf,
    pub telemetry_path: Option<PathBuf>,
    pub telemetry_outputs: Option<TelemetryOutputs>,
}

/// One JSONL row per simulated session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRow {
    pub run_id: String,
    pub session_index: usize,
    pub session_id: String,
    pub target: String,
    pub target_name: String,
    pub guess: Option<String>,
    pub guess_name: Option<String>,
    pub success: bool,
    pub status: SessionStatus,
    pub reason: Option<GuessReason>,
    pub turns: usize,
    pub confidence: f64,
    pub candidates_left: usize,
    pub entropy_bits: f64,
    pub avg_decision_ms: f64,
    pub learned: Option<String>,
}

impl SimulationRunner {
    /// Loads the corpus and builds the engine from a validated configuration.
    pub fn new(config: SimulationConfig, outputs: ResolvedOutputs) -> Result<Self, RunnerError> {
        let snapshot = JsonFileStore::new(&config.corpus).load()?;
        if snapshot.entities.is_empty() {
            return Err(RunnerError::EmptyCorpus {
                path: PathBuf::from(&config.corpus),
            });
        }

        let targets = if config.sessions.targets.is_empty() {
            snapshot.entities.iter().map(|e| e.id.clone()).collect()
        } else {
            let mut resolved = Vec::with_capacity(config.sessions.targets.len());
            for target in &config.sessions.targets {
                let id = EntityId::from(target.as_str());
                if !snapshot.entities.iter().any(|e| e.id == id) {
                    return Err(RunnerError::UnknownTarget(target.clone()));
                }
                resolved.push(id);
            }
            resolved
        };

        let patterns = snapshot.pattern_store().shared();
        let store = Arc::new(MemoryStore::new(snapshot));
        let learner = Learner::new(store.clone(), patterns.clone());
        let seed = config.sessions.seed.unwrap_or(0);
        let engine = SessionEngine::new(config.engine.clone(), patterns)
            .with_seed(seed)
            .with_health(Arc::new(HealthTracker::new()));
        let copilot: Arc<dyn Copilot> = if config.sessions.copilot {
            copilot_from_env()
        } else {
            Arc::new(NoopCopilot)
        };
        let runtime = Builder::new_current_thread().enable_all().build()?;

        Ok(Self {
            config,
            outputs,
            store,
            learner,
            engine,
            copilot,
            runtime,
            targets,
        })
    }

    pub fn engine(&self) -> &SessionEngine {
        &self.engine
    }

    /// Plays every session, streaming JSONL rows to disk.
    pub fn run(&self) -> Result<RunSummary, RunnerError> {
        ensure_parent(self.outputs.jsonl.parent())?;
        ensure_parent(self.outputs.summary_md.parent())?;

        let mut writer = BufWriter::new(File::create(&self.outputs.jsonl)?);
        let mut rng = StdRng::seed_from_u64(self.config.sessions.seed.unwrap_or(0));
        let mut analytics = AnalyticsCollector::new(&self.config);
        let mut recent_openers = VecDeque::with_capacity(RECENT_OPENER_WINDOW);
        let mut rows_written = 0usize;

        for session_index in 0..self.config.sessions.count {
            let target_id = &self.targets[session_index % self.targets.len()];
            let session_seed = rng.next_u64();
            let row = self.play_session(session_index, target_id, session_seed, &mut recent_openers)?;
            analytics.record_session(&row);
            serde_json::to_writer(&mut writer, &row)?;
            writer.write_all(b"\n")?;
            rows_written += 1;
        }

        writer.flush()?;

        let summary = analytics.finalize()?;
        summary.write_markdown(&self.outputs.summary_md)?;

        let telemetry_dir = self.outputs.summary_dir();
        let telemetry_path = if self.config.logging.enable_structured {
            Some(telemetry_dir.join(TELEMETRY_FILE))
        } else {
            None
        };

        let telemetry_outputs = if let Some(path) = telemetry_path.as_ref() {
            write_summary_outputs(path, &telemetry_dir)?
        } else {
            None
        };

        if let Some(outputs) = telemetry_outputs.as_ref() {
            append_highlights_to_markdown(&self.outputs.summary_md, outputs)?;
        }

        Ok(RunSummary {
            sessions_played: self.config.sessions.count,
            successes: summary.successes,
            rows_written,
            jsonl_path: self.outputs.jsonl.clone(),
            summary_path: self.outputs.summary_md.clone(),
            telemetry_path,
            telemetry_outputs,
        })
    }

    fn play_session(
        &self,
        session_index: usize,
        target_id: &EntityId,
        session_seed: u64,
        recent_openers: &mut VecDeque<QuestionId>,
    ) -> Result<SessionRow, RunnerError> {
        let corpus = self.store.load()?.corpus();
        let pool = corpus.active_questions();
        let target = corpus
            .entity(target_id)
            .cloned()
            .ok_or_else(|| RunnerError::UnknownTarget(target_id.to_string()))?;

        let sessions = &self.config.sessions;
        let player = SimulatedPlayer::new(target.clone(), sessions.answer_noise, sessions.latency_ms);
        let mut rng = StdRng::seed_from_u64(session_seed);

        let context = SessionContext {
            region: sessions.region.clone(),
            memory: sessions.theme.clone().map(|theme| SessionMemory {
                theme,
                play_count: session_index as u32 + 1,
            }),
            recent_openers: recent_openers.iter().cloned().collect(),
        };
        let mut state = self
            .engine
            .initialize_session(corpus.entities(), Some(context));

        let mut question = self.engine.opening_question(&state, &pool);
        if let Some(opener) = question.as_ref() {
            if recent_openers.len() == RECENT_OPENER_WINDOW {
                recent_openers.pop_front();
            }
            recent_openers.push_back(opener.id.clone());
        }

        let mut guess: Option<(SharedEntity, GuessReason)> = None;
        let mut decision_ms = 0.0;
        let mut metrics = None;
        while let Some(current) = question.take() {
            if state.turn >= sessions.max_turns {
                break;
            }
            let answer = player.answer(&current, &mut rng);
            let turn = self
                .engine
                .evaluate_turn_assisted(&mut state, answer, &pool, self.copilot.as_ref());
            let outcome = match self.runtime.block_on(turn) {
                Ok(outcome) => outcome,
                Err(TurnError::Finished(_)) => break,
            };
            decision_ms += state.last_latency_ms.unwrap_or(0.0);
            metrics = Some(outcome.metrics);
            if let Some(made) = outcome.guess {
                guess = Some((made.entity, made.reason));
                break;
            }
            question = outcome.next_question;
        }

        let success = guess
            .as_ref()
            .is_some_and(|(entity, _)| player.confirms(entity));
        self.engine.record_outcome(&state, success);
        let wrong = guess.as_ref().filter(|_| !success).map(|(entity, _)| entity);
        let learned = self.learn(&state, &target, wrong, success)?;

        let metrics = metrics.unwrap_or_else(|| BeliefMetrics::from_posterior(&state.posterior));
        let row = SessionRow {
            run_id: self.config.run_id.clone(),
            session_index,
            session_id: state.id.clone(),
            target: target.id.to_string(),
            target_name: target.name.clone(),
            guess: guess.as_ref().map(|(entity, _)| entity.id.to_string()),
            guess_name: guess.as_ref().map(|(entity, _)| entity.name.clone()),
            success,
            status: state.status,
            reason: guess.as_ref().map(|(_, reason)| *reason),
            turns: state.turn,
            confidence: state.top_confidence,
            candidates_left: state.candidates.len(),
            entropy_bits: metrics.entropy_bits,
            avg_decision_ms: if state.turn == 0 {
                0.0
            } else {
                decision_ms / state.turn as f64
            },
            learned,
        };

        if tracing::enabled!(target: "mindora_bench::session", Level::INFO) {
            event!(
                target: "mindora_bench::session",
                Level::INFO,
                run_id = %row.run_id,
                session_index = row.session_index as u32,
                session = %row.session_id,
                target_entity = %row.target,
                guess = row.guess.as_deref().unwrap_or("-"),
                success = row.success,
                reason = row.reason.map(GuessReason::as_str).unwrap_or("-"),
                turns = row.turns as u32,
                confidence = row.confidence,
                avg_decision_ms = row.avg_decision_ms,
            );
        }

        Ok(row)
    }

    fn learn(
        &self,
        state: &SessionState,
        target: &SharedEntity,
        wrong: Option<&SharedEntity>,
        success: bool,
    ) -> Result<Option<String>, RunnerError> {
        let sessions = &self.config.sessions;
        if success && sessions.learn_on_success {
            let outcome = self
                .learner
                .confirm_guess(&target.id, &state.history, Some(state.theme()))?;
            return Ok(learn_label(&outcome));
        }
        if !success && sessions.teach_on_miss && !state.history.is_empty() {
            let request = TeachRequest {
                name: target.name.clone(),
                description: target.description.clone(),
                history: state.history.clone(),
            };
            let Some(wrong) = wrong else {
                let outcome = self.learner.teach(request)?;
                return Ok(learn_label(&outcome.pattern).map(|label| format!("taught:{label}")));
            };
            let handled = self.engine.handle_wrong_guess(
                state,
                wrong,
                request,
                self.copilot.as_ref(),
                &self.learner,
            );
            let outcome = self.runtime.block_on(handled)?;
            let label = learn_label(&outcome.taught.pattern).map(|label| format!("taught:{label}"));
            return Ok(match (label, outcome.distinction) {
                (Some(label), Some(_)) => Some(format!("{label}+distinction")),
                (None, Some(_)) => Some("distinction".to_string()),
                (label, None) => label,
            });
        }
        Ok(None)
    }
}

fn learn_label(outcome: &LearnOutcome) -> Option<String> {
    match outcome {
        LearnOutcome::Skipped { .. } => None,
        LearnOutcome::Reinforced { .. } => Some("reinforced".to_string()),
        LearnOutcome::Inserted { .. } => Some("inserted".to_string()),
    }
}

fn ensure_parent(path: Option<&Path>) -> Result<(), RunnerError> {
    if let Some(dir) = path.filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("failed to serialize session row: {source}")]
    Serialize {
        #[from]
        source: serde_json::Error,
    },
    #[error("corpus error: {0}")]
    Store(#[from] StoreError),
    #[error("corpus at {path:?} holds no entities")]
    EmptyCorpus { path: PathBuf },
    #[error("target entity '{0}' is not in the corpus")]
    UnknownTarget(String),
    #[error("learning failed: {0}")]
    Learning(#[from] LearningError),
    #[error("analytics error: {0}")]
    Analytics(#[from] AnalyticsError),
    #[error("telemetry summarisation failed: {0}")]
    Telemetry(#[from] TelemetryError),
}
