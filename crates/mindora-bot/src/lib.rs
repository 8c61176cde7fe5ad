pub mod config;
pub mod copilot;
pub mod fusion;
pub mod optimizer;
pub mod select;
pub mod session;

pub use config::{CopilotGate, EngineConfig, FusionWeights, TuningThresholds, WeightOverrides};
pub use copilot::{Copilot, CopilotError, GuessAssist, HttpCopilot, NoopCopilot, copilot_from_env};
pub use fusion::{Decision, Guess, GuessKind, GuessReason, ScoreBreakdown, decide, fuse};
pub use optimizer::{HealthMetrics, HealthTracker, SelfTuner};
pub use select::{EntropySelector, Phase, SelectionInput};
pub use session::{
    SessionContext, SessionEngine, SessionMemory, SessionState, SessionStatus, TurnError,
    TurnOutcome, WrongGuessOutcome, fallback_question,
};
