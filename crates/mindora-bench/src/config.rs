use mindora_bot::EngineConfig;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

const DEFAULT_MAX_TURNS: usize = 25;
const DEFAULT_LATENCY_MIN_MS: u64 = 600;
const DEFAULT_LATENCY_MAX_MS: u64 = 2_400;
const RUN_ID_ALLOWED: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789._-";

/// Root simulation configuration loaded from YAML.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SimulationConfig {
    pub run_id: String,
    /// Snapshot JSON holding entities, questions and categories.
    pub corpus: String,
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    pub outputs: OutputsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let path_buf = path.to_path_buf();
        let file = File::open(path).map_err(|source| ConfigError::Read {
            source,
            path: path_buf.clone(),
        })?;
        let reader = BufReader::new(file);
        let mut cfg: SimulationConfig =
            serde_yaml::from_reader(reader).map_err(|source| ConfigError::Parse {
                source,
                path: path_buf.clone(),
            })?;
        cfg.validate().map_err(|source| ConfigError::Invalid {
            path: path_buf,
            source,
        })?;
        Ok(cfg)
    }

    /// Validate the configuration without performing I/O.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        validate_run_id(&self.run_id)?;
        if self.corpus.trim().is_empty() {
            return Err(ValidationError::InvalidField {
                field: "corpus".to_string(),
                message: "corpus path must not be empty".to_string(),
            });
        }
        self.sessions.validate()?;
        validate_engine(&self.engine)?;
        self.outputs.validate(&self.run_id)?;
        self.logging.normalize();
        Ok(())
    }

    /// Resolve output templates (e.g., `{run_id}` placeholders) into concrete paths.
    pub fn resolved_outputs(&self) -> ResolvedOutputs {
        ResolvedOutputs {
            jsonl: resolve_template(&self.run_id, &self.outputs.jsonl),
            summary_md: resolve_template(&self.run_id, &self.outputs.summary_md),
        }
    }
}

/// How many simulated players to run and how they behave.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionsConfig {
    pub count: usize,
    pub seed: Option<u64>,
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
    /// Entity ids to cycle through as secrets. Empty means every entity in the corpus.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub theme: Option<String>,
    /// Chance that a hard answer is softened to Probably / Probably Not.
    #[serde(default)]
    pub answer_noise: f64,
    #[serde(default)]
    pub latency_ms: LatencyRange,
    #[serde(default = "default_true")]
    pub learn_on_success: bool,
    #[serde(default)]
    pub teach_on_miss: bool,
    /// Consult the HTTP copilot configured through the environment.
    #[serde(default)]
    pub copilot: bool,
}

impl SessionsConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::InvalidField {
                field: "sessions.count".to_string(),
                message: "number of sessions must be greater than zero".to_string(),
            });
        }

        if self.max_turns == 0 {
            return Err(ValidationError::InvalidField {
                field: "sessions.max_turns".to_string(),
                message: "max_turns must be at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.answer_noise) {
            return Err(ValidationError::InvalidField {
                field: "sessions.answer_noise".to_string(),
                message: "answer_noise must lie in [0, 1]".to_string(),
            });
        }

        if self.latency_ms.min > self.latency_ms.max {
            return Err(ValidationError::InvalidField {
                field: "sessions.latency_ms".to_string(),
                message: format!(
                    "min ({}) must not exceed max ({})",
                    self.latency_ms.min, self.latency_ms.max
                ),
            });
        }

        if self.targets.iter().any(|target| target.trim().is_empty()) {
            return Err(ValidationError::InvalidField {
                field: "sessions.targets".to_string(),
                message: "target ids must not be empty".to_string(),
            });
        }

        Ok(())
    }
}

/// Simulated answer latency, drawn uniformly from `min..=max`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct LatencyRange {
    pub min: u64,
    pub max: u64,
}

impl Default for LatencyRange {
    fn default() -> Self {
        Self {
            min: DEFAULT_LATENCY_MIN_MS,
            max: DEFAULT_LATENCY_MAX_MS,
        }
    }
}

fn default_max_turns() -> usize {
    DEFAULT_MAX_TURNS
}

fn default_true() -> bool {
    true
}

/// Output artifact configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputsConfig {
    pub jsonl: String,
    pub summary_md: String,
}

impl OutputsConfig {
    fn validate(&self, run_id: &str) -> Result<(), ValidationError> {
        for (label, value) in [
            ("outputs.jsonl", &self.jsonl),
            ("outputs.summary_md", &self.summary_md),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }

            let resolved = resolve_template(run_id, value);
            if resolved.components().count() == 0 {
                return Err(ValidationError::InvalidField {
                    field: label.to_string(),
                    message: "resolved path is invalid".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Logging configuration defaults to disabled structured logs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub enable_structured: bool,
    #[serde(default = "default_tracing_level")]
    pub tracing_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_structured: false,
            tracing_level: default_tracing_level(),
        }
    }
}

impl LoggingConfig {
    fn normalize(&mut self) {
        if self.tracing_level.trim().is_empty() {
            self.tracing_level = default_tracing_level();
        }
    }

    pub fn level(&self) -> Option<Level> {
        match self.tracing_level.to_ascii_lowercase().as_str() {
            "trace" => Some(Level::TRACE),
            "debug" => Some(Level::DEBUG),
            "info" => Some(Level::INFO),
            "warn" | "warning" => Some(Level::WARN),
            "error" => Some(Level::ERROR),
            _ => None,
        }
    }
}

fn default_tracing_level() -> String {
    "info".to_string()
}

fn validate_run_id(run_id: &str) -> Result<(), ValidationError> {
    if run_id.trim().is_empty() {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id must not be empty".to_string(),
        });
    }

    if !run_id.chars().all(|c| RUN_ID_ALLOWED.contains(c)) {
        return Err(ValidationError::InvalidField {
            field: "run_id".to_string(),
            message: "run_id may only contain alphanumeric characters, '.', '_' or '-'".to_string(),
        });
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ValidationError> {
    for (label, value) in [
        ("engine.hard_threshold", engine.hard_threshold),
        ("engine.soft_threshold", engine.soft_threshold),
        ("engine.early_read_threshold", engine.early_read_threshold),
        ("engine.elimination_floor", engine.elimination_floor),
    ] {
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ValidationError::InvalidField {
                field: label.to_string(),
                message: format!("{value} is outside [0, 1]"),
            });
        }
    }

    let weights = &engine.weights;
    for (label, value) in [
        ("engine.weights.rule", weights.rule),
        ("engine.weights.similarity", weights.similarity),
        ("engine.weights.fuzzy", weights.fuzzy),
        ("engine.weights.pattern", weights.pattern),
        ("engine.weights.assist", weights.assist),
        ("engine.pattern_bonus", engine.pattern_bonus),
        ("engine.popularity_split_bonus", engine.popularity_split_bonus),
        ("engine.follow_up_boost", engine.follow_up_boost),
        ("engine.topic_repeat_penalty", engine.topic_repeat_penalty),
        ("engine.usage_penalty", engine.usage_penalty),
        ("engine.opening_noise", engine.opening_noise),
        ("engine.turn_noise", engine.turn_noise),
        ("engine.cooldown_penalty", engine.cooldown_penalty),
        ("engine.prior_floor", engine.prior_floor),
        ("engine.region_boost", engine.region_boost),
        ("engine.streak_boost", engine.streak_boost),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidField {
                field: label.to_string(),
                message: format!("{value} must be a finite, non-negative number"),
            });
        }
    }

    if engine.soft_threshold > engine.hard_threshold {
        return Err(ValidationError::InvalidField {
            field: "engine.soft_threshold".to_string(),
            message: "soft threshold must not exceed the hard threshold".to_string(),
        });
    }

    Ok(())
}

fn resolve_template(run_id: &str, template: &str) -> PathBuf {
    let replaced = template.replace("{run_id}", run_id);
    PathBuf::from(replaced)
}

/// Fully resolved output paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutputs {
    pub jsonl: PathBuf,
    pub summary_md: PathBuf,
}

impl ResolvedOutputs {
    /// Directory holding the summary; telemetry files land next to it.
    pub fn summary_dir(&self) -> PathBuf {
        self.summary_md
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Errors surfaced when loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse config {path:?}: {source}")]
    Parse {
        #[source]
        source: serde_yaml::Error,
        path: PathBuf,
    },
    #[error("invalid configuration in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: ValidationError,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path.as_path(),
        }
    }
}

/// Validation failures captured with contextual metadata.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field}: {message}")]
    InvalidField { field: String, message: String },
}
