use super::ids::QuestionId;
use chrono::{DateTime, Utc};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Latency assumed for answers that arrive without a measured response time.
pub const DEFAULT_LATENCY_MS: u64 = 1_000;

/// Graded answer scale shared by every scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnswerValue {
    #[serde(alias = "yes")]
    Yes,
    #[serde(alias = "probably")]
    Probably,
    #[serde(alias = "Dont Know", alias = "Don't Know", alias = "dont_know")]
    DontKnow,
    #[serde(alias = "Probably Not", alias = "probably_not")]
    ProbablyNot,
    #[serde(alias = "no")]
    No,
}

/// Which side of a yes/no split a value falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leaning {
    Yes,
    No,
    Neutral,
}

impl AnswerValue {
    pub const ALL: [AnswerValue; 5] = [
        AnswerValue::Yes,
        AnswerValue::Probably,
        AnswerValue::DontKnow,
        AnswerValue::ProbablyNot,
        AnswerValue::No,
    ];

    /// Truth weight on [0, 1]. This is the only weight table in the workspace.
    pub const fn weight(self) -> f64 {
        match self {
            AnswerValue::Yes => 1.0,
            AnswerValue::Probably => 0.75,
            AnswerValue::DontKnow => 0.5,
            AnswerValue::ProbablyNot => 0.25,
            AnswerValue::No => 0.0,
        }
    }

    /// Weight of a possibly missing feature value; unknown sits in the middle.
    pub fn weight_of(value: Option<AnswerValue>) -> f64 {
        value.map_or(AnswerValue::DontKnow.weight(), AnswerValue::weight)
    }

    pub const fn is_hard(self) -> bool {
        matches!(self, AnswerValue::Yes | AnswerValue::No)
    }

    pub const fn is_uncertain(self) -> bool {
        matches!(
            self,
            AnswerValue::Probably | AnswerValue::ProbablyNot | AnswerValue::DontKnow
        )
    }

    /// The exact opposite of a hard value. Graded values have none.
    pub const fn opposite(self) -> Option<AnswerValue> {
        match self {
            AnswerValue::Yes => Some(AnswerValue::No),
            AnswerValue::No => Some(AnswerValue::Yes),
            _ => None,
        }
    }

    pub const fn leaning(self) -> Leaning {
        match self {
            AnswerValue::Yes | AnswerValue::Probably => Leaning::Yes,
            AnswerValue::No | AnswerValue::ProbablyNot => Leaning::No,
            AnswerValue::DontKnow => Leaning::Neutral,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            AnswerValue::Yes => "Yes",
            AnswerValue::Probably => "Probably",
            AnswerValue::DontKnow => "Dont Know",
            AnswerValue::ProbablyNot => "Probably Not",
            AnswerValue::No => "No",
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnswerError(String);

impl fmt::Display for ParseAnswerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised answer '{}'", self.0)
    }
}

impl std::error::Error for ParseAnswerError {}

impl FromStr for AnswerValue {
    type Err = ParseAnswerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "yes" | "y" => Ok(AnswerValue::Yes),
            "probably" => Ok(AnswerValue::Probably),
            "dontknow" | "unknown" => Ok(AnswerValue::DontKnow),
            "probablynot" => Ok(AnswerValue::ProbablyNot),
            "no" | "n" => Ok(AnswerValue::No),
            _ => Err(ParseAnswerError(s.to_string())),
        }
    }
}

/// One recorded response. Never mutated once appended to a session history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub feature_key: String,
    pub value: AnswerValue,
    pub answered_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Answer {
    pub fn new(
        question_id: impl Into<QuestionId>,
        feature_key: impl Into<String>,
        value: AnswerValue,
    ) -> Self {
        Self {
            question_id: question_id.into(),
            feature_key: feature_key.into(),
            value,
            answered_at: Utc::now(),
            latency_ms: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn latency_or_default(&self) -> u64 {
        self.latency_ms.unwrap_or(DEFAULT_LATENCY_MS)
    }
}
