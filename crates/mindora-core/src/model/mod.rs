pub mod answer;
pub mod category;
pub mod corpus;
pub mod entity;
pub mod ids;
pub mod question;

pub use answer::{Answer, AnswerValue, DEFAULT_LATENCY_MS, Leaning};
pub use category::Category;
pub use corpus::Corpus;
pub use entity::{Entity, SharedEntity};
pub use ids::{EntityId, QuestionId};
pub use question::Question;

use std::collections::HashMap;

/// Per-turn derived score keyed by entity id. Entity records themselves stay read-only.
pub type ScoreMap = HashMap<EntityId, f64>;
