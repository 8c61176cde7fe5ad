//! Recall of answer sequences from past confirmed sessions.
//!
//! - `matcher`: answer-vector encoding and cosine similarity.
//! - `store`: the bounded, least-recently-used pattern store.

mod matcher;
mod store;

pub use matcher::{cosine_similarity, encode_history};
pub use store::{
    LearnOutcome, MATCH_THRESHOLD, MERGE_SIMILARITY, MIN_HISTORY, MIN_LEARN_CONFIDENCE,
    PATTERN_CAPACITY, Pattern, PatternStore, SharedPatterns,
};
