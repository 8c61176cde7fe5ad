//! Belief tracking over the remaining candidates.
//!
//! This module is composed of:
//! - `hard`: deterministic elimination on exact yes/no answers.
//! - `bayes`: posterior updates seeded from the previous turn.
//! - `soft`: graded (fuzzy) agreement with the whole answer history.
//! - `telemetry`: entropy summaries of the posterior for logging.

mod bayes;
mod hard;
pub mod soft;
pub mod telemetry;

pub use bayes::{BayesianUpdater, likelihood, normalize};
pub use hard::{RuleFilter, contradicts};
pub use soft::{FuzzyScorer, membership};
pub use telemetry::BeliefMetrics;
