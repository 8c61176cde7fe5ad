//! Offline upkeep of the persisted corpus.

use crate::model::{Entity, Question};
use crate::store::{SnapshotStore, StoreError};
use serde::Serialize;
use tracing::info;

pub const ABANDON_RATE_LIMIT: f64 = 0.3;
pub const ABANDON_QUALITY_PENALTY: f64 = 0.1;
pub const ARCHIVE_QUALITY_FLOOR: f64 = 0.2;
const DRIFT_SUCCESS_WEIGHT: f64 = 0.6;
const DEFAULT_SUCCESS_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub penalized: usize,
    pub archived: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    pub penalized_questions: usize,
    pub archived_questions: usize,
    pub drifted_entities: usize,
}

/// Lowers the quality of frequently abandoned questions and archives the worst ones.
pub fn prune_questions(questions: &mut [Question]) -> PruneReport {
    let mut report = PruneReport::default();
    for question in questions.iter_mut().filter(|q| !q.archived) {
        if question.abandon_rate.is_some_and(|rate| rate > ABANDON_RATE_LIMIT) {
            question.quality = (question.quality - ABANDON_QUALITY_PENALTY).max(0.0);
            report.penalized += 1;
        }
        if question.quality < ARCHIVE_QUALITY_FLOOR {
            question.archived = true;
            report.archived += 1;
        }
    }
    report
}

/// Pulls popularity toward the observed guess success rate. Returns how many entities changed.
pub fn drift_popularity(entities: &mut [Entity]) -> usize {
    let mut changed = 0;
    for entity in entities.iter_mut() {
        let success = entity.guess_success_rate.unwrap_or(DEFAULT_SUCCESS_RATE);
        let drifted =
            success * DRIFT_SUCCESS_WEIGHT + entity.prior() * (1.0 - DRIFT_SUCCESS_WEIGHT);
        let drifted = (drifted * 1_000.0).round() / 1_000.0;
        if drifted != entity.popularity {
            entity.popularity = drifted;
            changed += 1;
        }
    }
    changed
}

/// Headline 0-100 score from success percentage and average turns per session.
pub fn experience_score(success_pct: f64, avg_turns: f64) -> f64 {
    (success_pct / 100.0 * 40.0 - 2.0 * avg_turns + 60.0).clamp(0.0, 100.0)
}

/// Runs pruning and popularity drift as a single load-mutate-save.
pub fn run_maintenance(store: &dyn SnapshotStore) -> Result<MaintenanceReport, StoreError> {
    let mut snapshot = store.load()?;
    let prune = prune_questions(&mut snapshot.questions);
    let drifted_entities = drift_popularity(&mut snapshot.entities);
    store.save(&snapshot)?;

    let report = MaintenanceReport {
        penalized_questions: prune.penalized,
        archived_questions: prune.archived,
        drifted_entities,
    };
    info!(
        target: "mindora_core::learning",
        penalized = report.penalized_questions,
        archived = report.archived_questions,
        drifted = report.drifted_entities,
        "maintenance pass complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, Snapshot};

    #[test]
    fn abandoned_questions_lose_quality_then_archive() {
        let mut healthy = Question::new("q1", "Is it real?", "is_real");
        healthy.abandon_rate = Some(0.1);
        let mut abandoned = Question::new("q2", "Does it hum?", "hums").with_quality(0.25);
        abandoned.abandon_rate = Some(0.5);
        let mut questions = vec![healthy, abandoned];

        let report = prune_questions(&mut questions);
        assert_eq!(report, PruneReport { penalized: 1, archived: 1 });
        assert!(!questions[0].archived);
        assert!(questions[1].archived);
        assert!((questions[1].quality - 0.15).abs() < 1e-9);
    }

    #[test]
    fn popularity_drifts_toward_success() {
        let mut entity = Entity::new("e1", "Eagle", "cat").with_popularity(0.9);
        entity.guess_success_rate = Some(0.2);
        let mut entities = vec![entity, Entity::new("e2", "Owl", "cat")];
        assert_eq!(drift_popularity(&mut entities), 1);
        assert!((entities[0].popularity - 0.48).abs() < 1e-9);
        assert_eq!(entities[1].popularity, 0.5);
    }

    #[test]
    fn experience_score_is_clamped() {
        assert_eq!(experience_score(100.0, 0.0), 100.0);
        assert_eq!(experience_score(0.0, 40.0), 0.0);
        assert!((experience_score(80.0, 10.0) - 72.0).abs() < 1e-9);
    }

    #[test]
    fn maintenance_persists_changes() {
        let mut question = Question::new("q1", "Hmm?", "hmm").with_quality(0.1);
        question.abandon_rate = Some(0.0);
        let store = MemoryStore::new(Snapshot {
            questions: vec![question],
            ..Snapshot::default()
        });
        let report = run_maintenance(&store).unwrap();
        assert_eq!(report.archived_questions, 1);
        assert!(store.load().unwrap().questions[0].archived);
    }
}
