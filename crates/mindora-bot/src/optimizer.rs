//! Self-tuning checks. Each returns partial overrides for the next turn only.

use crate::config::{TuningThresholds, WeightOverrides};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Success rate assumed before any session has finished.
pub const DEFAULT_SUCCESS_RATE: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthMetrics {
    pub avg_turns: f64,
    pub success_rate: f64,
}

/// Slow or inaccurate systems lean on entropy, patterns and rules.
pub fn check_health(metrics: HealthMetrics, thresholds: &TuningThresholds) -> WeightOverrides {
    let mut overrides = WeightOverrides::default();
    if metrics.avg_turns > thresholds.slow_avg_turns {
        overrides.entropy_multiplier = Some(1.2);
        overrides.pattern = Some(0.15);
    }
    if metrics.success_rate < thresholds.low_success_rate {
        overrides.rule = Some(0.4);
    }
    overrides
}

/// Detects stalled confidence over the last `plateau_window` log entries.
pub fn check_plateau(confidence_log: &[f64], thresholds: &TuningThresholds) -> WeightOverrides {
    let window = thresholds.plateau_window.max(1);
    if confidence_log.len() < window {
        return WeightOverrides::default();
    }
    let current = confidence_log[confidence_log.len() - 1];
    let earlier = confidence_log[confidence_log.len() - window];
    if current - earlier < thresholds.plateau_min_gain {
        WeightOverrides {
            entropy_multiplier: Some(1.5),
            novelty_multiplier: Some(1.3),
            pattern: Some(0.05),
            ..WeightOverrides::default()
        }
    } else {
        WeightOverrides::default()
    }
}

/// Sheds the costlier signals when a decision took longer than the budget.
pub fn monitor_latency(latency_ms: f64, thresholds: &TuningThresholds) -> WeightOverrides {
    if latency_ms > thresholds.latency_budget_ms {
        WeightOverrides {
            similarity: Some(0.1),
            fuzzy: Some(0.1),
            ..WeightOverrides::default()
        }
    } else {
        WeightOverrides::default()
    }
}

/// Running health of finished sessions, shared across sessions.
#[derive(Debug, Default)]
pub struct HealthTracker {
    inner: Mutex<HealthTotals>,
}

#[derive(Debug, Default, Clone, Copy)]
struct HealthTotals {
    sessions: u64,
    successes: u64,
    turns: u64,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, turns: usize, success: bool) {
        let mut totals = self.inner.lock();
        totals.sessions += 1;
        totals.turns += turns as u64;
        if success {
            totals.successes += 1;
        }
    }

    pub fn sessions(&self) -> u64 {
        self.inner.lock().sessions
    }

    /// Aggregate metrics. Without history the current turn count stands in for the average.
    pub fn metrics(&self, current_turns: usize) -> HealthMetrics {
        let totals = *self.inner.lock();
        if totals.sessions == 0 {
            return HealthMetrics {
                avg_turns: current_turns as f64,
                success_rate: DEFAULT_SUCCESS_RATE,
            };
        }
        HealthMetrics {
            avg_turns: totals.turns as f64 / totals.sessions as f64,
            success_rate: totals.successes as f64 / totals.sessions as f64,
        }
    }
}

/// Combines the three checks in health, plateau, latency order.
#[derive(Debug, Clone, Copy)]
pub struct SelfTuner<'t> {
    thresholds: &'t TuningThresholds,
}

impl<'t> SelfTuner<'t> {
    pub fn new(thresholds: &'t TuningThresholds) -> Self {
        Self { thresholds }
    }

    pub fn overrides(
        &self,
        health: HealthMetrics,
        confidence_log: &[f64],
        last_latency_ms: Option<f64>,
    ) -> WeightOverrides {
        let health_overrides = check_health(health, self.thresholds);
        let plateau = check_plateau(confidence_log, self.thresholds);
        let latency = last_latency_ms
            .map(|ms| monitor_latency(ms, self.thresholds))
            .unwrap_or_default();
        let merged = health_overrides.merge(plateau).merge(latency);
        if !merged.is_empty() {
            debug!(
                target: "mindora_bot::tuning",
                avg_turns = health.avg_turns,
                success_rate = health.success_rate,
                plateau = !plateau.is_empty(),
                slow = !latency.is_empty(),
                overrides = ?merged,
                "self-tuning overrides active"
            );
        }
        merged
    }
}
