use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Linear weights of the confidence fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    pub rule: f64,
    pub similarity: f64,
    pub fuzzy: f64,
    pub pattern: f64,
    pub assist: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            rule: 0.35,
            similarity: 0.25,
            fuzzy: 0.20,
            pattern: 0.10,
            assist: 0.10,
        }
    }
}

impl FusionWeights {
    /// Weights with any overridden slot replaced.
    pub fn with_overrides(self, overrides: &WeightOverrides) -> Self {
        Self {
            rule: overrides.rule.unwrap_or(self.rule),
            similarity: overrides.similarity.unwrap_or(self.similarity),
            fuzzy: overrides.fuzzy.unwrap_or(self.fuzzy),
            pattern: overrides.pattern.unwrap_or(self.pattern),
            assist: overrides.assist.unwrap_or(self.assist),
        }
    }
}

/// Partial configuration produced by the self-tuning checks. Valid for one turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuzzy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assist: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub novelty_multiplier: Option<f64>,
}

impl WeightOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Layers `later` on top of `self`; fields set in `later` win.
    pub fn merge(self, later: WeightOverrides) -> Self {
        Self {
            rule: later.rule.or(self.rule),
            similarity: later.similarity.or(self.similarity),
            fuzzy: later.fuzzy.or(self.fuzzy),
            pattern: later.pattern.or(self.pattern),
            assist: later.assist.or(self.assist),
            entropy_multiplier: later.entropy_multiplier.or(self.entropy_multiplier),
            novelty_multiplier: later.novelty_multiplier.or(self.novelty_multiplier),
        }
    }

    pub fn entropy_multiplier(&self) -> f64 {
        self.entropy_multiplier.unwrap_or(1.0)
    }

    pub fn novelty_multiplier(&self) -> f64 {
        self.novelty_multiplier.unwrap_or(1.0)
    }
}

/// When the optional assistant may be consulted and how long it may take.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopilotGate {
    pub min_history: usize,
    pub min_candidates: usize,
    pub max_candidates: usize,
    pub timeout_ms: u64,
}

impl Default for CopilotGate {
    fn default() -> Self {
        Self {
            min_history: 3,
            min_candidates: 2,
            max_candidates: 12,
            timeout_ms: 2_500,
        }
    }
}

impl CopilotGate {
    pub fn allows(&self, history_len: usize, candidate_count: usize) -> bool {
        history_len >= self.min_history
            && (self.min_candidates..=self.max_candidates).contains(&candidate_count)
    }
}

/// Thresholds of the self-tuning checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningThresholds {
    pub slow_avg_turns: f64,
    pub low_success_rate: f64,
    pub plateau_window: usize,
    pub plateau_min_gain: f64,
    pub latency_budget_ms: f64,
}

impl Default for TuningThresholds {
    fn default() -> Self {
        Self {
            slow_avg_turns: 8.0,
            low_success_rate: 0.6,
            plateau_window: 3,
            plateau_min_gain: 0.05,
            latency_budget_ms: 90.0,
        }
    }
}

/// Every threshold and weight used by a session engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: FusionWeights,
    pub pattern_bonus_threshold: f64,
    pub pattern_bonus: f64,
    pub confidence_cap: f64,
    pub hard_threshold: f64,
    pub soft_threshold: f64,
    pub decisive_discount: f64,
    pub early_read_max_turn: usize,
    pub early_read_threshold: f64,
    pub hard_min_turn: usize,
    pub soft_min_turn: usize,
    pub elimination_floor: f64,
    pub pattern_min_turn: usize,
    pub auto_lock_share: f64,
    pub auto_lock_min_candidates: usize,
    pub entropy_floor: f64,
    pub viable_entropy: f64,
    pub popular_threshold: f64,
    pub popularity_split_bonus: f64,
    pub follow_up_boost: f64,
    pub topic_repeat_penalty: f64,
    pub topic_repeat_window: usize,
    pub usage_penalty: f64,
    pub opening_noise: f64,
    pub turn_noise: f64,
    pub cooldown_penalty: f64,
    pub prior_floor: f64,
    pub region_boost: f64,
    pub region_categories: BTreeMap<String, Vec<String>>,
    pub streak_boost: f64,
    pub streak_cap: u32,
    pub copilot: CopilotGate,
    pub tuning: TuningThresholds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut region_categories = BTreeMap::new();
        region_categories.insert(
            "IN".to_string(),
            vec!["cat_bollywood".to_string(), "cat_cricket".to_string()],
        );
        Self {
            weights: FusionWeights::default(),
            pattern_bonus_threshold: 0.95,
            pattern_bonus: 0.15,
            confidence_cap: 0.99,
            hard_threshold: 0.85,
            soft_threshold: 0.70,
            decisive_discount: 0.05,
            early_read_max_turn: 5,
            early_read_threshold: 0.75,
            hard_min_turn: 5,
            soft_min_turn: 8,
            elimination_floor: 0.15,
            pattern_min_turn: 3,
            auto_lock_share: 0.90,
            auto_lock_min_candidates: 2,
            entropy_floor: 0.15,
            viable_entropy: 0.05,
            popular_threshold: 0.7,
            popularity_split_bonus: 0.2,
            follow_up_boost: 1.3,
            topic_repeat_penalty: 0.7,
            topic_repeat_window: 5,
            usage_penalty: 0.15,
            opening_noise: 0.4,
            turn_noise: 0.05,
            cooldown_penalty: 10.0,
            prior_floor: 0.1,
            region_boost: 0.10,
            region_categories,
            streak_boost: 0.05,
            streak_cap: 3,
            copilot: CopilotGate::default(),
            tuning: TuningThresholds::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with `MINDORA_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_env_reader(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key reader. Unparseable or out-of-range values are ignored.
    pub fn with_env_reader<F>(mut self, mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut unit = |key: &str, slot: &mut f64| {
            if let Some(value) = parse_unit(read(key)) {
                *slot = value;
            }
        };
        unit("MINDORA_HARD_THRESHOLD", &mut self.hard_threshold);
        unit("MINDORA_SOFT_THRESHOLD", &mut self.soft_threshold);
        unit("MINDORA_EARLY_READ_THRESHOLD", &mut self.early_read_threshold);
        unit("MINDORA_ELIMINATION_FLOOR", &mut self.elimination_floor);
        unit("MINDORA_RULE_WEIGHT", &mut self.weights.rule);
        unit("MINDORA_SIMILARITY_WEIGHT", &mut self.weights.similarity);
        unit("MINDORA_FUZZY_WEIGHT", &mut self.weights.fuzzy);
        unit("MINDORA_PATTERN_WEIGHT", &mut self.weights.pattern);
        unit("MINDORA_ASSIST_WEIGHT", &mut self.weights.assist);

        if let Some(timeout) = read("MINDORA_COPILOT_TIMEOUT_MS")
            .and_then(|raw| raw.trim().parse::<u64>().ok())
            .filter(|ms| (1..=60_000).contains(ms))
        {
            self.copilot.timeout_ms = timeout;
        }
        if let Some(budget) = read("MINDORA_LATENCY_BUDGET_MS")
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|ms| ms.is_finite() && *ms > 0.0)
        {
            self.tuning.latency_budget_ms = budget;
        }
        self
    }

    /// Regional categories boosted at session start.
    pub fn boosted_categories(&self, region: &str) -> &[String] {
        self.region_categories
            .get(region)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn parse_unit(raw: Option<String>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && (0.0..=1.0).contains(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_weights_sum_to_one() {
        let w = FusionWeights::default();
        let total = w.rule + w.similarity + w.fuzzy + w.pattern + w.assist;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn env_reader_applies_valid_values_only() {
        let mut vars = HashMap::new();
        vars.insert("MINDORA_HARD_THRESHOLD", "0.9");
        vars.insert("MINDORA_SOFT_THRESHOLD", "1.7");
        vars.insert("MINDORA_ELIMINATION_FLOOR", "nan");
        vars.insert("MINDORA_COPILOT_TIMEOUT_MS", "1200");

        let config = EngineConfig::default()
            .with_env_reader(|key| vars.get(key).map(|value| value.to_string()));
        assert_eq!(config.hard_threshold, 0.9);
        assert_eq!(config.soft_threshold, 0.70);
        assert_eq!(config.elimination_floor, 0.15);
        assert_eq!(config.copilot.timeout_ms, 1_200);
    }

    #[test]
    fn later_overrides_win() {
        let health = WeightOverrides {
            pattern: Some(0.15),
            entropy_multiplier: Some(1.2),
            ..WeightOverrides::default()
        };
        let plateau = WeightOverrides {
            pattern: Some(0.05),
            ..WeightOverrides::default()
        };
        let merged = health.merge(plateau);
        assert_eq!(merged.pattern, Some(0.05));
        assert_eq!(merged.entropy_multiplier(), 1.2);
        assert_eq!(merged.novelty_multiplier(), 1.0);
    }

    #[test]
    fn copilot_gate_bounds() {
        let gate = CopilotGate::default();
        assert!(!gate.allows(2, 5));
        assert!(gate.allows(3, 2));
        assert!(gate.allows(3, 12));
        assert!(!gate.allows(3, 13));
        assert!(!gate.allows(3, 1));
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"hard_threshold":0.9,"weights":{"rule":0.4}}"#).unwrap();
        assert_eq!(config.hard_threshold, 0.9);
        assert_eq!(config.weights.rule, 0.4);
        assert_eq!(config.weights.fuzzy, 0.20);
        assert_eq!(config.boosted_categories("IN").len(), 2);
    }
}
