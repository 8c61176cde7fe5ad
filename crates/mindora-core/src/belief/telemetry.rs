use crate::model::ScoreMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeliefMetrics {
    pub candidate_count: usize,
    /// Shannon entropy of the posterior, in bits.
    pub entropy_bits: f64,
    pub leader_mass: f64,
}

impl BeliefMetrics {
    pub fn from_posterior(posterior: &ScoreMap) -> Self {
        let total: f64 = posterior.values().sum();
        let mut entropy_bits = 0.0;
        let mut leader_mass: f64 = 0.0;
        if total > 0.0 {
            for mass in posterior.values() {
                let p = mass / total;
                if p > 0.0 {
                    entropy_bits -= p * p.log2();
                }
                leader_mass = leader_mass.max(p);
            }
        }

        Self {
            candidate_count: posterior.len(),
            entropy_bits,
            leader_mass,
        }
    }
}
