use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// FSRS-5 default weight vector (w0..w18).
pub const DEFAULT_WEIGHTS: [f64; 19] = [
    0.40255, 1.18385, 3.173, 15.69105, 7.1949, 0.5345, 1.4604, 0.0046, 1.54575, 0.1192, 1.01925,
    1.9395, 0.11, 0.29605, 2.2698, 0.2315, 2.9898, 0.51655, 0.6621,
];

pub const DEFAULT_DESIRED_RETENTION: f64 = 0.90;
pub const DEFAULT_MAXIMUM_INTERVAL_DAYS: u32 = 36500;

/// Per-user scheduling parameters.
///
/// The weight vector is stored as a named parameter bag ("w0".."w18") rather
/// than positional fields so the algorithm can be revised without a breaking
/// change to persisted configs; absent keys fall back to DEFAULT_WEIGHTS.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FsrsConfig {
    pub weights: BTreeMap<String, f64>,
    pub learning_steps_minutes: Vec<i64>,
    pub relearning_steps_minutes: Vec<i64>,
    pub graduating_interval_days: u32,
    pub easy_interval_days: u32,
    pub minimum_interval_days: u32,
    pub maximum_interval_days: u32,
    pub lapse_multiplier: f64,
    pub desired_retention: f64,
    /// Per-user cap overrides; None defers to the tier default.
    pub daily_new_limit: Option<u32>,
    pub daily_review_limit: Option<u32>,
}

impl Default for FsrsConfig {
    fn default() -> Self {
        let weights = DEFAULT_WEIGHTS
            .iter()
            .enumerate()
            .map(|(i, w)| (format!("w{i}"), *w))
            .collect();
        Self {
            weights,
            learning_steps_minutes: vec![1, 10],
            relearning_steps_minutes: vec![10],
            graduating_interval_days: 1,
            easy_interval_days: 4,
            minimum_interval_days: 1,
            maximum_interval_days: DEFAULT_MAXIMUM_INTERVAL_DAYS,
            lapse_multiplier: 0.5,
            desired_retention: DEFAULT_DESIRED_RETENTION,
            daily_new_limit: None,
            daily_review_limit: None,
        }
    }
}

impl FsrsConfig {
    pub fn weight(&self, index: usize) -> f64 {
        self.weights
            .get(&format!("w{index}"))
            .copied()
            .unwrap_or_else(|| DEFAULT_WEIGHTS.get(index).copied().unwrap_or(0.0))
    }

    pub fn first_learning_step_minutes(&self) -> i64 {
        self.learning_steps_minutes.first().copied().unwrap_or(1)
    }

    pub fn first_relearning_step_minutes(&self) -> i64 {
        self.relearning_steps_minutes.first().copied().unwrap_or(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_all_weights() {
        let cfg = FsrsConfig::default();
        assert_eq!(cfg.weights.len(), 19);
        for i in 0..19 {
            assert_eq!(cfg.weight(i), DEFAULT_WEIGHTS[i]);
        }
    }

    #[test]
    fn missing_weight_falls_back_to_default() {
        let mut cfg = FsrsConfig::default();
        cfg.weights.remove("w8");
        assert_eq!(cfg.weight(8), DEFAULT_WEIGHTS[8]);
    }
}
