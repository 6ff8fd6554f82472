//! The hyperparameter record.
use serde::{Deserialize, Serialize};

/// Hyperparameters of a run.
///
/// A flat record with one field per recognized option. It is passed by
/// value into agent construction and snapshotted into the tracker run
/// config during evaluation. Not every algorithm consumes every field;
/// unused fields are still logged for provenance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HyperParams {
    /// Learning rate of all optimizers.
    pub learning_rate: f64,

    /// Capacity of the replay buffer.
    pub buffer_size: usize,

    /// Environment steps before the first optimization.
    pub learning_starts: usize,

    /// Batch size of optimization steps.
    pub batch_size: usize,

    /// Soft update coefficient of target networks.
    pub tau: f64,

    /// Discount factor.
    pub gamma: f64,

    /// Interval of optimization steps in environment steps.
    pub train_freq: usize,

    /// Gradient updates per optimization step; non-positive values mean
    /// one update.
    pub gradient_steps: i64,

    /// Standard deviation of the exploration noise, for the
    /// deterministic-actor algorithms.
    pub action_noise: Option<f64>,

    /// Extra policy-network options; unused by the built-in policies.
    pub policy_kwargs: Option<serde_json::Value>,

    /// Verbosity of the underlying algorithm.
    pub verbose: usize,

    /// Random seed.
    pub seed: Option<i64>,

    /// Build the model at construction time.
    pub init_model: bool,
}

impl Default for HyperParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.0003,
            buffer_size: 200_000,
            learning_starts: 100,
            batch_size: 256,
            tau: 0.005,
            gamma: 0.99,
            train_freq: 1,
            gradient_steps: -1,
            action_noise: None,
            policy_kwargs: None,
            verbose: 0,
            seed: None,
            init_model: true,
        }
    }
}

impl HyperParams {
    /// Gradient updates per optimization step, with the non-positive
    /// sentinel mapped to one update.
    pub fn n_updates_per_opt(&self) -> usize {
        if self.gradient_steps > 0 {
            self.gradient_steps as usize
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_gradient_steps_mean_one_update() {
        let mut hp = HyperParams::default();
        assert_eq!(hp.n_updates_per_opt(), 1);
        hp.gradient_steps = 4;
        assert_eq!(hp.n_updates_per_opt(), 4);
    }

    #[test]
    fn record_is_flat_when_serialized() {
        let hp = HyperParams::default();
        let value = serde_json::to_value(&hp).unwrap();
        let map = value.as_object().unwrap();
        assert!(map.contains_key("learning_rate"));
        assert!(map.contains_key("init_model"));
        assert_eq!(map["buffer_size"], 200_000);
    }
}
