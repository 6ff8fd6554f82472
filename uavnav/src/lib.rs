#![warn(missing_docs)]
//! Driver crate: algorithm selection, hyperparameters and the artifact
//! store shared by the train and predict paths of the binary.
pub mod artifact;
pub mod hyper;

use clap::ValueEnum;

/// The number of episodes a training run covers; the total environment
/// step budget is `steps_per_ep * NUM_EPISODES`.
pub const NUM_EPISODES: usize = 600;

/// Total environment step budget of a training run.
pub fn total_timesteps(steps_per_ep: usize) -> usize {
    steps_per_ep * NUM_EPISODES
}

/// The algorithms the driver can train and evaluate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Algo {
    /// Deep Q-network (discrete actions).
    Dqn,

    /// Advantage actor-critic.
    A2c,

    /// Proximal policy optimization.
    Ppo,

    /// Deep deterministic policy gradient.
    Ddpg,

    /// Soft actor-critic.
    Sac,

    /// Twin delayed DDPG.
    Td3,
}

impl Algo {
    /// Canonical lowercase name, used for artifact prefixes and log
    /// directories.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dqn => "dqn",
            Self::A2c => "a2c",
            Self::Ppo => "ppo",
            Self::Ddpg => "ddpg",
            Self::Sac => "sac",
            Self::Td3 => "td3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_budget_is_episodes_times_steps() {
        assert_eq!(total_timesteps(50), 30_000);
        assert_eq!(total_timesteps(5), 3_000);
    }

    #[test]
    fn every_algorithm_has_a_name() {
        let names: Vec<_> = [Algo::Dqn, Algo::A2c, Algo::Ppo, Algo::Ddpg, Algo::Sac, Algo::Td3]
            .iter()
            .map(|a| a.name())
            .collect();
        assert_eq!(names, vec!["dqn", "a2c", "ppo", "ddpg", "sac", "td3"]);
    }
}
