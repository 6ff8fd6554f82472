//! Configuration of [`Sac`](super::Sac).
use super::ent_coef::EntCoefMode;
use crate::{
    util::{actor::GaussianActorConfig, critic::CriticConfig, CriticLoss, OutDim},
    Device,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Sac`](super::Sac).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct SacConfig<Q, P>
where
    P: OutDim,
{
    /// Configuration of the actor.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the critics.
    pub critic_config: CriticConfig<Q>,

    /// The number of critics.
    pub n_critics: usize,

    /// Discount factor.
    pub gamma: f64,

    /// Soft update coefficient.
    pub tau: f64,

    /// Entropy coefficient mode.
    pub ent_coef_mode: EntCoefMode,

    /// Numerical stability constant of the tanh correction.
    pub epsilon: f64,

    /// The number of gradient updates per optimization step.
    pub n_updates_per_opt: usize,

    /// The minimum number of transitions in the buffer before updates.
    pub min_transitions_warmup: usize,

    /// Batch size.
    pub batch_size: usize,

    /// Initially in the training mode.
    pub train: bool,

    /// Critic loss function.
    pub critic_loss: CriticLoss,

    /// Reward scale.
    pub reward_scale: f32,

    /// Compute device.
    pub device: Option<Device>,

    /// Random seed (reserved; candle has no global seed control here).
    pub seed: Option<i64>,
}

impl<Q, P> Default for SacConfig<Q, P>
where
    P: OutDim,
{
    fn default() -> Self {
        Self {
            actor_config: GaussianActorConfig::default(),
            critic_config: CriticConfig::default(),
            n_critics: 2,
            gamma: 0.99,
            tau: 0.005,
            ent_coef_mode: EntCoefMode::Fix(1.0),
            epsilon: 1e-4,
            n_updates_per_opt: 1,
            min_transitions_warmup: 1,
            batch_size: 1,
            train: false,
            critic_loss: CriticLoss::Mse,
            reward_scale: 1.0,
            device: None,
            seed: None,
        }
    }
}

impl<Q, P> SacConfig<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the configuration of the critics.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
        self
    }

    /// Sets the number of critics.
    pub fn n_critics(mut self, v: usize) -> Self {
        self.n_critics = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the soft update coefficient.
    pub fn tau(mut self, v: f64) -> Self {
        self.tau = v;
        self
    }

    /// Sets the entropy coefficient mode.
    pub fn ent_coef_mode(mut self, v: EntCoefMode) -> Self {
        self.ent_coef_mode = v;
        self
    }

    /// Sets the number of gradient updates per optimization step.
    pub fn n_updates_per_opt(mut self, v: usize) -> Self {
        self.n_updates_per_opt = v;
        self
    }

    /// Sets the warmup size of the replay buffer.
    pub fn min_transitions_warmup(mut self, v: usize) -> Self {
        self.min_transitions_warmup = v;
        self
    }

    /// Sets the batch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the critic loss function.
    pub fn critic_loss(mut self, v: CriticLoss) -> Self {
        self.critic_loss = v;
        self
    }

    /// Sets the reward scale.
    pub fn reward_scale(mut self, v: f32) -> Self {
        self.reward_scale = v;
        self
    }

    /// Sets the compute device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = Some(v);
        self
    }

    /// Sets the random seed.
    pub fn seed(mut self, v: i64) -> Self {
        self.seed = Some(v);
        self
    }

    /// Constructs [`SacConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`SacConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
