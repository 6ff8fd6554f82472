//! Configuration of [`Ddpg`](super::Ddpg).
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

/// Configuration of [`Ddpg`](super::Ddpg).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DdpgConfig<Q, P>
where
    P: OutDim,
{
    /// Configuration of the actor.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the critic.
    pub critic_config: CriticConfig<Q>,

    /// Discount factor.
    pub gamma: f64,

    /// Soft update coefficient.
    pub tau: f64,

    /// Standard deviation of the Gaussian exploration noise; `None`
    /// disables exploration noise.
    pub action_noise: Option<f64>,

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

    /// Compute device.
    pub device: Option<Device>,

    /// Random seed (reserved).
    pub seed: Option<i64>,
}

impl<Q, P> Default for DdpgConfig<Q, P>
where
    P: OutDim,
{
    fn default() -> Self {
        Self {
            actor_config: GaussianActorConfig::default(),
            critic_config: CriticConfig::default(),
            gamma: 0.99,
            tau: 0.005,
            action_noise: Some(0.1),
            n_updates_per_opt: 1,
            min_transitions_warmup: 1,
            batch_size: 1,
            train: false,
            critic_loss: CriticLoss::Mse,
            device: None,
            seed: None,
        }
    }
}

impl<Q, P> DdpgConfig<Q, P>
where
    Q: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the configuration of the critic.
    pub fn critic_config(mut self, v: CriticConfig<Q>) -> Self {
        self.critic_config = v;
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

    /// Sets the exploration noise.
    pub fn action_noise(mut self, v: Option<f64>) -> Self {
        self.action_noise = v;
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

    /// Constructs [`DdpgConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DdpgConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
