//! Configuration of [`Ppo`](super::Ppo).
use crate::{
    util::{actor::GaussianActorConfig, value::ValueModelConfig, OutDim},
    Device,
};
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Ppo`](super::Ppo).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct PpoConfig<V, P>
where
    P: OutDim,
{
    /// Configuration of the actor.
    pub actor_config: GaussianActorConfig<P>,

    /// Configuration of the value baseline.
    pub value_config: ValueModelConfig<V>,

    /// Discount factor.
    pub gamma: f64,

    /// GAE lambda.
    pub gae_lambda: f64,

    /// Clip range of the surrogate ratio.
    pub clip_range: f64,

    /// The number of epochs over each rollout.
    pub n_epochs: usize,

    /// Minibatch size.
    pub batch_size: usize,

    /// Entropy bonus coefficient.
    pub ent_coef: f64,

    /// Initially in the training mode.
    pub train: bool,

    /// Compute device.
    pub device: Option<Device>,

    /// Random seed of the minibatch shuffler.
    pub seed: Option<i64>,
}

impl<V, P> Default for PpoConfig<V, P>
where
    P: OutDim,
{
    fn default() -> Self {
        Self {
            actor_config: GaussianActorConfig::default(),
            value_config: ValueModelConfig::default(),
            gamma: 0.99,
            gae_lambda: 0.95,
            clip_range: 0.2,
            n_epochs: 4,
            batch_size: 64,
            ent_coef: 0.0,
            train: false,
            device: None,
            seed: None,
        }
    }
}

impl<V, P> PpoConfig<V, P>
where
    V: DeserializeOwned + Serialize,
    P: DeserializeOwned + Serialize + OutDim,
{
    /// Sets the configuration of the actor.
    pub fn actor_config(mut self, v: GaussianActorConfig<P>) -> Self {
        self.actor_config = v;
        self
    }

    /// Sets the configuration of the value baseline.
    pub fn value_config(mut self, v: ValueModelConfig<V>) -> Self {
        self.value_config = v;
        self
    }

    /// Sets the discount factor.
    pub fn gamma(mut self, v: f64) -> Self {
        self.gamma = v;
        self
    }

    /// Sets the GAE lambda.
    pub fn gae_lambda(mut self, v: f64) -> Self {
        self.gae_lambda = v;
        self
    }

    /// Sets the clip range of the surrogate ratio.
    pub fn clip_range(mut self, v: f64) -> Self {
        self.clip_range = v;
        self
    }

    /// Sets the number of epochs over each rollout.
    pub fn n_epochs(mut self, v: usize) -> Self {
        self.n_epochs = v;
        self
    }

    /// Sets the minibatch size.
    pub fn batch_size(mut self, v: usize) -> Self {
        self.batch_size = v;
        self
    }

    /// Sets the entropy bonus coefficient.
    pub fn ent_coef(mut self, v: f64) -> Self {
        self.ent_coef = v;
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

    /// Constructs [`PpoConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`PpoConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
