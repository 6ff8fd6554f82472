//! Value function over observations.
use crate::{
    model::SubModel1,
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::{Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`ValueModel`].
pub struct ValueModelConfig<V> {
    /// Configuration of the value network.
    pub v_config: Option<V>,

    /// Configuration of the optimizer.
    pub opt_config: OptimizerConfig,
}

impl<V> Default for ValueModelConfig<V> {
    fn default() -> Self {
        Self {
            v_config: None,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl<V> ValueModelConfig<V>
where
    V: DeserializeOwned + Serialize,
{
    /// Sets the configuration of the value network.
    pub fn v_config(mut self, v: V) -> Self {
        self.v_config = Some(v);
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`ValueModelConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`ValueModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// State-value function used as the baseline of the on-policy agents.
pub struct ValueModel<V>
where
    V: SubModel1<Output = Tensor>,
    V::Config: DeserializeOwned + Serialize + Clone,
{
    device: Device,
    varmap: VarMap,

    v: V,
    v_config: V::Config,

    opt_config: OptimizerConfig,
    opt: Optimizer,
}

impl<V> ValueModel<V>
where
    V: SubModel1<Output = Tensor>,
    V::Config: DeserializeOwned + Serialize + Clone,
{
    /// Constructs [`ValueModel`].
    pub fn build(config: ValueModelConfig<V::Config>, device: Device) -> Result<Self> {
        let v_config = config.v_config.context("v_config is not set.")?;
        let opt_config = config.opt_config;
        let varmap = VarMap::new();
        let v = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            V::build(vb, v_config.clone())
        };
        let opt = opt_config.build(varmap.all_vars()).unwrap();

        Ok(Self {
            device,
            opt_config,
            varmap,
            opt,
            v,
            v_config,
        })
    }

    /// Outputs the state value given observations.
    pub fn forward(&self, obs: &V::Input) -> Tensor {
        self.v.forward(obs)
    }

    /// Runs a backward pass and applies an optimization step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Returns the variables of the value function.
    pub fn get_varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters of the value function.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save value function to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters of the value function.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load value function from {:?}", path.as_ref());
        Ok(())
    }
}
