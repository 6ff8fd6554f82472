//! Configuration of [`Trainer`](super::Trainer).
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration of [`Trainer`](super::Trainer).
///
/// All intervals are counted in environment steps, matching the step
/// budget handed to the trainer by the command line
/// (`steps_per_ep × episode count`).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct TrainerConfig {
    /// The total number of environment steps.
    pub max_steps: usize,

    /// Interval of optimization steps in environment steps.
    pub opt_interval: usize,

    /// Warmup period before the first optimization, in environment steps.
    pub warmup_period: usize,

    /// Interval of flushing records, in environment steps.
    pub flush_record_interval: usize,

    /// Interval of recording computational cost, in environment steps.
    pub record_compute_cost_interval: usize,

    /// Interval of writing checkpoints, in environment steps.
    /// `None` disables periodic checkpointing.
    pub checkpoint_interval: Option<usize>,

    /// Directory receiving checkpoint bundles.
    pub checkpoint_dir: Option<String>,

    /// Filename prefix of checkpoint bundles.
    pub checkpoint_prefix: Option<String>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            max_steps: 0,
            opt_interval: 1,
            warmup_period: 0,
            flush_record_interval: usize::MAX,
            record_compute_cost_interval: usize::MAX,
            checkpoint_interval: None,
            checkpoint_dir: None,
            checkpoint_prefix: None,
        }
    }
}

impl TrainerConfig {
    /// Sets the total number of environment steps.
    pub fn max_steps(mut self, v: usize) -> Self {
        self.max_steps = v;
        self
    }

    /// Sets the interval of optimization in environment steps.
    pub fn opt_interval(mut self, v: usize) -> Self {
        self.opt_interval = v;
        self
    }

    /// Sets the warmup period in environment steps.
    pub fn warmup_period(mut self, v: usize) -> Self {
        self.warmup_period = v;
        self
    }

    /// Sets the interval of flushing records in environment steps.
    pub fn flush_record_interval(mut self, v: usize) -> Self {
        self.flush_record_interval = v;
        self
    }

    /// Sets the interval of recording computational cost.
    pub fn record_compute_cost_interval(mut self, v: usize) -> Self {
        self.record_compute_cost_interval = v;
        self
    }

    /// Enables periodic checkpointing every `interval` environment steps.
    ///
    /// Checkpoint bundles are saved as `dir/prefix_<steps>_steps`.
    pub fn checkpointing(
        mut self,
        interval: usize,
        dir: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        self.checkpoint_interval = Some(interval);
        self.checkpoint_dir = Some(dir.into());
        self.checkpoint_prefix = Some(prefix.into());
        self
    }

    /// Constructs [`TrainerConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`TrainerConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn roundtrip_yaml() -> Result<()> {
        let config = TrainerConfig::default()
            .max_steps(30_000)
            .opt_interval(1)
            .warmup_period(100)
            .checkpointing(1000, "model/ddpg", "ddpg");

        let dir = TempDir::new("trainer_config")?;
        let path = dir.path().join("trainer.yaml");
        config.save(&path)?;
        let config_ = TrainerConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }
}
