//! Train [`Agent`].
mod config;
mod sampler;
use std::{
    path::PathBuf,
    time::{Duration, SystemTime},
};

use crate::{
    record::{Record, RecordValue::Scalar, Recorder},
    Agent, Env, ExperienceBufferBase, ReplayBufferBase, StepProcessor,
};
use anyhow::Result;
pub use config::TrainerConfig;
use log::info;
pub use sampler::Sampler;

#[cfg_attr(doc, aquamarine::aquamarine)]
/// Manages the training loop and its participants.
///
/// # Training loop
///
/// 0. Given an agent implementing [`Agent`] and a recorder implementing
///    [`Recorder`](crate::record::Recorder).
/// 1. Build the environment, the [`StepProcessor`] and a [`Sampler`];
///    reset the environment-step counter `env_steps = 0` and the
///    optimization-step counter `opt_steps = 0`.
/// 2. Do an environment step and push the transition into the buffer,
///    `env_steps += 1`.
/// 3. If checkpointing is enabled and `env_steps` is a multiple of the
///    checkpoint interval, save a checkpoint bundle to
///    `(checkpoint_dir)/(prefix)_(env_steps)_steps`.
/// 4. Past the warmup period, every `opt_interval` environment steps, do
///    an optimization step for the agent with batches taken from the
///    buffer (the agent may still skip it, e.g. while its replay warmup
///    is unsatisfied).
/// 5. Every `flush_record_interval` environment steps, flush aggregated
///    records to the recorder.
/// 6. Stop when `env_steps == max_steps`; otherwise go back to 2.
///
/// # Interaction of objects
///
/// ```mermaid
/// graph LR
///     A[Agent]-->|Env::Act|B[Env]
///     B -->|Env::Obs|A
///     B -->|"Step&lt;E: Env&gt;"|C[StepProcessor]
///     C -->|Item|D[Buffer]
///     D -->|Batch|A
/// ```
pub struct Trainer {
    /// The total number of environment steps.
    max_steps: usize,

    /// Interval of optimization in environment steps.
    opt_interval: usize,

    /// Warmup period, in environment steps.
    warmup_period: usize,

    /// Interval of flushing records in environment steps.
    flush_record_interval: usize,

    /// Interval of recording computational cost in environment steps.
    record_compute_cost_interval: usize,

    /// Interval of writing checkpoints in environment steps.
    checkpoint_interval: Option<usize>,

    /// Directory receiving checkpoint bundles.
    checkpoint_dir: Option<String>,

    /// Filename prefix of checkpoint bundles.
    checkpoint_prefix: Option<String>,

    /// Optimization steps since the computational cost was last recorded.
    opt_steps_for_ops: usize,

    /// Accumulated optimization time since the last cost record.
    timer_for_ops: Duration,
}

impl Trainer {
    /// Constructs a trainer.
    pub fn build(config: TrainerConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            opt_interval: config.opt_interval,
            warmup_period: config.warmup_period,
            flush_record_interval: config.flush_record_interval,
            record_compute_cost_interval: config.record_compute_cost_interval,
            checkpoint_interval: config.checkpoint_interval,
            checkpoint_dir: config.checkpoint_dir,
            checkpoint_prefix: config.checkpoint_prefix,
            opt_steps_for_ops: 0,
            timer_for_ops: Duration::new(0, 0),
        }
    }

    /// Returns optimization steps per second, then resets the counters.
    fn opt_steps_per_sec(&mut self) -> f32 {
        let osps = 1000. * self.opt_steps_for_ops as f32 / (self.timer_for_ops.as_millis() as f32);
        self.opt_steps_for_ops = 0;
        self.timer_for_ops = Duration::new(0, 0);
        osps
    }

    fn checkpoint_path(&self, env_steps: usize) -> PathBuf {
        let dir = self.checkpoint_dir.as_deref().unwrap_or("model");
        let prefix = self.checkpoint_prefix.as_deref().unwrap_or("agent");
        PathBuf::from(dir).join(format!("{}_{}_steps", prefix, env_steps))
    }

    fn save_checkpoint<E, R>(&self, agent: &Box<dyn Agent<E, R>>, env_steps: usize)
    where
        E: Env,
        R: ReplayBufferBase,
    {
        let path = self.checkpoint_path(env_steps);
        match agent.save_params(&path) {
            Ok(_) => info!("Saved checkpoint in {:?}", &path),
            Err(e) => info!("Failed to save checkpoint in {:?}: {}", &path, e),
        }
    }

    /// Performs a training step: one environment step, then possibly one
    /// optimization step. The second return value tells whether an
    /// optimization step was done.
    pub fn train_step<E, P, R>(
        &mut self,
        agent: &mut Box<dyn Agent<E, R>>,
        buffer: &mut R,
        sampler: &mut Sampler<E, P>,
        env_steps: usize,
    ) -> Result<(Record, bool)>
    where
        E: Env,
        P: StepProcessor<E>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        let record = sampler.sample_and_push(agent, buffer)?;

        if env_steps < self.warmup_period || env_steps % self.opt_interval != 0 {
            return Ok((record, false));
        }

        let timer = SystemTime::now();
        let record_agent = agent.opt(buffer);
        self.timer_for_ops += timer.elapsed()?;

        match record_agent {
            None => Ok((record, false)),
            Some(record_agent) => {
                self.opt_steps_for_ops += 1;
                Ok((record.merge(record_agent), true))
            }
        }
    }

    /// Trains the agent for the configured number of environment steps.
    ///
    /// Any error from the environment or the buffer propagates to the
    /// caller and ends the run; checkpoints written so far are left on
    /// disk.
    pub fn train<E, P, R>(
        &mut self,
        env: E,
        step_proc: P,
        agent: &mut Box<dyn Agent<E, R>>,
        buffer: &mut R,
        recorder: &mut Box<dyn Recorder>,
    ) -> Result<()>
    where
        E: Env,
        P: StepProcessor<E>,
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        let mut sampler = Sampler::new(env, step_proc);
        let mut env_steps: usize = 0;
        let mut opt_steps: usize = 0;
        agent.train();

        loop {
            env_steps += 1;
            let (mut record, is_opt) = self.train_step(agent, buffer, &mut sampler, env_steps)?;

            if let Some(interval) = self.checkpoint_interval {
                if env_steps % interval == 0 {
                    self.save_checkpoint(agent, env_steps);
                }
            }

            if is_opt {
                opt_steps += 1;
                if env_steps % self.record_compute_cost_interval == 0 {
                    record.insert("opt_steps_per_sec", Scalar(self.opt_steps_per_sec()));
                }
            }

            if !record.is_empty() {
                recorder.store(record);
            }

            if env_steps % self.flush_record_interval == 0 {
                recorder.flush(opt_steps as _);
            }

            if env_steps == self.max_steps {
                break;
            }
        }

        info!(
            "Finished training: {} env steps, {} opt steps",
            env_steps, opt_steps
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dummy::{DummyAgent, DummyEnv, DummyEnvConfig, DummyReplayBuffer, DummyStepProcessor},
        record::NullRecorder,
    };
    use tempdir::TempDir;

    fn new_agent() -> Box<dyn Agent<DummyEnv, DummyReplayBuffer>> {
        Box::new(DummyAgent::new())
    }

    #[test]
    fn runs_for_the_exact_step_budget() -> Result<()> {
        let mut trainer = Trainer::build(TrainerConfig::default().max_steps(25));
        let env = DummyEnv::build(&DummyEnvConfig::default(), 0)?;
        let mut agent = new_agent();
        let mut buffer = DummyReplayBuffer::build(&());
        let mut recorder: Box<dyn Recorder> = Box::new(NullRecorder);

        trainer.train(
            env,
            DummyStepProcessor::build(&()),
            &mut agent,
            &mut buffer,
            &mut recorder,
        )?;

        assert_eq!(buffer.len(), 25);
        Ok(())
    }

    #[test]
    fn warmup_skips_optimization() -> Result<()> {
        let mut trainer = Trainer::build(
            TrainerConfig::default()
                .max_steps(10)
                .warmup_period(5)
                .opt_interval(1),
        );
        let env = DummyEnv::build(&DummyEnvConfig::default(), 0)?;
        let mut agent = new_agent();
        let mut buffer = DummyReplayBuffer::build(&());
        let mut recorder: Box<dyn Recorder> = Box::new(NullRecorder);

        trainer.train(
            env,
            DummyStepProcessor::build(&()),
            &mut agent,
            &mut buffer,
            &mut recorder,
        )?;

        // Steps 5..=10 trigger optimization; 1..=4 are warmup.
        assert_eq!(buffer.n_batches, 6);
        Ok(())
    }

    #[test]
    fn writes_periodic_checkpoints() -> Result<()> {
        let dir = TempDir::new("trainer_ckpt")?;
        let ckpt_dir = dir.path().join("ddpg");
        let mut trainer = Trainer::build(
            TrainerConfig::default()
                .max_steps(10)
                .checkpointing(4, ckpt_dir.to_str().unwrap(), "ddpg"),
        );
        let env = DummyEnv::build(&DummyEnvConfig::default(), 0)?;
        let mut agent = new_agent();
        let mut buffer = DummyReplayBuffer::build(&());
        let mut recorder: Box<dyn Recorder> = Box::new(NullRecorder);

        trainer.train(
            env,
            DummyStepProcessor::build(&()),
            &mut agent,
            &mut buffer,
            &mut recorder,
        )?;

        assert!(ckpt_dir.join("ddpg_4_steps").join("dummy.ckpt").exists());
        assert!(ckpt_dir.join("ddpg_8_steps").join("dummy.ckpt").exists());
        assert!(!ckpt_dir.join("ddpg_12_steps").exists());
        Ok(())
    }
}
