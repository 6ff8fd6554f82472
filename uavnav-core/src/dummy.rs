//! Minimal functional environment and agent, used by tests.
use crate::{
    record::{Record, RecordValue},
    Act, Agent, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase, Step,
    StepProcessor,
};
use anyhow::{ensure, Context, Result};
use std::path::{Path, PathBuf};

/// Observation of [`DummyEnv`]: the current step counter.
#[derive(Clone, Debug)]
pub struct DummyObs(pub f32);

impl Obs for DummyObs {
    fn dummy(_n: usize) -> Self {
        Self(0.0)
    }

    fn len(&self) -> usize {
        1
    }
}

/// Action on [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyAct(pub f32);

impl Act for DummyAct {
    fn len(&self) -> usize {
        1
    }
}

/// Info of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyInfo;

impl Info for DummyInfo {}

/// Configuration of [`DummyEnv`].
#[derive(Clone, Debug)]
pub struct DummyEnvConfig {
    /// Steps per episode.
    pub horizon: usize,
}

impl Default for DummyEnvConfig {
    fn default() -> Self {
        Self { horizon: 100 }
    }
}

/// A deterministic environment counting its own steps.
///
/// The episode terminates every `horizon` steps; the reward is always 1.
pub struct DummyEnv {
    horizon: usize,
    count: usize,
}

impl Env for DummyEnv {
    type Config = DummyEnvConfig;
    type Obs = DummyObs;
    type Act = DummyAct;
    type Info = DummyInfo;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        Ok(Self {
            horizon: config.horizon,
            count: 0,
        })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        self.count += 1;
        let is_terminated = (self.count % self.horizon == 0) as i8;
        let record = Record::from_slice(&[
            ("info", RecordValue::String("dummy".to_string())),
            ("info/steps", RecordValue::Scalar(self.count as f32)),
        ]);
        let step = Step::new(
            DummyObs(self.count as f32),
            a.clone(),
            vec![1.0],
            vec![is_terminated],
            vec![0],
            DummyInfo,
            None,
        );
        (step, record)
    }

    fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        self.count = 0;
        Ok(DummyObs(0.0))
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let (mut step, record) = self.step(a);
        if step.is_done() {
            self.count = 0;
            step.init_obs = Some(DummyObs(0.0));
        }
        (step, record)
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset(None)
    }
}

/// Transition type of [`DummyStepProcessor`].
pub struct DummyTransition;

/// Step processor producing [`DummyTransition`]s.
pub struct DummyStepProcessor;

impl StepProcessor<DummyEnv> for DummyStepProcessor {
    type Config = ();
    type Output = DummyTransition;

    fn build(_config: &Self::Config) -> Self {
        Self
    }

    fn reset(&mut self, _init_obs: DummyObs) {}

    fn process(&mut self, _step: Step<DummyEnv>) -> Self::Output {
        DummyTransition
    }
}

/// A buffer counting pushed transitions and sampled batches.
pub struct DummyReplayBuffer {
    size: usize,

    /// The number of batches sampled so far.
    pub n_batches: usize,
}

impl ExperienceBufferBase for DummyReplayBuffer {
    type Item = DummyTransition;

    fn push(&mut self, _tr: Self::Item) -> Result<()> {
        self.size += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.size
    }
}

impl ReplayBufferBase for DummyReplayBuffer {
    type Config = ();
    type Batch = ();

    fn build(_config: &Self::Config) -> Self {
        Self {
            size: 0,
            n_batches: 0,
        }
    }

    fn batch(&mut self, _size: usize) -> Result<Self::Batch> {
        ensure!(self.size > 0, "Empty buffer");
        self.n_batches += 1;
        Ok(())
    }
}

/// A deterministic agent doubling the observation.
pub struct DummyAgent {
    train: bool,
    n_opts: usize,
}

impl DummyAgent {
    /// Constructs the agent.
    pub fn new() -> Self {
        Self {
            train: true,
            n_opts: 0,
        }
    }
}

impl Default for DummyAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl Policy<DummyEnv> for DummyAgent {
    fn sample(&mut self, obs: &DummyObs) -> DummyAct {
        DummyAct(2.0 * obs.0)
    }
}

impl Agent<DummyEnv, DummyReplayBuffer> for DummyAgent {
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt(&mut self, buffer: &mut DummyReplayBuffer) -> Option<Record> {
        buffer.batch(1).ok()?;
        self.n_opts += 1;
        Some(Record::from_scalar("loss", 0.0))
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(path)?;
        let file = path.join("dummy.ckpt");
        std::fs::write(&file, format!("{}", self.n_opts))?;
        Ok(vec![file])
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        let file = path.join("dummy.ckpt");
        let content = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {:?}", &file))?;
        self.n_opts = content.trim().parse()?;
        Ok(())
    }
}
