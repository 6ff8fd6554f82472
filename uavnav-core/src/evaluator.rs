//! Evaluate [`Agent`].
use crate::{record::Record, record::Recorder, Agent, Env, ReplayBufferBase};
use anyhow::Result;
mod step_evaluator;
pub use step_evaluator::StepEvaluator;

/// Evaluate [`Agent`].
pub trait Evaluator<E: Env> {
    /// Evaluates an agent, writing one record per step to the recorder.
    ///
    /// The caller is responsible for the internal state of `agent`, in
    /// particular for switching it to evaluation mode beforehand so that
    /// action selection is deterministic.
    fn evaluate<R>(
        &mut self,
        agent: &mut Box<dyn Agent<E, R>>,
        recorder: &mut dyn Recorder,
    ) -> Result<Record>
    where
        R: ReplayBufferBase;
}
