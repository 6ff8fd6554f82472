//! Experience sampling.
use crate::{record::Record, Agent, Env, ExperienceBufferBase, ReplayBufferBase, StepProcessor};
use anyhow::Result;

/// Samples experiences from an environment and pushes them to a buffer.
///
/// The sampler owns the environment and the step processor, resets the
/// environment lazily on the first sample, and keeps the previous
/// observation between calls.
pub struct Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    env: E,
    prev_obs: Option<E::Obs>,
    step_processor: P,
}

impl<E, P> Sampler<E, P>
where
    E: Env,
    P: StepProcessor<E>,
{
    /// Creates a sampler from an environment and a step processor.
    pub fn new(env: E, step_processor: P) -> Self {
        Self {
            env,
            prev_obs: None,
            step_processor,
        }
    }

    /// Samples one experience and pushes it to the buffer.
    ///
    /// Returns the diagnostic record emitted by the environment step.
    pub fn sample_and_push<R>(
        &mut self,
        agent: &mut Box<dyn Agent<E, R>>,
        buffer: &mut R,
    ) -> Result<Record>
    where
        R: ExperienceBufferBase<Item = P::Output> + ReplayBufferBase,
    {
        // Reset the environment if required
        if self.prev_obs.is_none() {
            self.prev_obs = Some(self.env.reset(None)?);
            self.step_processor
                .reset(self.prev_obs.as_ref().unwrap().clone());
        }

        // Sample an action and apply it to the environment
        let (step, record, is_done) = {
            let act = agent.sample(self.prev_obs.as_ref().unwrap());
            let (step, record) = self.env.step_with_reset(&act);
            let is_done = step.is_done();
            (step, record, is_done)
        };

        // Update the previous observation
        self.prev_obs = match is_done {
            true => Some(
                step.init_obs
                    .clone()
                    .expect("Terminal step must carry init_obs"),
            ),
            false => Some(step.obs.clone()),
        };

        // Produce and push the transition
        let transition = self.step_processor.process(step);
        buffer.push(transition)?;

        if is_done {
            self.step_processor
                .reset(self.prev_obs.as_ref().unwrap().clone());
        }

        Ok(record)
    }
}
