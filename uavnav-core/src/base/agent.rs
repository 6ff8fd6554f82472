//! Agent.
use super::{Env, Policy, ReplayBufferBase};
use crate::record::Record;
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Represents a trainable policy on an environment.
///
/// In training mode, [`Policy::sample`] is expected to explore; in
/// evaluation mode, action selection must be deterministic.
pub trait Agent<E: Env, R: ReplayBufferBase>: Policy<E> {
    /// Sets the policy to training mode.
    fn train(&mut self);

    /// Sets the policy to evaluation mode.
    fn eval(&mut self);

    /// Returns `true` if it is in training mode.
    fn is_train(&self) -> bool;

    /// Performs an optimization step.
    ///
    /// `buffer` is the buffer from which transitions are taken for
    /// updating model parameters. Returns `None` when the step was
    /// skipped, for example during the warmup period of a replay buffer.
    fn opt(&mut self, buffer: &mut R) -> Option<Record>;

    /// Saves the parameters of the agent in the given directory.
    ///
    /// This method commonly creates a number of files in the directory,
    /// one per sub-model (e.g. a Q-network and its target network).
    /// Returns the paths of the created files.
    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Loads the parameters of the agent from the given directory.
    fn load_params(&mut self, path: &Path) -> Result<()>;
}
