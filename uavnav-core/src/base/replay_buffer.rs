//! Buffer interfaces for storing and sampling experiences.
use anyhow::Result;

/// Interface for buffers that store experiences from environments.
pub trait ExperienceBufferBase {
    /// Items stored in the buffer.
    type Item;

    /// Pushes an experience into the buffer.
    fn push(&mut self, tr: Self::Item) -> Result<()>;

    /// The current number of experiences in the buffer.
    fn len(&self) -> usize;

    /// Returns `true` if the buffer is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Interface for buffers that generate batches for training.
///
/// The semantics of [`ReplayBufferBase::batch`] depend on the buffer:
/// a replay buffer samples transitions at random, while a rollout buffer
/// drains its whole content in insertion order.
pub trait ReplayBufferBase {
    /// Configuration of the buffer.
    type Config: Clone;

    /// Batch generated for training.
    type Batch;

    /// Builds the buffer from a configuration.
    fn build(config: &Self::Config) -> Self;

    /// Constructs a batch of experiences for training.
    fn batch(&mut self, size: usize) -> Result<Self::Batch>;
}
