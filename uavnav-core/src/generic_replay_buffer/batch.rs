//! Generic transition batches.
use crate::TransitionBatch;

/// Basic operations on batches of observations or actions.
///
/// A `BatchBase` acts both as the storage inside a buffer (with
/// `capacity` slots, written with [`BatchBase::push`]) and as the batch
/// handed to the agent (created with [`BatchBase::sample`]).
pub trait BatchBase {
    /// Creates a new batch with the given capacity.
    fn new(capacity: usize) -> Self;

    /// Adds the data at the given index. Writing past the capacity wraps
    /// around to the beginning.
    fn push(&mut self, ix: usize, data: Self);

    /// Retrieves the samples at the given indices.
    fn sample(&self, ixs: &Vec<usize>) -> Self;
}

/// A generic transition batch `(o_t, a_t, o_t+1, r_t, flags)`.
pub struct GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Observations.
    pub obs: O,

    /// Actions.
    pub act: A,

    /// Next observations.
    pub next_obs: O,

    /// Rewards.
    pub reward: Vec<f32>,

    /// Episode termination flags.
    pub is_terminated: Vec<i8>,

    /// Episode truncation flags.
    pub is_truncated: Vec<i8>,
}

impl<O, A> TransitionBatch for GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type ObsBatch = O;
    type ActBatch = A;

    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
    ) {
        (
            self.obs,
            self.act,
            self.next_obs,
            self.reward,
            self.is_terminated,
            self.is_truncated,
        )
    }

    fn len(&self) -> usize {
        self.reward.len()
    }

    fn obs(&self) -> &Self::ObsBatch {
        &self.obs
    }

    fn act(&self) -> &Self::ActBatch {
        &self.act
    }
}

impl<O, A> GenericTransitionBatch<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    /// Creates a new batch with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            obs: O::new(capacity),
            act: A::new(capacity),
            next_obs: O::new(capacity),
            reward: Vec::with_capacity(capacity),
            is_terminated: Vec::with_capacity(capacity),
            is_truncated: Vec::with_capacity(capacity),
        }
    }
}
