//! Transition batch.

/// A batch of transitions `(o_t, a_t, o_t+1, r_t, terminated, truncated)`.
pub trait TransitionBatch {
    /// A set of observations.
    type ObsBatch;

    /// A set of actions.
    type ActBatch;

    /// Decomposes the batch into observations, actions, next observations,
    /// rewards, termination flags and truncation flags.
    fn unpack(
        self,
    ) -> (
        Self::ObsBatch,
        Self::ActBatch,
        Self::ObsBatch,
        Vec<f32>,
        Vec<i8>,
        Vec<i8>,
    );

    /// The number of transitions in the batch.
    fn len(&self) -> usize;

    /// Returns `true` if the batch is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a reference to the observations.
    fn obs(&self) -> &Self::ObsBatch;

    /// Returns a reference to the actions.
    fn act(&self) -> &Self::ActBatch;
}
