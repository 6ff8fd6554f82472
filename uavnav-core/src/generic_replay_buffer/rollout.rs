//! Ordered buffer for on-policy agents.
use super::{BatchBase, GenericTransitionBatch, RolloutBufferConfig};
use crate::{ExperienceBufferBase, ReplayBufferBase, TransitionBatch};
use anyhow::{ensure, Result};

/// An ordered buffer of transitions drained as a whole.
///
/// On-policy agents consume every collected transition exactly once, in
/// insertion order. [`ReplayBufferBase::batch`] returns the whole content
/// and clears the buffer; the `size` argument is ignored.
pub struct RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    items: Vec<GenericTransitionBatch<O, A>>,
}

impl<O, A> ExperienceBufferBase for RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Item = GenericTransitionBatch<O, A>;

    fn len(&self) -> usize {
        self.items.iter().map(|item| item.len()).sum()
    }

    fn push(&mut self, tr: Self::Item) -> Result<()> {
        self.items.push(tr);
        Ok(())
    }
}

impl<O, A> ReplayBufferBase for RolloutBuffer<O, A>
where
    O: BatchBase,
    A: BatchBase,
{
    type Config = RolloutBufferConfig;
    type Batch = GenericTransitionBatch<O, A>;

    fn build(_config: &Self::Config) -> Self {
        Self { items: Vec::new() }
    }

    /// Drains the buffer into a single batch in insertion order.
    fn batch(&mut self, _size: usize) -> Result<Self::Batch> {
        ensure!(!self.items.is_empty(), "Cannot drain an empty rollout buffer");

        let n = self.len();
        let mut batch: GenericTransitionBatch<O, A> = GenericTransitionBatch::with_capacity(n);
        let mut ix = 0;

        for item in self.items.drain(..) {
            let len = item.len();
            let (obs, act, next_obs, mut reward, mut is_terminated, mut is_truncated) =
                item.unpack();
            batch.obs.push(ix, obs);
            batch.act.push(ix, act);
            batch.next_obs.push(ix, next_obs);
            batch.reward.append(&mut reward);
            batch.is_terminated.append(&mut is_terminated);
            batch.is_truncated.append(&mut is_truncated);
            ix += len;
        }

        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug)]
    struct VecBatch(Vec<f32>);

    impl BatchBase for VecBatch {
        fn new(capacity: usize) -> Self {
            Self(vec![0.; capacity])
        }

        fn push(&mut self, ix: usize, data: Self) {
            for (j, v) in data.0.iter().enumerate() {
                self.0[ix + j] = *v;
            }
        }

        fn sample(&self, ixs: &Vec<usize>) -> Self {
            Self(ixs.iter().map(|ix| self.0[*ix]).collect())
        }
    }

    fn transition(v: f32) -> GenericTransitionBatch<VecBatch, VecBatch> {
        GenericTransitionBatch {
            obs: VecBatch(vec![v]),
            act: VecBatch(vec![v]),
            next_obs: VecBatch(vec![v + 1.]),
            reward: vec![v],
            is_terminated: vec![0],
            is_truncated: vec![0],
        }
    }

    #[test]
    fn drains_in_insertion_order() {
        let config = RolloutBufferConfig::default();
        let mut buffer = RolloutBuffer::<VecBatch, VecBatch>::build(&config);

        for i in 0..4 {
            buffer.push(transition(i as f32)).unwrap();
        }
        assert_eq!(buffer.len(), 4);

        let batch = buffer.batch(0).unwrap();
        assert_eq!(batch.reward, vec![0., 1., 2., 3.]);
        assert_eq!(batch.obs.0, vec![0., 1., 2., 3.]);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn drain_empty_fails() {
        let config = RolloutBufferConfig::default();
        let mut buffer = RolloutBuffer::<VecBatch, VecBatch>::build(&config);
        assert!(buffer.batch(0).is_err());
    }
}
