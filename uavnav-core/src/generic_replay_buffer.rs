//! Generic buffers for transitions of arbitrary observation/action types.
//!
//! Two buffers are provided:
//!
//! * [`SimpleReplayBuffer`]: a fixed-capacity ring buffer with uniform
//!   random sampling, used by the off-policy agents.
//! * [`RolloutBuffer`]: an ordered buffer drained as a whole, used by the
//!   on-policy agents.
//!
//! Both store [`GenericTransitionBatch`] items produced by
//! [`SimpleStepProcessor`].
mod base;
mod batch;
mod config;
mod rollout;
mod step_proc;

pub use base::SimpleReplayBuffer;
pub use batch::{BatchBase, GenericTransitionBatch};
pub use config::{RolloutBufferConfig, SimpleReplayBufferConfig};
pub use rollout::RolloutBuffer;
pub use step_proc::{SimpleStepProcessor, SimpleStepProcessorConfig};
