#![warn(missing_docs)]
//! Core abstractions for training and evaluating reinforcement-learning
//! policies on a simulated aerial vehicle.
//!
//! This crate is backend-agnostic: neural networks, the simulator client
//! and the experiment tracker live in sibling crates. What is defined here
//! is the contract between them:
//!
//! * [`Env`], [`Step`] and [`StepProcessor`]: the environment side,
//! * [`Policy`] and [`Agent`]: the trainable policy side,
//! * [`ExperienceBufferBase`], [`ReplayBufferBase`] and the buffers in
//!   [`generic_replay_buffer`]: experience storage,
//! * [`Trainer`]: the training loop with periodic checkpointing,
//! * [`Evaluator`] and [`StepEvaluator`]: fixed-step policy evaluation,
//! * [`record`]: metric records and the [`Recorder`] output trait.
//!
//! [`Recorder`]: crate::record::Recorder
pub mod dummy;
pub mod error;
pub mod generic_replay_buffer;
pub mod record;

mod base;
pub use base::{
    Act, Agent, Configurable, Env, ExperienceBufferBase, Info, Obs, Policy, ReplayBufferBase,
    Step, StepProcessor, TransitionBatch,
};

mod trainer;
pub use trainer::{Sampler, Trainer, TrainerConfig};

mod evaluator;
pub use evaluator::{Evaluator, StepEvaluator};
