//! RL agents implemented with [candle](https://crates.io/crates/candle-core).
//!
//! Six algorithms are provided, all generic over the environment and the
//! buffer feeding them:
//!
//! * [`dqn`]: value-based, discrete actions.
//! * [`ddpg`], [`td3`], [`sac`]: off-policy actor-critic, continuous
//!   actions.
//! * [`a2c`], [`ppo`]: on-policy actor-critic over a rollout buffer,
//!   continuous actions.
//!
//! The [`cnn`] module holds the convolutional image policies used by the
//! driver; [`mlp`] holds small fully-connected models, mostly used in
//! tests and for low-dimensional observations.
pub mod a2c;
pub mod cnn;
pub mod ddpg;
pub mod dqn;
pub mod mlp;
pub mod model;
pub mod opt;
pub mod ppo;
pub mod sac;
mod tensor_batch;
pub mod td3;
pub mod util;
use candle_core::Tensor;
use serde::{Deserialize, Serialize};
pub use tensor_batch::TensorBatch;

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Compute device for candle.
///
/// This enum exists because [`candle_core::Device`] does not support
/// serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The n-th CUDA device.
    Cuda(usize),
}

impl Device {
    /// Returns the first CUDA device if one is available, CPU otherwise.
    pub fn cuda_if_available() -> Self {
        match candle_core::Device::cuda_if_available(0) {
            Ok(device) if device.is_cuda() => Self::Cuda(0),
            _ => Self::Cpu,
        }
    }
}

impl From<candle_core::Device> for Device {
    fn from(device: candle_core::Device) -> Self {
        match device {
            candle_core::Device::Cpu => Self::Cpu,
            candle_core::Device::Cuda(_) => Self::Cuda(0),
            _ => unimplemented!(),
        }
    }
}

impl From<Device> for candle_core::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(n) => candle_core::Device::new_cuda(n).unwrap(),
        }
    }
}

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Activation applied to the final layer of a model.
pub enum Activation {
    /// No activation.
    None,

    /// Rectified linear unit.
    Relu,

    /// Hyperbolic tangent.
    Tanh,
}

impl Activation {
    /// Applies the activation.
    pub fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            Self::None => xs.clone(),
            Self::Relu => xs.relu().unwrap(),
            Self::Tanh => xs.tanh().unwrap(),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for the agent tests.
    use crate::TensorBatch;
    use candle_core::{DType, Device, Tensor};
    use uavnav_core::{
        generic_replay_buffer::{
            GenericTransitionBatch, SimpleReplayBuffer, SimpleReplayBufferConfig,
        },
        record::Record,
        Act, Env, Obs, ReplayBufferBase, Step,
    };

    #[derive(Clone, Debug)]
    pub struct TestObs(pub Vec<f32>);

    impl Obs for TestObs {
        fn dummy(_n: usize) -> Self {
            Self(vec![0.0; 4])
        }

        fn len(&self) -> usize {
            1
        }
    }

    impl From<TestObs> for Tensor {
        fn from(obs: TestObs) -> Tensor {
            let n = obs.0.len();
            Tensor::from_vec(obs.0, &[1, n], &Device::Cpu).unwrap()
        }
    }

    impl From<TestObs> for TensorBatch {
        fn from(obs: TestObs) -> TensorBatch {
            TensorBatch::from_tensor(obs.into())
        }
    }

    #[derive(Clone, Debug)]
    pub struct TestAct(pub Vec<f32>);

    impl Act for TestAct {
        fn len(&self) -> usize {
            1
        }
    }

    impl From<Tensor> for TestAct {
        fn from(t: Tensor) -> Self {
            let t = match t.dims().len() {
                1 => t,
                _ => t.squeeze(0).unwrap(),
            };
            Self(t.to_dtype(DType::F32).unwrap().to_vec1().unwrap())
        }
    }

    impl From<TestAct> for Tensor {
        fn from(act: TestAct) -> Tensor {
            let n = act.0.len();
            Tensor::from_vec(act.0, &[1, n], &Device::Cpu).unwrap()
        }
    }

    impl From<TestAct> for TensorBatch {
        fn from(act: TestAct) -> TensorBatch {
            TensorBatch::from_tensor(act.into())
        }
    }

    /// Environment type used only for its associated types.
    pub struct TestEnv;

    impl Env for TestEnv {
        type Config = ();
        type Obs = TestObs;
        type Act = TestAct;
        type Info = ();

        fn build(_config: &Self::Config, _seed: i64) -> anyhow::Result<Self> {
            Ok(Self)
        }

        fn step(&mut self, _a: &Self::Act) -> (Step<Self>, Record) {
            unimplemented!();
        }

        fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> anyhow::Result<Self::Obs> {
            unimplemented!();
        }

        fn step_with_reset(&mut self, _a: &Self::Act) -> (Step<Self>, Record) {
            unimplemented!();
        }

        fn reset_with_index(&mut self, _ix: usize) -> anyhow::Result<Self::Obs> {
            unimplemented!();
        }
    }

    pub type TestBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;

    /// Fills a replay buffer with `n` synthetic transitions of the given
    /// observation and action dimensions.
    pub fn fill_buffer(obs_dim: usize, act_dim: usize, n: usize) -> TestBuffer {
        let config = SimpleReplayBufferConfig::default().capacity(n.max(2));
        let mut buffer = TestBuffer::build(&config);
        for i in 0..n {
            let v = (i % 7) as f32 / 7.0;
            let obs =
                Tensor::from_vec(vec![v; obs_dim], &[1, obs_dim], &Device::Cpu).unwrap();
            let next_obs =
                Tensor::from_vec(vec![v + 0.1; obs_dim], &[1, obs_dim], &Device::Cpu).unwrap();
            let act =
                Tensor::from_vec(vec![0.5 - v; act_dim], &[1, act_dim], &Device::Cpu).unwrap();
            uavnav_core::ExperienceBufferBase::push(
                &mut buffer,
                GenericTransitionBatch {
                    obs: TensorBatch::from_tensor(obs),
                    act: TensorBatch::from_tensor(act),
                    next_obs: TensorBatch::from_tensor(next_obs),
                    reward: vec![v],
                    is_terminated: vec![(i % 5 == 4) as i8],
                    is_truncated: vec![0],
                },
            )
            .unwrap();
        }
        buffer
    }

    /// Same as [`fill_buffer`] but with discrete (i64) actions.
    pub fn fill_buffer_discrete(obs_dim: usize, n_act: i64, n: usize) -> TestBuffer {
        let config = SimpleReplayBufferConfig::default().capacity(n.max(2));
        let mut buffer = TestBuffer::build(&config);
        for i in 0..n {
            let v = (i % 7) as f32 / 7.0;
            let obs =
                Tensor::from_vec(vec![v; obs_dim], &[1, obs_dim], &Device::Cpu).unwrap();
            let next_obs =
                Tensor::from_vec(vec![v + 0.1; obs_dim], &[1, obs_dim], &Device::Cpu).unwrap();
            let act = Tensor::from_vec(vec![(i as i64) % n_act], &[1, 1], &Device::Cpu).unwrap();
            uavnav_core::ExperienceBufferBase::push(
                &mut buffer,
                GenericTransitionBatch {
                    obs: TensorBatch::from_tensor(obs),
                    act: TensorBatch::from_tensor(act),
                    next_obs: TensorBatch::from_tensor(next_obs),
                    reward: vec![v],
                    is_terminated: vec![(i % 5 == 4) as i8],
                    is_truncated: vec![0],
                },
            )
            .unwrap();
        }
        buffer
    }
}
