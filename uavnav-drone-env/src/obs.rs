//! Observation type.
use candle_core::Tensor;
use ndarray::ArrayD;
use uavnav_candle_agent::{util::arrayd_to_tensor, TensorBatch};
use uavnav_core::Obs;

/// Camera image observation, `(channels, height, width)` as `f32` in
/// `[0, 255]`.
#[derive(Clone, Debug)]
pub struct DroneObs(pub ArrayD<f32>);

impl Obs for DroneObs {
    fn dummy(_n: usize) -> Self {
        Self(ndarray::ArrayD::zeros(ndarray::IxDyn(&[1, 1, 1])))
    }

    fn len(&self) -> usize {
        1
    }
}

impl From<DroneObs> for Tensor {
    /// Adds the batch dimension: `(1, C, H, W)`.
    fn from(obs: DroneObs) -> Tensor {
        arrayd_to_tensor::<f32, f32>(obs.0, true).expect("Failed to convert observation")
    }
}

impl From<DroneObs> for TensorBatch {
    fn from(obs: DroneObs) -> TensorBatch {
        TensorBatch::from_tensor(obs.into())
    }
}
