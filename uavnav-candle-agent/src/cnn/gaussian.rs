use super::{create_trunk, feature_dim};
use crate::{model::SubModel1, util::OutDim};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, Sequential, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`CnnGaussian`].
pub struct CnnGaussianConfig {
    /// Number of input channels.
    pub in_channels: i64,

    /// Image height in pixels.
    pub height: i64,

    /// Image width in pixels.
    pub width: i64,

    /// Dimension of the action vector.
    pub out_dim: i64,
}

impl CnnGaussianConfig {
    /// Creates the configuration.
    pub fn new(in_channels: i64, height: i64, width: i64, out_dim: i64) -> Self {
        Self {
            in_channels,
            height,
            width,
            out_dim,
        }
    }
}

impl OutDim for CnnGaussianConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, v: i64) {
        self.out_dim = v;
    }
}

/// Convolutional policy network emitting `(mean, log_std)` of a Gaussian
/// action distribution.
pub struct CnnGaussian {
    device: Device,
    seq: Sequential,
    fc: Linear,
    head_mean: Linear,
    head_lstd: Linear,
}

impl SubModel1 for CnnGaussian {
    type Config = CnnGaussianConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, x: &Self::Input) -> Self::Output {
        let x = x.to_device(&self.device).unwrap();
        let x = self.seq.forward(&x).unwrap();
        let x = self.fc.forward(&x).unwrap().relu().unwrap();
        let mean = self.head_mean.forward(&x).unwrap();
        let lstd = self.head_lstd.forward(&x).unwrap();
        (mean, lstd)
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Self {
        let device = vb.device().clone();
        let seq = create_trunk(&vb, config.in_channels).unwrap();
        let in_dim = feature_dim(config.height, config.width);
        let fc = linear(in_dim as _, 512, vb.pp("fc")).unwrap();
        let head_mean = linear(512, config.out_dim as _, vb.pp("head_mean")).unwrap();
        let head_lstd = linear(512, config.out_dim as _, vb.pp("head_lstd")).unwrap();

        Self {
            device,
            seq,
            fc,
            head_mean,
            head_lstd,
        }
    }
}
