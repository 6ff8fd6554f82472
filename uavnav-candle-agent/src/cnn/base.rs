use super::{create_trunk, feature_dim};
use crate::{model::SubModel1, util::OutDim};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Module, Sequential, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`Cnn`].
pub struct CnnConfig {
    /// Number of input channels.
    pub in_channels: i64,

    /// Image height in pixels.
    pub height: i64,

    /// Image width in pixels.
    pub width: i64,

    /// Output dimension, e.g. the number of discrete actions.
    pub out_dim: i64,
}

impl CnnConfig {
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

impl OutDim for CnnConfig {
    fn get_out_dim(&self) -> i64 {
        self.out_dim
    }

    fn set_out_dim(&mut self, v: i64) {
        self.out_dim = v;
    }
}

/// Convolutional network mapping an image batch to a vector per image,
/// with the architecture of the DQN paper.
pub struct Cnn {
    device: Device,
    seq: Sequential,
    head1: candle_nn::Linear,
    head2: candle_nn::Linear,
}

impl SubModel1 for Cnn {
    type Config = CnnConfig;
    type Input = Tensor;
    type Output = Tensor;

    fn forward(&self, x: &Self::Input) -> Tensor {
        let x = x.to_device(&self.device).unwrap();
        let x = self.seq.forward(&x).unwrap();
        let x = self.head1.forward(&x).unwrap().relu().unwrap();
        self.head2.forward(&x).unwrap()
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Self {
        let device = vb.device().clone();
        let seq = create_trunk(&vb, config.in_channels).unwrap();
        let in_dim = feature_dim(config.height, config.width);
        let head1 = linear(in_dim as _, 512, vb.pp("l1")).unwrap();
        let head2 = linear(512, config.out_dim as _, vb.pp("l2")).unwrap();

        Self {
            device,
            seq,
            head1,
            head2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn forward_shape() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let cnn = Cnn::build(vb, CnnConfig::new(1, 80, 80, 4));

        let x = Tensor::zeros(&[2, 1, 80, 80], DType::F32, &device).unwrap();
        let y = cnn.forward(&x);
        assert_eq!(y.dims(), &[2, 4]);
    }
}
