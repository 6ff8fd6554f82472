use super::{create_trunk, feature_dim};
use crate::model::SubModel2;
use candle_core::{Device, Tensor, D};
use candle_nn::{linear, Linear, Module, Sequential, VarBuilder};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`CnnQ`].
pub struct CnnQConfig {
    /// Number of input channels.
    pub in_channels: i64,

    /// Image height in pixels.
    pub height: i64,

    /// Image width in pixels.
    pub width: i64,

    /// Dimension of the action vector.
    pub act_dim: i64,
}

impl CnnQConfig {
    /// Creates the configuration.
    pub fn new(in_channels: i64, height: i64, width: i64, act_dim: i64) -> Self {
        Self {
            in_channels,
            height,
            width,
            act_dim,
        }
    }
}

/// Convolutional action-value network over image observations and
/// continuous actions.
///
/// The image is reduced to a feature vector by the trunk; the action is
/// concatenated to the feature vector before the value head.
pub struct CnnQ {
    device: Device,
    seq: Sequential,
    fc: Linear,
    head1: Linear,
    head2: Linear,
}

impl SubModel2 for CnnQ {
    type Config = CnnQConfig;
    type Input1 = Tensor;
    type Input2 = Tensor;
    type Output = Tensor;

    fn forward(&self, obs: &Self::Input1, act: &Self::Input2) -> Tensor {
        let obs = obs.to_device(&self.device).unwrap();
        let act = act.to_device(&self.device).unwrap();
        let x = self.seq.forward(&obs).unwrap();
        let x = self.fc.forward(&x).unwrap().relu().unwrap();
        let x = Tensor::cat(&[x, act], D::Minus1).unwrap();
        let x = self.head1.forward(&x).unwrap().relu().unwrap();
        self.head2.forward(&x).unwrap()
    }

    fn build(vb: VarBuilder, config: Self::Config) -> Self {
        let device = vb.device().clone();
        let seq = create_trunk(&vb, config.in_channels).unwrap();
        let in_dim = feature_dim(config.height, config.width);
        let fc = linear(in_dim as _, 512, vb.pp("fc")).unwrap();
        let head1 = linear((512 + config.act_dim) as _, 256, vb.pp("l1")).unwrap();
        let head2 = linear(256, 1, vb.pp("l2")).unwrap();

        Self {
            device,
            seq,
            fc,
            head1,
            head2,
        }
    }
}
