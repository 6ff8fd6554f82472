//! Convolutional image policies.
//!
//! All variants share the three-convolution feature trunk of the classic
//! deep Q-network. The flatten dimension is computed from the configured
//! image shape, so any input resolution the convolutions accept works.
mod base;
mod gaussian;
mod q;
use anyhow::Result;
pub use base::{Cnn, CnnConfig};
use candle_core::DType::F32;
use candle_nn::{conv::Conv2dConfig, conv2d_no_bias, sequential::seq, Sequential, VarBuilder};
pub use gaussian::{CnnGaussian, CnnGaussianConfig};
pub use q::{CnnQ, CnnQConfig};

fn stride(s: i64) -> Conv2dConfig {
    Conv2dConfig {
        stride: s as _,
        ..Default::default()
    }
}

/// Output size of one convolution along one axis.
fn conv_out(x: i64, kernel: i64, stride: i64) -> i64 {
    (x - kernel) / stride + 1
}

/// Flattened feature dimension of the trunk for the given image size.
fn feature_dim(height: i64, width: i64) -> i64 {
    let h = conv_out(conv_out(conv_out(height, 8, 4), 4, 2), 3, 1);
    let w = conv_out(conv_out(conv_out(width, 8, 4), 4, 2), 3, 1);
    64 * h * w
}

/// Creates the convolutional feature trunk.
///
/// The input is an image batch `(N, C, H, W)` with values in `[0, 255]`;
/// the output is the flattened feature batch.
fn create_trunk(vb: &VarBuilder, in_channels: i64) -> Result<Sequential> {
    let seq = seq()
        .add_fn(|xs| xs.to_dtype(F32)? / 255.0)
        .add(conv2d_no_bias(
            in_channels as _,
            32,
            8,
            stride(4),
            vb.pp("c1"),
        )?)
        .add_fn(|xs| xs.relu())
        .add(conv2d_no_bias(32, 64, 4, stride(2), vb.pp("c2"))?)
        .add_fn(|xs| xs.relu())
        .add(conv2d_no_bias(64, 64, 3, stride(1), vb.pp("c3"))?)
        .add_fn(|xs| xs.relu()?.flatten_from(1));

    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::feature_dim;

    #[test]
    fn feature_dim_of_known_shapes() {
        // The 84x84 input of the original DQN paper.
        assert_eq!(feature_dim(84, 84), 3136);
        // The 80x80 camera frames of the drone simulator.
        assert_eq!(feature_dim(80, 80), 2304);
    }
}
