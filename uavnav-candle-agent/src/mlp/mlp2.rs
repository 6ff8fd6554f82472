use super::{mlp_forward, MlpConfig};
use crate::{model::SubModel1, Activation};
use candle_core::{Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Two-headed multilayer perceptron emitting `(mean, log_std)`.
pub struct Mlp2 {
    device: Device,
    trunk: Vec<Linear>,
    head_mean: Linear,
    head_lstd: Linear,
}

impl SubModel1 for Mlp2 {
    type Config = MlpConfig;
    type Input = Tensor;
    type Output = (Tensor, Tensor);

    fn forward(&self, xs: &Self::Input) -> Self::Output {
        let xs = xs.to_device(&self.device).unwrap();
        let xs = mlp_forward(xs, &self.trunk, &Activation::Relu);
        let mean = self.head_mean.forward(&xs).unwrap();
        let lstd = self.head_lstd.forward(&xs).unwrap();
        (mean, lstd)
    }

    fn build(vs: VarBuilder, config: Self::Config) -> Self {
        let device = vs.device().clone();
        let units = if config.units.is_empty() {
            vec![64]
        } else {
            config.units.clone()
        };

        let mut trunk = Vec::new();
        let mut in_dim = config.in_dim;
        for (i, u) in units.iter().enumerate() {
            trunk.push(linear(in_dim as _, *u as _, vs.pp(format!("trunk_ln{}", i))).unwrap());
            in_dim = *u;
        }

        let head_mean = linear(in_dim as _, config.out_dim as _, vs.pp("head_mean")).unwrap();
        let head_lstd = linear(in_dim as _, config.out_dim as _, vs.pp("head_lstd")).unwrap();

        Self {
            device,
            trunk,
            head_mean,
            head_lstd,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;
    use candle_nn::VarMap;

    #[test]
    fn forward_shapes() {
        let device = Device::Cpu;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let config = MlpConfig::new(4, vec![16], 3, Activation::None);
        let mlp2 = Mlp2::build(vb, config);

        let x = Tensor::zeros(&[5, 4], DType::F32, &device).unwrap();
        let (mean, lstd) = mlp2.forward(&x);
        assert_eq!(mean.dims(), &[5, 3]);
        assert_eq!(lstd.dims(), &[5, 3]);
    }
}
