//! Utilities shared by the agents.
pub mod actor;
pub mod critic;
pub mod value;
use anyhow::Result;
use candle_core::{DType, Device, Tensor, WithDType, D};
use candle_nn::VarMap;
use log::trace;
use ndarray::ArrayD;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;

/// Critic loss type.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum CriticLoss {
    /// Mean squared error.
    Mse,

    /// Smooth L1 loss.
    SmoothL1,
}

/// Applies a soft update on variables: `dest = tau * src + (1 - tau) * dest`.
///
/// Variables are identified by their names.
pub fn track(dest: &VarMap, src: &VarMap, tau: f64) -> Result<()> {
    trace!("dest");
    let dest = dest.data().lock().unwrap();
    trace!("src");
    let src = src.data().lock().unwrap();

    dest.iter().for_each(|(k_dest, v_dest)| {
        let v_src = src.get(k_dest).unwrap();
        let t_src = v_src.as_tensor();
        let t_dest = v_dest.as_tensor();
        let t_dest = ((tau * t_src).unwrap() + (1.0 - tau) * t_dest).unwrap();
        v_dest.set(&t_dest).unwrap();
    });

    Ok(())
}

/// See <https://pytorch.org/docs/stable/generated/torch.nn.SmoothL1Loss.html>.
pub fn smooth_l1_loss(x: &Tensor, y: &Tensor) -> Result<Tensor, candle_core::Error> {
    let device = x.device();
    let d = (x - y)?.abs()?;
    let m1 = d.lt(1.0)?.to_dtype(DType::F32)?.to_device(device)?;
    let m2 = Tensor::try_from(1f32)?
        .to_device(device)?
        .broadcast_sub(&m1)?;
    (((0.5 * m1)? * d.powf(2.0)?)? + m2 * (d - 0.5)?)?.mean_all()
}

/// Log probability of a standard Normal distribution, summed over the
/// last dimension.
pub fn normal_logp(x: &Tensor) -> Result<Tensor> {
    let tmp: Tensor =
        ((-0.5 * (2.0 * std::f32::consts::PI).ln() as f64) - (0.5 * x.powf(2.0)?)?)?;
    Ok(tmp.sum(D::Minus1)?)
}

/// Interface for handling output dimensions.
pub trait OutDim {
    /// Returns the output dimension.
    fn get_out_dim(&self) -> i64;

    /// Sets the output dimension.
    fn set_out_dim(&mut self, v: i64);
}

/// Converts a vector into a 1-D or 1xN tensor.
pub fn vec_to_tensor<T1, T2>(v: Vec<T1>, add_batch_dim: bool) -> Result<Tensor>
where
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let v = v.iter().map(|e| e.as_()).collect::<Vec<T2>>();
    let t: Tensor = TryFrom::<Vec<T2>>::try_from(v)?;

    match add_batch_dim {
        true => Ok(t.unsqueeze(0)?),
        false => Ok(t),
    }
}

/// Converts an ndarray into a tensor, optionally adding a batch dimension.
pub fn arrayd_to_tensor<T1, T2>(a: ArrayD<T1>, add_batch_dim: bool) -> Result<Tensor>
where
    T1: AsPrimitive<T2>,
    T2: WithDType,
{
    let shape = a.shape().to_vec();
    let v = a.iter().map(|e| e.as_()).collect::<Vec<T2>>();
    let t: Tensor = TryFrom::<Vec<T2>>::try_from(v)?;
    let t = t.reshape(shape)?;

    match add_batch_dim {
        true => Ok(t.unsqueeze(0)?),
        false => Ok(t),
    }
}

/// Converts a tensor into an ndarray, optionally deleting the batch
/// dimension.
pub fn tensor_to_arrayd<T>(t: Tensor, delete_batch_dim: bool) -> Result<ArrayD<T>>
where
    T: WithDType,
{
    let shape = match delete_batch_dim {
        false => t.dims().to_vec(),
        true => t.dims()[1..].to_vec(),
    };
    let v: Vec<T> = t.flatten_all()?.to_vec1()?;

    Ok(ndarray::Array1::<T>::from(v).into_shape(ndarray::IxDyn(&shape))?)
}

/// Creates the tensor `gamma * (1 - done)` used in TD backups.
pub fn gamma_not_done(
    gamma: f32,
    is_terminated: &[i8],
    device: &Device,
) -> Result<Tensor> {
    let batch_size = is_terminated.len();
    let not_done = is_terminated
        .iter()
        .map(|e| (1f32 - *e as f32) * gamma)
        .collect::<Vec<_>>();
    Ok(Tensor::from_slice(&not_done[..], (batch_size,), device)?)
}

/// Log probability of actions under a diagonal Gaussian, summed over the
/// action dimension.
///
/// `lstd` must already be clamped by the caller.
pub fn gaussian_logp(mean: &Tensor, lstd: &Tensor, act: &Tensor) -> Result<Tensor> {
    let std = lstd.exp()?;
    let z = ((act - mean)? / std)?;
    let logp = ((-0.5 * (2.0 * std::f32::consts::PI).ln() as f64) - lstd)?;
    let logp = (logp - (0.5 * z.powf(2.0)?)?)?;
    Ok(logp.sum(D::Minus1)?)
}

/// Entropy of a diagonal Gaussian, summed over the action dimension and
/// averaged over the batch.
pub fn gaussian_entropy(lstd: &Tensor) -> Result<Tensor> {
    let c = 0.5 * (1.0 + (2.0 * std::f32::consts::PI).ln()) as f64;
    Ok((lstd + c)?.sum(D::Minus1)?.mean_all()?)
}

/// Generalized advantage estimation.
///
/// Returns `(advantages, returns)`. Termination zeroes the bootstrap
/// value; both termination and truncation stop the advantage recursion,
/// so transitions of different episodes never mix.
pub fn compute_gae(
    reward: &[f32],
    values: &[f32],
    next_values: &[f32],
    is_terminated: &[i8],
    is_truncated: &[i8],
    gamma: f32,
    lambda: f32,
) -> (Vec<f32>, Vec<f32>) {
    let n = reward.len();
    let mut adv = vec![0f32; n];
    let mut last_adv = 0f32;

    for i in (0..n).rev() {
        let not_term = 1f32 - is_terminated[i] as f32;
        let episode_continues = 1f32 - (is_terminated[i] | is_truncated[i]) as f32;
        let delta = reward[i] + gamma * next_values[i] * not_term - values[i];
        last_adv = delta + gamma * lambda * episode_continues * last_adv;
        adv[i] = last_adv;
    }

    let ret = adv.iter().zip(values.iter()).map(|(a, v)| a + v).collect();
    (adv, ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_nn::Init;

    #[test]
    fn test_track() -> Result<()> {
        let tau = 0.7;
        let t_src = Tensor::from_slice(&[1.0f32, 2.0, 3.0], (3,), &Device::Cpu)?;
        let t_dest = Tensor::from_slice(&[4.0f32, 5.0, 6.0], (3,), &Device::Cpu)?;
        let t = ((tau * &t_src).unwrap() + (1.0 - tau) * &t_dest).unwrap();

        let init = Init::Randn {
            mean: 0.0,
            stdev: 1.0,
        };
        let vm_src = {
            let vm = VarMap::new();
            vm.get((3,), "var1", init, DType::F32, &Device::Cpu)?;
            vm.data().lock().unwrap().get("var1").unwrap().set(&t_src)?;
            vm
        };
        let vm_dest = {
            let vm = VarMap::new();
            vm.get((3,), "var1", init, DType::F32, &Device::Cpu)?;
            vm.data()
                .lock()
                .unwrap()
                .get("var1")
                .unwrap()
                .set(&t_dest)?;
            vm
        };
        track(&vm_dest, &vm_src, tau)?;

        let t_ = vm_dest
            .data()
            .lock()
            .unwrap()
            .get("var1")
            .unwrap()
            .as_tensor()
            .clone();

        assert!((t - t_)?.abs()?.sum(0)?.to_scalar::<f32>()? < 1e-6);

        Ok(())
    }

    #[test]
    fn test_smooth_l1_loss() -> Result<()> {
        let x = Tensor::from_slice(&[0.0f32, 2.0], (2,), &Device::Cpu)?;
        let y = Tensor::from_slice(&[0.5f32, 0.0], (2,), &Device::Cpu)?;
        // |d| = [0.5, 2.0] -> [0.5 * 0.25, 2.0 - 0.5] -> mean = 0.8125
        let loss = smooth_l1_loss(&x, &y)?.to_scalar::<f32>()?;
        assert!((loss - 0.8125).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn test_gamma_not_done() -> Result<()> {
        let t = gamma_not_done(0.9, &[0, 1, 0], &Device::Cpu)?;
        let vs: Vec<f32> = t.to_vec1()?;
        assert_eq!(vs, vec![0.9, 0.0, 0.9]);
        Ok(())
    }

    #[test]
    fn gae_with_lambda_one_is_discounted_return() {
        // Single episode of three steps, no termination inside.
        let reward = [1.0, 1.0, 1.0];
        let values = [0.0, 0.0, 0.0];
        let next_values = [0.0, 0.0, 0.5];
        let (adv, ret) = compute_gae(
            &reward,
            &values,
            &next_values,
            &[0, 0, 0],
            &[0, 0, 1],
            0.5,
            1.0,
        );
        // Last step: 1 + 0.5 * 0.5 = 1.25; middle: 1 + 0.5 * 1.25;
        // first: 1 + 0.5 * 1.625.
        assert_eq!(ret, vec![1.8125, 1.625, 1.25]);
        assert_eq!(adv, ret);
    }

    #[test]
    fn gae_resets_at_episode_boundary() {
        let reward = [1.0, 1.0];
        let values = [0.0, 0.0];
        let next_values = [9.0, 0.0];
        let (adv, _) = compute_gae(&reward, &values, &next_values, &[1, 0], &[0, 1], 0.9, 0.95);
        // The terminated first step must not bootstrap or chain into the
        // second episode.
        assert_eq!(adv[0], 1.0);
        assert_eq!(adv[1], 1.0);
    }

    #[test]
    fn gaussian_logp_of_mean_action() -> Result<()> {
        let mean = Tensor::zeros(&[1, 2], DType::F32, &Device::Cpu)?;
        let lstd = Tensor::zeros(&[1, 2], DType::F32, &Device::Cpu)?;
        let act = Tensor::zeros(&[1, 2], DType::F32, &Device::Cpu)?;
        let logp: Vec<f32> = gaussian_logp(&mean, &lstd, &act)?.to_vec1()?;
        let expected = -(2.0 * std::f32::consts::PI).ln();
        assert!((logp[0] - expected).abs() < 1e-5);
        Ok(())
    }
}
