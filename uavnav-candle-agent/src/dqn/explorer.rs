//! Exploration strategies of DQN.
use candle_core::{shape::D, DType, Tensor};
use candle_nn::ops::softmax;
use rand::{distributions::WeightedIndex, Rng};
use serde::{Deserialize, Serialize};

/// Explorers for DQN.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub enum DqnExplorer {
    /// Softmax action selection.
    Softmax(Softmax),

    /// Epsilon-greedy action selection.
    EpsilonGreedy(EpsilonGreedy),
}

/// Softmax explorer for DQN.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct Softmax {}

#[allow(clippy::new_without_default)]
impl Softmax {
    /// Constructs a softmax explorer.
    pub fn new() -> Self {
        Self {}
    }

    /// Takes an action based on action values, returns an i64 tensor.
    ///
    /// * `a` - action values.
    pub fn action(&mut self, a: &Tensor, rng: &mut impl Rng) -> Tensor {
        let device = a.device();
        let probs = softmax(a, 1).unwrap().to_vec2::<f32>().unwrap();
        let n_samples = probs.len();
        let data = probs
            .into_iter()
            .map(|p| rng.sample(WeightedIndex::new(&p).unwrap()) as i64)
            .collect::<Vec<_>>();
        Tensor::from_vec(data, &[n_samples], device).unwrap()
    }
}

/// Epsilon-greedy explorer for DQN.
///
/// Epsilon decays linearly from `eps_start` to `eps_final` over
/// `final_step` action selections.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonGreedy {
    /// The number of action selections so far.
    pub n_opts: usize,

    /// Initial epsilon.
    pub eps_start: f64,

    /// Final epsilon.
    pub eps_final: f64,

    /// The step at which `eps_final` is reached.
    pub final_step: usize,
}

#[allow(clippy::new_without_default)]
impl EpsilonGreedy {
    /// Constructs an epsilon-greedy explorer.
    pub fn new() -> Self {
        Self {
            n_opts: 0,
            eps_start: 1.0,
            eps_final: 0.02,
            final_step: 100_000,
        }
    }

    /// Constructs an epsilon-greedy explorer with the given final step.
    pub fn with_final_step(final_step: usize) -> DqnExplorer {
        DqnExplorer::EpsilonGreedy(Self {
            n_opts: 0,
            eps_start: 1.0,
            eps_final: 0.02,
            final_step,
        })
    }

    /// Takes an action based on action values, returns an i64 tensor.
    ///
    /// * `a` - action values.
    pub fn action(&mut self, a: &Tensor, rng: &mut impl Rng) -> Tensor {
        let d = (self.eps_start - self.eps_final) / (self.final_step as f64);
        let eps = (self.eps_start - d * self.n_opts as f64).max(self.eps_final);
        let r = rng.gen::<f32>();
        let is_random = r < eps as f32;
        self.n_opts += 1;

        if is_random {
            let n_samples = a.dims()[0];
            let n_actions = a.dims()[1] as u64;
            Tensor::from_slice(
                (0..n_samples)
                    .map(|_| (rng.gen::<u64>() % n_actions) as i64)
                    .collect::<Vec<_>>()
                    .as_slice(),
                &[n_samples],
                a.device(),
            )
            .unwrap()
        } else {
            a.argmax(D::Minus1).unwrap().to_dtype(DType::I64).unwrap()
        }
    }

    /// Sets the epsilon value at the final step.
    pub fn eps_final(self, v: f64) -> Self {
        let mut s = self;
        s.eps_final = v;
        s
    }

    /// Sets the epsilon value at the start.
    pub fn eps_start(self, v: f64) -> Self {
        let mut s = self;
        s.eps_start = v;
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn greedy_when_epsilon_is_zero() {
        let mut explorer = EpsilonGreedy::new().eps_start(0.0).eps_final(0.0);
        let mut rng = SmallRng::seed_from_u64(0);
        let a = Tensor::from_slice(&[0.1f32, 0.9, 0.2], (1, 3), &Device::Cpu).unwrap();
        let act: Vec<i64> = explorer.action(&a, &mut rng).to_vec1().unwrap();
        assert_eq!(act, vec![1]);
    }

    #[test]
    fn epsilon_decays_linearly() {
        let mut explorer = EpsilonGreedy::new();
        explorer.final_step = 100;
        let mut rng = SmallRng::seed_from_u64(0);
        let a = Tensor::from_slice(&[0.1f32, 0.9], (1, 2), &Device::Cpu).unwrap();
        for _ in 0..200 {
            explorer.action(&a, &mut rng);
        }
        assert_eq!(explorer.n_opts, 200);
    }
}
