use super::PpoConfig;
use crate::{
    model::SubModel1,
    util::{
        actor::GaussianActor, compute_gae, gaussian_entropy, gaussian_logp, value::ValueModel,
        OutDim,
    },
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::loss::mse;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path, path::PathBuf};
use uavnav_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};

/// Proximal policy optimization (PPO) agent.
///
/// On-policy: every optimization step drains the rollout buffer, computes
/// GAE advantages, and runs several epochs of clipped-surrogate updates
/// over shuffled minibatches.
pub struct Ppo<E, P, V, R>
where
    E: Env,
    P: SubModel1<Output = (Tensor, Tensor)>,
    V: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) pi: GaussianActor<P>,
    pub(super) vnet: ValueModel<V>,
    pub(super) gamma: f64,
    pub(super) gae_lambda: f64,
    pub(super) clip_range: f64,
    pub(super) n_epochs: usize,
    pub(super) batch_size: usize,
    pub(super) ent_coef: f64,
    pub(super) min_lstd: f64,
    pub(super) max_lstd: f64,
    pub(super) train: bool,
    pub(super) n_opts: usize,
    pub(super) device: Device,
    rng: StdRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, P, V, R> Ppo<E, P, V, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    V: SubModel1<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn state_values(&self, obs: &Tensor) -> Result<Vec<f32>> {
        Ok(self
            .vnet
            .forward(obs)
            .detach()
            .squeeze(D::Minus1)?
            .to_vec1()?)
    }

    fn logp(&self, obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let (mean, lstd) = self.pi.forward(obs);
        let lstd = lstd.clamp(self.min_lstd, self.max_lstd)?;
        gaussian_logp(&mean, &lstd, act)
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        // Drain the whole rollout; the batch size is irrelevant here.
        let batch = buffer.batch(0)?;
        let (obs, act, next_obs, reward, is_terminated, is_truncated) = batch.unpack();
        let obs = obs.into().to_device(&self.device)?;
        let act = act.into().to_device(&self.device)?;
        let next_obs = next_obs.into().to_device(&self.device)?;
        let n = reward.len();

        let values = self.state_values(&obs)?;
        let next_values = self.state_values(&next_obs)?;
        let (adv, ret) = compute_gae(
            &reward,
            &values,
            &next_values,
            &is_terminated,
            &is_truncated,
            self.gamma as f32,
            self.gae_lambda as f32,
        );

        // Normalize the advantages over the rollout.
        let adv = {
            let mean = adv.iter().sum::<f32>() / n as f32;
            let var = adv.iter().map(|a| (a - mean).powi(2)).sum::<f32>() / n as f32;
            let std = var.sqrt() + 1e-8;
            adv.iter().map(|a| (a - mean) / std).collect::<Vec<_>>()
        };
        let adv = Tensor::from_vec(adv, (n,), &self.device)?;
        let ret = Tensor::from_vec(ret, (n,), &self.device)?;

        // Log probabilities under the rollout policy.
        let logp_old = self.logp(&obs, &act)?.detach();

        let mut loss_actor = 0f32;
        let mut loss_value = 0f32;
        let mut entropy_sum = 0f32;
        let mut n_updates = 0;

        let mut ixs: Vec<u32> = (0..n as u32).collect();
        for _ in 0..self.n_epochs {
            ixs.shuffle(&mut self.rng);

            for chunk in ixs.chunks(self.batch_size.max(1)) {
                let ixs_t = Tensor::from_vec(chunk.to_vec(), (chunk.len(),), &self.device)?;
                let obs_b = obs.index_select(&ixs_t, 0)?;
                let act_b = act.index_select(&ixs_t, 0)?;
                let adv_b = adv.index_select(&ixs_t, 0)?;
                let ret_b = ret.index_select(&ixs_t, 0)?;
                let logp_old_b = logp_old.index_select(&ixs_t, 0)?;

                // Clipped surrogate objective
                let (mean, lstd) = self.pi.forward(&obs_b);
                let lstd = lstd.clamp(self.min_lstd, self.max_lstd)?;
                let logp = gaussian_logp(&mean, &lstd, &act_b)?;
                let entropy = gaussian_entropy(&lstd)?;
                let ratio = (logp - &logp_old_b)?.exp()?;
                let surr1 = (&ratio * &adv_b)?;
                let surr2 = (ratio.clamp(1.0 - self.clip_range, 1.0 + self.clip_range)?
                    * &adv_b)?;
                let pg_loss = (surr1.minimum(&surr2)?.mean_all()? * -1f64)?;
                let loss = (pg_loss - (self.ent_coef * &entropy)?)?;
                self.pi.backward_step(&loss)?;

                // Value update
                let v = self.vnet.forward(&obs_b).squeeze(D::Minus1)?;
                let v_loss = mse(&v, &ret_b)?;
                self.vnet.backward_step(&v_loss)?;

                loss_actor += loss.to_scalar::<f32>()?;
                loss_value += v_loss.to_scalar::<f32>()?;
                entropy_sum += entropy.to_scalar::<f32>()?;
                n_updates += 1;
            }
        }

        self.n_opts += 1;

        Ok(Record::from_slice(&[
            (
                "loss_actor",
                RecordValue::Scalar(loss_actor / n_updates as f32),
            ),
            (
                "loss_value",
                RecordValue::Scalar(loss_value / n_updates as f32),
            ),
            (
                "entropy",
                RecordValue::Scalar(entropy_sum / n_updates as f32),
            ),
        ]))
    }
}

impl<E, P, V, R> Configurable for Ppo<E, P, V, R>
where
    E: Env,
    P: SubModel1<Output = (Tensor, Tensor)>,
    V: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
{
    type Config = PpoConfig<V::Config, P::Config>;

    /// Constructs a PPO agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the PPO agent")
            .into();
        let pi = GaussianActor::build(config.actor_config.clone(), device.clone()).unwrap();
        let vnet = ValueModel::build(config.value_config.clone(), device.clone()).unwrap();
        let seed = config.seed.unwrap_or(42) as u64;

        Ppo {
            pi,
            vnet,
            gamma: config.gamma,
            gae_lambda: config.gae_lambda,
            clip_range: config.clip_range,
            n_epochs: config.n_epochs,
            batch_size: config.batch_size,
            ent_coef: config.ent_coef,
            min_lstd: config.actor_config.min_log_std,
            max_lstd: config.actor_config.max_log_std,
            train: config.train,
            n_opts: 0,
            device,
            rng: StdRng::seed_from_u64(seed),
            phantom: PhantomData,
        }
    }
}

impl<E, P, V, R> Policy<E> for Ppo<E, P, V, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    V: SubModel1<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
{
    /// In training mode the action is sampled from the Gaussian; in
    /// evaluation mode the mean action is returned.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let obs = obs.clone().into();
        let (mean, lstd) = self.pi.forward(&obs);
        let act = if self.train {
            let std = lstd
                .clamp(self.min_lstd, self.max_lstd)
                .unwrap()
                .exp()
                .unwrap();
            ((std * mean.randn_like(0., 1.).unwrap()).unwrap() + mean).unwrap()
        } else {
            mean
        };
        act.into()
    }
}

impl<E, P, V, R> Agent<E, R> for Ppo<E, P, V, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    V: SubModel1<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase + ExperienceBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn train(&mut self) {
        self.train = true;
    }

    fn eval(&mut self) {
        self.train = false;
    }

    fn is_train(&self) -> bool {
        self.train
    }

    fn opt(&mut self, buffer: &mut R) -> Option<Record> {
        if ExperienceBufferBase::len(buffer) == 0 {
            return None;
        }
        Some(self.opt_(buffer).expect("Failed in Ppo::opt_()"))
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let pi = path.join("pi.safetensors");
        let vnet = path.join("vnet.safetensors");
        self.pi.save(&pi)?;
        self.vnet.save(&vnet)?;
        Ok(vec![pi, vnet])
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.pi.load(path.join("pi.safetensors"))?;
        self.vnet.load(path.join("vnet.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        testing::{TestEnv, TestObs},
        util::{actor::GaussianActorConfig, value::ValueModelConfig},
        Activation, TensorBatch,
    };
    use uavnav_core::generic_replay_buffer::{
        GenericTransitionBatch, RolloutBuffer, RolloutBufferConfig,
    };

    type Buffer = RolloutBuffer<TensorBatch, TensorBatch>;

    fn agent_config() -> PpoConfig<MlpConfig, MlpConfig> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(4, vec![16], 2, Activation::None));
        let value_config = ValueModelConfig::default()
            .v_config(MlpConfig::new(4, vec![16], 1, Activation::None));
        PpoConfig::default()
            .actor_config(actor_config)
            .value_config(value_config)
            .n_epochs(2)
            .batch_size(4)
            .device(crate::Device::Cpu)
    }

    fn filled_rollout(n: usize) -> Buffer {
        let mut buffer = Buffer::build(&RolloutBufferConfig::default());
        for i in 0..n {
            let v = i as f32 / n as f32;
            let obs = Tensor::from_vec(vec![v; 4], &[1, 4], &candle_core::Device::Cpu).unwrap();
            let next_obs =
                Tensor::from_vec(vec![v + 0.1; 4], &[1, 4], &candle_core::Device::Cpu).unwrap();
            let act = Tensor::from_vec(vec![0.2f32, -0.2], &[1, 2], &candle_core::Device::Cpu)
                .unwrap();
            uavnav_core::ExperienceBufferBase::push(
                &mut buffer,
                GenericTransitionBatch {
                    obs: TensorBatch::from_tensor(obs),
                    act: TensorBatch::from_tensor(act),
                    next_obs: TensorBatch::from_tensor(next_obs),
                    reward: vec![v],
                    is_terminated: vec![0],
                    is_truncated: vec![(i == n - 1) as i8],
                },
            )
            .unwrap();
        }
        buffer
    }

    #[test]
    fn opt_drains_the_rollout() {
        let mut agent: Ppo<TestEnv, Mlp2, Mlp, Buffer> = Ppo::build(agent_config());
        let mut buffer = filled_rollout(8);
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_actor").is_ok());
        assert!(record.get_scalar("loss_value").is_ok());
        assert_eq!(uavnav_core::ExperienceBufferBase::len(&buffer), 0);
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut agent: Ppo<TestEnv, Mlp2, Mlp, Buffer> = Ppo::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![1.0, 0.0, -1.0, 0.5]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }
}
