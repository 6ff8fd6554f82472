use super::A2cConfig;
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
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path, path::PathBuf};
use uavnav_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, Policy, ReplayBufferBase, TransitionBatch,
};

/// Advantage actor-critic (A2C) agent.
///
/// On-policy: every optimization step drains the rollout buffer, computes
/// bootstrapped returns and advantages, and applies one policy update and
/// one value update.
pub struct A2c<E, P, V, R>
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
    pub(super) ent_coef: f64,
    pub(super) min_lstd: f64,
    pub(super) max_lstd: f64,
    pub(super) train: bool,
    pub(super) n_opts: usize,
    pub(super) device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, P, V, R> A2c<E, P, V, R>
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
            1.0,
        );
        let adv = Tensor::from_vec(adv, (n,), &self.device)?;
        let ret = Tensor::from_vec(ret, (n,), &self.device)?;

        // Policy update
        let (loss_actor, entropy) = {
            let (mean, lstd) = self.pi.forward(&obs);
            let lstd = lstd.clamp(self.min_lstd, self.max_lstd)?;
            let logp = gaussian_logp(&mean, &lstd, &act)?;
            let entropy = gaussian_entropy(&lstd)?;
            let pg_loss = ((logp * &adv)?.mean_all()? * -1f64)?;
            let loss = (pg_loss - (self.ent_coef * &entropy)?)?;
            self.pi.backward_step(&loss)?;
            (loss.to_scalar::<f32>()?, entropy.to_scalar::<f32>()?)
        };

        // Value update
        let loss_value = {
            let v = self.vnet.forward(&obs).squeeze(D::Minus1)?;
            let loss = mse(&v, &ret)?;
            self.vnet.backward_step(&loss)?;
            loss.to_scalar::<f32>()?
        };

        self.n_opts += 1;

        Ok(Record::from_slice(&[
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            ("loss_value", RecordValue::Scalar(loss_value)),
            ("entropy", RecordValue::Scalar(entropy)),
        ]))
    }
}

impl<E, P, V, R> Configurable for A2c<E, P, V, R>
where
    E: Env,
    P: SubModel1<Output = (Tensor, Tensor)>,
    V: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
{
    type Config = A2cConfig<V::Config, P::Config>;

    /// Constructs an A2C agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the A2C agent")
            .into();
        let pi = GaussianActor::build(config.actor_config.clone(), device.clone()).unwrap();
        let vnet = ValueModel::build(config.value_config.clone(), device.clone()).unwrap();

        A2c {
            pi,
            vnet,
            gamma: config.gamma,
            ent_coef: config.ent_coef,
            min_lstd: config.actor_config.min_log_std,
            max_lstd: config.actor_config.max_log_std,
            train: config.train,
            n_opts: 0,
            device,
            phantom: PhantomData,
        }
    }
}

impl<E, P, V, R> Policy<E> for A2c<E, P, V, R>
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

impl<E, P, V, R> Agent<E, R> for A2c<E, P, V, R>
where
    E: Env,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    V: SubModel1<Input = Tensor, Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    V::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    R: uavnav_core::ExperienceBufferBase,
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
        if uavnav_core::ExperienceBufferBase::len(buffer) == 0 {
            return None;
        }
        Some(self.opt_(buffer).expect("Failed in A2c::opt_()"))
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

    fn agent_config() -> A2cConfig<MlpConfig, MlpConfig> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(4, vec![16], 2, Activation::None));
        let value_config = ValueModelConfig::default()
            .v_config(MlpConfig::new(4, vec![16], 1, Activation::None));
        A2cConfig::default()
            .actor_config(actor_config)
            .value_config(value_config)
            .ent_coef(0.01)
            .device(crate::Device::Cpu)
    }

    fn filled_rollout(n: usize) -> Buffer {
        let mut buffer = Buffer::build(&RolloutBufferConfig::default());
        for i in 0..n {
            let v = i as f32 / n as f32;
            let obs = Tensor::from_vec(vec![v; 4], &[1, 4], &candle_core::Device::Cpu).unwrap();
            let next_obs =
                Tensor::from_vec(vec![v + 0.1; 4], &[1, 4], &candle_core::Device::Cpu).unwrap();
            let act = Tensor::from_vec(vec![0.1f32, -0.1], &[1, 2], &candle_core::Device::Cpu)
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
        let mut agent: A2c<TestEnv, Mlp2, Mlp, Buffer> = A2c::build(agent_config());
        let mut buffer = filled_rollout(8);
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_actor").is_ok());
        assert!(record.get_scalar("loss_value").is_ok());
        assert_eq!(uavnav_core::ExperienceBufferBase::len(&buffer), 0);
    }

    #[test]
    fn opt_on_empty_rollout_is_skipped() {
        let mut agent: A2c<TestEnv, Mlp2, Mlp, Buffer> = A2c::build(agent_config());
        let mut buffer = Buffer::build(&RolloutBufferConfig::default());
        assert!(agent.opt(&mut buffer).is_none());
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut agent: A2c<TestEnv, Mlp2, Mlp, Buffer> = A2c::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![0.0, 0.5, -0.5, 1.0]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }
}
