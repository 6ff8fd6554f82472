//! DQN agent.
use super::{config::DqnConfig, explorer::DqnExplorer, model::DqnModel};
use crate::{
    model::SubModel1,
    util::{gamma_not_done, smooth_l1_loss, track, CriticLoss, OutDim},
};
use anyhow::Result;
use candle_core::{shape::D, DType, Device, Tensor};
use candle_nn::loss::mse;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path, path::PathBuf};
use uavnav_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};

#[allow(clippy::upper_case_acronyms)]
/// Deep Q-network agent.
///
/// Discrete actions; the Q-network and its target network share the same
/// sub-model type `Q`.
pub struct Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(in crate::dqn) soft_update_interval: usize,
    pub(in crate::dqn) soft_update_counter: usize,
    pub(in crate::dqn) n_updates_per_opt: usize,
    pub(in crate::dqn) min_transitions_warmup: usize,
    pub(in crate::dqn) batch_size: usize,
    pub(in crate::dqn) qnet: DqnModel<Q>,
    pub(in crate::dqn) qnet_tgt: DqnModel<Q>,
    pub(in crate::dqn) train: bool,
    pub(in crate::dqn) discount_factor: f64,
    pub(in crate::dqn) tau: f64,
    pub(in crate::dqn) explorer: DqnExplorer,
    pub(in crate::dqn) device: Device,
    pub(in crate::dqn) n_opts: usize,
    pub(in crate::dqn) double_dqn: bool,
    pub(in crate::dqn) critic_loss: CriticLoss,
    rng: SmallRng,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, R> Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Q::Input>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Q::Input>,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update_critic(&mut self, buffer: &mut R) -> Result<f32> {
        let batch = buffer.batch(self.batch_size)?;
        let (obs, act, next_obs, reward, is_terminated, _is_truncated) = batch.unpack();
        let obs = obs.into();
        let act = act.into().to_device(&self.device)?;
        let next_obs = next_obs.into();
        let reward = Tensor::from_slice(&reward[..], (reward.len(),), &self.device)?;
        let gamma_not_done = gamma_not_done(
            self.discount_factor as f32,
            &is_terminated,
            &self.device,
        )?;

        let pred = {
            let x = self.qnet.forward(&obs);
            x.gather(&act, D::Minus1)?.squeeze(D::Minus1)?
        };

        let tgt = {
            let q = if self.double_dqn {
                // Select the next action with the online network, evaluate
                // it with the target network.
                let x = self.qnet.forward(&next_obs);
                let y = x.argmax(D::Minus1)?.unsqueeze(D::Minus1)?;
                let tgt = self.qnet_tgt.forward(&next_obs);
                tgt.gather(&y, D::Minus1)?.squeeze(D::Minus1)?
            } else {
                let x = self.qnet_tgt.forward(&next_obs);
                let y = x.argmax(D::Minus1)?.unsqueeze(D::Minus1)?;
                x.gather(&y, D::Minus1)?.squeeze(D::Minus1)?
            };

            (reward + (gamma_not_done * q)?)?
        }
        .detach();

        let loss = match self.critic_loss {
            CriticLoss::Mse => mse(&pred, &tgt)?,
            CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
        };

        self.qnet.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;

        for _ in 0..self.n_updates_per_opt {
            loss_critic += self.update_critic(buffer)?;
        }

        self.soft_update_counter += 1;
        if self.soft_update_counter == self.soft_update_interval {
            self.soft_update_counter = 0;
            track(self.qnet_tgt.get_varmap(), self.qnet.get_varmap(), self.tau)?;
        }

        loss_critic /= self.n_updates_per_opt as f32;
        self.n_opts += 1;

        Ok(Record::from_slice(&[(
            "loss_critic",
            RecordValue::Scalar(loss_critic),
        )]))
    }
}

impl<E, Q, R> Configurable for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = DqnConfig<Q::Config>;

    /// Constructs a DQN agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the DQN agent")
            .into();
        let qnet = DqnModel::build(config.model_config.clone(), device.clone()).unwrap();
        let qnet_tgt = qnet.clone();
        let seed = config.seed.unwrap_or(42) as u64;

        Dqn {
            qnet,
            qnet_tgt,
            soft_update_interval: config.soft_update_interval,
            soft_update_counter: 0,
            n_updates_per_opt: config.n_updates_per_opt,
            min_transitions_warmup: config.min_transitions_warmup,
            batch_size: config.batch_size,
            discount_factor: config.discount_factor,
            tau: config.tau,
            train: config.train,
            explorer: config.explorer,
            device,
            n_opts: 0,
            double_dqn: config.double_dqn,
            critic_loss: config.critic_loss,
            rng: SmallRng::seed_from_u64(seed),
            phantom: PhantomData,
        }
    }
}

impl<E, Q, R> Policy<E> for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Output = Tensor>,
    R: ReplayBufferBase,
    E::Obs: Into<Q::Input>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// In training mode, actions are taken with the explorer; in
    /// evaluation mode, the greedy action is taken.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let a = self.qnet.forward(&obs.clone().into());
        let a = if self.train {
            match &mut self.explorer {
                DqnExplorer::Softmax(softmax) => softmax.action(&a, &mut self.rng),
                DqnExplorer::EpsilonGreedy(egreedy) => egreedy.action(&a, &mut self.rng),
            }
        } else {
            a.argmax(D::Minus1).unwrap().to_dtype(DType::I64).unwrap()
        };
        a.into()
    }
}

impl<E, Q, R> Agent<E, R> for Dqn<E, Q, R>
where
    E: Env,
    Q: SubModel1<Output = Tensor>,
    R: ReplayBufferBase + ExperienceBufferBase,
    E::Obs: Into<Q::Input>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Q::Input>,
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
        if buffer.len() >= self.min_transitions_warmup {
            Some(self.opt_(buffer).expect("Failed in Dqn::opt_()"))
        } else {
            None
        }
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let qnet = path.join("qnet.safetensors");
        let qnet_tgt = path.join("qnet_tgt.safetensors");
        self.qnet.save(&qnet)?;
        self.qnet_tgt.save(&qnet_tgt)?;
        Ok(vec![qnet, qnet_tgt])
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.qnet.load(path.join("qnet.safetensors"))?;
        self.qnet_tgt.load(path.join("qnet_tgt.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dqn::DqnModelConfig,
        mlp::{Mlp, MlpConfig},
        testing::{fill_buffer_discrete, TestBuffer, TestEnv, TestObs},
        Activation,
    };
    use tempdir::TempDir;

    fn agent_config() -> DqnConfig<MlpConfig> {
        let mlp_config = MlpConfig::new(4, vec![16], 3, Activation::None);
        let model_config = DqnModelConfig::default().q_config(mlp_config);
        DqnConfig::default()
            .model_config(model_config)
            .batch_size(8)
            .min_transitions_warmup(8)
            .device(crate::Device::Cpu)
    }

    #[test]
    fn opt_waits_for_warmup() {
        let mut agent: Dqn<TestEnv, Mlp, TestBuffer> = Dqn::build(agent_config());
        let mut buffer = fill_buffer_discrete(4, 3, 4);
        assert!(agent.opt(&mut buffer).is_none());

        let mut buffer = fill_buffer_discrete(4, 3, 16);
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_critic").is_ok());
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut agent: Dqn<TestEnv, Mlp, TestBuffer> = Dqn::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![0.3, -0.1, 0.7, 0.0]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }

    #[test]
    fn save_load_roundtrip() -> Result<()> {
        let agent: Dqn<TestEnv, Mlp, TestBuffer> = Dqn::build(agent_config());
        let dir = TempDir::new("dqn")?;
        let files = agent.save_params(dir.path())?;
        assert_eq!(files.len(), 2);

        let mut agent2: Dqn<TestEnv, Mlp, TestBuffer> = Dqn::build(agent_config());
        agent2.load_params(dir.path())?;
        Ok(())
    }
}
