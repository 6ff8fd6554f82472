use super::DdpgConfig;
use crate::{
    model::{SubModel1, SubModel2},
    util::{
        actor::GaussianActor, critic::Critic, gamma_not_done, smooth_l1_loss, track, CriticLoss,
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
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};

/// Deep deterministic policy gradient (DDPG) agent.
///
/// The actor is deterministic: the tanh-squashed mean of the policy
/// network. Gaussian exploration noise is added in training mode.
pub struct Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = Tensor>,
    P: SubModel1<Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) critic: Critic<Q>,
    pub(super) critic_tgt: Critic<Q>,
    pub(super) pi: GaussianActor<P>,
    pub(super) pi_tgt: GaussianActor<P>,
    pub(super) gamma: f64,
    pub(super) tau: f64,
    pub(super) action_noise: Option<f64>,
    pub(super) n_updates_per_opt: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) batch_size: usize,
    pub(super) train: bool,
    pub(super) n_opts: usize,
    pub(super) critic_loss: CriticLoss,
    pub(super) device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// Deterministic action of the given actor: the squashed mean.
    fn action(pi: &GaussianActor<P>, obs: &Tensor) -> Result<Tensor> {
        let (mean, _lstd) = pi.forward(obs);
        Ok(mean.tanh()?)
    }
}

impl<E, Q, P, R> Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor> + Clone,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    fn update_critic(&mut self, batch: R::Batch) -> Result<f32> {
        let loss = {
            let (obs, act, next_obs, reward, is_terminated, _is_truncated) = batch.unpack();
            let batch_size = reward.len();
            let obs = obs.into().to_device(&self.device)?;
            let act = act.into().to_device(&self.device)?;
            let next_obs = next_obs.into().to_device(&self.device)?;
            let reward = Tensor::from_slice(&reward[..], (batch_size,), &self.device)?;
            let gamma_not_done =
                gamma_not_done(self.gamma as f32, &is_terminated, &self.device)?;

            let pred = self.critic.forward(&obs, &act).squeeze(D::Minus1)?;
            let tgt = {
                let next_act = Self::action(&self.pi_tgt, &next_obs)?;
                let next_q = self
                    .critic_tgt
                    .forward(&next_obs, &next_act)
                    .squeeze(D::Minus1)?;
                (reward + (gamma_not_done * next_q)?)?
            }
            .detach();

            match self.critic_loss {
                CriticLoss::Mse => mse(&pred, &tgt)?,
                CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt)?,
            }
        };

        self.critic.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn update_actor(&mut self, batch: &R::Batch) -> Result<f32> {
        let loss = {
            let obs = batch.obs().clone().into().to_device(&self.device)?;
            let act = Self::action(&self.pi, &obs)?;
            let qval = self.critic.forward(&obs, &act).squeeze(D::Minus1)?;
            (qval.mean_all()? * -1f64)?
        };

        self.pi.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn soft_update(&mut self) -> Result<()> {
        track(self.critic_tgt.get_varmap(), self.critic.get_varmap(), self.tau)?;
        track(self.pi_tgt.get_varmap(), self.pi.get_varmap(), self.tau)?;
        Ok(())
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;

        for _ in 0..self.n_updates_per_opt {
            let batch = buffer.batch(self.batch_size)?;
            loss_actor += self.update_actor(&batch)?;
            loss_critic += self.update_critic(batch)?;
            self.soft_update()?;
            self.n_opts += 1;
        }

        loss_critic /= self.n_updates_per_opt as f32;
        loss_actor /= self.n_updates_per_opt as f32;

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
        ]))
    }
}

impl<E, Q, P, R> Configurable for Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = Tensor>,
    P: SubModel1<Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = DdpgConfig<Q::Config, P::Config>;

    /// Constructs a DDPG agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the DDPG agent")
            .into();
        let pi = GaussianActor::build(config.actor_config.clone(), device.clone()).unwrap();
        let pi_tgt = pi.clone();
        let critic = Critic::build(config.critic_config.clone(), device.clone()).unwrap();
        let critic_tgt = critic.clone();

        Ddpg {
            critic,
            critic_tgt,
            pi,
            pi_tgt,
            gamma: config.gamma,
            tau: config.tau,
            action_noise: config.action_noise,
            n_updates_per_opt: config.n_updates_per_opt,
            min_transitions_warmup: config.min_transitions_warmup,
            batch_size: config.batch_size,
            train: config.train,
            critic_loss: config.critic_loss,
            n_opts: 0,
            device,
            phantom: PhantomData,
        }
    }
}

impl<E, Q, P, R> Policy<E> for Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// The deterministic action, plus Gaussian exploration noise in
    /// training mode. Actions stay within `[-1, 1]`.
    fn sample(&mut self, obs: &E::Obs) -> E::Act {
        let obs = obs.clone().into();
        let act = Self::action(&self.pi, &obs).unwrap();
        let act = match (self.train, self.action_noise) {
            (true, Some(sigma)) => {
                let noise = (act.randn_like(0., 1.).unwrap() * sigma).unwrap();
                (act + noise).unwrap().clamp(-1f64, 1f64).unwrap()
            }
            _ => act,
        };
        act.into()
    }
}

impl<E, Q, P, R> Agent<E, R> for Ddpg<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = Tensor>,
    P: SubModel1<Input = Tensor, Output = (Tensor, Tensor)>,
    R: ReplayBufferBase + ExperienceBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor> + Clone,
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
            Some(self.opt_(buffer).expect("Failed in Ddpg::opt_()"))
        } else {
            None
        }
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let files = vec![
            path.join("critic.safetensors"),
            path.join("critic_tgt.safetensors"),
            path.join("pi.safetensors"),
            path.join("pi_tgt.safetensors"),
        ];
        self.critic.save(&files[0])?;
        self.critic_tgt.save(&files[1])?;
        self.pi.save(&files[2])?;
        self.pi_tgt.save(&files[3])?;
        Ok(files)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        self.critic.load(path.join("critic.safetensors"))?;
        self.critic_tgt.load(path.join("critic_tgt.safetensors"))?;
        self.pi.load(path.join("pi.safetensors"))?;
        self.pi_tgt.load(path.join("pi_tgt.safetensors"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        mlp::{Mlp, Mlp2, MlpConfig},
        testing::{fill_buffer, TestBuffer, TestEnv, TestObs},
        util::{actor::GaussianActorConfig, critic::CriticConfig},
        Activation,
    };
    use tempdir::TempDir;

    fn agent_config() -> DdpgConfig<MlpConfig, MlpConfig> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(4, vec![16], 2, Activation::None));
        let critic_config = CriticConfig::default()
            .q_config(MlpConfig::new(6, vec![16], 1, Activation::None));
        DdpgConfig::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .batch_size(8)
            .min_transitions_warmup(8)
            .device(crate::Device::Cpu)
    }

    #[test]
    fn opt_returns_losses() {
        let mut agent: Ddpg<TestEnv, Mlp, Mlp2, TestBuffer> = Ddpg::build(agent_config());
        let mut buffer = fill_buffer(4, 2, 16);
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_critic").is_ok());
        assert!(record.get_scalar("loss_actor").is_ok());
    }

    #[test]
    fn eval_action_ignores_noise() {
        let mut agent: Ddpg<TestEnv, Mlp, Mlp2, TestBuffer> = Ddpg::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![0.1, 0.2, 0.3, 0.4]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }

    #[test]
    fn save_load_roundtrip() -> Result<()> {
        let agent: Ddpg<TestEnv, Mlp, Mlp2, TestBuffer> = Ddpg::build(agent_config());
        let dir = TempDir::new("ddpg")?;
        let files = agent.save_params(dir.path())?;
        assert_eq!(files.len(), 4);

        let mut agent2: Ddpg<TestEnv, Mlp, Mlp2, TestBuffer> = Ddpg::build(agent_config());
        agent2.load_params(dir.path())?;
        Ok(())
    }
}
