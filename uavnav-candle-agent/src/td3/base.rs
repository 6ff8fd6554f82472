use super::Td3Config;
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

/// Twin delayed DDPG (TD3) agent.
///
/// Extends DDPG with twin critics taking the minimum in the backup,
/// clipped Gaussian smoothing noise on the target action, and delayed
/// actor updates.
pub struct Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = Tensor>,
    P: SubModel1<Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) qnets: Vec<Critic<Q>>,
    pub(super) qnets_tgt: Vec<Critic<Q>>,
    pub(super) pi: GaussianActor<P>,
    pub(super) pi_tgt: GaussianActor<P>,
    pub(super) gamma: f64,
    pub(super) tau: f64,
    pub(super) action_noise: Option<f64>,
    pub(super) policy_noise: f64,
    pub(super) noise_clip: f64,
    pub(super) policy_delay: usize,
    pub(super) n_updates_per_opt: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) batch_size: usize,
    pub(super) train: bool,
    pub(super) n_opts: usize,
    pub(super) critic_loss: CriticLoss,
    pub(super) device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Td3<E, Q, P, R>
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
    fn action(pi: &GaussianActor<P>, obs: &Tensor) -> Result<Tensor> {
        let (mean, _lstd) = pi.forward(obs);
        Ok(mean.tanh()?)
    }

    /// Target action with clipped smoothing noise, clamped to `[-1, 1]`.
    fn target_action(&self, next_obs: &Tensor) -> Result<Tensor> {
        let act = Self::action(&self.pi_tgt, next_obs)?;
        let noise = (act.randn_like(0., 1.)? * self.policy_noise)?
            .clamp(-self.noise_clip, self.noise_clip)?;
        Ok((act + noise)?.clamp(-1f64, 1f64)?)
    }

    fn qvals_min(&self, qnets: &[Critic<Q>], obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let qvals: Vec<_> = qnets
            .iter()
            .map(|qnet| qnet.forward(obs, act).squeeze(D::Minus1).unwrap())
            .collect();
        Ok(Tensor::stack(&qvals, 0)?.min(0)?)
    }

    fn update_critics(&mut self, batch: R::Batch) -> Result<f32> {
        let losses = {
            let (obs, act, next_obs, reward, is_terminated, _is_truncated) = batch.unpack();
            let batch_size = reward.len();
            let obs = obs.into().to_device(&self.device)?;
            let act = act.into().to_device(&self.device)?;
            let next_obs = next_obs.into().to_device(&self.device)?;
            let reward = Tensor::from_slice(&reward[..], (batch_size,), &self.device)?;
            let gamma_not_done =
                gamma_not_done(self.gamma as f32, &is_terminated, &self.device)?;

            let tgt = {
                let next_act = self.target_action(&next_obs)?;
                let next_q = self.qvals_min(&self.qnets_tgt, &next_obs, &next_act)?;
                (reward + (gamma_not_done * next_q)?)?
            }
            .detach();

            self.qnets
                .iter()
                .map(|qnet| {
                    let pred = qnet.forward(&obs, &act).squeeze(D::Minus1).unwrap();
                    match self.critic_loss {
                        CriticLoss::Mse => mse(&pred, &tgt).unwrap(),
                        CriticLoss::SmoothL1 => smooth_l1_loss(&pred, &tgt).unwrap(),
                    }
                })
                .collect::<Vec<_>>()
        };

        for (qnet, loss) in self.qnets.iter_mut().zip(&losses) {
            qnet.backward_step(loss)?;
        }

        Ok(losses
            .iter()
            .map(|loss| loss.to_scalar::<f32>().unwrap())
            .sum::<f32>()
            / (self.qnets.len() as f32))
    }

    fn update_actor(&mut self, batch: &R::Batch) -> Result<f32> {
        let loss = {
            let obs = batch.obs().clone().into().to_device(&self.device)?;
            let act = Self::action(&self.pi, &obs)?;
            let qval = self.qnets[0].forward(&obs, &act).squeeze(D::Minus1)?;
            (qval.mean_all()? * -1f64)?
        };

        self.pi.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn soft_update(&mut self) -> Result<()> {
        for (qnet_tgt, qnet) in self.qnets_tgt.iter().zip(&self.qnets) {
            track(qnet_tgt.get_varmap(), qnet.get_varmap(), self.tau)?;
        }
        track(self.pi_tgt.get_varmap(), self.pi.get_varmap(), self.tau)?;
        Ok(())
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;
        let mut n_actor_updates = 0;

        for _ in 0..self.n_updates_per_opt {
            let batch = buffer.batch(self.batch_size)?;

            // Delayed actor updates.
            if self.n_opts % self.policy_delay == 0 {
                loss_actor += self.update_actor(&batch)?;
                n_actor_updates += 1;
            }

            loss_critic += self.update_critics(batch)?;
            self.soft_update()?;
            self.n_opts += 1;
        }

        loss_critic /= self.n_updates_per_opt as f32;
        let mut record =
            Record::from_slice(&[("loss_critic", RecordValue::Scalar(loss_critic))]);
        if n_actor_updates > 0 {
            record.insert(
                "loss_actor",
                RecordValue::Scalar(loss_actor / n_actor_updates as f32),
            );
        }

        Ok(record)
    }
}

impl<E, Q, P, R> Configurable for Td3<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = Tensor>,
    P: SubModel1<Output = (Tensor, Tensor)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = Td3Config<Q::Config, P::Config>;

    /// Constructs a TD3 agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the TD3 agent")
            .into();
        let pi = GaussianActor::build(config.actor_config.clone(), device.clone()).unwrap();
        let pi_tgt = pi.clone();
        let mut qnets = vec![];
        let mut qnets_tgt = vec![];
        for _ in 0..config.n_critics {
            let qnet = Critic::build(config.critic_config.clone(), device.clone()).unwrap();
            qnets_tgt.push(qnet.clone());
            qnets.push(qnet);
        }

        Td3 {
            qnets,
            qnets_tgt,
            pi,
            pi_tgt,
            gamma: config.gamma,
            tau: config.tau,
            action_noise: config.action_noise,
            policy_noise: config.policy_noise,
            noise_clip: config.noise_clip,
            policy_delay: config.policy_delay,
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

impl<E, Q, P, R> Policy<E> for Td3<E, Q, P, R>
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

impl<E, Q, P, R> Agent<E, R> for Td3<E, Q, P, R>
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
            Some(self.opt_(buffer).expect("Failed in Td3::opt_()"))
        } else {
            None
        }
    }

    fn save_params(&self, path: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(path)?;
        let mut files = vec![];
        for (i, (qnet, qnet_tgt)) in self.qnets.iter().zip(&self.qnets_tgt).enumerate() {
            let f1 = path.join(format!("qnet_{}.safetensors", i));
            let f2 = path.join(format!("qnet_tgt_{}.safetensors", i));
            qnet.save(&f1)?;
            qnet_tgt.save(&f2)?;
            files.push(f1);
            files.push(f2);
        }
        let pi = path.join("pi.safetensors");
        let pi_tgt = path.join("pi_tgt.safetensors");
        self.pi.save(&pi)?;
        self.pi_tgt.save(&pi_tgt)?;
        files.push(pi);
        files.push(pi_tgt);
        Ok(files)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        for (i, (qnet, qnet_tgt)) in self.qnets.iter_mut().zip(&mut self.qnets_tgt).enumerate() {
            qnet.load(path.join(format!("qnet_{}.safetensors", i)))?;
            qnet_tgt.load(path.join(format!("qnet_tgt_{}.safetensors", i)))?;
        }
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

    fn agent_config() -> Td3Config<MlpConfig, MlpConfig> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(4, vec![16], 2, Activation::None));
        let critic_config = CriticConfig::default()
            .q_config(MlpConfig::new(6, vec![16], 1, Activation::None));
        Td3Config::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .batch_size(8)
            .min_transitions_warmup(8)
            .policy_delay(2)
            .device(crate::Device::Cpu)
    }

    #[test]
    fn actor_update_is_delayed() {
        let mut agent: Td3<TestEnv, Mlp, Mlp2, TestBuffer> = Td3::build(agent_config());
        let mut buffer = fill_buffer(4, 2, 16);

        // First opt: n_opts == 0, actor updated.
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_actor").is_ok());

        // Second opt: n_opts == 1, actor update skipped.
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_actor").is_err());
    }

    #[test]
    fn eval_action_is_deterministic() {
        let mut agent: Td3<TestEnv, Mlp, Mlp2, TestBuffer> = Td3::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![0.5, -0.5, 0.0, 1.0]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }
}
