use super::{EntCoef, SacConfig};
use crate::{
    model::{SubModel1, SubModel2},
    util::{
        actor::GaussianActor,
        critic::Critic,
        gamma_not_done, normal_logp, smooth_l1_loss, track, CriticLoss, OutDim,
    },
};
use anyhow::Result;
use candle_core::{Device, Tensor, D};
use candle_nn::loss::mse;
use log::trace;
use serde::{de::DeserializeOwned, Serialize};
use std::{fs, marker::PhantomData, path::Path, path::PathBuf};
use uavnav_core::{
    record::{Record, RecordValue},
    Agent, Configurable, Env, ExperienceBufferBase, Policy, ReplayBufferBase, TransitionBatch,
};

type ActionValue = Tensor;
type ActMean = Tensor;
type ActStd = Tensor;

/// Soft actor-critic (SAC) agent.
///
/// The actor emits a tanh-squashed Gaussian; the critics are twin
/// action-value networks whose minimum is used in the soft backup.
pub struct Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = ActionValue>,
    P: SubModel1<Output = (ActMean, ActStd)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    pub(super) qnets: Vec<Critic<Q>>,
    pub(super) qnets_tgt: Vec<Critic<Q>>,
    pub(super) pi: GaussianActor<P>,
    pub(super) gamma: f64,
    pub(super) tau: f64,
    pub(super) ent_coef: EntCoef,
    pub(super) epsilon: f64,
    pub(super) min_lstd: f64,
    pub(super) max_lstd: f64,
    pub(super) n_updates_per_opt: usize,
    pub(super) min_transitions_warmup: usize,
    pub(super) batch_size: usize,
    pub(super) train: bool,
    pub(super) reward_scale: f32,
    pub(super) n_opts: usize,
    pub(super) critic_loss: CriticLoss,
    pub(super) device: Device,
    phantom: PhantomData<(E, R)>,
}

impl<E, Q, P, R> Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
    R::Batch: TransitionBatch,
    <R::Batch as TransitionBatch>::ObsBatch: Into<Tensor> + Clone,
    <R::Batch as TransitionBatch>::ActBatch: Into<Tensor>,
{
    /// Returns an action and its log probability under the squashed
    /// Normal distribution.
    fn action_logp(&self, o: &Tensor) -> Result<(Tensor, Tensor)> {
        let (mean, lstd) = self.pi.forward(o);
        let std = lstd.clamp(self.min_lstd, self.max_lstd)?.exp()?;
        let z = Tensor::randn(0f32, 1f32, mean.dims(), &self.device)?;
        let a = ((&std * &z)? + &mean)?.tanh()?;
        let log_p = (normal_logp(&z)?
            - ((1f64 - a.powf(2.0)?)? + self.epsilon)?
                .log()?
                .sum(D::Minus1)?)?;

        Ok((a, log_p))
    }

    fn qvals(&self, qnets: &[Critic<Q>], obs: &Tensor, act: &Tensor) -> Vec<Tensor> {
        qnets
            .iter()
            .map(|qnet| qnet.forward(obs, act).squeeze(D::Minus1).unwrap())
            .collect()
    }

    /// Returns the minimum over critics of the action values.
    fn qvals_min(&self, qnets: &[Critic<Q>], obs: &Tensor, act: &Tensor) -> Result<Tensor> {
        let qvals = self.qvals(qnets, obs, act);
        let qvals = Tensor::stack(&qvals, 0)?;
        let qvals_min = qvals.min(0)?;

        Ok(qvals_min)
    }

    fn update_critic(&mut self, batch: R::Batch) -> Result<f32> {
        let losses = {
            let (obs, act, next_obs, reward, is_terminated, _is_truncated) = batch.unpack();
            let batch_size = reward.len();
            let obs = obs.into().to_device(&self.device)?;
            let act = act.into().to_device(&self.device)?;
            let next_obs = next_obs.into().to_device(&self.device)?;
            let reward = Tensor::from_slice(&reward[..], (batch_size,), &self.device)?;
            let gamma_not_done =
                gamma_not_done(self.gamma as f32, &is_terminated, &self.device)?;

            let preds = self.qvals(&self.qnets, &obs, &act);
            let tgt = {
                let next_q = {
                    let (next_a, next_log_p) = self.action_logp(&next_obs)?;
                    let next_q = self.qvals_min(&self.qnets_tgt, &next_obs, &next_a)?;
                    (next_q - self.ent_coef.alpha()?.broadcast_mul(&next_log_p)?)?
                };
                (((self.reward_scale as f64) * reward)? + (gamma_not_done * next_q)?)?
            }
            .detach();

            let losses: Vec<_> = match self.critic_loss {
                CriticLoss::Mse => preds
                    .iter()
                    .map(|pred| mse(pred, &tgt).unwrap())
                    .collect(),
                CriticLoss::SmoothL1 => preds
                    .iter()
                    .map(|pred| smooth_l1_loss(pred, &tgt).unwrap())
                    .collect(),
            };
            losses
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
            let (act, log_p) = self.action_logp(&obs)?;

            // Update the entropy coefficient
            self.ent_coef.update(&log_p)?;

            let qval = self.qvals_min(&self.qnets, &obs, &act)?;
            (self.ent_coef.alpha()?.broadcast_mul(&log_p)? - &qval)?.mean_all()?
        };

        self.pi.backward_step(&loss)?;

        Ok(loss.to_scalar::<f32>()?)
    }

    fn soft_update(&mut self) -> Result<()> {
        for (qnet_tgt, qnet) in self.qnets_tgt.iter().zip(&self.qnets) {
            track(qnet_tgt.get_varmap(), qnet.get_varmap(), self.tau)?;
        }
        Ok(())
    }

    fn opt_(&mut self, buffer: &mut R) -> Result<Record> {
        let mut loss_critic = 0f32;
        let mut loss_actor = 0f32;

        for _ in 0..self.n_updates_per_opt {
            trace!("batch()");
            let batch = buffer.batch(self.batch_size)?;

            trace!("update_actor()");
            loss_actor += self.update_actor(&batch)?;

            trace!("update_critic()");
            loss_critic += self.update_critic(batch)?;

            trace!("soft_update()");
            self.soft_update()?;

            self.n_opts += 1;
        }

        loss_critic /= self.n_updates_per_opt as f32;
        loss_actor /= self.n_updates_per_opt as f32;

        Ok(Record::from_slice(&[
            ("loss_critic", RecordValue::Scalar(loss_critic)),
            ("loss_actor", RecordValue::Scalar(loss_actor)),
            (
                "ent_coef",
                RecordValue::Scalar(self.ent_coef.alpha()?.to_vec1::<f32>()?[0]),
            ),
        ]))
    }
}

impl<E, Q, P, R> Configurable for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Output = ActionValue>,
    P: SubModel1<Output = (ActMean, ActStd)>,
    R: ReplayBufferBase,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    type Config = SacConfig<Q::Config, P::Config>;

    /// Constructs a SAC agent.
    fn build(config: Self::Config) -> Self {
        let device: Device = config
            .device
            .expect("No device is given for the SAC agent")
            .into();
        let n_critics = config.n_critics;
        let pi = GaussianActor::build(config.actor_config.clone(), device.clone()).unwrap();
        let mut qnets = vec![];
        let mut qnets_tgt = vec![];
        for _ in 0..n_critics {
            let qnet = Critic::build(config.critic_config.clone(), device.clone()).unwrap();
            qnets_tgt.push(qnet.clone());
            qnets.push(qnet);
        }

        Sac {
            qnets,
            qnets_tgt,
            pi,
            gamma: config.gamma,
            tau: config.tau,
            ent_coef: EntCoef::new(config.ent_coef_mode, device.clone()).unwrap(),
            epsilon: config.epsilon,
            min_lstd: config.actor_config.min_log_std,
            max_lstd: config.actor_config.max_log_std,
            n_updates_per_opt: config.n_updates_per_opt,
            min_transitions_warmup: config.min_transitions_warmup,
            batch_size: config.batch_size,
            train: config.train,
            reward_scale: config.reward_scale,
            critic_loss: config.critic_loss,
            n_opts: 0,
            device,
            phantom: PhantomData,
        }
    }
}

impl<E, Q, P, R> Policy<E> for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
    R: ReplayBufferBase,
    E::Obs: Into<Tensor>,
    E::Act: From<Tensor>,
    Q::Config: DeserializeOwned + Serialize + std::fmt::Debug + PartialEq + Clone,
    P::Config: DeserializeOwned + Serialize + OutDim + std::fmt::Debug + PartialEq + Clone,
{
    /// In training mode the action is sampled from the squashed Gaussian;
    /// in evaluation mode the squashed mean is returned.
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
        act.tanh().unwrap().into()
    }
}

impl<E, Q, P, R> Agent<E, R> for Sac<E, Q, P, R>
where
    E: Env,
    Q: SubModel2<Input1 = Tensor, Input2 = Tensor, Output = ActionValue>,
    P: SubModel1<Input = Tensor, Output = (ActMean, ActStd)>,
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
            Some(self.opt_(buffer).expect("Failed in Sac::opt_()"))
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
        let ent_coef = path.join("ent_coef.safetensors");
        self.pi.save(&pi)?;
        self.ent_coef.save(&ent_coef)?;
        files.push(pi);
        files.push(ent_coef);
        Ok(files)
    }

    fn load_params(&mut self, path: &Path) -> Result<()> {
        for (i, (qnet, qnet_tgt)) in self.qnets.iter_mut().zip(&mut self.qnets_tgt).enumerate() {
            qnet.load(path.join(format!("qnet_{}.safetensors", i)))?;
            qnet_tgt.load(path.join(format!("qnet_tgt_{}.safetensors", i)))?;
        }
        self.pi.load(path.join("pi.safetensors"))?;
        self.ent_coef.load(path.join("ent_coef.safetensors"))?;
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

    fn agent_config() -> SacConfig<MlpConfig, MlpConfig> {
        let actor_config = GaussianActorConfig::default()
            .policy_config(MlpConfig::new(4, vec![16], 2, Activation::None));
        let critic_config = CriticConfig::default()
            .q_config(MlpConfig::new(6, vec![16], 1, Activation::None));
        SacConfig::default()
            .actor_config(actor_config)
            .critic_config(critic_config)
            .batch_size(8)
            .min_transitions_warmup(8)
            .device(crate::Device::Cpu)
    }

    #[test]
    fn opt_returns_losses() {
        let mut agent: Sac<TestEnv, Mlp, Mlp2, TestBuffer> = Sac::build(agent_config());
        let mut buffer = fill_buffer(4, 2, 16);
        let record = agent.opt(&mut buffer).unwrap();
        assert!(record.get_scalar("loss_critic").is_ok());
        assert!(record.get_scalar("loss_actor").is_ok());
    }

    #[test]
    fn eval_mode_is_deterministic() {
        let mut agent: Sac<TestEnv, Mlp, Mlp2, TestBuffer> = Sac::build(agent_config());
        agent.eval();
        let obs = TestObs(vec![0.1, 0.2, 0.3, 0.4]);
        let a1 = agent.sample(&obs);
        let a2 = agent.sample(&obs);
        assert_eq!(a1.0, a2.0);
    }

    #[test]
    fn actions_are_squashed() {
        let mut agent: Sac<TestEnv, Mlp, Mlp2, TestBuffer> = Sac::build(agent_config());
        agent.eval();
        let act = agent.sample(&TestObs(vec![10.0, -3.0, 8.0, 1.0]));
        for a in act.0 {
            assert!((-1.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn save_load_roundtrip() -> Result<()> {
        let agent: Sac<TestEnv, Mlp, Mlp2, TestBuffer> = Sac::build(agent_config());
        let dir = TempDir::new("sac")?;
        let files = agent.save_params(dir.path())?;
        assert_eq!(files.len(), 6);

        let mut agent2: Sac<TestEnv, Mlp, Mlp2, TestBuffer> = Sac::build(agent_config());
        agent2.load_params(dir.path())?;
        Ok(())
    }
}
