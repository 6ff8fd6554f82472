//! Command line driver: trains or evaluates an RL policy flying a
//! simulated UAV to a 3D target position.
use anyhow::{ensure, Result};
use clap::Parser;
use log::info;
use std::env;
use uavnav::{artifact::ArtifactStore, hyper::HyperParams, total_timesteps, Algo};
use uavnav_candle_agent::{
    a2c::{A2c, A2cConfig},
    cnn::{Cnn, CnnConfig, CnnGaussian, CnnGaussianConfig, CnnQ, CnnQConfig},
    ddpg::{Ddpg, DdpgConfig},
    dqn::{Dqn, DqnConfig, DqnModelConfig},
    opt::OptimizerConfig,
    ppo::{Ppo, PpoConfig},
    sac::{EntCoefMode, Sac, SacConfig},
    td3::{Td3, Td3Config},
    util::{actor::GaussianActorConfig, critic::CriticConfig, value::ValueModelConfig},
    Device, TensorBatch,
};
use uavnav_core::{
    generic_replay_buffer::{
        GenericTransitionBatch, RolloutBuffer, RolloutBufferConfig, SimpleReplayBuffer,
        SimpleReplayBufferConfig, SimpleStepProcessor, SimpleStepProcessorConfig,
    },
    record::Recorder,
    Agent, Configurable, Env as _, Evaluator as _, ExperienceBufferBase, ReplayBufferBase,
    StepEvaluator, StepProcessor as _, Trainer, TrainerConfig,
};
use uavnav_drone_env::{registry, DroneEnv, DroneEnvConfig, SimClient};
use uavnav_mlflow_tracking::MlflowTrackingClient;
use uavnav_tensorboard::TensorboardRecorder;

type Env = DroneEnv;
type StepProc = SimpleStepProcessor<Env, TensorBatch, TensorBatch>;
type ReplayBuffer = SimpleReplayBuffer<TensorBatch, TensorBatch>;
type RolloutBuf = RolloutBuffer<TensorBatch, TensorBatch>;

const ENV_ID: &str = "DroneSim-v1";
/// Camera image shape as `(height, width, channels)`.
const IMG_SHAPE: [usize; 3] = [80, 80, 1];
const TARGET: [f32; 3] = [30.0, -30.0, -5.0];
const ACT_DIM: i64 = 3;
const N_DISCRETE_ACTIONS: i64 = 7;
const MODEL_DIR: &str = "model";
const DATA_DIR: &str = "data";
const SIM_ADDR: &str = "127.0.0.1:4560";
const TRACKING_URL: &str = "http://localhost:8080";
const PROJECT: &str = "UAV";
/// Rollout lengths of the on-policy algorithms, in environment steps.
const A2C_N_STEPS: usize = 16;
const PPO_N_STEPS: usize = 128;
const PPO_MINIBATCH: usize = 64;

/// Train or evaluate RL policies flying a simulated UAV to a target
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Algorithm to train or evaluate
    #[arg(long, value_enum)]
    model: Algo,

    /// Steps per episode
    #[arg(long)]
    steps_per_ep: usize,

    /// Evaluate the most recent saved model instead of training
    #[arg(short = 'p', long, default_value_t = false)]
    predict: bool,

    /// Write a checkpoint bundle every given number of environment steps
    #[arg(long)]
    checkpoint_interval: Option<usize>,
}

fn opt_config(hp: &HyperParams) -> OptimizerConfig {
    OptimizerConfig::default().learning_rate(hp.learning_rate)
}

fn cnn_config(out_dim: i64) -> CnnConfig {
    CnnConfig::new(
        IMG_SHAPE[2] as i64,
        IMG_SHAPE[0] as i64,
        IMG_SHAPE[1] as i64,
        out_dim,
    )
}

fn actor_config(hp: &HyperParams) -> GaussianActorConfig<CnnGaussianConfig> {
    let policy = CnnGaussianConfig::new(
        IMG_SHAPE[2] as i64,
        IMG_SHAPE[0] as i64,
        IMG_SHAPE[1] as i64,
        ACT_DIM,
    );
    GaussianActorConfig::default()
        .policy_config(policy)
        .opt_config(opt_config(hp))
}

fn critic_config(hp: &HyperParams) -> CriticConfig<CnnQConfig> {
    let q = CnnQConfig::new(
        IMG_SHAPE[2] as i64,
        IMG_SHAPE[0] as i64,
        IMG_SHAPE[1] as i64,
        ACT_DIM,
    );
    CriticConfig::default()
        .q_config(q)
        .opt_config(opt_config(hp))
}

fn value_config(hp: &HyperParams) -> ValueModelConfig<CnnConfig> {
    ValueModelConfig::default()
        .v_config(cnn_config(1))
        .opt_config(opt_config(hp))
}

fn dqn_config(hp: &HyperParams, device: Device) -> DqnConfig<CnnConfig> {
    let model_config = DqnModelConfig::default()
        .q_config(cnn_config(N_DISCRETE_ACTIONS))
        .opt_config(opt_config(hp));
    let mut config = DqnConfig::default()
        .model_config(model_config)
        .batch_size(hp.batch_size)
        .min_transitions_warmup(hp.learning_starts)
        .n_updates_per_opt(hp.n_updates_per_opt())
        .discount_factor(hp.gamma)
        .tau(hp.tau)
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn sac_config(hp: &HyperParams, device: Device) -> SacConfig<CnnQConfig, CnnGaussianConfig> {
    let mut config = SacConfig::default()
        .actor_config(actor_config(hp))
        .critic_config(critic_config(hp))
        .batch_size(hp.batch_size)
        .min_transitions_warmup(hp.learning_starts)
        .n_updates_per_opt(hp.n_updates_per_opt())
        .gamma(hp.gamma)
        .tau(hp.tau)
        .ent_coef_mode(EntCoefMode::Auto(-(ACT_DIM as f64), hp.learning_rate))
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn ddpg_config(hp: &HyperParams, device: Device) -> DdpgConfig<CnnQConfig, CnnGaussianConfig> {
    let mut config = DdpgConfig::default()
        .actor_config(actor_config(hp))
        .critic_config(critic_config(hp))
        .batch_size(hp.batch_size)
        .min_transitions_warmup(hp.learning_starts)
        .n_updates_per_opt(hp.n_updates_per_opt())
        .gamma(hp.gamma)
        .tau(hp.tau)
        .action_noise(hp.action_noise)
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn td3_config(hp: &HyperParams, device: Device) -> Td3Config<CnnQConfig, CnnGaussianConfig> {
    let mut config = Td3Config::default()
        .actor_config(actor_config(hp))
        .critic_config(critic_config(hp))
        .batch_size(hp.batch_size)
        .min_transitions_warmup(hp.learning_starts)
        .n_updates_per_opt(hp.n_updates_per_opt())
        .gamma(hp.gamma)
        .tau(hp.tau)
        .action_noise(hp.action_noise)
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn a2c_config(hp: &HyperParams, device: Device) -> A2cConfig<CnnConfig, CnnGaussianConfig> {
    let mut config = A2cConfig::default()
        .actor_config(actor_config(hp))
        .value_config(value_config(hp))
        .gamma(hp.gamma)
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn ppo_config(hp: &HyperParams, device: Device) -> PpoConfig<CnnConfig, CnnGaussianConfig> {
    let mut config = PpoConfig::default()
        .actor_config(actor_config(hp))
        .value_config(value_config(hp))
        .gamma(hp.gamma)
        .batch_size(PPO_MINIBATCH.min(hp.batch_size))
        .device(device);
    if let Some(seed) = hp.seed {
        config = config.seed(seed);
    }
    config
}

fn replay_buffer_config(hp: &HyperParams) -> SimpleReplayBufferConfig {
    let mut config = SimpleReplayBufferConfig::default().capacity(hp.buffer_size);
    if let Some(seed) = hp.seed {
        config = config.seed(seed as u64);
    }
    config
}

fn trainer_config(
    algo: Algo,
    steps_per_ep: usize,
    checkpoint_interval: Option<usize>,
    warmup_period: usize,
    opt_interval: usize,
) -> TrainerConfig {
    let mut config = TrainerConfig::default()
        .max_steps(total_timesteps(steps_per_ep))
        .opt_interval(opt_interval)
        .warmup_period(warmup_period)
        .flush_record_interval(1000)
        .record_compute_cost_interval(1000);

    if let Some(interval) = checkpoint_interval {
        let dir = ArtifactStore::new(MODEL_DIR).checkpoint_dir(algo.name());
        config = config.checkpointing(interval, dir.to_string_lossy(), algo.name());
    }

    config
}

/// Runs a training session and saves the final artifact.
fn run_training<R>(
    algo: Algo,
    agent: &mut Box<dyn Agent<Env, R>>,
    buffer: &mut R,
    env: Env,
    trainer_config: TrainerConfig,
) -> Result<()>
where
    R: ExperienceBufferBase<Item = GenericTransitionBatch<TensorBatch, TensorBatch>>
        + ReplayBufferBase,
{
    let logdir = format!("{}/{}", DATA_DIR, algo.name().to_uppercase());
    let mut recorder: Box<dyn Recorder> = Box::new(TensorboardRecorder::new(logdir, "opt_steps"));
    let mut trainer = Trainer::build(trainer_config);
    let step_proc = StepProc::build(&SimpleStepProcessorConfig::default());

    trainer.train(env, step_proc, agent, buffer, &mut recorder)?;

    // One artifact per successful run, stamped after training finished.
    let artifact = ArtifactStore::new(MODEL_DIR).create(algo.name())?;
    agent.save_params(&artifact)?;
    info!("Saved the trained model in {:?}", artifact);

    Ok(())
}

fn train(args: &Args, hp: &HyperParams, device: Device) -> Result<()> {
    let algo = args.model;
    let env = registry::make(ENV_ID)?;
    let off_policy_cfg = |warmup| {
        trainer_config(
            algo,
            args.steps_per_ep,
            args.checkpoint_interval,
            warmup,
            hp.train_freq,
        )
    };
    let on_policy_cfg = |n_steps| {
        trainer_config(algo, args.steps_per_ep, args.checkpoint_interval, 0, n_steps)
    };

    match algo {
        Algo::Dqn => {
            let mut agent: Box<dyn Agent<Env, ReplayBuffer>> =
                Box::new(Dqn::<Env, Cnn, ReplayBuffer>::build(dqn_config(hp, device)));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(hp));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                off_policy_cfg(hp.learning_starts),
            )
        }
        Algo::Sac => {
            let mut agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Sac::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                sac_config(hp, device)
            ));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(hp));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                off_policy_cfg(hp.learning_starts),
            )
        }
        Algo::Ddpg => {
            let mut agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Ddpg::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                ddpg_config(hp, device)
            ));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(hp));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                off_policy_cfg(hp.learning_starts),
            )
        }
        Algo::Td3 => {
            let mut agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Td3::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                td3_config(hp, device)
            ));
            let mut buffer = ReplayBuffer::build(&replay_buffer_config(hp));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                off_policy_cfg(hp.learning_starts),
            )
        }
        Algo::A2c => {
            let mut agent: Box<dyn Agent<Env, RolloutBuf>> = Box::new(A2c::<
                Env,
                CnnGaussian,
                Cnn,
                RolloutBuf,
            >::build(
                a2c_config(hp, device)
            ));
            let mut buffer =
                RolloutBuf::build(&RolloutBufferConfig::default().capacity(A2C_N_STEPS));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                on_policy_cfg(A2C_N_STEPS),
            )
        }
        Algo::Ppo => {
            let mut agent: Box<dyn Agent<Env, RolloutBuf>> = Box::new(Ppo::<
                Env,
                CnnGaussian,
                Cnn,
                RolloutBuf,
            >::build(
                ppo_config(hp, device)
            ));
            let mut buffer =
                RolloutBuf::build(&RolloutBufferConfig::default().capacity(PPO_N_STEPS));
            run_training(
                algo,
                &mut agent,
                &mut buffer,
                env,
                on_policy_cfg(PPO_N_STEPS),
            )
        }
    }
}

/// Runs an evaluation session on the most recent saved model, logging
/// every step to the experiment tracker.
fn run_eval<R>(
    algo: Algo,
    mut agent: Box<dyn Agent<Env, R>>,
    env_config: &DroneEnvConfig,
    hp: &HyperParams,
    max_steps: usize,
) -> Result<()>
where
    R: ReplayBufferBase,
{
    // Locate and load the artifact before any tracker traffic, so a
    // missing model aborts without opening a run.
    let path = ArtifactStore::new(MODEL_DIR).latest(algo.name())?;
    agent.load_params(&path)?;
    agent.eval();
    info!("Loaded the model from {:?}", path);

    let tracking_url = env::var("TRACKING_URL").unwrap_or_else(|_| TRACKING_URL.to_string());
    let client = MlflowTrackingClient::new(&tracking_url).set_experiment(PROJECT)?;
    let mut recorder = client.create_recorder("", "eval_steps")?;
    recorder.log_params(hp)?;
    recorder.set_tags(&[("algo", algo.name())])?;

    let mut evaluator = StepEvaluator::<Env>::new(env_config, 0, max_steps)?;
    let record = evaluator.evaluate(&mut agent, &mut recorder)?;
    info!(
        "Finished evaluation: total_reward={}",
        record.get_scalar("total_reward")?
    );

    // Dropping the recorder marks the tracker run as finished.
    Ok(())
}

fn predict(
    args: &Args,
    env_config: &DroneEnvConfig,
    hp: &HyperParams,
    device: Device,
) -> Result<()> {
    let algo = args.model;
    let max_steps = args.steps_per_ep;

    match algo {
        Algo::Dqn => {
            let agent: Box<dyn Agent<Env, ReplayBuffer>> =
                Box::new(Dqn::<Env, Cnn, ReplayBuffer>::build(dqn_config(hp, device)));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
        Algo::Sac => {
            let agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Sac::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                sac_config(hp, device)
            ));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
        Algo::Ddpg => {
            let agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Ddpg::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                ddpg_config(hp, device)
            ));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
        Algo::Td3 => {
            let agent: Box<dyn Agent<Env, ReplayBuffer>> = Box::new(Td3::<
                Env,
                CnnQ,
                CnnGaussian,
                ReplayBuffer,
            >::build(
                td3_config(hp, device)
            ));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
        Algo::A2c => {
            let agent: Box<dyn Agent<Env, RolloutBuf>> = Box::new(A2c::<
                Env,
                CnnGaussian,
                Cnn,
                RolloutBuf,
            >::build(
                a2c_config(hp, device)
            ));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
        Algo::Ppo => {
            let agent: Box<dyn Agent<Env, RolloutBuf>> = Box::new(Ppo::<
                Env,
                CnnGaussian,
                Cnn,
                RolloutBuf,
            >::build(
                ppo_config(hp, device)
            ));
            run_eval(algo, agent, env_config, hp, max_steps)
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    ensure!(args.steps_per_ep > 0, "--steps-per-ep must be positive");

    // Process-wide startup: compute device, simulator connection and
    // environment registration.
    let device = Device::cuda_if_available();
    info!("Compute device: {:?}", device);

    let sim_addr = env::var("SIM_ADDR").unwrap_or_else(|_| SIM_ADDR.to_string());
    let client = SimClient::connect(&sim_addr)?.into_shared();

    registry::register(
        ENV_ID,
        DroneEnvConfig::default()
            .img_shape(IMG_SHAPE)
            .target(TARGET)
            .max_episode_steps(Some(args.steps_per_ep))
            .client(client),
    )?;
    let env_config = registry::config(ENV_ID)?;

    if env::var("DEBUG").is_ok() {
        println!("{}", registry::spec(ENV_ID)?);
    }

    let hyper_params = HyperParams::default();

    if !args.predict {
        train(&args, &hyper_params, device)
    } else {
        predict(&args, &env_config, &hyper_params, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_every_algorithm() {
        for name in ["dqn", "a2c", "ppo", "ddpg", "sac", "td3"] {
            let args =
                Args::try_parse_from(["uavnav", "--model", name, "--steps-per-ep", "50"]).unwrap();
            assert_eq!(args.model.name(), name);
            assert!(!args.predict);
        }
    }

    #[test]
    fn rejects_unknown_algorithms() {
        assert!(
            Args::try_parse_from(["uavnav", "--model", "xyz", "--steps-per-ep", "50"]).is_err()
        );
    }

    #[test]
    fn steps_per_ep_is_required() {
        assert!(Args::try_parse_from(["uavnav", "--model", "ppo"]).is_err());
    }

    #[test]
    fn predict_flag_selects_evaluation() {
        let args =
            Args::try_parse_from(["uavnav", "--model", "ddpg", "--steps-per-ep", "10", "-p"])
                .unwrap();
        assert!(args.predict);
    }

    #[test]
    fn training_budget_is_steps_times_episodes() {
        let config = trainer_config(Algo::Ppo, 50, None, 100, 1);
        assert_eq!(config.max_steps, 30_000);
        assert!(config.checkpoint_interval.is_none());
    }

    #[test]
    fn checkpointing_is_wired_to_the_store() {
        let config = trainer_config(Algo::Ddpg, 10, Some(1000), 0, 1);
        assert_eq!(config.checkpoint_interval, Some(1000));
        assert_eq!(config.checkpoint_dir.as_deref(), Some("model/ddpg"));
        assert_eq!(config.checkpoint_prefix.as_deref(), Some("ddpg"));
    }
}
