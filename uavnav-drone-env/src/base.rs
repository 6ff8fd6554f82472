//! The drone environment.
use crate::{DroneAct, DroneEnvConfig, DroneInfo, DroneObs, SharedSimClient, SimFrame};
use anyhow::{Context, Result};
use ndarray::{ArrayD, IxDyn};
use uavnav_core::{
    record::{Record, RecordValue},
    Env, Step,
};

fn distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Environment flying a simulated drone to a 3D target position.
///
/// Observations are camera images; the reward at every step is the
/// progress toward the target (previous distance minus current
/// distance), with a bonus on arrival and a penalty on collision. The
/// episode terminates on arrival or collision and truncates after the
/// configured number of steps.
pub struct DroneEnv {
    client: SharedSimClient,
    img_shape: [usize; 3],
    target: [f32; 3],
    goal_radius: f32,
    action_scale: f32,
    max_steps: Option<usize>,
    count_steps: usize,
    prev_dist: f32,
}

impl DroneEnv {
    /// Converts raw image bytes `(H, W, C)` into the `(C, H, W)` f32
    /// observation.
    fn frame_to_obs(&self, frame: &SimFrame) -> DroneObs {
        let [h, w, c] = self.img_shape;
        debug_assert_eq!(frame.image.len(), h * w * c);

        let mut data = vec![0f32; c * h * w];
        for y in 0..h {
            for x in 0..w {
                for ch in 0..c {
                    data[ch * h * w + y * w + x] = frame.image[y * w * c + x * c + ch] as f32;
                }
            }
        }
        DroneObs(ArrayD::from_shape_vec(IxDyn(&[c, h, w]), data).unwrap())
    }

    fn reset_(&mut self) -> Result<DroneObs> {
        let frame = self
            .client
            .lock()
            .unwrap()
            .reset()
            .context("Failed to reset the simulator")?;
        self.count_steps = 0;
        self.prev_dist = distance(&frame.position, &self.target);
        Ok(self.frame_to_obs(&frame))
    }
}

impl Env for DroneEnv {
    type Config = DroneEnvConfig;
    type Obs = DroneObs;
    type Act = DroneAct;
    type Info = DroneInfo;

    fn build(config: &Self::Config, _seed: i64) -> Result<Self> {
        let client = config
            .client
            .clone()
            .context("No simulator client is given for DroneEnv")?;

        Ok(Self {
            client,
            img_shape: config.img_shape,
            target: config.target,
            goal_radius: config.goal_radius,
            action_scale: config.action_scale,
            max_steps: config.max_episode_steps,
            count_steps: 0,
            prev_dist: 0.0,
        })
    }

    fn step(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let cmd = a.to_command(self.action_scale);
        let frame = self
            .client
            .lock()
            .unwrap()
            .step(cmd)
            .expect("Simulator step failed");

        let dist = distance(&frame.position, &self.target);
        let reached = dist <= self.goal_radius;
        let mut reward = self.prev_dist - dist;
        if reached {
            reward += 1.0;
        }
        if frame.collided {
            reward -= 1.0;
        }
        self.prev_dist = dist;
        self.count_steps += 1;

        let is_terminated = (reached || frame.collided) as i8;
        let is_truncated = match self.max_steps {
            Some(max_steps) => (self.count_steps >= max_steps && is_terminated == 0) as i8,
            None => 0,
        };

        let info = DroneInfo {
            position: frame.position,
            distance: dist,
            collided: frame.collided,
        };
        let record = Record::from_slice(&[
            (
                "info",
                RecordValue::String(serde_json::to_string(&info).unwrap()),
            ),
            ("info/distance", RecordValue::Scalar(dist)),
            ("info/pos_x", RecordValue::Scalar(frame.position[0])),
            ("info/pos_y", RecordValue::Scalar(frame.position[1])),
            ("info/pos_z", RecordValue::Scalar(frame.position[2])),
            (
                "info/collided",
                RecordValue::Scalar(frame.collided as i8 as f32),
            ),
        ]);

        let obs = self.frame_to_obs(&frame);
        let step = Step::new(
            obs,
            a.clone(),
            vec![reward],
            vec![is_terminated],
            vec![is_truncated],
            info,
            None,
        );

        (step, record)
    }

    fn reset(&mut self, _is_done: Option<&Vec<i8>>) -> Result<Self::Obs> {
        self.reset_()
    }

    fn step_with_reset(&mut self, a: &Self::Act) -> (Step<Self>, Record) {
        let (mut step, record) = self.step(a);
        if step.is_done() {
            let init_obs = self.reset_().expect("Simulator reset failed");
            step.init_obs = Some(init_obs);
        }
        (step, record)
    }

    fn reset_with_index(&mut self, _ix: usize) -> Result<Self::Obs> {
        self.reset_()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{BufRead, BufReader, Write},
        net::{TcpListener, TcpStream},
        thread,
    };
    use uavnav_core::Obs as _;

    /// Minimal in-process simulator: the vehicle starts at the origin
    /// and integrates the received velocity commands.
    fn spawn_stub_sim(img_len: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve(stream, img_len);
        });

        addr
    }

    fn serve(stream: TcpStream, img_len: usize) {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = stream;
        let mut pos = [0f32; 3];

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap_or(0) == 0 {
                return;
            }
            let req: serde_json::Value = serde_json::from_str(&line).unwrap();
            match req["cmd"].as_str().unwrap() {
                "reset" => pos = [0.0; 3],
                "step" => {
                    pos[0] += req["vx"].as_f64().unwrap() as f32;
                    pos[1] += req["vy"].as_f64().unwrap() as f32;
                    pos[2] += req["vz"].as_f64().unwrap() as f32;
                }
                cmd => panic!("Unknown command: {}", cmd),
            }
            let frame = serde_json::json!({
                "image": vec![128u8; img_len],
                "position": pos,
                "collided": false,
            });
            writeln!(writer, "{}", frame).unwrap();
        }
    }

    fn test_env(max_steps: Option<usize>) -> DroneEnv {
        let addr = spawn_stub_sim(2 * 2 * 1);
        let client = crate::SimClient::connect(&addr).unwrap().into_shared();
        let config = DroneEnvConfig::default()
            .img_shape([2, 2, 1])
            .target([3.0, 0.0, 0.0])
            .goal_radius(0.5)
            .max_episode_steps(max_steps)
            .client(client);
        DroneEnv::build(&config, 0).unwrap()
    }

    #[test]
    fn progress_toward_the_target_is_rewarded() {
        let mut env = test_env(None);
        let obs = env.reset(None).unwrap();
        assert_eq!(obs.0.shape(), &[1, 2, 2]);

        let (step, record) = env.step(&DroneAct::Cont(vec![1.0, 0.0, 0.0]));
        // Distance shrinks from 3 to 2.
        assert!((step.reward[0] - 1.0).abs() < 1e-6);
        assert_eq!(step.is_terminated[0], 0);
        assert!(record.get_string("info").is_ok());
        assert!((record.get_scalar("info/distance").unwrap() - 2.0).abs() < 1e-6);
    }

    #[test]
    fn reaching_the_target_terminates() {
        let mut env = test_env(None);
        env.reset(None).unwrap();

        let act = DroneAct::Cont(vec![1.0, 0.0, 0.0]);
        env.step(&act);
        env.step(&act);
        let (step, _) = env.step(&act);
        // Third step lands at the target: progress 1 plus arrival bonus.
        assert_eq!(step.is_terminated[0], 1);
        assert!((step.reward[0] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn episode_truncates_at_the_step_limit() {
        let mut env = test_env(Some(2));
        env.reset(None).unwrap();

        let act = DroneAct::Discrete(6); // hover
        let (step, _) = env.step_with_reset(&act);
        assert_eq!(step.is_truncated[0], 0);
        let (step, _) = env.step_with_reset(&act);
        assert_eq!(step.is_truncated[0], 1);
        assert!(step.init_obs.is_some());
    }

    #[test]
    fn observations_have_channel_first_layout() {
        let mut env = test_env(None);
        let obs = env.reset(None).unwrap();
        assert_eq!(obs.len(), 1);
        for v in obs.0.iter() {
            assert_eq!(*v, 128.0);
        }
    }
}
