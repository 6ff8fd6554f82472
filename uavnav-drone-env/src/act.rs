//! Action type.
use candle_core::{DType, Device, Tensor};
use uavnav_candle_agent::TensorBatch;
use uavnav_core::Act;

/// Velocity commands of the discrete action set: one unit thrust per
/// axis direction, plus hover.
pub const DISCRETE_COMMANDS: [[f32; 3]; 7] = [
    [1.0, 0.0, 0.0],
    [-1.0, 0.0, 0.0],
    [0.0, 1.0, 0.0],
    [0.0, -1.0, 0.0],
    [0.0, 0.0, 1.0],
    [0.0, 0.0, -1.0],
    [0.0, 0.0, 0.0],
];

/// Action on the drone environment.
///
/// Continuous actions are normalized velocity vectors in `[-1, 1]` per
/// axis; discrete actions index [`DISCRETE_COMMANDS`].
#[derive(Clone, Debug)]
pub enum DroneAct {
    /// Normalized velocity vector.
    Cont(Vec<f32>),

    /// Index into the discrete command set.
    Discrete(i64),
}

impl Act for DroneAct {
    fn len(&self) -> usize {
        1
    }
}

impl DroneAct {
    /// Converts the action into a velocity command, clipping continuous
    /// values to `[-1, 1]` and applying the scale.
    pub fn to_command(&self, scale: f32) -> [f32; 3] {
        match self {
            Self::Cont(v) => {
                let mut cmd = [0f32; 3];
                for (c, v) in cmd.iter_mut().zip(v.iter()) {
                    *c = v.clamp(-1.0, 1.0) * scale;
                }
                cmd
            }
            Self::Discrete(ix) => {
                let ix = (*ix).clamp(0, DISCRETE_COMMANDS.len() as i64 - 1) as usize;
                let mut cmd = DISCRETE_COMMANDS[ix];
                for c in cmd.iter_mut() {
                    *c *= scale;
                }
                cmd
            }
        }
    }
}

impl From<Tensor> for DroneAct {
    /// Interprets i64 tensors as discrete actions and f32 tensors as
    /// continuous actions, dropping the batch dimension if present.
    fn from(t: Tensor) -> Self {
        let t = match t.dims().len() {
            2 => t.squeeze(0).unwrap(),
            _ => t,
        };
        match t.dtype() {
            DType::I64 => {
                let ixs: Vec<i64> = t.to_vec1().unwrap();
                Self::Discrete(ixs[0])
            }
            _ => {
                let v: Vec<f32> = t.to_dtype(DType::F32).unwrap().to_vec1().unwrap();
                Self::Cont(v)
            }
        }
    }
}

impl From<DroneAct> for Tensor {
    /// Adds the batch dimension: `(1, 3)` for continuous actions,
    /// `(1, 1)` for discrete actions.
    fn from(act: DroneAct) -> Tensor {
        match act {
            DroneAct::Cont(v) => {
                let n = v.len();
                Tensor::from_vec(v, &[1, n], &Device::Cpu).unwrap()
            }
            DroneAct::Discrete(ix) => Tensor::from_vec(vec![ix], &[1, 1], &Device::Cpu).unwrap(),
        }
    }
}

impl From<DroneAct> for TensorBatch {
    fn from(act: DroneAct) -> TensorBatch {
        TensorBatch::from_tensor(act.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continuous_commands_are_clipped_and_scaled() {
        let act = DroneAct::Cont(vec![2.0, -3.0, 0.5]);
        assert_eq!(act.to_command(2.0), [2.0, -2.0, 1.0]);
    }

    #[test]
    fn discrete_commands_index_the_table() {
        let act = DroneAct::Discrete(1);
        assert_eq!(act.to_command(1.0), [-1.0, 0.0, 0.0]);
        // Hover
        let act = DroneAct::Discrete(6);
        assert_eq!(act.to_command(1.0), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn tensor_roundtrip_keeps_the_kind() {
        let act = DroneAct::Cont(vec![0.1, 0.2, 0.3]);
        let t: Tensor = act.into();
        match DroneAct::from(t) {
            DroneAct::Cont(v) => assert_eq!(v.len(), 3),
            _ => panic!("Expected a continuous action"),
        }

        let act = DroneAct::Discrete(4);
        let t: Tensor = act.into();
        match DroneAct::from(t) {
            DroneAct::Discrete(ix) => assert_eq!(ix, 4),
            _ => panic!("Expected a discrete action"),
        }
    }
}
