//! Configuration of [`DroneEnv`](crate::DroneEnv).
use crate::SharedSimClient;
use serde::{Deserialize, Serialize};

/// Configuration of [`DroneEnv`](crate::DroneEnv).
///
/// The simulator client handle is injected at runtime and excluded from
/// serialization.
#[derive(Clone, Serialize, Deserialize)]
pub struct DroneEnvConfig {
    /// Shape of the camera image as `(height, width, channels)`.
    pub img_shape: [usize; 3],

    /// Target position in the world frame.
    pub target: [f32; 3],

    /// Maximum episode length in steps; `None` disables truncation.
    pub max_episode_steps: Option<usize>,

    /// Distance at which the target counts as reached.
    pub goal_radius: f32,

    /// Scale applied to the normalized velocity commands.
    pub action_scale: f32,

    /// Handle of the simulator client.
    #[serde(skip)]
    pub client: Option<SharedSimClient>,
}

impl Default for DroneEnvConfig {
    fn default() -> Self {
        Self {
            img_shape: [80, 80, 1],
            target: [0.0, 0.0, 0.0],
            max_episode_steps: None,
            goal_radius: 2.0,
            action_scale: 1.0,
            client: None,
        }
    }
}

impl DroneEnvConfig {
    /// Sets the image shape as `(height, width, channels)`.
    pub fn img_shape(mut self, v: [usize; 3]) -> Self {
        self.img_shape = v;
        self
    }

    /// Sets the target position.
    pub fn target(mut self, v: [f32; 3]) -> Self {
        self.target = v;
        self
    }

    /// Sets the maximum episode length.
    pub fn max_episode_steps(mut self, v: Option<usize>) -> Self {
        self.max_episode_steps = v;
        self
    }

    /// Sets the goal radius.
    pub fn goal_radius(mut self, v: f32) -> Self {
        self.goal_radius = v;
        self
    }

    /// Sets the action scale.
    pub fn action_scale(mut self, v: f32) -> Self {
        self.action_scale = v;
        self
    }

    /// Sets the simulator client handle.
    pub fn client(mut self, v: SharedSimClient) -> Self {
        self.client = Some(v);
        self
    }
}

impl std::fmt::Debug for DroneEnvConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DroneEnvConfig")
            .field("img_shape", &self.img_shape)
            .field("target", &self.target)
            .field("max_episode_steps", &self.max_episode_steps)
            .field("goal_radius", &self.goal_radius)
            .field("action_scale", &self.action_scale)
            .field("client", &self.client.as_ref().map(|_| "SimClient"))
            .finish()
    }
}
