//! Step information.
use serde::Serialize;
use uavnav_core::Info;

/// Diagnostic information attached to every environment step.
#[derive(Clone, Debug, Serialize)]
pub struct DroneInfo {
    /// Vehicle position in the world frame.
    pub position: [f32; 3],

    /// Distance to the target.
    pub distance: f32,

    /// Whether the vehicle collided.
    pub collided: bool,
}

impl Info for DroneInfo {}
