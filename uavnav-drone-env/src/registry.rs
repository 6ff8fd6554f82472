//! Process-wide environment registry.
//!
//! Mirrors the register/make split of gym-style frameworks: the driver
//! registers an environment configuration under a stable string ID once
//! at startup, and later code constructs instances by ID only. The
//! registry is an explicit process-wide singleton, initialized on first
//! use.
use crate::{DroneEnv, DroneEnvConfig};
use anyhow::{bail, Context, Result};
use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, OnceLock},
};
use uavnav_core::Env;

static REGISTRY: OnceLock<Mutex<HashMap<String, DroneEnvConfig>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, DroneEnvConfig>> {
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Printable description of a registered environment.
#[derive(Clone, Debug)]
pub struct EnvSpec {
    /// The ID under which the environment is registered.
    pub id: String,

    /// Maximum episode length in steps.
    pub max_episode_steps: Option<usize>,

    /// Shape of the camera image as `(height, width, channels)`.
    pub img_shape: [usize; 3],

    /// Target position in the world frame.
    pub target: [f32; 3],
}

impl fmt::Display for EnvSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EnvSpec(id={:?}, max_episode_steps={:?}, img_shape={:?}, target={:?})",
            self.id, self.max_episode_steps, self.img_shape, self.target
        )
    }
}

/// Registers an environment configuration under the given ID.
///
/// Registering the same ID twice is an error.
pub fn register(id: impl Into<String>, config: DroneEnvConfig) -> Result<()> {
    let id = id.into();
    let mut registry = registry().lock().unwrap();
    if registry.contains_key(&id) {
        bail!("Environment {:?} is already registered", id);
    }
    registry.insert(id, config);
    Ok(())
}

/// Returns the configuration registered under the given ID.
pub fn config(id: &str) -> Result<DroneEnvConfig> {
    registry()
        .lock()
        .unwrap()
        .get(id)
        .cloned()
        .with_context(|| format!("Environment {:?} is not registered", id))
}

/// Constructs an environment registered under the given ID.
pub fn make(id: &str) -> Result<DroneEnv> {
    DroneEnv::build(&config(id)?, 0)
}

/// Returns the printable spec of the environment registered under the
/// given ID.
pub fn spec(id: &str) -> Result<EnvSpec> {
    let config = config(id)?;
    Ok(EnvSpec {
        id: id.to_string(),
        max_episode_steps: config.max_episode_steps,
        img_shape: config.img_shape,
        target: config.target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_inspect() {
        let config = DroneEnvConfig::default()
            .target([1.0, 2.0, 3.0])
            .max_episode_steps(Some(50));
        register("RegistryTest-v0", config).unwrap();

        let spec = spec("RegistryTest-v0").unwrap();
        assert_eq!(spec.max_episode_steps, Some(50));
        assert_eq!(spec.target, [1.0, 2.0, 3.0]);
        assert!(spec.to_string().contains("RegistryTest-v0"));

        // Duplicate registration is rejected.
        assert!(register("RegistryTest-v0", DroneEnvConfig::default()).is_err());
    }

    #[test]
    fn unknown_id_is_an_error() {
        assert!(config("NoSuchEnv-v0").is_err());
        assert!(make("NoSuchEnv-v0").is_err());
    }

    #[test]
    fn make_without_client_fails() {
        register("NoClient-v0", DroneEnvConfig::default()).unwrap();
        assert!(make("NoClient-v0").is_err());
    }
}
