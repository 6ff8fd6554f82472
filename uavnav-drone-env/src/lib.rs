#![warn(missing_docs)]
//! Drone simulator environment.
//!
//! The simulator runs as an external process; [`SimClient`] talks to it
//! over a line-delimited JSON protocol on TCP. [`DroneEnv`] wraps the
//! client into the environment contract of `uavnav-core`: image
//! observations, continuous or discretized thrust actions, and a reward
//! shaped by the distance to a 3D target position.
//!
//! Environments are registered under a stable string ID with
//! [`registry::register`] and constructed with [`registry::make`], so the
//! rest of the program refers to them by name only.
mod act;
mod base;
mod client;
mod config;
mod info;
mod obs;
pub mod registry;

pub use act::DroneAct;
pub use base::DroneEnv;
pub use client::{SharedSimClient, SimClient, SimFrame};
pub use config::DroneEnvConfig;
pub use info::DroneInfo;
pub use obs::DroneObs;
