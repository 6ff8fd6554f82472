//! Experiment tracking over the MLflow REST API.
//!
//! Before running an evaluation with tracking, start a tracking server:
//!
//! ```bash
//! mlflow server --host 127.0.0.1 --port 8080
//! ```
//!
//! A run is created with [`MlflowTrackingClient::create_recorder`];
//! configuration snapshots are logged with
//! [`MlflowTrackingRecorder::log_params`] (nested structures are
//! flattened into `a.b.c`-style keys), and every record written through
//! the [`Recorder`](uavnav_core::record::Recorder) trait becomes one
//! metric point per scalar. Dropping the recorder marks the run as
//! FINISHED.
mod client;
mod experiment;
mod recorder;
mod run;
pub use client::{GetExperimentIdError, MlflowTrackingClient};
use experiment::Experiment;
pub use recorder::MlflowTrackingRecorder;
pub use run::Run;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
fn system_time_as_millis() -> u128 {
    let time = SystemTime::now();
    time.duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis()
}
