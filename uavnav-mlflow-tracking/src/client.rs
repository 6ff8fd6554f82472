use crate::{system_time_as_millis, Experiment, MlflowTrackingRecorder, Run};
use anyhow::Result;
use log::info;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::Display;

#[derive(Debug, Deserialize)]
struct Experiment_ {
    experiment: Experiment,
}

#[derive(Debug, Deserialize)]
struct Run_ {
    run: Run,
}

/// Failed to resolve the experiment ID on the tracking server.
#[derive(Debug, Clone)]
pub struct GetExperimentIdError;

impl Display for GetExperimentIdError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to get experiment ID")
    }
}

impl Error for GetExperimentIdError {}

#[derive(Debug, Serialize)]
/// Parameters from <https://mlflow.org/docs/latest/rest-api.html#create-run>.
struct CreateRunParams {
    experiment_id: String,
    start_time: i64,
    run_name: String,
}

#[derive(Debug, Serialize)]
struct CreateExperimentParams {
    name: String,
}

/// Access to an MLflow tracking server via the REST API (version 2.0).
pub struct MlflowTrackingClient {
    client: Client,

    /// Base URL of the tracking server.
    base_url: String,

    /// Current experiment ID.
    experiment_id: Option<String>,

    /// User name for basic authentication.
    user_name: String,

    /// Password for basic authentication.
    password: String,
}

impl MlflowTrackingClient {
    /// Creates a client for the tracking server at the given base URL.
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.as_ref().to_string(),
            experiment_id: None,
            user_name: "".to_string(),
            password: "".to_string(),
        }
    }

    /// Sets the user name and password for basic authentication.
    pub fn basic_auth(self, user_name: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        Self {
            user_name: user_name.as_ref().to_string(),
            password: password.as_ref().to_string(),
            ..self
        }
    }

    /// Resolves and stores the experiment ID for the given experiment
    /// name, creating the experiment if it does not exist yet.
    pub fn set_experiment(self, name: impl AsRef<str>) -> Result<Self, GetExperimentIdError> {
        let experiment_id = {
            self.get_experiment(name.as_ref())
                .ok_or(GetExperimentIdError)?
                .experiment_id
        };

        info!(
            "For experiment {:?}, id={} is set in MlflowTrackingClient",
            name.as_ref(),
            experiment_id
        );

        Ok(Self {
            experiment_id: Some(experiment_id),
            ..self
        })
    }

    /// Gets an [`Experiment`] by name from the tracking server, creating
    /// it if it does not exist.
    fn get_experiment(&self, name: &str) -> Option<Experiment> {
        let resp = {
            let resp = self
                .get(
                    self.url("experiments/get-by-name"),
                    &[("experiment_name", name)],
                )
                .ok()?;
            if resp.status().is_success() {
                resp
            } else {
                // The experiment does not exist yet; create it.
                self.post(
                    self.url("experiments/create"),
                    &CreateExperimentParams { name: name.into() },
                )
                .ok()?;
                self.get(
                    self.url("experiments/get-by-name"),
                    &[("experiment_name", name)],
                )
                .ok()?
            }
        };
        let experiment: Experiment_ = serde_json::from_str(resp.text().ok()?.as_str()).ok()?;

        Some(experiment.experiment)
    }

    fn url(&self, api: impl AsRef<str>) -> String {
        format!("{}/api/2.0/mlflow/{}", self.base_url, api.as_ref())
    }

    fn get(
        &self,
        url: String,
        query: &impl Serialize,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        self.client
            .get(url)
            .basic_auth(&self.user_name, Some(&self.password))
            .query(query)
            .send()
    }

    fn post(
        &self,
        url: String,
        params: &impl Serialize,
    ) -> reqwest::Result<reqwest::blocking::Response> {
        self.client
            .post(url)
            .basic_auth(&self.user_name, Some(&self.password))
            .json(&params)
            .send()
    }

    /// Creates a run on the tracking server and returns the recorder
    /// bound to it.
    ///
    /// If `run_name` is empty, a name is generated by the tracking
    /// server. [`MlflowTrackingClient::set_experiment`] must have been
    /// called before.
    pub fn create_recorder(
        &self,
        run_name: impl AsRef<str>,
        step_key: impl AsRef<str>,
    ) -> Result<MlflowTrackingRecorder> {
        let not_given_name = run_name.as_ref().is_empty();
        let experiment_id = self.experiment_id.as_ref().expect("Needs experiment_id");
        let resp = self.post(
            self.url("runs/create"),
            &CreateRunParams {
                experiment_id: experiment_id.to_string(),
                start_time: system_time_as_millis() as i64,
                run_name: run_name.as_ref().to_string(),
            },
        )?;

        let run = {
            let run: Run_ =
                serde_json::from_str(&resp.text()?).expect("Failed to deserialize Run");
            run.run
        };
        if not_given_name {
            info!(
                "Run name {:?} has been automatically generated",
                run.info.run_name
            );
        }
        MlflowTrackingRecorder::new(&self.base_url, &run, step_key.as_ref())
    }
}
