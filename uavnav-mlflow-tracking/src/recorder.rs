use crate::{system_time_as_millis, Run};
use anyhow::Result;
use chrono::{DateTime, Duration, Local, SecondsFormat};
use reqwest::blocking::Client;
use serde::Serialize;
use serde_json::Value;
use uavnav_core::record::{Record, RecordStorage, RecordValue, Recorder};

#[derive(Debug, Serialize)]
struct LogParamParams<'a> {
    run_id: &'a String,
    key: &'a String,
    value: String,
}

#[derive(Debug, Serialize)]
struct LogMetricParams<'a> {
    run_id: &'a String,
    key: &'a String,
    value: f64,
    timestamp: i64,
    step: i64,
}

#[derive(Debug, Serialize)]
struct UpdateRunParams<'a> {
    run_id: &'a String,
    status: String,
    end_time: i64,
    run_name: &'a String,
}

#[derive(Debug, Serialize)]
struct SetTagParams<'a> {
    run_id: &'a String,
    key: &'a String,
    value: &'a String,
}

/// Records metrics of a run to the MLflow tracking server.
///
/// Before the run, [`MlflowTrackingRecorder::log_params`] snapshots the
/// configuration of the run (e.g. the hyperparameter record) as params;
/// nested structures are flattened into `a.b.c`-style keys.
///
/// [`Recorder::write`] logs each [`RecordValue::Scalar`] in the record as
/// a metric point. The value under `step_key` (e.g. `eval_steps`) is used
/// as the `step` field of the metric; other value types are ignored,
/// matching what the metric API accepts.
///
/// When dropped, the recorder updates the run status to `FINISHED`.
pub struct MlflowTrackingRecorder {
    client: Client,
    base_url: String,
    run_id: String,
    run_name: String,
    user_name: String,
    password: String,
    step_key: String,
    storage: RecordStorage,
    start_time: DateTime<Local>,
}

impl MlflowTrackingRecorder {
    /// Creates a recorder bound to an existing run.
    ///
    /// This method is used by
    /// [`MlflowTrackingClient::create_recorder`](crate::MlflowTrackingClient::create_recorder).
    /// It adds a tag `host_start_time` with the current time.
    pub fn new(base_url: &str, run: &Run, step_key: &str) -> Result<Self> {
        let client = Client::new();
        let start_time = Local::now();
        let recorder = Self {
            client,
            base_url: base_url.to_string(),
            run_id: run.info.run_id.clone(),
            run_name: run.info.run_name.clone(),
            user_name: "".to_string(),
            password: "".to_string(),
            step_key: step_key.to_string(),
            storage: RecordStorage::new(),
            start_time,
        };

        recorder.set_tag(
            "host_start_time",
            start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;

        Ok(recorder)
    }

    /// Logs a configuration snapshot as params of the run.
    pub fn log_params(&self, params: impl Serialize) -> Result<()> {
        let url = format!("{}/api/2.0/mlflow/runs/log-parameter", self.base_url);
        let flatten_map = {
            let map = match serde_json::to_value(params)? {
                Value::Object(map) => map,
                _ => panic!("Failed to parse object"),
            };
            flatten_serde_json::flatten(&map)
        };
        for (key, value) in flatten_map.iter() {
            let params = LogParamParams {
                run_id: &self.run_id,
                key,
                value: value.to_string(),
            };
            let _resp = self
                .client
                .post(&url)
                .basic_auth(&self.user_name, Some(&self.password))
                .json(&params)
                .send()?;
        }

        Ok(())
    }

    /// Sets a tag on the run.
    pub fn set_tag(&self, key: impl AsRef<str>, value: impl AsRef<str>) -> Result<()> {
        let url = format!("{}/api/2.0/mlflow/runs/set-tag", self.base_url);
        let params = SetTagParams {
            run_id: &self.run_id,
            key: &key.as_ref().to_string(),
            value: &value.as_ref().to_string(),
        };
        let _resp = self
            .client
            .post(&url)
            .basic_auth(&self.user_name, Some(&self.password))
            .json(&params)
            .send()?;

        Ok(())
    }

    /// Sets a batch of tags on the run.
    pub fn set_tags(&self, tags: &[(&str, &str)]) -> Result<()> {
        for (key, value) in tags.iter() {
            self.set_tag(key, value)?;
        }
        Ok(())
    }
}

impl Recorder for MlflowTrackingRecorder {
    fn write(&mut self, record: Record) {
        let url = format!("{}/api/2.0/mlflow/runs/log-metric", self.base_url);
        let timestamp = system_time_as_millis() as i64;
        let step = record
            .get_scalar(&self.step_key)
            .expect("Record has no step key") as i64;

        for (key, value) in record.iter() {
            if *key != self.step_key {
                if let RecordValue::Scalar(v) = value {
                    let params = LogMetricParams {
                        run_id: &self.run_id,
                        key,
                        value: *v as f64,
                        timestamp,
                        step,
                    };
                    let _resp = self
                        .client
                        .post(&url)
                        .basic_auth(&self.user_name, Some(&self.password))
                        .json(&params)
                        .send()
                        .expect("Failed to log a metric");
                }
            }
        }
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        let mut record = self.storage.aggregate();
        record.insert(&self.step_key, RecordValue::Scalar(step as _));
        self.write(record);
    }
}

impl Drop for MlflowTrackingRecorder {
    /// Updates the run status to `FINISHED`, tagging the end time and
    /// duration.
    fn drop(&mut self) {
        let end_time = Local::now();
        let duration = end_time.signed_duration_since(self.start_time);
        let _ = self.set_tag(
            "host_end_time",
            end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        let _ = self.set_tag("host_duration", format_duration(&duration));

        let url = format!("{}/api/2.0/mlflow/runs/update", self.base_url);
        let params = UpdateRunParams {
            run_id: &self.run_id,
            status: "FINISHED".to_string(),
            end_time: end_time.timestamp_millis(),
            run_name: &self.run_name,
        };
        let _ = self
            .client
            .post(&url)
            .basic_auth(&self.user_name, Some(&self.password))
            .json(&params)
            .send();
    }
}

fn format_duration(dt: &Duration) -> String {
    let mut seconds = dt.num_seconds();
    let mut minutes = seconds / 60;
    seconds %= 60;
    let hours = minutes / 60;
    minutes %= 60;
    format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::format_duration;
    use chrono::Duration;

    #[test]
    fn durations_render_as_hms() {
        assert_eq!(format_duration(&Duration::seconds(3_725)), "01:02:05");
        assert_eq!(format_duration(&Duration::seconds(59)), "00:00:59");
    }
}
