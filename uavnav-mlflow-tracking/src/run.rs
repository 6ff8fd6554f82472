use serde::Deserialize;

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
/// A run on the tracking server.
pub struct Run {
    /// Metadata of the run.
    pub info: RunInfo,
    data: Option<RunData>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
/// Metadata of a run.
pub struct RunInfo {
    /// Unique ID of the run.
    pub run_id: String,

    /// Name of the run.
    pub run_name: String,

    experiment_id: String,
    status: Option<String>,
    start_time: i64,
    end_time: Option<i64>,
    artifact_uri: Option<String>,
    lifecycle_stage: Option<String>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct RunData {
    metrics: Option<Vec<Metric>>,
    params: Option<Vec<Param>>,
    tags: Option<Vec<RunTag>>,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct RunTag {
    key: String,
    value: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct Param {
    key: String,
    value: String,
}

#[allow(dead_code)]
#[derive(Debug, Deserialize)]
struct Metric {
    key: String,
    value: String,
    timestamp: i64,
    step: i64,
}
