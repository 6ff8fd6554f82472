//! TFRecord output for training metrics.
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;
use uavnav_core::record::{Record, RecordStorage, RecordValue, Recorder};

/// Writes records to TFRecord files.
///
/// Records stored between flushes are aggregated by
/// [`RecordStorage`]; on flush, the aggregate is written with the given
/// step under `step_key`. Only [`RecordValue::Scalar`] values are
/// written; other variants are ignored.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    step_key: String,
    storage: RecordStorage,
}

impl TensorboardRecorder {
    /// Constructs a [`TensorboardRecorder`] writing TFRecord files into
    /// `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P, step_key: impl Into<String>) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            step_key: step_key.into(),
            storage: RecordStorage::new(),
        }
    }
}

impl Recorder for TensorboardRecorder {
    /// Writes a record as a TFRecord entry keyed by the step value under
    /// `step_key`.
    fn write(&mut self, record: Record) {
        let step = record
            .get_scalar(&self.step_key)
            .expect("Record has no step key") as usize;

        for (k, v) in record.iter() {
            if *k != self.step_key {
                if let RecordValue::Scalar(v) = v {
                    self.writer.add_scalar(k, *v, step);
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
        self.writer.flush();
    }
}
