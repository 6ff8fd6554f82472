use super::{Record, Recorder};

/// A recorder that keeps all written records in memory.
///
/// Mostly useful in tests, where the records emitted by a training or
/// evaluation run are inspected afterwards.
pub struct BufferedRecorder(Vec<Record>);

impl BufferedRecorder {
    /// Constructs an empty buffered recorder.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns an iterator over the buffered records.
    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.0.iter()
    }

    /// The number of buffered records.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no record has been written.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BufferedRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder for BufferedRecorder {
    fn write(&mut self, record: Record) {
        self.0.push(record);
    }

    fn store(&mut self, record: Record) {
        self.0.push(record);
    }

    fn flush(&mut self, _step: i64) {}
}
