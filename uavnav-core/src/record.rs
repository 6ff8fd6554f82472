//! Records of metrics and the recorders that write them out.
//!
//! A [`Record`] is a flexible container of key-value pairs produced while
//! training or evaluating an agent: losses, rewards, diagnostic info from
//! the environment. A [`Recorder`] receives records and writes them to an
//! output destination, e.g. TFRecord files or an experiment tracker.
//!
//! [`RecordStorage`] aggregates stored records between flushes; scalar
//! values are summarized with min/max/mean/median when more than one
//! record carries the same key.
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
