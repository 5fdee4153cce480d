use std::path::PathBuf;

/// What happened to one capture attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Persisted { timestamp: u64, path: PathBuf },
    /// The vehicle did not return a depth image.
    Missed { reason: String },
    /// A depth image arrived but could not be decoded or saved.
    Dropped { timestamp: u64, reason: String },
}
