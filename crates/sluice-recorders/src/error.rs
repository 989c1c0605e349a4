//! Recorder errors

use thiserror::Error;

/// Recorder result type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the recording layer.
///
/// Configuration and lookup failures are fatal at model-build time.
/// Precondition failures signal a lifecycle call made out of order.
/// Numeric anomalies inside a run (a zero deviation target, say) are
/// contained to the affected cell as NaN and never surface here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown aggregation function: {0}")]
    UnknownAggregation(String),

    #[error("recorder {recorder} misconfigured: {message}")]
    Configuration { recorder: String, message: String },

    #[error("{operation} called on recorder {recorder} before setup")]
    NotSetup {
        recorder: String,
        operation: &'static str,
    },

    #[error("{operation} called on recorder {recorder} before the run finished")]
    NotFinished {
        recorder: String,
        operation: &'static str,
    },

    #[error("duplicate recorder name: {0}")]
    DuplicateRecorder(String),

    #[error("recorder not found: {0}")]
    RecorderNotFound(String),

    #[error("unknown recorder type: {0}")]
    UnknownRecorderType(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("storage not found: {0}")]
    StorageNotFound(String),

    #[error("parameter not found: {0}")]
    ParameterNotFound(String),

    #[error("recorder config invalid: {0}")]
    InvalidConfig(String),
}
