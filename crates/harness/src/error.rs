use harness_common::{ProtocolError, ResolutionError};

/// Failures on the supervisor side, before an execution process exists.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Failures inside the execution process that stop the handler from being
/// called. Each one ends up in the `error` field of the emitted result.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("ProtocolError: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("ResolutionError: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("CaptureError: cannot redirect handler output: {0}")]
    Capture(#[source] std::io::Error),
}
