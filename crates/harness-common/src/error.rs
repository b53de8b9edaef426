use std::path::PathBuf;

/// The payload could not be turned into an invocation request.
///
/// Always raised before any handler code runs.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("cannot read payload {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("payload is too large ({size} bytes, limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload must be a JSON object")]
    NotAnObject,

    #[error("unsupported or missing version: expected \"{expected}\", got {found}")]
    UnsupportedVersion {
        expected: &'static str,
        found: String,
    },

    #[error("`{0}` must be a JSON object")]
    FieldNotAnObject(&'static str),
}

/// A handler reference could not be resolved to a registered handler.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    #[error("handler must be in module.function format, got {0:?}")]
    InvalidReference(String),

    #[error("no module named {0:?}")]
    ModuleNotFound(String),

    #[error("module {module:?} has no handler {name:?}")]
    HandlerNotFound { module: String, name: String },
}
