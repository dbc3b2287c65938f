use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings format error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },
    #[error("no counting line is set")]
    NoCountingLine,
    #[error("worker thread panicked; the session can no longer run")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, Error>;
