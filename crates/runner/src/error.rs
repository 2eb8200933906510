use thiserror::Error;

/// Errors surfaced by the bridge process
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Failed to read config file '{path}': {reason}")]
    ConfigIo { path: String, reason: String },

    #[error("Invalid config file '{path}': {reason}")]
    ConfigParse { path: String, reason: String },

    #[error("Failed to write config file '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Bridge already started")]
    AlreadyStarted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
