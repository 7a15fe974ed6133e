use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A logging setting (format, level, sink) could not be understood.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    /// A global subscriber was installed earlier in this process.
    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

pub type Result<T> = std::result::Result<T, Error>;
