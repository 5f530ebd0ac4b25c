use thiserror::Error;

/// Errors that escape `check` as a whole. Per-link failures never surface
/// here; they end up in the result vector as BROKEN entries.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("invalid skip pattern {pattern:?}: {message}")]
    InvalidSkipPattern { pattern: String, message: String },

    #[error("invalid seed {0:?}")]
    InvalidSeed(String),

    #[error("seed path does not exist: {0}")]
    SeedNotFound(String),

    #[error("static server failed to start: {0}")]
    Server(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}
