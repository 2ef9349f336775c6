use thiserror::Error;

use crate::SimTime;

#[derive(Debug, Error)]
pub enum GridClearError {
    /// Fewer than two distinct quantities survived deduplication.
    #[error("Degenerate bid curve: {points} distinct point(s)")]
    DegenerateCurve { points: usize },

    #[error("Invalid bid curve: {0}")]
    InvalidCurve(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Payload codec error: {0}")]
    Codec(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Consensus not reached after {backoffs} step-size backoffs (iteration {iterations})")]
    ConvergenceFailed { iterations: usize, backoffs: usize },

    #[error("Market clearing deadline reached at t={at}")]
    TimeoutExpired { at: SimTime },
}

impl From<std::io::Error> for GridClearError {
    fn from(err: std::io::Error) -> Self {
        GridClearError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for GridClearError {
    fn from(err: serde_json::Error) -> Self {
        GridClearError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GridClearError>;
