//! Error types for the simulation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Coordinate ({x}, {y}) is outside the {width}x{height} grid")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },

    #[error("Rule evaluation failed at ({x}, {y}): {reason}")]
    RuleEvaluation { x: i32, y: i32, reason: String },

    #[error("Invalid seed pattern: {0}")]
    InvalidSeedPattern(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tick cancelled before commit")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn rule(x: i32, y: i32, reason: impl Into<String>) -> Self {
        Error::RuleEvaluation {
            x,
            y,
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
