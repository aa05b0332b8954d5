//! Error types and handling for StakeDuel

use thiserror::Error;

use crate::games::MoveError;

/// Result type alias for StakeDuel operations
pub type Result<T> = std::result::Result<T, Error>;

/// StakeDuel error types
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Match not found")]
    MatchNotFound,

    #[error("Player not found")]
    PlayerNotFound,

    #[error("Player is not part of this match")]
    PlayerNotInMatch,

    #[error("Rejected move: {0}")]
    Move(#[from] MoveError),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid stake: {0}")]
    InvalidStake(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Settlement error: {0}")]
    Settlement(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(format!("JSON error: {}", err))
    }
}
