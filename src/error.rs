//! Error types for ride-dispatch

use crate::ride::RideStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Duplicate ride ID: {0}")]
    DuplicateId(String),

    #[error("Ride not found: {0}")]
    NotFound(String),

    #[error("Ride {id} is already {current}")]
    InvalidTransition { id: String, current: RideStatus },

    #[error("Messaging channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Server error: {0}")]
    Server(String),
}

pub type Result<T> = std::result::Result<T, Error>;
