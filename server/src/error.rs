use shared::ProtocolError;
use thiserror::Error;

/// Failures raised by world and session handlers
#[derive(Error, Debug)]
pub enum GameError {
    #[error("entity {0} not found")]
    NotFound(String),

    #[error("connection is not logged in")]
    NotLoggedIn,

    #[error("connection is already logged in as {0}")]
    AlreadyLoggedIn(String),

    #[error("bad event arguments: {0}")]
    BadArguments(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
