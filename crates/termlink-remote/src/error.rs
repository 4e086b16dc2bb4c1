use std::path::PathBuf;

use termlink_connection::ConnectionError;

/// Errors from remote-script commands and file exchange.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The terminal rejected the command. Holds the reply verbatim.
    #[error("terminal reported an error: {0}")]
    Terminal(String),

    /// The reply did not have the expected shape.
    #[error("unexpected reply to '{request}': {reply:?}")]
    InvalidReply { request: String, reply: String },

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start file exchange worker: {0}")]
    Worker(#[source] std::io::Error),

    /// Single-file requests conflict with the automatic exchange worker.
    #[error("automatic file exchange is active")]
    FileExchangeActive,
}

impl RemoteError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, RemoteError::Connection(err) if err.is_connection_lost())
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
