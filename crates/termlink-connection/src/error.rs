use std::time::Duration;

use termlink_frame::Channel;

/// Errors that can occur in connection operations.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Resolving or connecting to the terminal failed.
    #[error("transport error: {0}")]
    Transport(#[from] termlink_transport::TransportError),

    /// The telegram could not be encoded (nothing was written).
    #[error("frame error: {0}")]
    Frame(#[source] termlink_frame::FrameError),

    /// Writing a telegram failed. The connection must be torn down.
    #[error("transmission failed on channel {channel}: {source}")]
    Transmission {
        channel: u8,
        #[source]
        source: termlink_frame::FrameError,
    },

    /// The registration telegram could not be written. Nothing is left open.
    #[error("registration failed: {0}")]
    Registration(#[source] termlink_frame::FrameError),

    /// No telegram arrived in time. The connection may still be healthy.
    #[error("timed out after {after:?} waiting on channel {channel}")]
    Timeout { channel: Channel, after: Duration },

    /// The receiver observed the connection closing. Reconnect to continue.
    #[error("connection to terminal lost while waiting on channel {channel}")]
    ConnectionLost { channel: Channel },

    /// The operation needs an open connection.
    #[error("not connected to a terminal")]
    NotConnected,

    /// `connect` was called on a connection that is still open.
    #[error("already connected as '{0}'")]
    AlreadyConnected(String),

    /// The channel never carries telegrams from the terminal.
    #[error("channel {0} has no receive queue")]
    UnknownChannel(Channel),

    /// The connection name cannot be registered.
    #[error("invalid connection name: {0}")]
    InvalidConnectionName(String),

    /// The receiver thread panicked instead of returning.
    #[error("receiver thread panicked")]
    ReceiverPanicked,

    /// The receiver thread could not be spawned.
    #[error("failed to spawn receiver thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl ConnectionError {
    /// No telegram arrived within the wait window.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectionError::Timeout { .. })
    }

    /// The connection is gone; retrying on it will not help.
    pub fn is_connection_lost(&self) -> bool {
        matches!(
            self,
            ConnectionError::ConnectionLost { .. }
                | ConnectionError::Transmission { .. }
                | ConnectionError::NotConnected
        )
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
