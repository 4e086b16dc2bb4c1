//! Client for the terminal's remote telegram protocol.
//!
//! termlink talks to the terminal over TCP: length-prefixed telegrams tagged
//! with a channel, demultiplexed into per-channel queues by a background
//! receiver, with remote-script commands and file exchange on top.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP stream setup and socket options
//! - [`frame`]: telegram framing and the channel set
//! - [`connection`]: named connections, channel queues, the receiver thread
//! - [`remote`]: remote-script commands and file exchange

/// Re-export transport types.
pub mod transport {
    pub use termlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use termlink_frame::*;
}

/// Re-export connection types.
pub mod connection {
    pub use termlink_connection::*;
}

/// Re-export remote-script and file exchange types.
pub mod remote {
    pub use termlink_remote::*;
}

pub use termlink_connection::{Channel, Connection, ConnectionConfig, ConnectionError};
pub use termlink_remote::{FileExchange, RemoteError, ScriptWrapper};
