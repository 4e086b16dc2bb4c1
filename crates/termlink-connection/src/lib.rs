//! Named connections to the terminal.
//!
//! This is the layer collaborators talk to. A [`Connection`] opens the TCP
//! stream, registers under a connection name and runs a background receiver
//! thread that sorts incoming telegrams into one [`ChannelQueue`] per known
//! channel. Callers send on any channel and block, with a timeout, on the
//! queue of the channel they expect a reply on.

pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod queue;
pub mod receiver;
pub mod registry;

pub use config::ConnectionConfig;
pub use connection::Connection;
pub use control::{ControlRequest, SHUTDOWN_PAYLOAD};
pub use error::{ConnectionError, Result};
pub use queue::{ChannelQueue, ChannelQueues};
pub use receiver::ReceiverHandle;
pub use registry::{connection_registry, Handle, HandleRegistry};
pub use termlink_frame::Channel;
