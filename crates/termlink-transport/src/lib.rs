//! TCP transport to the terminal's control port.
//!
//! This is the lowest layer of termlink. It resolves the terminal host, opens
//! the stream and exposes the half-close and socket options the connection
//! layer needs. Everything else builds on top of the [`TermStream`] type
//! provided here.

pub mod error;
pub mod stream;

pub use error::{Result, TransportError};
pub use stream::{StreamOptions, TermStream, DEFAULT_CONTROL_PORT};
