//! Remote-script commands and file exchange for the terminal.
//!
//! [`ScriptWrapper`] turns instrument operations (potential, current,
//! impedance) into command telegrams on an existing [`Connection`].
//! [`FileExchange`] opens its own connection and pulls measurement files off
//! the terminal, either one at a time or automatically in the background.
//!
//! [`Connection`]: termlink_connection::Connection

pub mod error;
pub mod files;
pub mod script;

pub use error::{RemoteError, Result};
pub use files::{
    FileExchange, FileExchangeConfig, ReceivedFile, DEFAULT_CONNECTION_NAME,
    DEFAULT_FILE_EXTENSIONS,
};
pub use script::{Impedance, PotentiostatMode, ScriptWrapper};
