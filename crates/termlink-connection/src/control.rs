/// Payload of the telegram on the SHUTDOWN channel that ends a session.
pub const SHUTDOWN_PAYLOAD: [u8; 2] = [0xff, 0xff];

/// Remote-interface request to force the terminal into remote-script mode.
pub const FORCE_REMOTE_SCRIPT: &str = "2,ScriptRemote";

const FILE_INTERFACE_ID: u8 = 3;
const OPERATION_UNREGISTER: u8 = 0;
const OPERATION_ACQUIRE_FILE: u8 = 1;
const OPERATION_AUTOMATIC_EXCHANGE: u8 = 4;

/// Requests sent on the CONTROL channel.
///
/// Requests addressed to a named connection carry the registration name so
/// the terminal knows which client they belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest<'a> {
    /// Announce that the client is leaving. Acknowledged on CONTROL.
    Unregister { connection: &'a str },
    /// Ask for a single file. It arrives on the file channels.
    AcquireFile { connection: &'a str, path: &'a str },
    /// Switch automatic file exchange on for the given extension list, or off
    /// when `extensions` is `None`. Acknowledged on FILE_EXCHANGE.
    AutomaticFileExchange {
        connection: &'a str,
        extensions: Option<&'a str>,
    },
    /// Put the terminal into remote-script mode. Acknowledged on CONTROL.
    ForceRemoteScript,
}

impl ControlRequest<'_> {
    /// Text payload for the CONTROL channel.
    pub fn to_payload(&self) -> String {
        match self {
            ControlRequest::Unregister { connection } => {
                format!("{FILE_INTERFACE_ID},{connection},{OPERATION_UNREGISTER},OFF")
            }
            ControlRequest::AcquireFile { connection, path } => {
                format!("{FILE_INTERFACE_ID},{connection},{OPERATION_ACQUIRE_FILE},{path}")
            }
            ControlRequest::AutomaticFileExchange {
                connection,
                extensions: Some(extensions),
            } => format!(
                "{FILE_INTERFACE_ID},{connection},{OPERATION_AUTOMATIC_EXCHANGE},ON,{extensions}"
            ),
            ControlRequest::AutomaticFileExchange {
                connection,
                extensions: None,
            } => format!("{FILE_INTERFACE_ID},{connection},{OPERATION_AUTOMATIC_EXCHANGE},OFF"),
            ControlRequest::ForceRemoteScript => FORCE_REMOTE_SCRIPT.to_string(),
        }
    }
}
