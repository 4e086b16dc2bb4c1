//! Channel tags used by the terminal.
//!
//! The set is fixed by the terminal implementation. Tags outside this set
//! may still appear on the wire and are dropped by the receiving side.

use std::fmt;

/// Remote-script command requests and their replies.
pub const COMMAND: u8 = 2;

/// Connection shutdown signal. Only ever sent, never received.
pub const SHUTDOWN: u8 = 4;

/// Connection management (remote-mode switching, unregister, file-exchange setup).
pub const CONTROL: u8 = 0x80;

/// Decimal byte count of the file being transferred.
pub const FILE_LENGTH: u8 = 129;

/// Path of the file being transferred, as seen by the terminal host.
pub const FILE_PATH: u8 = 130;

/// One chunk of file content.
pub const FILE_CHUNK: u8 = 131;

/// Replies to file-exchange control requests.
pub const FILE_EXCHANGE: u8 = 132;

/// Measurement status broadcasts.
pub const STATUS: u8 = 133;

/// Log line broadcasts.
pub const LOG: u8 = 134;

/// A known channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Channel {
    Command = COMMAND,
    Shutdown = SHUTDOWN,
    Control = CONTROL,
    FileLength = FILE_LENGTH,
    FilePath = FILE_PATH,
    FileChunk = FILE_CHUNK,
    FileExchange = FILE_EXCHANGE,
    Status = STATUS,
    Log = LOG,
}

impl Channel {
    /// Every known channel.
    pub const ALL: [Channel; 9] = [
        Channel::Command,
        Channel::Shutdown,
        Channel::Control,
        Channel::FileLength,
        Channel::FilePath,
        Channel::FileChunk,
        Channel::FileExchange,
        Channel::Status,
        Channel::Log,
    ];

    /// Channels the terminal sends telegrams on.
    pub const RECEIVABLE: [Channel; 8] = [
        Channel::Command,
        Channel::Control,
        Channel::FileLength,
        Channel::FilePath,
        Channel::FileChunk,
        Channel::FileExchange,
        Channel::Status,
        Channel::Log,
    ];

    /// Wire tag of this channel.
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Look up a known channel by wire tag.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|channel| channel.id() == id)
    }

    /// Whether the terminal ever sends on this channel.
    pub fn is_receivable(self) -> bool {
        self != Channel::Shutdown
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Channel::Command => "COMMAND",
            Channel::Shutdown => "SHUTDOWN",
            Channel::Control => "CONTROL",
            Channel::FileLength => "FILE_LENGTH",
            Channel::FilePath => "FILE_PATH",
            Channel::FileChunk => "FILE_CHUNK",
            Channel::FileExchange => "FILE_EXCHANGE",
            Channel::Status => "STATUS",
            Channel::Log => "LOG",
        }
    }
}

impl From<Channel> for u8 {
    fn from(channel: Channel) -> Self {
        channel.id()
    }
}

impl TryFrom<u8> for Channel {
    type Error = u8;

    fn try_from(id: u8) -> std::result::Result<Self, Self::Error> {
        Self::from_id(id).ok_or(id)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.id())
    }
}

/// Returns a human-readable name for a raw channel tag.
pub fn channel_name(id: u8) -> &'static str {
    Channel::from_id(id).map_or("UNKNOWN", Channel::name)
}
