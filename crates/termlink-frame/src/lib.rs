//! Length-prefixed telegram framing with channel tags.
//!
//! Every telegram exchanged with the terminal is framed with:
//! - A 2-byte little-endian payload length
//! - A 1-byte channel tag used for multiplexing
//!
//! Payloads are limited to 65535 bytes; the protocol has no continuation
//! mechanism. The reader hides partial reads, the writer hides partial writes.

pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use channel::{
    channel_name, Channel, COMMAND, CONTROL, FILE_CHUNK, FILE_EXCHANGE, FILE_LENGTH, FILE_PATH,
    LOG, SHUTDOWN, STATUS,
};
pub use codec::{
    decode_header, decode_telegram, encode_header, encode_registration, encode_telegram,
    Telegram, HEADER_SIZE, MAX_PAYLOAD, PROTOCOL_VERSION,
};
pub use error::{FrameError, Result};
pub use reader::TelegramReader;
pub use writer::TelegramWriter;

#[cfg(feature = "async")]
pub use async_codec::TelegramCodec;
