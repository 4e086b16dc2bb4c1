use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::channel::Channel;
use crate::error::{FrameError, Result};

/// Telegram header: length (2) + channel (1) = 3 bytes.
pub const HEADER_SIZE: usize = 3;

/// Largest payload the 16-bit length field can describe.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Protocol version marker carried by the registration frame. The terminal
/// rejects any other value.
pub const PROTOCOL_VERSION: [u8; 2] = [0x02, 0xd0];

/// Buffer size and internal protocol fields of the registration frame, both
/// left at 0xffff.
const REGISTRATION_RESERVED: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// A telegram with its channel tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    /// The raw channel tag.
    pub channel: u8,
    /// The telegram payload.
    pub payload: Bytes,
}

impl Telegram {
    /// Create a new telegram.
    pub fn new(channel: impl Into<u8>, payload: impl Into<Bytes>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }

    /// The known channel this telegram belongs to, if any.
    pub fn known_channel(&self) -> Option<Channel> {
        Channel::from_id(self.channel)
    }

    /// The total wire size of this telegram (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Build the 3-byte header for a payload of `len` bytes on `channel`.
pub fn encode_header(len: u16, channel: u8) -> [u8; HEADER_SIZE] {
    let [lo, hi] = len.to_le_bytes();
    [lo, hi, channel]
}

/// Split a header into `(payload_len, channel)`.
pub fn decode_header(header: &[u8; HEADER_SIZE]) -> (u16, u8) {
    (u16::from_le_bytes([header[0], header[1]]), header[2])
}

/// Encode a telegram into the wire format.
///
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Length       │ Channel   │ Payload         │
/// │ (2B LE)      │ (1B)      │ (Length bytes)  │
/// └──────────────┴───────────┴─────────────────┘
/// ```
pub fn encode_telegram(channel: u8, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = payload_len(payload)?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&encode_header(len, channel));
    dst.put_slice(payload);
    Ok(())
}

/// Decode one telegram from a buffer.
///
/// Returns `None` if the buffer doesn't contain a complete telegram yet.
/// On success, consumes the telegram bytes from the buffer.
pub fn decode_telegram(src: &mut BytesMut) -> Option<Telegram> {
    if src.len() < HEADER_SIZE {
        return None;
    }

    let (len, channel) = decode_header(&[src[0], src[1], src[2]]);
    let total = HEADER_SIZE + len as usize;
    if src.len() < total {
        return None;
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(len as usize).freeze();
    Some(Telegram { channel, payload })
}

/// Encode the one-time registration frame announcing `name` to the terminal.
///
/// This frame does not follow the regular telegram layout:
///
/// ```text
/// ┌──────────────┬─────────────┬─────────────┬─────────────┐
/// │ Name length  │ Version     │ 0xffff      │ Name bytes  │
/// │ (2B LE)      │ 0x02 0xd0   │ 0xffff      │             │
/// └──────────────┴─────────────┴─────────────┴─────────────┘
/// ```
pub fn encode_registration(name: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = payload_len(name)?;
    dst.reserve(2 + PROTOCOL_VERSION.len() + REGISTRATION_RESERVED.len() + name.len());
    dst.put_u16_le(len);
    dst.put_slice(&PROTOCOL_VERSION);
    dst.put_slice(&REGISTRATION_RESERVED);
    dst.put_slice(name);
    Ok(())
}

fn payload_len(payload: &[u8]) -> Result<u16> {
    u16::try_from(payload.len()).map_err(|_| FrameError::PayloadTooLarge {
        size: payload.len(),
        max: MAX_PAYLOAD,
    })
}
