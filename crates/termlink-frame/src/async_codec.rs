use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_telegram, encode_telegram, Telegram};
use crate::error::FrameError;

/// `tokio_util` codec for telegrams, for use with `Framed` on async streams.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelegramCodec;

impl TelegramCodec {
    /// Create a new codec.
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for TelegramCodec {
    type Item = Telegram;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(decode_telegram(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match decode_telegram(src) {
            Some(telegram) => Ok(Some(telegram)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Telegram> for TelegramCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Telegram, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_telegram(item.channel, item.payload.as_ref(), dst)
    }
}
