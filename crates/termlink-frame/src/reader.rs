use std::io::Read;

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{decode_header, Telegram, HEADER_SIZE};
use crate::error::{FrameError, Result};

/// Reads complete telegrams from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete telegrams.
/// A zero-byte read in the header or payload phase is reported as
/// [`FrameError::ConnectionClosed`]. Any other read error, `Interrupted`
/// included, ends the read with [`FrameError::Io`]: a half-read telegram
/// cannot be resumed reliably, so the stream is treated as dead.
pub struct TelegramReader<T> {
    inner: T,
}

impl<T: Read> TelegramReader<T> {
    /// Create a new telegram reader.
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Read the next complete telegram (blocking).
    pub fn read_telegram(&mut self) -> Result<Telegram> {
        let mut header = [0u8; HEADER_SIZE];
        read_full(&mut self.inner, &mut header)?;
        let (len, channel) = decode_header(&header);

        let mut payload = BytesMut::zeroed(len as usize);
        read_full(&mut self.inner, &mut payload)?;

        trace!(channel, len, "telegram read");
        Ok(Telegram {
            channel,
            payload: payload.freeze(),
        })
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

fn read_full<R: Read>(inner: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}
