use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_registration, encode_telegram, Telegram};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// Writes complete telegrams to any `Write` stream.
///
/// A telegram is encoded into an internal buffer and written in full before
/// `send` returns. A failure part way through leaves the stream in an unknown
/// state; callers should treat the connection as unusable.
pub struct TelegramWriter<T> {
    inner: T,
    buf: BytesMut,
}

impl<T: Write> TelegramWriter<T> {
    /// Create a new telegram writer.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Write a complete telegram (blocking).
    pub fn write_telegram(&mut self, telegram: &Telegram) -> Result<()> {
        self.send(telegram.channel, telegram.payload.as_ref())
    }

    /// Encode and send a payload on a channel.
    pub fn send(&mut self, channel: u8, payload: &[u8]) -> Result<()> {
        self.buf.clear();
        encode_telegram(channel, payload, &mut self.buf)?;
        self.write_buffer()?;
        trace!(channel, len = payload.len(), "telegram written");
        Ok(())
    }

    /// Send the registration frame announcing `name`.
    pub fn send_registration(&mut self, name: &str) -> Result<()> {
        self.buf.clear();
        encode_registration(name.as_bytes(), &mut self.buf)?;
        self.write_buffer()
    }

    fn write_buffer(&mut self) -> Result<()> {
        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_telegram, MAX_PAYLOAD};

    fn written(writer: TelegramWriter<Cursor<Vec<u8>>>) -> BytesMut {
        BytesMut::from(writer.into_inner().into_inner().as_slice())
    }

    #[test]
    fn write_single_telegram() {
        let mut writer = TelegramWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(2, b"1:IMPEDANCE:").unwrap();

        let mut wire = written(writer);
        let telegram = decode_telegram(&mut wire).unwrap();
        assert_eq!(telegram.channel, 2);
        assert_eq!(telegram.payload.as_ref(), b"1:IMPEDANCE:");
        assert!(wire.is_empty());
    }

    #[test]
    fn write_multiple_telegrams() {
        let mut writer = TelegramWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send(2, b"one").unwrap();
        writer.send(0x80, b"two").unwrap();
        writer.write_telegram(&Telegram::new(4u8, vec![0xff, 0xff])).unwrap();

        let mut wire = written(writer);
        let t1 = decode_telegram(&mut wire).unwrap();
        let t2 = decode_telegram(&mut wire).unwrap();
        let t3 = decode_telegram(&mut wire).unwrap();

        assert_eq!((t1.channel, t1.payload.as_ref()), (2, b"one".as_ref()));
        assert_eq!((t2.channel, t2.payload.as_ref()), (0x80, b"two".as_ref()));
        assert_eq!((t3.channel, t3.payload.as_ref()), (4, [0xff, 0xff].as_ref()));
    }

    #[test]
    fn registration_is_written_verbatim() {
        let mut writer = TelegramWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_registration("FileExchange").unwrap();

        let wire = written(writer);
        assert_eq!(&wire[..8], &[12, 0, 0x02, 0xd0, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(&wire[8..], b"FileExchange");
    }

    #[test]
    fn payload_too_large_rejected_before_writing() {
        let mut writer = TelegramWriter::new(Cursor::new(Vec::<u8>::new()));
        let err = writer.send(131, &vec![0u8; MAX_PAYLOAD + 1]).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(written(writer).is_empty());
    }

    #[test]
    fn flush_propagates() {
        let sink = FlushTrackingWriter::default();
        let flag = Arc::clone(&sink.flushed);
        let mut writer = TelegramWriter::new(sink);

        writer.send(2, b"x").unwrap();

        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn handles_interrupted_write_and_flush() {
        let writer_impl = InterruptedWriteThenFlush {
            wrote_once: false,
            flush_interrupted: false,
            data: Vec::new(),
        };

        let mut writer = TelegramWriter::new(writer_impl);
        writer.send(2, b"retry").unwrap();

        let inner = writer.into_inner();
        assert_eq!(inner.data.len(), 3 + 5);
    }

    #[test]
    fn short_writes_are_completed() {
        let mut writer = TelegramWriter::new(TwoBytesAtATime { data: Vec::new() });
        writer.send(130, b"C:\\THALES\\temp\\a.ism").unwrap();

        let mut wire = BytesMut::from(writer.into_inner().data.as_slice());
        let telegram = decode_telegram(&mut wire).unwrap();
        assert_eq!(telegram.payload.as_ref(), b"C:\\THALES\\temp\\a.ism");
    }

    #[test]
    fn connection_closed_when_write_returns_zero() {
        let mut writer = TelegramWriter::new(ZeroWriter);
        let err = writer.send(2, b"x").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn write_error_is_reported() {
        let mut writer = TelegramWriter::new(BrokenPipeWriter);
        let err = writer.send(2, b"x").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[derive(Default)]
    struct FlushTrackingWriter {
        flushed: Arc<AtomicBool>,
        data: Vec<u8>,
    }

    impl Write for FlushTrackingWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            self.flushed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct InterruptedWriteThenFlush {
        wrote_once: bool,
        flush_interrupted: bool,
        data: Vec<u8>,
    }

    impl Write for InterruptedWriteThenFlush {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.wrote_once {
                self.wrote_once = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if !self.flush_interrupted {
                self.flush_interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            Ok(())
        }
    }

    struct TwoBytesAtATime {
        data: Vec<u8>,
    }

    impl Write for TwoBytesAtATime {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = buf.len().min(2);
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenPipeWriter;

    impl Write for BrokenPipeWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
