use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// TCP port the terminal listens on for remote connections.
pub const DEFAULT_CONTROL_PORT: u16 = 260;

/// Socket options applied when a stream is opened.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Upper bound for each connect attempt. `None` uses the OS default.
    pub connect_timeout: Option<Duration>,
    /// Disable Nagle's algorithm. Telegrams are small and latency bound.
    pub nodelay: bool,
    /// Enable TCP keepalive probes so a vanished host eventually errors the reader.
    pub keepalive: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            nodelay: true,
            keepalive: true,
        }
    }
}

/// A connected stream to the terminal. Implements `Read + Write`.
///
/// The connection layer clones the stream once: the clone is owned by the
/// receiver thread for reading, the original is used for writing and for
/// the half-close that stops the receiver.
pub struct TermStream {
    inner: TcpStream,
    peer: SocketAddr,
}

impl TermStream {
    /// Resolve `host` and connect to `port` with default options.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_options(host, port, &StreamOptions::default())
    }

    /// Resolve `host` and connect to `port`, trying each resolved address in order.
    pub fn connect_with_options(host: &str, port: u16, options: &StreamOptions) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            let attempt = match options.connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    debug!(%addr, "connected to terminal");
                    return Self::from_tcp(stream, options);
                }
                Err(source) => {
                    debug!(%addr, error = %source, "connect attempt failed");
                    last_err = Some(TransportError::Connect { addr, source });
                }
            }
        }

        Err(last_err.unwrap_or_else(|| TransportError::NoAddress {
            host: host.to_string(),
        }))
    }

    /// Wrap an already connected `TcpStream` and apply `options`.
    pub fn from_tcp(stream: TcpStream, options: &StreamOptions) -> Result<Self> {
        stream.set_nodelay(options.nodelay)?;
        if options.keepalive {
            set_keepalive(&stream)?;
        }
        let peer = stream.peer_addr()?;
        Ok(Self {
            inner: stream,
            peer,
        })
    }

    /// Address of the terminal this stream is connected to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Try to clone this stream (creates a new file descriptor for the same socket).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self {
            inner: cloned,
            peer: self.peer,
        })
    }

    /// Half-close the read direction.
    ///
    /// A read blocked on any clone of this socket returns 0 bytes afterwards.
    /// Shutting down an already disconnected socket is not an error.
    pub fn shutdown_read(&self) -> Result<()> {
        self.shutdown_how(Shutdown::Read)
    }

    /// Shut down both directions.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_how(Shutdown::Both)
    }

    fn shutdown_how(&self, how: Shutdown) -> Result<()> {
        match self.inner.shutdown(how) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(TransportError::Io(err)),
        }
    }
}

impl Read for TermStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for TermStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl std::fmt::Debug for TermStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermStream")
            .field("peer", &self.peer)
            .finish()
    }
}

#[cfg(unix)]
fn set_keepalive(stream: &TcpStream) -> Result<()> {
    use std::os::fd::AsRawFd;

    let enable: libc::c_int = 1;
    // SAFETY: `enable` is a valid c_int for the duration of the call and the
    // descriptor belongs to a connected TcpStream owned by this process.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_KEEPALIVE,
            (&enable as *const libc::c_int).cast::<libc::c_void>(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(TransportError::Io(std::io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
fn set_keepalive(_stream: &TcpStream) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    fn listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[test]
    fn connect_and_exchange_bytes() {
        let (listener, port) = listener();

        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            conn.read_exact(&mut buf).unwrap();
            conn.write_all(&buf).unwrap();
        });

        let mut stream = TermStream::connect("127.0.0.1", port).unwrap();
        assert_eq!(stream.peer_addr().port(), port);
        stream.write_all(b"hello").unwrap();
        let mut echoed = [0u8; 5];
        stream.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"hello");

        server.join().unwrap();
    }

    #[test]
    fn refused_connection_is_connect_error() {
        let (listener, port) = listener();
        drop(listener);

        let result = TermStream::connect("127.0.0.1", port);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[test]
    fn unresolvable_host_is_resolve_error() {
        let result = TermStream::connect("terminal.invalid", DEFAULT_CONTROL_PORT);
        assert!(matches!(
            result,
            Err(TransportError::Resolve { .. }) | Err(TransportError::NoAddress { .. })
        ));
    }

    #[test]
    fn connect_timeout_option_is_applied() {
        let (listener, port) = listener();
        let options = StreamOptions {
            connect_timeout: Some(Duration::from_secs(2)),
            ..StreamOptions::default()
        };

        let stream = TermStream::connect_with_options("127.0.0.1", port, &options).unwrap();
        let _accepted = listener.accept().unwrap();
        assert_eq!(stream.peer_addr().port(), port);
    }

    #[test]
    fn shutdown_read_unblocks_reader_clone() {
        let (listener, port) = listener();
        let stream = TermStream::connect("127.0.0.1", port).unwrap();
        let (_server_side, _) = listener.accept().unwrap();

        let mut reader = stream.try_clone().unwrap();
        let blocked = thread::spawn(move || {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).unwrap()
        });

        thread::sleep(Duration::from_millis(50));
        stream.shutdown_read().unwrap();

        assert_eq!(blocked.join().unwrap(), 0);
    }

    #[test]
    fn shutdown_twice_is_not_an_error() {
        let (listener, port) = listener();
        let stream = TermStream::connect("127.0.0.1", port).unwrap();
        let _accepted = listener.accept().unwrap();

        stream.shutdown().unwrap();
        stream.shutdown().unwrap();
    }
}
