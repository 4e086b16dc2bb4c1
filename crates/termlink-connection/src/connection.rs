use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use termlink_frame::{Channel, FrameError, TelegramReader, TelegramWriter, MAX_PAYLOAD};
use termlink_transport::TermStream;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::control::{ControlRequest, SHUTDOWN_PAYLOAD};
use crate::error::{ConnectionError, Result};
use crate::queue::{ChannelQueue, ChannelQueues};
use crate::receiver::ReceiverHandle;

/// The open half of a connection: the write side and the receiver reading
/// the other side.
struct Link {
    writer: TelegramWriter<TermStream>,
    receiver: ReceiverHandle,
    peer: SocketAddr,
    session: u64,
}

/// A named connection to the terminal.
///
/// Every method takes `&self`; a `Connection` can be shared between threads
/// behind an `Arc`. Sends are serialized. Waits on different channels proceed
/// independently, and a `disconnect` from one thread wakes every thread
/// blocked in a wait with [`ConnectionError::ConnectionLost`].
///
/// Waits take an optional timeout. `None` falls back to the connection's
/// default timeout (see [`Connection::set_timeout`]), and `Some(Duration::MAX)`
/// waits forever regardless of the default.
pub struct Connection {
    config: ConnectionConfig,
    queues: Arc<ChannelQueues>,
    link: Mutex<Option<Link>>,
    name: RwLock<String>,
    timeout: RwLock<Option<Duration>>,
    /// Set once a session has been established; until then a poisoned
    /// queue means "never connected" rather than "connection lost".
    registered: AtomicBool,
    sessions: AtomicU64,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    /// Create a disconnected connection with default configuration.
    pub fn new() -> Self {
        Self::with_config(ConnectionConfig::default())
    }

    pub fn with_config(config: ConnectionConfig) -> Self {
        let timeout = config.default_timeout;
        // Waits fail fast until the first connect resets the queues.
        let queues = ChannelQueues::new();
        queues.poison_all();
        Self {
            config,
            queues: Arc::new(queues),
            link: Mutex::new(None),
            name: RwLock::new(String::new()),
            timeout: RwLock::new(timeout),
            registered: AtomicBool::new(false),
            sessions: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn lock_link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Connect to the terminal at `address` and register as `connection_name`.
    ///
    /// Blocks for both settle intervals of the configuration. On failure no
    /// socket or thread is left behind.
    pub fn connect(&self, address: &str, connection_name: &str) -> Result<()> {
        validate_name(connection_name)?;

        let mut link = self.lock_link();
        if link.is_some() {
            return Err(ConnectionError::AlreadyConnected(self.connection_name()));
        }

        let stream = TermStream::connect_with_options(address, self.config.port, &self.config.stream)?;
        let peer = stream.peer_addr();
        let reader_stream = stream.try_clone()?;
        debug!(%peer, name = connection_name, "tcp connected");

        self.queues.reset_all();
        let receiver = match ReceiverHandle::spawn(
            TelegramReader::new(reader_stream),
            Arc::clone(&self.queues),
            connection_name,
        ) {
            Ok(receiver) => receiver,
            Err(err) => {
                self.queues.poison_all();
                let _ = stream.shutdown();
                return Err(err);
            }
        };

        thread::sleep(self.config.registration_settle);

        let mut writer = TelegramWriter::new(stream);
        if let Err(source) = writer.send_registration(connection_name) {
            warn!(%peer, error = %source, "registration failed");
            let _ = teardown(Link {
                writer,
                receiver,
                peer,
                session: 0,
            });
            return Err(ConnectionError::Registration(source));
        }

        thread::sleep(self.config.post_registration_settle);

        *self.name.write().unwrap_or_else(PoisonError::into_inner) = connection_name.to_string();
        self.registered.store(true, Ordering::Release);
        *link = Some(Link {
            writer,
            receiver,
            peer,
            session: self.sessions.fetch_add(1, Ordering::AcqRel) + 1,
        });
        info!(%peer, name = connection_name, "connected to terminal");
        Ok(())
    }

    /// Leave the terminal politely and close the connection.
    ///
    /// The unregister exchange and the shutdown telegram are best effort; the
    /// socket is closed and the receiver joined whether or not they succeed.
    pub fn disconnect(&self) -> Result<()> {
        let session = self
            .lock_link()
            .as_ref()
            .map(|link| link.session)
            .ok_or(ConnectionError::NotConnected)?;

        let name = self.connection_name();
        let unregister = ControlRequest::Unregister { connection: &name }.to_payload();
        match self.send_and_wait_for_reply(
            unregister.as_bytes(),
            Channel::Control,
            Some(self.config.unregister_timeout),
            None,
        ) {
            Ok(reply) => debug!(reply = %String::from_utf8_lossy(&reply), "unregistered"),
            Err(err) => debug!(error = %err, "unregister exchange failed"),
        }

        if let Err(err) = self.send(&SHUTDOWN_PAYLOAD, Channel::Shutdown) {
            debug!(error = %err, "shutdown telegram not sent");
        }

        // The guard stays held until the receiver is joined, so a concurrent
        // connect cannot reset the queues before the old receiver poisons them.
        let mut guard = self.lock_link();
        // Another thread may have finished the teardown, or even reconnected,
        // in the meantime.
        if guard.as_ref().map(|link| link.session) != Some(session) {
            return Ok(());
        }
        let Some(link) = guard.take() else {
            return Ok(());
        };
        info!(peer = %link.peer, name = %name, "disconnected from terminal");
        let result = teardown(link);
        drop(guard);
        result
    }

    /// Whether a connection is open and its receiver still reading.
    pub fn is_connected(&self) -> bool {
        self.lock_link()
            .as_ref()
            .is_some_and(|link| link.receiver.is_running())
    }

    /// Name registered by the last successful `connect`.
    pub fn connection_name(&self) -> String {
        self.name
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Address of the terminal, while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.lock_link().as_ref().map(|link| link.peer)
    }

    /// Default timeout for waits that do not pass one. `None` waits forever.
    pub fn timeout(&self) -> Option<Duration> {
        *self.timeout.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        *self.timeout.write().unwrap_or_else(PoisonError::into_inner) = timeout;
    }

    /// Send one telegram.
    pub fn send(&self, payload: &[u8], channel: Channel) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(ConnectionError::Frame(FrameError::PayloadTooLarge {
                size: payload.len(),
                max: MAX_PAYLOAD,
            }));
        }

        let mut link = self.lock_link();
        let link = link.as_mut().ok_or(ConnectionError::NotConnected)?;
        link.writer
            .send(channel.id(), payload)
            .map_err(|source| ConnectionError::Transmission {
                channel: channel.id(),
                source,
            })
    }

    /// Block until a telegram arrives on `channel`.
    pub fn wait_for_telegram(&self, channel: Channel, timeout: Option<Duration>) -> Result<Bytes> {
        let queue = self.queue(channel)?;
        let timeout = timeout.or_else(|| self.timeout());

        match queue.pop_blocking(timeout) {
            Some(payload) if payload.is_empty() => Err(self.closed(channel)),
            Some(payload) => Ok(payload),
            None => Err(ConnectionError::Timeout {
                channel,
                after: timeout.unwrap_or(Duration::MAX),
            }),
        }
    }

    /// Send on `channel` and wait for the reply on `reply_channel`, or on
    /// `channel` itself when no reply channel is given.
    pub fn send_and_wait_for_reply(
        &self,
        payload: &[u8],
        channel: Channel,
        timeout: Option<Duration>,
        reply_channel: Option<Channel>,
    ) -> Result<Bytes> {
        let reply_channel = reply_channel.unwrap_or(channel);
        // Fail before sending if the reply could never be received.
        self.queue(reply_channel)?;
        self.send(payload, channel)?;
        self.wait_for_telegram(reply_channel, timeout)
    }

    /// Like [`wait_for_telegram`](Self::wait_for_telegram), decoding the
    /// payload as text. Invalid UTF-8 is replaced, not rejected.
    pub fn wait_for_string_telegram(
        &self,
        channel: Channel,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.wait_for_telegram(channel, timeout)
            .map(|payload| String::from_utf8_lossy(&payload).into_owned())
    }

    pub fn send_string_and_wait_for_reply_string(
        &self,
        payload: &str,
        channel: Channel,
        timeout: Option<Duration>,
        reply_channel: Option<Channel>,
    ) -> Result<String> {
        self.send_and_wait_for_reply(payload.as_bytes(), channel, timeout, reply_channel)
            .map(|reply| String::from_utf8_lossy(&reply).into_owned())
    }

    /// Take a pending telegram without waiting.
    pub fn receive_telegram(&self, channel: Channel) -> Result<Option<Bytes>> {
        match self.queue(channel)?.pop_nonblocking() {
            Some(payload) if payload.is_empty() => Err(self.closed(channel)),
            other => Ok(other),
        }
    }

    /// Whether a telegram is pending on `channel`.
    pub fn telegram_received(&self, channel: Channel) -> bool {
        self.queue(channel).is_ok_and(|queue| !queue.is_empty())
    }

    /// Discard telegrams pending on `channel`.
    pub fn clear_incoming_telegram_queue(&self, channel: Channel) -> Result<()> {
        self.queue(channel)?.clear();
        Ok(())
    }

    /// Error for a wait that found its queue poisoned.
    fn closed(&self, channel: Channel) -> ConnectionError {
        if self.registered.load(Ordering::Acquire) {
            ConnectionError::ConnectionLost { channel }
        } else {
            ConnectionError::NotConnected
        }
    }

    fn queue(&self, channel: Channel) -> Result<&ChannelQueue> {
        self.queues
            .queue(channel)
            .ok_or(ConnectionError::UnknownChannel(channel))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let link = self
            .link
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut link) = link {
            debug!(peer = %link.peer, "closing connection on drop");
            let _ = link.writer.send(Channel::Shutdown.id(), &SHUTDOWN_PAYLOAD);
            if let Err(err) = teardown(link) {
                debug!(error = %err, "teardown on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.connection_name())
            .field("peer", &self.peer_addr())
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

/// Close the socket exactly once and wait for the receiver to stop.
fn teardown(link: Link) -> Result<()> {
    let Link {
        writer, receiver, ..
    } = link;
    let stream = writer.into_inner();

    // Unblocks the receiver's pending read; it poisons the queues on its way out.
    if let Err(err) = stream.shutdown_read() {
        debug!(error = %err, "read shutdown failed");
    }
    let joined = receiver.join();
    if let Err(err) = stream.shutdown() {
        debug!(error = %err, "socket shutdown failed");
    }
    drop(stream);
    joined
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ConnectionError::InvalidConnectionName(
            "name must not be empty".to_string(),
        ));
    }
    if name.len() > usize::from(u16::MAX) {
        return Err(ConnectionError::InvalidConnectionName(format!(
            "name is {} bytes, limit is {}",
            name.len(),
            u16::MAX
        )));
    }
    Ok(())
}
