//! Background thread that demultiplexes telegrams into channel queues.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use termlink_frame::{channel_name, FrameError, Telegram, TelegramReader};
use tracing::{debug, trace, warn};

use crate::error::{ConnectionError, Result};
use crate::queue::ChannelQueues;

/// Owns the receiver thread of one connection.
#[derive(Debug)]
pub struct ReceiverHandle {
    handle: JoinHandle<()>,
    running: Arc<AtomicBool>,
}

impl ReceiverHandle {
    /// Start a receiver thread reading from `reader`.
    ///
    /// The thread runs until the stream reports an error or end of file, then
    /// poisons every queue and stops.
    pub fn spawn<R>(
        reader: TelegramReader<R>,
        queues: Arc<ChannelQueues>,
        connection_name: &str,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name(format!("termlink-rx-{connection_name}"))
            .spawn(move || receive_loop(reader, &queues, &thread_running))
            .map_err(ConnectionError::Spawn)?;

        Ok(Self { handle, running })
    }

    /// Whether the thread is still reading.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Wait for the thread to finish.
    pub fn join(self) -> Result<()> {
        self.handle
            .join()
            .map_err(|_| ConnectionError::ReceiverPanicked)
    }
}

/// Read telegrams until the stream ends, routing each to its queue.
pub fn receive_loop<R: Read>(
    mut reader: TelegramReader<R>,
    queues: &ChannelQueues,
    running: &AtomicBool,
) {
    loop {
        match reader.read_telegram() {
            Ok(telegram) => route(queues, telegram),
            Err(FrameError::ConnectionClosed) => {
                debug!("terminal closed the connection");
                break;
            }
            Err(err) => {
                warn!(error = %err, "telegram read failed, stopping receiver");
                break;
            }
        }
    }

    // A consumer woken by the poison must already see the receiver as stopped.
    running.store(false, Ordering::Release);
    queues.poison_all();
}

fn route(queues: &ChannelQueues, telegram: Telegram) {
    let Telegram { channel, payload } = telegram;

    // An empty payload would read as poison on the consumer side.
    if payload.is_empty() {
        debug!(channel, "dropping empty telegram");
        return;
    }

    match queues.get(channel) {
        Some(queue) => {
            trace!(
                channel,
                name = channel_name(channel),
                len = payload.len(),
                "telegram queued"
            );
            queue.put(payload);
        }
        None => debug!(channel, len = payload.len(), "dropping telegram on unknown channel"),
    }
}
