//! Per-channel telegram queues.
//!
//! Each queue is a FIFO of payloads guarded by a single mutex, with a
//! condition variable tied to that mutex. Consumers block on the condition
//! variable; the receiver thread is the only producer.
//!
//! An empty payload is the poison marker: the connection is gone. Poison is
//! sticky. Payloads queued before it are still handed out in order, after
//! which every pop returns the marker immediately until the queue is reset.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use termlink_frame::Channel;
use tracing::trace;

#[derive(Debug, Default)]
struct QueueState {
    items: VecDeque<Bytes>,
    poisoned: bool,
}

impl QueueState {
    fn take(&mut self) -> Option<Bytes> {
        match self.items.pop_front() {
            Some(payload) => Some(payload),
            None if self.poisoned => Some(Bytes::new()),
            None => None,
        }
    }
}

/// Blocking FIFO of payloads for one channel.
#[derive(Debug, Default)]
pub struct ChannelQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a payload and wake one waiter.
    ///
    /// An empty payload poisons the queue and wakes every waiter. Payloads
    /// pushed after poisoning are discarded.
    pub fn put(&self, payload: Bytes) {
        let mut state = self.lock();
        if payload.is_empty() {
            state.poisoned = true;
            drop(state);
            self.available.notify_all();
            return;
        }
        if state.poisoned {
            trace!(len = payload.len(), "discarding payload pushed after poison");
            return;
        }
        state.items.push_back(payload);
        drop(state);
        self.available.notify_one();
    }

    /// Mark the connection as gone.
    pub fn poison(&self) {
        self.put(Bytes::new());
    }

    pub fn is_poisoned(&self) -> bool {
        self.lock().poisoned
    }

    /// Take the oldest payload without waiting.
    ///
    /// Returns the empty poison marker once queued payloads are exhausted on
    /// a poisoned queue.
    pub fn pop_nonblocking(&self) -> Option<Bytes> {
        self.lock().take()
    }

    /// Take the oldest payload, waiting up to `timeout`.
    ///
    /// `None` waits forever. The wait is measured against a deadline fixed on
    /// entry, so spurious wakeups never extend it. Returns `None` only when
    /// the deadline passes with nothing to hand out.
    pub fn pop_blocking(&self, timeout: Option<Duration>) -> Option<Bytes> {
        // A timeout too large to represent is treated as no timeout.
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut state = self.lock();

        loop {
            if let Some(payload) = state.take() {
                return Some(payload);
            }

            state = match deadline {
                None => self
                    .available
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.available
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Number of queued payloads, not counting poison.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Drop queued payloads. Poison survives.
    pub fn clear(&self) {
        self.lock().items.clear();
    }

    /// Drop queued payloads and poison, for a fresh connection.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.items.clear();
        state.poisoned = false;
    }
}

/// The fixed set of queues for one connection, one per receivable channel.
#[derive(Debug)]
pub struct ChannelQueues {
    queues: HashMap<u8, ChannelQueue>,
}

impl Default for ChannelQueues {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelQueues {
    pub fn new() -> Self {
        let queues = Channel::RECEIVABLE
            .into_iter()
            .map(|channel| (channel.id(), ChannelQueue::new()))
            .collect();
        Self { queues }
    }

    /// Queue for a wire tag, if the tag belongs to a receivable channel.
    pub fn get(&self, id: u8) -> Option<&ChannelQueue> {
        self.queues.get(&id)
    }

    pub fn queue(&self, channel: Channel) -> Option<&ChannelQueue> {
        self.get(channel.id())
    }

    pub fn poison_all(&self) {
        for queue in self.queues.values() {
            queue.poison();
        }
    }

    pub fn reset_all(&self) {
        for queue in self.queues.values() {
            queue.reset();
        }
    }
}
