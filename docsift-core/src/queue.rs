//! The per-user scan queue between the scanner and extraction workers.

use crate::config::ExtractionConfig;
use crate::error::QueueError;
use crate::types::{ScanQueueEntry, User};
use crossbeam::channel::{self, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, info};

/// FIFO of scan entries with an end-of-stream signal.
///
/// One producer pushes and then closes exactly once; any number of consumers
/// pop concurrently, each entry reaching exactly one of them.
pub trait DocumentQueue: Send + Sync {
    fn name(&self) -> &str;

    /// Enqueue an entry. Blocks while the queue is full.
    fn push(&self, entry: ScanQueueEntry) -> Result<(), QueueError>;

    /// Next entry, blocking while the queue is empty and open. `Ok(None)`
    /// once the queue is closed and drained.
    fn pop(&self) -> Result<Option<ScanQueueEntry>, QueueError>;

    /// Signal end of stream. Closing twice is an error.
    fn close(&self) -> Result<(), QueueError>;

    fn is_closed(&self) -> bool;
}

/// In-process queue on a crossbeam channel.
///
/// Closing drops the only long-lived sender, so consumers see disconnection
/// after the last entry.
pub struct MemoryQueue {
    name: String,
    sender: Mutex<Option<Sender<ScanQueueEntry>>>,
    receiver: Receiver<ScanQueueEntry>,
    push_timeout: Option<Duration>,
}

impl MemoryQueue {
    /// `capacity` 0 means unbounded.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (sender, receiver) = if capacity == 0 {
            channel::unbounded()
        } else {
            channel::bounded(capacity)
        };
        Self {
            name: name.into(),
            sender: Mutex::new(Some(sender)),
            receiver,
            push_timeout: None,
        }
    }

    /// Fail a push that stays blocked for longer than `timeout`.
    pub fn with_push_timeout(mut self, timeout: Duration) -> Self {
        self.push_timeout = Some(timeout);
        self
    }

    /// Queue for `user`, named and sized from the configuration.
    pub fn for_user(config: &ExtractionConfig, user: &User) -> Self {
        let queue = Self::new(config.queue_name(user), config.queue.capacity);
        match config.queue.push_timeout_ms {
            Some(ms) => queue.with_push_timeout(Duration::from_millis(ms)),
            None => queue,
        }
    }

    /// Entries waiting to be popped.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn closed(&self) -> QueueError {
        QueueError::Closed {
            name: self.name.clone(),
        }
    }
}

impl DocumentQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn push(&self, entry: ScanQueueEntry) -> Result<(), QueueError> {
        // Clone out of the lock so a blocked push never holds it.
        let sender = self.sender.lock().clone().ok_or_else(|| self.closed())?;
        let disconnected = || QueueError::Disconnected {
            name: self.name.clone(),
        };

        match self.push_timeout {
            Some(timeout) => sender.send_timeout(entry, timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => QueueError::Timeout {
                    name: self.name.clone(),
                    timeout,
                },
                SendTimeoutError::Disconnected(_) => disconnected(),
            }),
            None => sender.send(entry).map_err(|_| disconnected()),
        }
    }

    fn pop(&self) -> Result<Option<ScanQueueEntry>, QueueError> {
        Ok(self.receiver.recv().ok())
    }

    fn close(&self) -> Result<(), QueueError> {
        match self.sender.lock().take() {
            Some(_) => {
                info!("Closed queue {} ({} entries pending)", self.name, self.len());
                Ok(())
            }
            None => {
                debug!("Queue {} was already closed", self.name);
                Err(self.closed())
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }
}
