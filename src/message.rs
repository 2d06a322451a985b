//! Message queue driving every component worker thread.
//!
//! A FIFO of small command records backed by a pool of reusable nodes. The
//! pool grows in batches when it runs dry and never shrinks until the queue is
//! dropped. Receivers park in [`MessageQueue::wait_new_msg`]; senders only
//! touch the condition variable when someone is actually parked.
//!
//! Invariant (checked in tests): `count() + pooled() == allocated()`.

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// Identifier of a queued message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Change state; `param` carries the target state.
    StateSet,
    /// Drop queued input back to its producers.
    Flush,
    /// Terminate the worker loop.
    Stop,
    /// Data-available poke.
    Nop,
    /// Backpressure relief poke.
    Wakeup,
    /// Upstream reached end of stream.
    Eos,
    /// Application-defined message.
    Custom(u32),
}

/// A command record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// What the message means.
    pub id: MessageId,
    /// Integer argument.
    pub param: u32,
    /// Opaque payload, copied on `put`.
    pub payload: Vec<u8>,
}

impl Message {
    /// Create a message without payload.
    pub fn new(id: MessageId, param: u32) -> Self {
        Self {
            id,
            param,
            payload: Vec::new(),
        }
    }

    /// Create a message carrying a payload.
    pub fn with_payload(id: MessageId, param: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            param,
            payload: payload.into(),
        }
    }
}

/// Result of [`MessageQueue::wait_new_msg`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Messages were already queued; no wait happened.
    Ready,
    /// Woken by a `put` (or spuriously).
    Notified,
    /// The bounded wait elapsed.
    TimedOut,
}

struct Node {
    id: MessageId,
    param: u32,
    payload: Vec<u8>,
}

impl Node {
    fn blank() -> Self {
        Self {
            id: MessageId::Nop,
            param: 0,
            payload: Vec::new(),
        }
    }
}

struct QueueInner {
    ready: VecDeque<Node>,
    pool: Vec<Node>,
    allocated: usize,
    waiters: usize,
}

impl QueueInner {
    /// Add up to one batch of nodes to the pool. Returns how many were added.
    fn grow(&mut self, config: &QueueConfig) -> usize {
        let room = config
            .max_nodes
            .map_or(usize::MAX, |max| max.saturating_sub(self.allocated));
        let batch = config.grow_batch.max(1).min(room);
        if batch == 0 || self.pool.try_reserve(batch).is_err() {
            return 0;
        }
        if self.ready.try_reserve(self.allocated + batch - self.ready.len()).is_err() {
            return 0;
        }
        self.pool.extend((0..batch).map(|_| Node::blank()));
        self.allocated += batch;
        batch
    }
}

/// Thread-safe, pool-backed FIFO with blocking and timed receive.
pub struct MessageQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
    config: QueueConfig,
}

impl MessageQueue {
    /// Create a queue and seed its pool.
    ///
    /// Fails only if the first batch cannot be allocated at all.
    pub fn new(config: QueueConfig) -> Result<Self> {
        let mut inner = QueueInner {
            ready: VecDeque::new(),
            pool: Vec::new(),
            allocated: 0,
            waiters: 0,
        };
        let seed = QueueConfig {
            grow_batch: config.initial_nodes.max(1),
            ..config.clone()
        };
        if inner.grow(&seed) == 0 {
            return Err(Error::InsufficientResources(
                "message queue: initial node batch".into(),
            ));
        }
        Ok(Self {
            inner: Mutex::new(inner),
            cond: Condvar::new(),
            config,
        })
    }

    /// Append a copy of `msg`.
    ///
    /// Fails with [`Error::InsufficientResources`] when the pool cannot grow or
    /// the payload copy cannot be allocated; the message is then dropped whole.
    pub fn put(&self, msg: &Message) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.pool.is_empty() && inner.grow(&self.config) == 0 {
            return Err(Error::InsufficientResources(format!(
                "message queue: pool exhausted at {} nodes",
                inner.allocated
            )));
        }

        let mut payload = Vec::new();
        if !msg.payload.is_empty() {
            payload.try_reserve_exact(msg.payload.len()).map_err(|_| {
                Error::InsufficientResources(format!(
                    "message queue: payload of {} bytes",
                    msg.payload.len()
                ))
            })?;
            payload.extend_from_slice(&msg.payload);
        }

        let Some(mut node) = inner.pool.pop() else {
            return Err(Error::InsufficientResources("message queue: no free node".into()));
        };
        node.id = msg.id;
        node.param = msg.param;
        node.payload = payload;
        inner.ready.push_back(node);

        if inner.waiters > 0 {
            self.cond.notify_one();
        }
        Ok(())
    }

    /// Pop the oldest message, or `None` when the queue is empty.
    pub fn get(&self) -> Option<Message> {
        let mut inner = self.inner.lock();
        let mut node = inner.ready.pop_front()?;
        let msg = Message {
            id: node.id,
            param: node.param,
            payload: std::mem::take(&mut node.payload),
        };
        inner.pool.push(node);
        Some(msg)
    }

    /// Block until a message is queued.
    ///
    /// Returns immediately with [`WaitOutcome::Ready`] if messages are pending.
    /// `None` waits indefinitely; `Some(timeout)` is measured on a monotonic
    /// clock and reports [`WaitOutcome::TimedOut`] when it elapses.
    pub fn wait_new_msg(&self, timeout: Option<Duration>) -> WaitOutcome {
        let mut inner = self.inner.lock();
        if !inner.ready.is_empty() {
            return WaitOutcome::Ready;
        }
        // Registered under the lock, so a put between here and the wait
        // cannot skip the notify.
        inner.waiters += 1;
        let outcome = match timeout {
            None => {
                self.cond.wait(&mut inner);
                WaitOutcome::Notified
            }
            Some(timeout) => {
                if self.cond.wait_for(&mut inner, timeout).timed_out() {
                    WaitOutcome::TimedOut
                } else {
                    WaitOutcome::Notified
                }
            }
        };
        inner.waiters -= 1;
        outcome
    }

    /// Drop every queued message, returning nodes to the pool.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        while let Some(mut node) = inner.ready.pop_front() {
            node.payload = Vec::new();
            inner.pool.push(node);
        }
    }

    /// Number of queued messages.
    pub fn count(&self) -> usize {
        self.inner.lock().ready.len()
    }

    /// Number of free nodes in the pool.
    pub fn pooled(&self) -> usize {
        self.inner.lock().pool.len()
    }

    /// Total nodes ever allocated.
    pub fn allocated(&self) -> usize {
        self.inner.lock().allocated
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MessageQueue")
            .field("count", &inner.ready.len())
            .field("pooled", &inner.pool.len())
            .field("allocated", &inner.allocated)
            .finish()
    }
}
