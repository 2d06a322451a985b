//! Component events and the application callback surface.
//!
//! Components report lifecycle results and stream conditions through a
//! [`ComponentCallback`] installed by the application. [`EventChannel`] is a
//! ready-made callback that forwards everything into a kanal channel, which is
//! what most applications (and the tests) want.

use super::{ComponentId, ComponentState};
use crate::buffer::MediaBuffer;
use crate::error::{ErrorKind, Result};
use std::fmt;
use std::time::{Duration, Instant};

/// Events raised by a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    /// A state transition completed.
    CommandComplete(ComponentState),

    /// A command was refused or the worker hit an error.
    Error {
        /// Classification.
        kind: ErrorKind,
        /// State the component was in.
        state: ComponentState,
    },

    /// The component emitted its last buffer (end of stream reached).
    BufferFlag,

    /// The muxer needs the next output location.
    NeedNextFile {
        /// Files opened before this one.
        sequence: u32,
        /// Slot in the recording ring.
        slot: u32,
    },
}

impl fmt::Display for ComponentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandComplete(state) => write!(f, "CommandComplete: {state}"),
            Self::Error { kind, state } => write!(f, "Error: {kind} (in {state})"),
            Self::BufferFlag => write!(f, "BufferFlag"),
            Self::NeedNextFile { sequence, slot } => {
                write!(f, "NeedNextFile: #{sequence} (slot {slot})")
            }
        }
    }
}

/// Application-side receiver of component events and buffers.
///
/// Called from component worker threads, never with a component lock held.
pub trait ComponentCallback: Send + Sync {
    /// An event was raised.
    fn on_event(&self, component: ComponentId, event: ComponentEvent);

    /// A buffer the application fed in has been consumed and is handed back.
    fn giveback_buffer(&self, component: ComponentId, buffer: &MediaBuffer) -> Result<()> {
        let _ = (component, buffer);
        Ok(())
    }

    /// A buffer was produced on an unbound output port.
    ///
    /// The application must hand it back with
    /// [`Component::giveback_buffer`](super::Component::giveback_buffer).
    fn deliver_buffer(&self, component: ComponentId, buffer: &MediaBuffer) -> Result<()> {
        let _ = (component, buffer);
        Err(crate::Error::Unsupported(
            "no consumer for unbound output".into(),
        ))
    }
}

/// Something reported through an [`EventChannel`].
#[derive(Debug, Clone)]
pub enum Notification {
    /// [`ComponentCallback::on_event`].
    Event(ComponentId, ComponentEvent),
    /// [`ComponentCallback::giveback_buffer`].
    Giveback(ComponentId, MediaBuffer),
    /// [`ComponentCallback::deliver_buffer`].
    Delivered(ComponentId, MediaBuffer),
}

/// Callback forwarding every notification into an unbounded channel.
pub struct EventChannel {
    sender: kanal::Sender<Notification>,
    accept_deliveries: bool,
}

impl EventChannel {
    /// Create a channel. Delivered buffers are accepted.
    pub fn new() -> (Self, EventReceiver) {
        let (sender, receiver) = kanal::unbounded();
        (
            Self {
                sender,
                accept_deliveries: true,
            },
            EventReceiver { receiver },
        )
    }

    /// Refuse delivered buffers, so producers keep them queued.
    pub fn refusing_deliveries(mut self) -> Self {
        self.accept_deliveries = false;
        self
    }

    fn forward(&self, notification: Notification) {
        if self.sender.send(notification).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl ComponentCallback for EventChannel {
    fn on_event(&self, component: ComponentId, event: ComponentEvent) {
        self.forward(Notification::Event(component, event));
    }

    fn giveback_buffer(&self, component: ComponentId, buffer: &MediaBuffer) -> Result<()> {
        self.forward(Notification::Giveback(component, buffer.clone()));
        Ok(())
    }

    fn deliver_buffer(&self, component: ComponentId, buffer: &MediaBuffer) -> Result<()> {
        if !self.accept_deliveries {
            return Err(crate::Error::InsufficientResources(
                "application refuses buffers".into(),
            ));
        }
        self.forward(Notification::Delivered(component, buffer.clone()));
        Ok(())
    }
}

/// Receiving end of an [`EventChannel`].
pub struct EventReceiver {
    receiver: kanal::Receiver<Notification>,
}

impl EventReceiver {
    /// Wait up to `timeout` for the next notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Take everything already queued.
    pub fn drain(&self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(Some(n)) = self.receiver.try_recv() {
            out.push(n);
        }
        out
    }

    /// Wait for the first notification matching `pred`, discarding others.
    pub fn wait_for<F>(&self, timeout: Duration, mut pred: F) -> Option<Notification>
    where
        F: FnMut(&Notification) -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.checked_duration_since(Instant::now())?;
            let n = self.recv_timeout(remaining)?;
            if pred(&n) {
                return Some(n);
            }
        }
    }

    /// Wait for a specific event from `component`.
    pub fn wait_event(
        &self,
        component: ComponentId,
        event: &ComponentEvent,
        timeout: Duration,
    ) -> bool {
        self.wait_for(timeout, |n| {
            matches!(n, Notification::Event(id, e) if *id == component && e == event)
        })
        .is_some()
    }
}
