//! Runtime context handed to component handlers.
//!
//! The context gives a [`ComponentHandler`](super::ComponentHandler) access to
//! its own component (events, message queue, ports) and to the peers bound to
//! its ports, without exposing the component's locks.

use super::event::ComponentEvent;
use super::generic::ComponentCore;
use super::port::PortDefinition;
use super::{Command, Component, ComponentId, ComponentState};
use crate::buffer::{BufferPayload, MediaBuffer};
use crate::config::WaitConfig;
use crate::error::{Error, Result};
use crate::exchange::BufferToken;
use crate::message::MessageId;
use std::cell::RefCell;
use std::sync::Arc;

/// Runtime context for one handler call.
pub struct ComponentContext<'a> {
    core: &'a ComponentCore,
    state: ComponentState,
    deferred: Option<&'a RefCell<Vec<ComponentEvent>>>,
}

impl<'a> ComponentContext<'a> {
    pub(crate) fn new(core: &'a ComponentCore, state: ComponentState) -> Self {
        Self {
            core,
            state,
            deferred: None,
        }
    }

    /// Context whose events are held until the caller releases its locks.
    pub(crate) fn deferred(
        core: &'a ComponentCore,
        state: ComponentState,
        sink: &'a RefCell<Vec<ComponentEvent>>,
    ) -> Self {
        Self {
            core,
            state,
            deferred: Some(sink),
        }
    }

    /// Component identity.
    pub fn id(&self) -> ComponentId {
        self.core.id
    }

    /// Component name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// State the component was in when this call started.
    pub fn state(&self) -> ComponentState {
        self.state
    }

    /// Worker wait settings.
    pub fn waits(&self) -> &WaitConfig {
        &self.core.waits
    }

    /// Raise an event to the application.
    pub fn notify(&self, event: ComponentEvent) {
        match self.deferred {
            Some(sink) => sink.borrow_mut().push(event),
            None => self.core.emit(event),
        }
    }

    /// Log `error` and raise it as an error event.
    pub fn report(&self, error: &Error) {
        tracing::warn!(component = %self.core.name, state = %self.state, %error, "component error");
        crate::observability::record_error(self.core.kind, error.kind());
        self.notify(ComponentEvent::Error {
            kind: error.kind(),
            state: self.state,
        });
    }

    /// Post a message to this component's own queue.
    pub fn post(&self, id: MessageId) {
        self.core.post(id, 0);
    }

    /// Make sure the worker loop runs again soon.
    pub fn poke(&self) {
        self.core.poke();
    }

    /// Whether end of stream was signaled and not yet consumed.
    pub fn eos_pending(&self) -> bool {
        self.core.eos_pending()
    }

    /// Forget a pending end of stream (seek or restart).
    pub fn clear_eos(&self) {
        self.core.clear_eos();
    }

    /// Definition of one of this component's ports.
    pub fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.core.port_definition(port)
    }

    /// Peer bound to `port`, if any.
    pub fn peer(&self, port: u32) -> Result<Option<(Arc<dyn Component>, u32)>> {
        self.core.bind_info(port)?.peer()
    }

    /// Send a payload out of `output_port`.
    ///
    /// Goes to the bound peer's [`Component::send_buffer`], or to the
    /// application's `deliver_buffer` when the port is unbound.
    pub fn deliver(
        &self,
        output_port: u32,
        token: BufferToken,
        payload: BufferPayload,
    ) -> Result<()> {
        match self.peer(output_port)? {
            Some((peer, input_port)) => {
                let buffer = MediaBuffer {
                    output_port,
                    input_port,
                    token: Some(token),
                    payload,
                };
                peer.send_buffer(&buffer)
            }
            None => {
                let buffer = MediaBuffer {
                    output_port,
                    input_port: 0,
                    token: Some(token),
                    payload,
                };
                match self.core.callback() {
                    Some(cb) => cb.deliver_buffer(self.core.id, &buffer),
                    None => Err(Error::Unsupported(format!(
                        "{}: port {output_port} is unbound and no callback is installed",
                        self.core.name
                    ))),
                }
            }
        }
    }

    /// Hand a consumed input buffer back to whoever produced it.
    ///
    /// The bound peer of `buffer.input_port` gets it through
    /// [`Component::giveback_buffer`]; buffers on an unbound port go back to
    /// the application.
    pub fn return_buffer(&self, buffer: &MediaBuffer) -> Result<()> {
        match self.peer(buffer.input_port)? {
            Some((peer, _)) => peer.giveback_buffer(buffer),
            None => match self.core.callback() {
                Some(cb) => cb.giveback_buffer(self.core.id, buffer),
                None => Ok(()),
            },
        }
    }

    /// Send a command to the peer bound to `port`.
    ///
    /// Returns `Ok(false)` when the port is unbound.
    pub fn command_peer(&self, port: u32, command: Command) -> Result<bool> {
        match self.peer(port)? {
            Some((peer, _)) => peer.send_command(command, None).map(|_| true),
            None => Ok(false),
        }
    }
}

impl std::fmt::Debug for ComponentContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("name", &self.core.name)
            .field("state", &self.state)
            .field("deferred", &self.deferred.is_some())
            .finish()
    }
}
