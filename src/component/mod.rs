//! Component control surface, ports and the generic worker.
//!
//! Every media stage is a [`Component`]: an object with its own worker thread
//! and message queue, a lifecycle [`ComponentState`] and a set of ports that
//! can be tunneled to ports of other components.
//!
//! - [`Component`] - the uniform control surface used by applications and peers
//! - [`GenericComponent`] - the state machine and worker loop, parameterized by
//!   a [`ComponentHandler`] that supplies the domain behavior
//! - [`tunnel`] / [`untunnel`] - bind or unbind an output port to an input port
//!
//! # Example
//!
//! ```rust,ignore
//! use mmpipe::component::{tunnel, Command, Component, ComponentState};
//!
//! tunnel(&venc, VIDEO_ENCODER_OUTPUT_PORT, &muxer, MUXER_VIDEO_PORT)?;
//! muxer.send_command(Command::SetState(ComponentState::Idle), None)?;
//! venc.send_command(Command::SetState(ComponentState::Idle), None)?;
//! ```

mod context;
mod event;
mod generic;
mod param;
mod port;
mod state;

pub use context::ComponentContext;
pub use event::{ComponentCallback, ComponentEvent, EventChannel, EventReceiver, Notification};
pub use generic::{ComponentHandler, GenericComponent, WorkOutcome};
pub use param::{Config, ConfigIndex, Param, ParamIndex, RecordFileInfo};
pub use port::{BindInfo, PortDefinition, PortDirection};
pub use state::ComponentState;

use crate::buffer::MediaBuffer;
use crate::error::{Error, Result};
use crate::message::MessageId;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Identity
// ============================================================================

/// Process-unique component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a component does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// Compressed audio in, PCM out.
    AudioDecoder,
    /// Raw video in, compressed video out.
    VideoEncoder,
    /// Compressed streams in, container files out.
    Muxer,
    /// Application-defined stage.
    Custom(&'static str),
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AudioDecoder => f.write_str("adec"),
            Self::VideoEncoder => f.write_str("venc"),
            Self::Muxer => f.write_str("muxer"),
            Self::Custom(name) => f.write_str(name),
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Control message sent with [`Component::send_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Request a state transition.
    SetState(ComponentState),
    /// Terminate the worker loop.
    Stop,
    /// Upstream reached end of stream.
    Eos,
    /// Backpressure relief poke.
    Wakeup,
    /// Data-available poke.
    Nop,
    /// Hand queued input back to its producers unprocessed.
    Flush,
}

impl Command {
    pub(crate) fn message_id(&self) -> MessageId {
        match self {
            Self::SetState(_) => MessageId::StateSet,
            Self::Stop => MessageId::Stop,
            Self::Eos => MessageId::Eos,
            Self::Wakeup => MessageId::Wakeup,
            Self::Nop => MessageId::Nop,
            Self::Flush => MessageId::Flush,
        }
    }

    pub(crate) fn param(&self) -> u32 {
        match self {
            Self::SetState(state) => state.as_param(),
            _ => 0,
        }
    }
}

// ============================================================================
// Control surface
// ============================================================================

/// Uniform control surface of every component.
///
/// All methods are callable from any thread. State changes are asynchronous:
/// [`send_command`](Self::send_command) only reports whether the command was
/// queued; the outcome arrives as a [`ComponentEvent`].
pub trait Component: Send + Sync {
    /// Identity.
    fn id(&self) -> ComponentId;

    /// Name used in logs.
    fn name(&self) -> &str;

    /// Kind of stage.
    fn kind(&self) -> ComponentKind;

    /// Queue a control message, with an optional opaque payload.
    fn send_command(&self, command: Command, data: Option<&[u8]>) -> Result<()>;

    /// Current lifecycle state.
    fn get_state(&self) -> ComponentState;

    /// Read a parameter.
    fn get_parameter(&self, index: ParamIndex) -> Result<Param>;

    /// Write a parameter.
    fn set_parameter(&self, param: Param) -> Result<()>;

    /// Read a runtime config.
    fn get_config(&self, index: ConfigIndex) -> Result<Config>;

    /// Write a runtime config.
    fn set_config(&self, config: Config) -> Result<()>;

    /// Definition of a port.
    fn port_definition(&self, port: u32) -> Result<PortDefinition>;

    /// Binding of a port.
    fn bind_info(&self, port: u32) -> Result<BindInfo>;

    /// Bind `port` to `peer`'s `peer_port`, or unbind it when `peer` is `None`.
    ///
    /// Only legal in [`ComponentState::Loaded`]. An input port validates that
    /// the peer port is a compatible output; an output port records the peer
    /// as is.
    fn bind_request(
        &self,
        port: u32,
        peer: Option<&Arc<dyn Component>>,
        peer_port: u32,
    ) -> Result<()>;

    /// Hand a buffer to this component's input port. Only legal while executing.
    fn send_buffer(&self, buffer: &MediaBuffer) -> Result<()>;

    /// Return a buffer this component produced on one of its output ports.
    fn giveback_buffer(&self, buffer: &MediaBuffer) -> Result<()>;

    /// Install the application callback.
    fn set_callback(&self, callback: Arc<dyn ComponentCallback>) -> Result<()>;

    /// Stop the worker and release everything. Only legal in LOADED or INVALID.
    fn deinit(&self) -> Result<()>;
}

// ============================================================================
// Tunnels
// ============================================================================

/// Bind `producer`'s output port to `consumer`'s input port.
///
/// Both components must be LOADED and the ports must be output → input of the
/// same domain. Nothing is recorded unless both sides accept.
pub fn tunnel(
    producer: &Arc<dyn Component>,
    output_port: u32,
    consumer: &Arc<dyn Component>,
    input_port: u32,
) -> Result<()> {
    for component in [producer, consumer] {
        let state = component.get_state();
        if state != ComponentState::Loaded {
            return Err(Error::InvalidState { state });
        }
    }

    let out_def = producer.port_definition(output_port)?;
    let in_def = consumer.port_definition(input_port)?;
    if out_def.direction != PortDirection::Output || in_def.direction != PortDirection::Input {
        return Err(Error::PortNotCompatible(format!(
            "{}:{} ({}) cannot feed {}:{} ({})",
            producer.name(),
            output_port,
            out_def.direction,
            consumer.name(),
            input_port,
            in_def.direction
        )));
    }

    consumer.bind_request(input_port, Some(producer), output_port)?;
    if let Err(e) = producer.bind_request(output_port, Some(consumer), input_port) {
        if let Err(rollback) = consumer.bind_request(input_port, None, 0) {
            tracing::warn!(error = %rollback, "failed to roll back input binding");
        }
        return Err(e);
    }

    tracing::debug!(
        producer = %producer.name(),
        output_port,
        consumer = %consumer.name(),
        input_port,
        "tunnel established"
    );
    Ok(())
}

/// Unbind both ends of a tunnel. Both sides are attempted; the first error wins.
pub fn untunnel(
    producer: &Arc<dyn Component>,
    output_port: u32,
    consumer: &Arc<dyn Component>,
    input_port: u32,
) -> Result<()> {
    let out = producer.bind_request(output_port, None, 0);
    let inp = consumer.bind_request(input_port, None, 0);
    out.and(inp)
}
