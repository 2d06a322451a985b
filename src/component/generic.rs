//! The generic component: state machine, worker thread and control surface.
//!
//! [`GenericComponent`] implements [`Component`] once for every media stage.
//! Domain behavior is supplied by a [`ComponentHandler`]; the generic part
//! owns the message queue, the state lock, the ports and the worker thread.
//!
//! # Worker loop
//!
//! ```text
//! loop {
//!     drain queue: STATE_SET -> transition, STOP -> exit, FLUSH -> handler
//!     not EXECUTING -> wait for a message
//!     EXECUTING     -> handler.process() -> Progress | WaitForMessage | WaitFor(d)
//! }
//! ```
//!
//! # Locks
//!
//! The state lock is held while a transition runs and while a buffer is
//! queued by `send_buffer`, so a buffer can never be accepted by a component
//! that is leaving EXECUTING. Events raised during a transition are delivered
//! after the state lock is released, and buffers are handed back from
//! [`ComponentHandler::after_transition`] once it is. Ports and bindings live
//! behind their own lock.

use super::context::ComponentContext;
use super::event::{ComponentCallback, ComponentEvent};
use super::param::{Config, ConfigIndex, Param, ParamIndex};
use super::port::{BindInfo, PortDefinition, PortDirection};
use super::{Command, Component, ComponentId, ComponentKind, ComponentState};
use crate::buffer::MediaBuffer;
use crate::config::{ComponentConfig, WaitConfig};
use crate::error::{Error, Result};
use crate::message::{Message, MessageId, MessageQueue};
use crate::observability;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

// ============================================================================
// Handler
// ============================================================================

/// What the worker should do after one unit of domain work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Progress was made; run again immediately (after draining messages).
    Progress,
    /// Nothing to do until a message arrives.
    WaitForMessage,
    /// Re-poll after at most this long, or earlier on a message.
    WaitFor(Duration),
}

/// Domain behavior plugged into a [`GenericComponent`].
///
/// `send_buffer` and `giveback_buffer` run on the caller's thread (usually a
/// peer's worker) and must only touch the handler's buffer exchanges: calling
/// into other components from them can deadlock. Everything else runs on the
/// component's own worker thread.
pub trait ComponentHandler: Send + Sync + 'static {
    /// Kind of stage.
    fn kind(&self) -> ComponentKind;

    /// Ports of the component, indexed by position.
    fn ports(&self) -> Vec<PortDefinition>;

    /// Read a handler-specific parameter.
    fn get_parameter(&self, ctx: &ComponentContext<'_>, index: ParamIndex) -> Result<Param> {
        let _ = ctx;
        Err(Error::Unsupported(format!("parameter {index:?}")))
    }

    /// Write a handler-specific parameter.
    fn set_parameter(&self, ctx: &ComponentContext<'_>, param: Param) -> Result<()> {
        let _ = ctx;
        Err(Error::Unsupported(format!("parameter {:?}", param.index())))
    }

    /// Validate and apply a new port format. Runs before the definition is stored.
    fn on_port_format(&self, ctx: &ComponentContext<'_>, def: &PortDefinition) -> Result<()> {
        let _ = (ctx, def);
        Ok(())
    }

    /// Read a runtime config.
    fn get_config(&self, ctx: &ComponentContext<'_>, index: ConfigIndex) -> Result<Config> {
        let _ = ctx;
        Err(Error::Unsupported(format!("config {index:?}")))
    }

    /// Write a runtime config.
    fn set_config(&self, ctx: &ComponentContext<'_>, config: Config) -> Result<()> {
        let _ = ctx;
        Err(Error::Unsupported(format!("config {config:?}")))
    }

    /// Queue a buffer arriving on an input port. Called only while EXECUTING.
    fn send_buffer(&self, ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()>;

    /// Take back a buffer this component produced on an output port.
    fn giveback_buffer(&self, ctx: &ComponentContext<'_>, buffer: &MediaBuffer) -> Result<()>;

    /// Perform the domain side of a legal transition.
    ///
    /// An error leaves the component in `from`.
    fn on_transition(
        &self,
        ctx: &ComponentContext<'_>,
        from: ComponentState,
        to: ComponentState,
    ) -> Result<()> {
        let _ = (ctx, from, to);
        Ok(())
    }

    /// Runs after a successful transition, once the state lock is released
    /// and before `CommandComplete` is raised. Buffers owned by peers or the
    /// application are handed back here.
    fn after_transition(
        &self,
        ctx: &ComponentContext<'_>,
        from: ComponentState,
        to: ComponentState,
    ) {
        let _ = (ctx, from, to);
    }

    /// Hand queued input back to its producers without processing it.
    fn on_flush(&self, ctx: &ComponentContext<'_>) {
        let _ = ctx;
    }

    /// One unit of domain work. Called only while EXECUTING.
    fn process(&self, ctx: &ComponentContext<'_>) -> WorkOutcome;

    /// Release everything; the worker has already exited.
    fn on_deinit(&self) {}
}

// ============================================================================
// Core shared with the worker
// ============================================================================

#[derive(Clone)]
struct PortSlot {
    definition: PortDefinition,
    bind: BindInfo,
}

pub(crate) struct ComponentCore {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) kind: ComponentKind,
    pub(crate) waits: WaitConfig,
    state: Mutex<ComponentState>,
    ports: Mutex<SmallVec<[PortSlot; 2]>>,
    queue: MessageQueue,
    callback: RwLock<Option<Arc<dyn ComponentCallback>>>,
    eos_pending: AtomicBool,
    stopping: AtomicBool,
}

impl ComponentCore {
    pub(crate) fn emit(&self, event: ComponentEvent) {
        tracing::debug!(component = %self.name, %event, "event");
        if let Some(cb) = self.callback() {
            cb.on_event(self.id, event);
        }
    }

    pub(crate) fn callback(&self) -> Option<Arc<dyn ComponentCallback>> {
        self.callback.read().clone()
    }

    pub(crate) fn post(&self, id: MessageId, param: u32) {
        match self.queue.put(&Message::new(id, param)) {
            Ok(()) => observability::record_message_posted(self.kind),
            Err(error) => {
                tracing::warn!(component = %self.name, ?id, %error, "failed to post message");
            }
        }
    }

    /// Post a NOP unless a message is already pending.
    pub(crate) fn poke(&self) {
        if self.queue.count() == 0 {
            self.post(MessageId::Nop, 0);
        }
    }

    pub(crate) fn eos_pending(&self) -> bool {
        self.eos_pending.load(Ordering::Acquire)
    }

    pub(crate) fn clear_eos(&self) {
        self.eos_pending.store(false, Ordering::Release);
    }

    pub(crate) fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.ports
            .lock()
            .get(port as usize)
            .map(|slot| slot.definition)
            .ok_or_else(|| Error::BadParameter(format!("{}: no port {port}", self.name)))
    }

    pub(crate) fn bind_info(&self, port: u32) -> Result<BindInfo> {
        self.ports
            .lock()
            .get(port as usize)
            .map(|slot| slot.bind.clone())
            .ok_or_else(|| Error::BadParameter(format!("{}: no port {port}", self.name)))
    }

    fn check_port(&self, port: u32, direction: PortDirection) -> Result<()> {
        let def = self.port_definition(port)?;
        if def.direction != direction {
            return Err(Error::BadParameter(format!(
                "{}: port {port} is not an {direction} port",
                self.name
            )));
        }
        Ok(())
    }
}

// ============================================================================
// GenericComponent
// ============================================================================

/// A component built from a [`ComponentHandler`].
pub struct GenericComponent<H: ComponentHandler> {
    core: Arc<ComponentCore>,
    handler: Arc<H>,
    worker: Mutex<Option<JoinHandle<()>>>,
    deinitialized: AtomicBool,
}

impl<H: ComponentHandler> GenericComponent<H> {
    /// Create the component in LOADED and start its worker thread.
    pub fn spawn(handler: H, config: ComponentConfig) -> Result<Arc<Self>> {
        let id = ComponentId::next();
        let kind = handler.kind();
        let name = config.name.clone().unwrap_or_else(|| format!("{kind}-{id}"));
        let ports: SmallVec<[PortSlot; 2]> = handler
            .ports()
            .into_iter()
            .map(|definition| PortSlot {
                definition,
                bind: BindInfo::default(),
            })
            .collect();

        let core = Arc::new(ComponentCore {
            id,
            name,
            kind,
            waits: config.waits.clone(),
            state: Mutex::new(ComponentState::Loaded),
            ports: Mutex::new(ports),
            queue: MessageQueue::new(config.queue.clone())?,
            callback: RwLock::new(None),
            eos_pending: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        });
        let handler = Arc::new(handler);

        let worker = {
            let core = Arc::clone(&core);
            let handler = Arc::clone(&handler);
            std::thread::Builder::new()
                .name(core.name.clone())
                .spawn(move || run_worker(core, handler))?
        };

        tracing::debug!(component = %core.name, %kind, %id, "component created");
        Ok(Arc::new(Self {
            core,
            handler,
            worker: Mutex::new(Some(worker)),
            deinitialized: AtomicBool::new(false),
        }))
    }

    /// The domain handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Messages waiting in the component's queue.
    pub fn pending_messages(&self) -> usize {
        self.core.queue.count()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.deinitialized.load(Ordering::Acquire) {
            return Err(Error::InvalidState {
                state: *self.core.state.lock(),
            });
        }
        Ok(())
    }

    /// Like `ensure_alive`, and also refuses once the component is INVALID.
    fn ensure_operational(&self) -> Result<()> {
        self.ensure_alive()?;
        let state = *self.core.state.lock();
        if state == ComponentState::Invalid {
            return Err(Error::InvalidState { state });
        }
        Ok(())
    }

    fn context(&self) -> ComponentContext<'_> {
        ComponentContext::new(&self.core, *self.core.state.lock())
    }

    /// Stop and join the worker. Returns whether a worker was running.
    fn stop_worker(&self) -> bool {
        let Some(handle) = self.worker.lock().take() else {
            return false;
        };
        self.core.stopping.store(true, Ordering::Release);
        self.core.post(MessageId::Stop, 0);
        if handle.thread().id() == std::thread::current().id() {
            tracing::warn!(component = %self.core.name, "teardown from own worker, not joining");
            return true;
        }
        if handle.join().is_err() {
            tracing::error!(component = %self.core.name, "worker thread panicked");
        }
        true
    }
}

impl<H: ComponentHandler> Component for GenericComponent<H> {
    fn id(&self) -> ComponentId {
        self.core.id
    }

    fn name(&self) -> &str {
        &self.core.name
    }

    fn kind(&self) -> ComponentKind {
        self.core.kind
    }

    fn send_command(&self, command: Command, data: Option<&[u8]>) -> Result<()> {
        self.ensure_alive()?;
        match command {
            Command::Nop | Command::Wakeup if self.core.queue.count() > 0 => return Ok(()),
            Command::Eos => self.core.eos_pending.store(true, Ordering::Release),
            _ => {}
        }
        let msg = Message::with_payload(command.message_id(), command.param(), data.unwrap_or(&[]));
        self.core.queue.put(&msg)?;
        observability::record_message_posted(self.core.kind);
        Ok(())
    }

    fn get_state(&self) -> ComponentState {
        *self.core.state.lock()
    }

    fn get_parameter(&self, index: ParamIndex) -> Result<Param> {
        self.ensure_operational()?;
        match index {
            ParamIndex::PortDefinition(port) => {
                self.core.port_definition(port).map(Param::PortDefinition)
            }
            other => self.handler.get_parameter(&self.context(), other),
        }
    }

    fn set_parameter(&self, param: Param) -> Result<()> {
        self.ensure_operational()?;
        let Param::PortDefinition(def) = param else {
            return self.handler.set_parameter(&self.context(), param);
        };

        let state = self.core.state.lock();
        if *state != ComponentState::Loaded {
            return Err(Error::InvalidState { state: *state });
        }
        let current = self.core.port_definition(def.index)?;
        if current.direction != def.direction || current.domain() != def.domain() {
            return Err(Error::BadParameter(format!(
                "{}: port {} direction and domain are fixed",
                self.core.name, def.index
            )));
        }
        let ctx = ComponentContext::new(&self.core, *state);
        self.handler.on_port_format(&ctx, &def)?;
        if let Some(slot) = self.core.ports.lock().get_mut(def.index as usize) {
            slot.definition = def;
        }
        Ok(())
    }

    fn get_config(&self, index: ConfigIndex) -> Result<Config> {
        self.ensure_operational()?;
        self.handler.get_config(&self.context(), index)
    }

    fn set_config(&self, config: Config) -> Result<()> {
        self.ensure_operational()?;
        self.handler.set_config(&self.context(), config)
    }

    fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        self.core.port_definition(port)
    }

    fn bind_info(&self, port: u32) -> Result<BindInfo> {
        self.core.bind_info(port)
    }

    fn bind_request(
        &self,
        port: u32,
        peer: Option<&Arc<dyn Component>>,
        peer_port: u32,
    ) -> Result<()> {
        self.ensure_operational()?;
        let state = self.get_state();
        if state != ComponentState::Loaded {
            return Err(Error::InvalidState { state });
        }
        let def = self.core.port_definition(port)?;

        let bind = match peer {
            None => BindInfo::default(),
            Some(peer) => {
                if def.direction == PortDirection::Input {
                    let peer_def = peer.port_definition(peer_port)?;
                    if peer_def.direction != PortDirection::Output {
                        return Err(Error::PortNotCompatible(format!(
                            "{}:{port} is an input but {}:{peer_port} is not an output",
                            self.core.name,
                            peer.name()
                        )));
                    }
                    def.check_compatible(&peer_def)?;
                }
                BindInfo::bound(peer, peer_port)
            }
        };

        tracing::debug!(
            component = %self.core.name,
            port,
            peer = ?bind.peer_id(),
            peer_port,
            "bind request"
        );
        if let Some(slot) = self.core.ports.lock().get_mut(port as usize) {
            slot.bind = bind;
        }
        Ok(())
    }

    fn send_buffer(&self, buffer: &MediaBuffer) -> Result<()> {
        self.ensure_operational()?;
        let state = self.core.state.lock();
        if *state != ComponentState::Executing {
            return Err(Error::InvalidState { state: *state });
        }
        self.core.check_port(buffer.input_port, PortDirection::Input)?;
        let ctx = ComponentContext::new(&self.core, *state);
        self.handler.send_buffer(&ctx, buffer)?;
        drop(state);

        observability::record_buffer_received(self.core.kind);
        self.core.poke();
        Ok(())
    }

    fn giveback_buffer(&self, buffer: &MediaBuffer) -> Result<()> {
        // Still accepted in INVALID so peers can hand back what they hold.
        self.ensure_alive()?;
        self.core.check_port(buffer.output_port, PortDirection::Output)?;
        let result = self.handler.giveback_buffer(&self.context(), buffer);
        match &result {
            Ok(()) => {
                observability::record_buffer_returned(self.core.kind);
                self.core.poke();
            }
            Err(error) => {
                observability::record_giveback_failure(self.core.kind);
                tracing::warn!(component = %self.core.name, %error, "giveback rejected");
            }
        }
        result
    }

    fn set_callback(&self, callback: Arc<dyn ComponentCallback>) -> Result<()> {
        self.ensure_operational()?;
        *self.core.callback.write() = Some(callback);
        Ok(())
    }

    fn deinit(&self) -> Result<()> {
        self.ensure_alive()?;
        let state = self.get_state();
        if !matches!(state, ComponentState::Loaded | ComponentState::Invalid) {
            return Err(Error::InvalidState { state });
        }
        if self.deinitialized.swap(true, Ordering::AcqRel) {
            return Err(Error::InvalidState { state });
        }

        self.stop_worker();
        self.handler.on_deinit();
        self.core.queue.clear();
        tracing::debug!(component = %self.core.name, "component deinitialized");
        Ok(())
    }
}

impl<H: ComponentHandler> Drop for GenericComponent<H> {
    fn drop(&mut self) {
        if self.stop_worker() {
            self.handler.on_deinit();
            self.core.queue.clear();
        }
    }
}

impl<H: ComponentHandler> std::fmt::Debug for GenericComponent<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericComponent")
            .field("id", &self.core.id)
            .field("name", &self.core.name)
            .field("kind", &self.core.kind)
            .field("state", &*self.core.state.lock())
            .finish()
    }
}

// ============================================================================
// Worker
// ============================================================================

fn run_worker<H: ComponentHandler>(core: Arc<ComponentCore>, handler: Arc<H>) {
    let span = observability::span_component(&core.name, core.kind, core.id);
    let _guard = span.enter();
    tracing::debug!("worker started");

    loop {
        while let Some(msg) = core.queue.get() {
            if core.stopping.load(Ordering::Acquire) {
                tracing::debug!("worker stopping");
                return;
            }
            match msg.id {
                MessageId::StateSet => apply_state_set(&core, handler.as_ref(), msg.param),
                MessageId::Stop => {
                    tracing::debug!("worker stopping");
                    return;
                }
                MessageId::Flush => {
                    let state = *core.state.lock();
                    handler.on_flush(&ComponentContext::new(&core, state));
                }
                MessageId::Eos => tracing::debug!("end of stream signaled"),
                MessageId::Nop | MessageId::Wakeup | MessageId::Custom(_) => {}
            }
        }
        if core.stopping.load(Ordering::Acquire) {
            return;
        }

        let state = *core.state.lock();
        if state != ComponentState::Executing {
            core.queue.wait_new_msg(None);
            continue;
        }

        let ctx = ComponentContext::new(&core, state);
        match handler.process(&ctx) {
            WorkOutcome::Progress => {}
            WorkOutcome::WaitForMessage => {
                core.queue.wait_new_msg(None);
            }
            WorkOutcome::WaitFor(timeout) => {
                core.queue.wait_new_msg(Some(timeout));
            }
        }
    }
}

fn apply_state_set<H: ComponentHandler>(core: &ComponentCore, handler: &H, param: u32) {
    let held = RefCell::new(Vec::new());
    let (from, result) = {
        let mut state = core.state.lock();
        let from = *state;
        let result = match ComponentState::from_param(param) {
            None => Err(Error::BadParameter(format!("unknown state {param}"))),
            Some(target) => from.check_transition(target).and_then(|()| {
                let ctx = ComponentContext::deferred(core, from, &held);
                match handler.on_transition(&ctx, from, target) {
                    Ok(()) => Ok(target),
                    Err(e) if target == ComponentState::Invalid => {
                        tracing::warn!(error = %e, "cleanup on entering invalid failed");
                        Ok(target)
                    }
                    Err(e) => Err(e),
                }
            }),
        };
        if let Ok(target) = result {
            *state = target;
        }
        (from, result)
    };

    for event in held.into_inner() {
        core.emit(event);
    }
    match result {
        Ok(to) => {
            tracing::debug!(%from, %to, "state changed");
            handler.after_transition(&ComponentContext::new(core, to), from, to);
            observability::record_transition(core.kind, to);
            if to == ComponentState::Invalid {
                core.emit(ComponentEvent::Error {
                    kind: crate::ErrorKind::InvalidState,
                    state: to,
                });
            }
            core.emit(ComponentEvent::CommandComplete(to));
        }
        Err(error) => {
            tracing::warn!(%from, %error, "state change rejected");
            observability::record_rejected_command(core.kind);
            core.emit(ComponentEvent::Error {
                kind: error.kind(),
                state: from,
            });
        }
    }
}
