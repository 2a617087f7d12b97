//! Message dispatch for the script console and debugger interfaces.
//!
//! [`ScriptConsole`] owns all console state (session, engine lifecycle, debug
//! session) together with the device collaborators, and is driven from the
//! bus message loop one message at a time.

use crate::bus::{Bus, Message, MessageArgs, ReplyTarget};
use crate::codec::{self, Endianness};
use crate::debug::{frame, DebugBridge, Frame, FrameBuilder};
use crate::engine::{ScriptEngine, Watchdog};
use crate::lifecycle::{EngineState, InstallOutcome, ScriptLifecycle};
use crate::relay::relay_output;
use crate::session::{ConsoleSession, GateOutcome, SessionGate};
use crate::store::{PersistedScript, ScriptStore, Storage};
use crate::types::{
    BusStatus, ConsoleProperty, DebugMethod, MessageId, OutputKind, PropertyValue, ReplyBody,
    ReplyCode,
};
use crate::{ConsoleConfig, ConsoleError, Result};

/// What the host loop should do after a message was offered to the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// Not a console message; offer it to the next handler.
    NoMatch,
    /// Reinitialize the script engine from the stored image.
    RestartEngine,
    Reboot,
}

pub struct ScriptConsole<B, E, S, W> {
    config: ConsoleConfig,
    gate: SessionGate,
    lifecycle: ScriptLifecycle,
    debug: DebugBridge,
    bus: B,
    engine: E,
    storage: S,
    watchdog: W,
}

impl<B, E, S, W> ScriptConsole<B, E, S, W>
where
    B: Bus,
    E: ScriptEngine,
    S: Storage,
    W: Watchdog,
{
    pub fn new(config: ConsoleConfig, bus: B, engine: E, storage: S, watchdog: W) -> Self {
        Self {
            gate: SessionGate::new(config.port, config.peer_name_capacity),
            lifecycle: ScriptLifecycle::new(&config),
            debug: DebugBridge::new(config.debug_buffer_capacity),
            config,
            bus,
            engine,
            storage,
            watchdog,
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn engine_state(&self) -> EngineState {
        self.lifecycle.state()
    }

    pub fn session(&self) -> Option<&ConsoleSession> {
        self.gate.active()
    }

    pub fn debug(&self) -> &DebugBridge {
        &self.debug
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn watchdog(&self) -> &W {
        &self.watchdog
    }

    pub fn handle<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Dispatch {
        let result = match msg.id {
            MessageId::AcceptSession => self.on_accept_session(msg),
            _ if !self.gate.is_active() => Ok(Dispatch::NoMatch),
            MessageId::SessionLost => self.on_session_lost(msg),
            MessageId::GetProperty(property) => self.on_get_property(property, &msg.reply_to),
            MessageId::SetProperty(_) => Err(ConsoleError::UnsupportedProperty),
            MessageId::Eval => self.on_eval(msg),
            MessageId::Install => self.on_install(msg),
            MessageId::Reset => self.on_reset(&msg.reply_to),
            MessageId::Reboot => Ok(Dispatch::Reboot),
            MessageId::DebugBegin => self.on_debug_begin(msg),
            MessageId::DebugEnd => self.on_debug_end(&msg.reply_to),
            MessageId::GetScript => self.on_get_script(&msg.reply_to),
            MessageId::Debug(method) => self.on_debug_request(method, msg),
            MessageId::Other(_) => Ok(Dispatch::NoMatch),
        };

        let e = match result {
            Ok(dispatch) => return dispatch,
            Err(e) => e,
        };
        tracing::warn!(id = ?msg.id, error = %e, "Console request failed");

        if !matches!(msg.id, MessageId::AcceptSession | MessageId::SessionLost) {
            self.send_error(&msg.reply_to, e.bus_status());
            return Dispatch::Handled;
        }
        match e {
            // Malformed session traffic may still belong to another handler.
            ConsoleError::TruncatedInput { .. } | ConsoleError::InvalidArgument(_) => {
                if let Err(e) = msg.args.rewind() {
                    tracing::warn!(error = %e, "Failed to rewind message arguments");
                }
                Dispatch::NoMatch
            }
            _ => Dispatch::Handled,
        }
    }

    /// Print/alert hook for the script engine.
    pub fn output(&mut self, kind: OutputKind, args: &[String]) {
        relay_output(
            &mut self.bus,
            kind,
            args,
            self.gate.active(),
            self.debug.is_quiet(),
        );
    }

    /// Reports an uncaught script error to the controller as an alert.
    pub fn report_script_error(&mut self, diagnostic: impl Into<String>) {
        self.output(OutputKind::Alert, &[diagnostic.into()]);
    }

    /// Called once the host has reinitialized the engine after
    /// [`Dispatch::RestartEngine`].
    pub fn engine_restarted(&mut self) {
        self.lifecycle.engine_restarted();
    }

    pub fn startup_script(&self) -> Option<PersistedScript> {
        self.lifecycle.startup_script(&self.storage)
    }

    pub fn shutdown(&mut self) {
        if self.debug.is_attached() {
            self.teardown_debug(false);
        }
        self.gate.clear();
        self.lifecycle.mark_dirty();
    }

    /// Delivers the engine's response to the stashed caller, if `method` is
    /// the request that is waiting.
    pub fn complete_debug_reply(&mut self, method: DebugMethod, payload: Vec<u8>) -> bool {
        match self.debug.complete(method) {
            Some(pending) => {
                self.send_reply(&pending.reply_to, ReplyBody::Debug(payload));
                true
            }
            None => {
                tracing::debug!(?method, "No pending request for debugger response");
                false
            }
        }
    }

    pub fn debugger_read(&mut self, out: &mut [u8]) -> usize {
        self.debug.read(out)
    }

    pub fn debugger_peek(&self) -> usize {
        self.debug.peek()
    }

    pub fn debugger_read_flush(&mut self) {
        self.debug.read_flush();
    }

    pub fn debugger_write(&mut self, bytes: &[u8]) -> usize {
        self.debug.write(bytes)
    }

    pub fn debugger_write_flush(&mut self) -> Vec<u8> {
        self.debug.write_flush()
    }

    pub fn debugger_paused(&mut self, paused: bool) {
        self.debug.set_paused(paused);
    }

    /// The engine detached its debugger on its own.
    pub fn debugger_detached(&mut self) {
        if self.debug.is_attached() {
            self.teardown_debug(true);
        }
    }

    fn on_accept_session<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Result<Dispatch> {
        match self.gate.accept(&mut msg.args, &msg.reply_to, &mut self.bus)? {
            GateOutcome::NotOurs => Ok(Dispatch::NoMatch),
            _ => Ok(Dispatch::Handled),
        }
    }

    fn on_session_lost<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Result<Dispatch> {
        match self.gate.session_lost(&mut msg.args)? {
            GateOutcome::Released => {
                if self.debug.is_attached() {
                    self.teardown_debug(false);
                }
                Ok(Dispatch::Handled)
            }
            _ => Ok(Dispatch::NoMatch),
        }
    }

    fn on_get_property(&mut self, property: ConsoleProperty, to: &ReplyTarget) -> Result<Dispatch> {
        let value = match property {
            ConsoleProperty::Engine => PropertyValue::Text(self.config.engine_name.clone()),
            ConsoleProperty::MaxEvalLen => PropertyValue::Uint32(self.config.max_eval_len as u32),
            ConsoleProperty::MaxScriptLen => {
                PropertyValue::Uint32(ScriptStore::max_script_len(&self.storage))
            }
        };
        self.send_reply(to, ReplyBody::Property(value));
        Ok(Dispatch::Handled)
    }

    fn on_eval<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Result<Dispatch> {
        let watchdog = (!self.debug.is_attached()).then_some(&mut self.watchdog);
        let (code, text) =
            self.lifecycle
                .eval(&mut msg.args, msg.endianness, &mut self.engine, watchdog)?;
        self.send_reply(&msg.reply_to, ReplyBody::StatusText(code, text));
        Ok(Dispatch::Handled)
    }

    fn on_install<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Result<Dispatch> {
        let outcome = self
            .lifecycle
            .install(&mut msg.args, msg.endianness, &mut self.storage)?;
        match outcome {
            InstallOutcome::Installed => {
                self.send_reply(
                    &msg.reply_to,
                    ReplyBody::StatusText(ReplyCode::Ok, "Script installed".to_string()),
                );
                Ok(Dispatch::RestartEngine)
            }
            InstallOutcome::Rejected(code, text) => {
                self.send_reply(&msg.reply_to, ReplyBody::StatusText(code, text));
                Ok(Dispatch::Handled)
            }
        }
    }

    fn on_reset(&mut self, to: &ReplyTarget) -> Result<Dispatch> {
        self.send_reply(to, ReplyBody::Empty);
        if self.debug.is_attached() {
            self.teardown_debug(false);
        }
        self.lifecycle.reset();
        Ok(Dispatch::RestartEngine)
    }

    fn on_debug_begin<A: MessageArgs>(&mut self, msg: &mut Message<A>) -> Result<Dispatch> {
        let quiet = msg.args.unmarshal_u8()? != 0;
        if !self.debug.begin(quiet) {
            return Err(ConsoleError::Busy);
        }
        tracing::info!(quiet, "Starting debug session");
        self.watchdog.disable();
        self.engine.attach_debugger();
        self.send_reply(&msg.reply_to, ReplyBody::Status(ReplyCode::DebugStarted));
        Ok(Dispatch::Handled)
    }

    fn on_debug_end(&mut self, to: &ReplyTarget) -> Result<Dispatch> {
        tracing::info!("Stopping debug session");
        self.teardown_debug(false);
        self.send_reply(to, ReplyBody::Status(ReplyCode::DebugStopped));
        Ok(Dispatch::Handled)
    }

    fn on_get_script(&mut self, to: &ReplyTarget) -> Result<Dispatch> {
        match self.lifecycle.store().load(&self.storage) {
            Some(script) => {
                let mut image = Endianness::native().encode_u32(script.length).to_vec();
                image.extend_from_slice(&script.bytes);
                self.send_reply(to, ReplyBody::Script(image));
            }
            None => {
                tracing::error!("Error opening stored script");
                self.send_error(to, BusStatus::Busy);
            }
        }
        Ok(Dispatch::Handled)
    }

    fn on_debug_request<A: MessageArgs>(
        &mut self,
        method: DebugMethod,
        msg: &mut Message<A>,
    ) -> Result<Dispatch> {
        let opcode = match frame::opcode(method) {
            Some(opcode) if self.debug.accepts(method) => opcode,
            _ => {
                self.send_error(&msg.reply_to, BusStatus::Busy);
                return Ok(Dispatch::Handled);
            }
        };

        let frame = self.request_frame(method, opcode, &mut msg.args, msg.endianness)?;
        if let Some(displaced) = self.debug.submit(method, frame, msg.reply_to.clone())? {
            tracing::debug!(method = ?displaced.method, "Pending debug request replaced");
            self.send_error(&displaced.reply_to, BusStatus::Busy);
        }
        Ok(Dispatch::Handled)
    }

    fn request_frame<A: MessageArgs>(
        &self,
        method: DebugMethod,
        opcode: u8,
        args: &mut A,
        endianness: Endianness,
    ) -> Result<Frame> {
        let builder = FrameBuilder::request(opcode);
        let builder = match method {
            DebugMethod::AddBreak => {
                let file = args.unmarshal_string()?;
                let line = args.unmarshal_u8()?;
                builder.string(&file).int(line as u32)
            }
            DebugMethod::DelBreak => builder.int(args.unmarshal_u8()? as u32),
            DebugMethod::GetVar | DebugMethod::Eval => builder.string(&args.unmarshal_string()?),
            DebugMethod::PutVar => {
                let name = args.unmarshal_string()?;
                let kind = args.unmarshal_u8()?;
                let len = codec::read_length_prefix(args, endianness)? as usize;
                let capacity = self.config.debug_buffer_capacity;
                if len > capacity {
                    codec::drain_payload(args, len)?;
                    return Err(ConsoleError::CapacityExceeded {
                        needed: len,
                        remaining: capacity,
                    });
                }
                let value = codec::read_payload(args, len)?;
                // The value arrives as a dvalue tag byte plus its encoded body.
                builder.string(&name).raw(&[kind]).raw(&value)
            }
            _ => builder,
        };
        Ok(builder.finish())
    }

    fn teardown_debug(&mut self, engine_initiated: bool) {
        let was_attached = self.debug.is_attached();
        let orphan = self.debug.end();
        if was_attached && !engine_initiated {
            self.engine.detach_debugger();
        }
        self.watchdog.enable();
        if let Some(pending) = orphan {
            self.send_error(&pending.reply_to, BusStatus::Busy);
        }
    }

    fn send_reply(&mut self, to: &ReplyTarget, body: ReplyBody) {
        if let Err(e) = self.bus.deliver_reply(to, body) {
            tracing::warn!(serial = to.serial, error = %e, "Reply undeliverable");
        }
    }

    fn send_error(&mut self, to: &ReplyTarget, status: BusStatus) {
        if let Err(e) = self.bus.deliver_error(to, status) {
            tracing::warn!(serial = to.serial, error = %e, "Error reply undeliverable");
        }
    }
}
