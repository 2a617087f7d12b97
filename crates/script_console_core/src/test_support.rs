//! Recording doubles for the bus, engine and watchdog.

use crate::bus::{Bus, ReplyTarget};
use crate::engine::{ExecOutcome, ExecStatus, ScriptEngine, Watchdog};
use crate::types::{BusStatus, OutputKind, ReplyBody};
use crate::{ConsoleError, Result};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct RecordingBus {
    pub replies: Vec<(ReplyTarget, ReplyBody)>,
    pub errors: Vec<(ReplyTarget, BusStatus)>,
    pub session_replies: Vec<bool>,
    pub signals: Vec<(OutputKind, String, u32, Vec<u8>)>,
    pub fail_deliveries: bool,
}

impl RecordingBus {
    fn check(&self) -> Result<()> {
        if self.fail_deliveries {
            return Err(ConsoleError::bus("peer unreachable"));
        }
        Ok(())
    }

    pub fn last_reply(&self) -> Option<&ReplyBody> {
        self.replies.last().map(|(_, body)| body)
    }

    pub fn last_error(&self) -> Option<BusStatus> {
        self.errors.last().map(|(_, status)| *status)
    }
}

impl Bus for RecordingBus {
    fn deliver_reply(&mut self, to: &ReplyTarget, body: ReplyBody) -> Result<()> {
        self.check()?;
        self.replies.push((to.clone(), body));
        Ok(())
    }

    fn deliver_error(&mut self, to: &ReplyTarget, status: BusStatus) -> Result<()> {
        self.check()?;
        self.errors.push((to.clone(), status));
        Ok(())
    }

    fn reply_accept_session(&mut self, _to: &ReplyTarget, accept: bool) -> Result<()> {
        self.check()?;
        self.session_replies.push(accept);
        Ok(())
    }

    fn deliver_signal(
        &mut self,
        kind: OutputKind,
        destination: &str,
        session_id: u32,
        body: Vec<u8>,
    ) -> Result<()> {
        self.check()?;
        self.signals
            .push((kind, destination.to_string(), session_id, body));
        Ok(())
    }
}

#[derive(Debug)]
pub struct ScriptedEngine {
    compile_outcome: ExecOutcome,
    run_outcome: ExecOutcome,
    pub compiled: Vec<Vec<u8>>,
    pub runs: usize,
    pub attached: bool,
    pub attach_calls: usize,
    pub detach_calls: usize,
}

impl ScriptedEngine {
    pub fn returning(run_outcome: ExecOutcome) -> Self {
        Self {
            compile_outcome: ExecOutcome::success(""),
            run_outcome,
            compiled: Vec::new(),
            runs: 0,
            attached: false,
            attach_calls: 0,
            detach_calls: 0,
        }
    }

    pub fn failing_compile(compile_outcome: ExecOutcome) -> Self {
        Self {
            compile_outcome,
            ..Self::returning(ExecOutcome::new(ExecStatus::Other(-1), "not run"))
        }
    }
}

impl ScriptEngine for ScriptedEngine {
    fn compile(&mut self, _filename: &str, source: &[u8]) -> ExecOutcome {
        self.compiled.push(source.to_vec());
        self.compile_outcome.clone()
    }

    fn run(&mut self) -> ExecOutcome {
        self.runs += 1;
        self.run_outcome.clone()
    }

    fn attach_debugger(&mut self) {
        self.attached = true;
        self.attach_calls += 1;
    }

    fn detach_debugger(&mut self) {
        self.attached = false;
        self.detach_calls += 1;
    }
}

#[derive(Debug, Default)]
pub struct RecordingWatchdog {
    pub armed: usize,
    pub disarmed: usize,
    pub suspended: bool,
    pub last_timeout: Option<Duration>,
}

impl Watchdog for RecordingWatchdog {
    fn arm(&mut self, timeout: Duration) {
        self.armed += 1;
        self.last_timeout = Some(timeout);
    }

    fn disarm(&mut self) {
        self.disarmed += 1;
    }

    fn enable(&mut self) {
        self.suspended = false;
    }

    fn disable(&mut self) {
        self.suspended = true;
    }
}
