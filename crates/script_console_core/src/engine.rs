//! Script engine and watchdog seams.

use crate::types::ReplyCode;
use std::time::Duration;

/// Raw result of a compile or run step as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    Success,
    EvalError,
    TypeError,
    RangeError,
    SyntaxError,
    AllocError,
    /// Any engine-specific code the console has no mapping for.
    Other(i32),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    pub status: ExecStatus,
    /// Stringified result value or error diagnostic.
    pub text: String,
}

impl ExecOutcome {
    pub fn new(status: ExecStatus, text: impl Into<String>) -> Self {
        Self {
            status,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self::new(ExecStatus::Success, text)
    }
}

pub trait ScriptEngine {
    /// Compiles `source` as an anonymous eval unit. On success the compiled
    /// unit is kept by the engine until the next [`ScriptEngine::run`].
    fn compile(&mut self, filename: &str, source: &[u8]) -> ExecOutcome;

    fn run(&mut self) -> ExecOutcome;

    /// Binds the engine's debugger to the console's debug transport.
    fn attach_debugger(&mut self);

    fn detach_debugger(&mut self);
}

pub trait Watchdog {
    /// Arms the runaway-script guard for one evaluation.
    fn arm(&mut self, timeout: Duration);

    fn disarm(&mut self);

    fn enable(&mut self);

    /// Suspends the guard entirely, e.g. while a debugger holds the script paused.
    fn disable(&mut self);
}

pub fn reply_code_for(status: ExecStatus) -> ReplyCode {
    match status {
        ExecStatus::Success => ReplyCode::Ok,
        ExecStatus::EvalError | ExecStatus::TypeError | ExecStatus::RangeError => {
            ReplyCode::EvalError
        }
        ExecStatus::SyntaxError => ReplyCode::SyntaxError,
        ExecStatus::AllocError => ReplyCode::ResourceError,
        ExecStatus::Other(_) => ReplyCode::InternalError,
    }
}
