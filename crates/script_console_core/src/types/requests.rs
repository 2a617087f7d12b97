use serde::{Deserialize, Serialize};

/// Identifies an inbound bus message after the transport has matched it
/// against the console and debugger interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageId {
    AcceptSession,
    SessionLost,
    GetProperty(ConsoleProperty),
    SetProperty(ConsoleProperty),
    Eval,
    Install,
    Reset,
    Reboot,
    DebugBegin,
    DebugEnd,
    GetScript,
    Debug(DebugMethod),
    /// Anything the transport could not map onto the console surface.
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsoleProperty {
    Engine,
    MaxEvalLen,
    MaxScriptLen,
}

/// Methods of the script debugger interface that are forwarded to the
/// engine's debugger as request frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebugMethod {
    BasicInfo,
    TriggerStatus,
    Pause,
    Resume,
    StepInto,
    StepOver,
    StepOut,
    ListBreak,
    AddBreak,
    DelBreak,
    GetVar,
    PutVar,
    GetCallStack,
    GetLocals,
    DumpHeap,
    Version,
    Detach,
    Eval,
}

impl DebugMethod {
    /// Pause and add-breakpoint take effect while the script is running;
    /// everything else needs a paused debugger.
    pub fn is_immediate(self) -> bool {
        matches!(self, DebugMethod::Pause | DebugMethod::AddBreak)
    }
}
