use super::frame::{DebugInput, Frame};
use crate::bus::ReplyTarget;
use crate::types::DebugMethod;
use crate::{ConsoleError, Result};

/// A bus call waiting for the engine's debugger to answer it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub reply_to: ReplyTarget,
    pub method: DebugMethod,
}

#[derive(Debug)]
pub struct DebugBridge {
    attached: bool,
    paused: bool,
    quiet: bool,
    pending: Option<PendingRequest>,
    input: DebugInput,
    output: Vec<u8>,
}

impl DebugBridge {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            attached: false,
            paused: false,
            quiet: false,
            pending: None,
            input: DebugInput::new(buffer_capacity),
            output: Vec::new(),
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Returns false when a session was already attached.
    pub fn begin(&mut self, quiet: bool) -> bool {
        if self.attached {
            return false;
        }
        self.attached = true;
        self.paused = false;
        self.quiet = quiet;
        self.input.clear();
        self.output.clear();
        true
    }

    /// Tears the session down and hands back any request that will now
    /// never be answered.
    pub fn end(&mut self) -> Option<PendingRequest> {
        self.attached = false;
        self.paused = false;
        self.quiet = false;
        self.input.clear();
        self.output.clear();
        self.pending.take()
    }

    /// Reported by the engine's debugger when execution halts or resumes.
    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Queues `frame` for the engine and stashes the caller until the engine
    /// answers. Pause and add-breakpoint may be re-asked and replace an
    /// outstanding request, which is returned so it can be answered busy.
    pub fn submit(
        &mut self,
        method: DebugMethod,
        frame: Frame,
        reply_to: ReplyTarget,
    ) -> Result<Option<PendingRequest>> {
        if !self.accepts(method) {
            return Err(ConsoleError::Busy);
        }
        if let Err(e) = self.input.append(&frame) {
            tracing::error!(?method, error = %e, "No space to write debug message");
            return Err(e);
        }
        tracing::debug!(?method, len = frame.len(), "Queued debug request");
        Ok(self.pending.replace(PendingRequest { reply_to, method }))
    }

    /// Whether a request of this kind can be translated right now, as
    /// opposed to being answered busy.
    pub fn accepts(&self, method: DebugMethod) -> bool {
        if !self.attached {
            return false;
        }
        if method.is_immediate() {
            return true;
        }
        self.paused && self.pending.is_none()
    }

    /// Takes the stashed request if it is the one the engine answered.
    pub fn complete(&mut self, method: DebugMethod) -> Option<PendingRequest> {
        match &self.pending {
            Some(pending) if pending.method == method => self.pending.take(),
            _ => None,
        }
    }

    pub fn read(&mut self, out: &mut [u8]) -> usize {
        self.input.read(out)
    }

    pub fn peek(&self) -> usize {
        self.input.available()
    }

    pub fn read_flush(&mut self) {
        self.input.compact();
    }

    pub fn write(&mut self, bytes: &[u8]) -> usize {
        self.output.extend_from_slice(bytes);
        bytes.len()
    }

    pub fn write_flush(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }
}
