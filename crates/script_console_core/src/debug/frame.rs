//! Request frames for the engine's debugger and the input stream they are
//! queued on.

use crate::types::DebugMethod;
use crate::{ConsoleError, Result};

pub const MARKER_EOM: u8 = 0x00;
pub const MARKER_REQ: u8 = 0x01;

const INT32: u8 = 0x10;
const STR32: u8 = 0x11;
const STR16: u8 = 0x12;
const SMALL_STR: u8 = 0x60;
const SMALL_INT: u8 = 0x80;
const SHORT_INT: u8 = 0xc0;

pub fn opcode(method: DebugMethod) -> Option<u8> {
    Some(match method {
        DebugMethod::BasicInfo => 0x10,
        DebugMethod::TriggerStatus => 0x11,
        DebugMethod::Pause => 0x12,
        DebugMethod::Resume => 0x13,
        DebugMethod::StepInto => 0x14,
        DebugMethod::StepOver => 0x15,
        DebugMethod::StepOut => 0x16,
        DebugMethod::ListBreak => 0x17,
        DebugMethod::AddBreak => 0x18,
        DebugMethod::DelBreak => 0x19,
        DebugMethod::GetVar => 0x1a,
        DebugMethod::PutVar => 0x1b,
        DebugMethod::GetCallStack => 0x1c,
        DebugMethod::GetLocals => 0x1d,
        DebugMethod::Eval => 0x1e,
        DebugMethod::Detach => 0x1f,
        DebugMethod::DumpHeap => 0x20,
        DebugMethod::Version => return None,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Builds `[REQ, command, args.., EOM]`, encoding each field as a debugger
/// dvalue.
#[derive(Debug)]
pub struct FrameBuilder {
    bytes: Vec<u8>,
}

impl FrameBuilder {
    pub fn request(opcode: u8) -> Self {
        let mut builder = Self {
            bytes: vec![MARKER_REQ],
        };
        builder.push_int(opcode as u32);
        builder
    }

    pub fn int(mut self, value: u32) -> Self {
        self.push_int(value);
        self
    }

    pub fn string(mut self, value: &str) -> Self {
        let len = value.len();
        if len < 32 {
            self.bytes.push(SMALL_STR + len as u8);
        } else if len <= u16::MAX as usize {
            self.bytes.push(STR16);
            self.bytes.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            self.bytes.push(STR32);
            self.bytes.extend_from_slice(&(len as u32).to_be_bytes());
        }
        self.bytes.extend_from_slice(value.as_bytes());
        self
    }

    /// Appends bytes that are already dvalue encoded.
    pub fn raw(mut self, encoded: &[u8]) -> Self {
        self.bytes.extend_from_slice(encoded);
        self
    }

    pub fn finish(mut self) -> Frame {
        self.bytes.push(MARKER_EOM);
        Frame(self.bytes)
    }

    fn push_int(&mut self, value: u32) {
        if value < 64 {
            self.bytes.push(SMALL_INT + value as u8);
        } else if value < 16384 {
            self.bytes.push(SHORT_INT + (value >> 8) as u8);
            self.bytes.push(value as u8);
        } else {
            self.bytes.push(INT32);
            self.bytes.extend_from_slice(&value.to_be_bytes());
        }
    }
}

/// Bounded byte stream the engine's debugger reads requests from.
#[derive(Debug)]
pub struct DebugInput {
    bytes: Vec<u8>,
    read_pos: usize,
    capacity: usize,
}

impl DebugInput {
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            read_pos: 0,
            capacity,
        }
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.bytes.len()
    }

    pub fn append(&mut self, frame: &Frame) -> Result<()> {
        let remaining = self.remaining();
        if frame.len() > remaining {
            return Err(ConsoleError::CapacityExceeded {
                needed: frame.len(),
                remaining,
            });
        }
        self.bytes.extend_from_slice(frame.as_bytes());
        Ok(())
    }

    /// Bytes queued but not yet read.
    pub fn available(&self) -> usize {
        self.bytes.len() - self.read_pos
    }

    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.available());
        out[..n].copy_from_slice(&self.bytes[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        if self.read_pos == self.bytes.len() {
            self.clear();
        }
        n
    }

    /// Drops consumed bytes so their space can be reused.
    pub fn compact(&mut self) {
        self.bytes.drain(..self.read_pos);
        self.read_pos = 0;
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.read_pos = 0;
    }
}
