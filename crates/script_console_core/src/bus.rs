//! Seams to the message bus transport.
//!
//! The transport owns session negotiation, header parsing and argument
//! marshalling. The console only sees a matched [`Message`] whose arguments
//! can be unmarshalled through [`MessageArgs`], and answers through [`Bus`].

use crate::codec::Endianness;
use crate::types::{BusStatus, MessageId, OutputKind, ReplyBody};
use crate::Result;

pub trait MessageArgs {
    /// Returns at most `max` bytes of the raw argument stream. The transport
    /// may hand out fewer bytes than asked for; an empty slice means no more
    /// bytes are available.
    fn unmarshal_raw(&mut self, max: usize) -> Result<&[u8]>;

    fn unmarshal_u8(&mut self) -> Result<u8>;

    fn unmarshal_u16(&mut self) -> Result<u16>;

    fn unmarshal_u32(&mut self) -> Result<u32>;

    fn unmarshal_string(&mut self) -> Result<String>;

    /// Rewinds the cursor to the first argument so another handler can
    /// unmarshal the message again.
    fn rewind(&mut self) -> Result<()>;
}

/// Everything needed to answer a method call later, without holding on to
/// the inbound message itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub serial: u32,
    pub sender: String,
    pub session_id: u32,
}

impl ReplyTarget {
    pub fn new(serial: u32, sender: impl Into<String>, session_id: u32) -> Self {
        Self {
            serial,
            sender: sender.into(),
            session_id,
        }
    }
}

#[derive(Debug)]
pub struct Message<A> {
    pub id: MessageId,
    pub endianness: Endianness,
    pub reply_to: ReplyTarget,
    pub args: A,
}

impl<A: MessageArgs> Message<A> {
    pub fn new(id: MessageId, reply_to: ReplyTarget, args: A) -> Self {
        Self {
            id,
            endianness: Endianness::native(),
            reply_to,
            args,
        }
    }

    pub fn with_endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = endianness;
        self
    }
}

pub trait Bus {
    fn deliver_reply(&mut self, to: &ReplyTarget, body: ReplyBody) -> Result<()>;

    fn deliver_error(&mut self, to: &ReplyTarget, status: BusStatus) -> Result<()>;

    fn reply_accept_session(&mut self, to: &ReplyTarget, accept: bool) -> Result<()>;

    /// Sends a print/alert signal. `body` is the fully marshalled signal
    /// payload whose size was declared before marshalling started.
    fn deliver_signal(
        &mut self,
        kind: OutputKind,
        destination: &str,
        session_id: u32,
        body: Vec<u8>,
    ) -> Result<()>;
}
