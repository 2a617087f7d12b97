//! Single-controller session gate.

use crate::bus::{Bus, MessageArgs, ReplyTarget};
use crate::{ConsoleError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleSession {
    pub session_id: u32,
    pub peer_name: String,
}

/// What the gate did with a session-management message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Accepted,
    Rejected,
    Released,
    /// Not addressed to the console; arguments were rewound.
    NotOurs,
}

#[derive(Debug)]
pub struct SessionGate {
    port: u16,
    peer_name_capacity: usize,
    active: Option<ConsoleSession>,
}

impl SessionGate {
    pub fn new(port: u16, peer_name_capacity: usize) -> Self {
        Self {
            port,
            peer_name_capacity,
            active: None,
        }
    }

    pub fn active(&self) -> Option<&ConsoleSession> {
        self.active.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Handles an accept-session call carrying `(port: u16, session_id: u32, joiner: string)`.
    pub fn accept<A, B>(&mut self, args: &mut A, reply_to: &ReplyTarget, bus: &mut B) -> Result<GateOutcome>
    where
        A: MessageArgs + ?Sized,
        B: Bus + ?Sized,
    {
        let port = args.unmarshal_u16()?;
        let session_id = args.unmarshal_u32()?;
        let joiner = args.unmarshal_string()?;

        if port != self.port {
            args.rewind()?;
            return Ok(GateOutcome::NotOurs);
        }

        if self.active.is_some() {
            tracing::info!(session_id, joiner = %joiner, "Rejecting second console session");
            bus.reply_accept_session(reply_to, false)?;
            return Ok(GateOutcome::Rejected);
        }

        // The name must fit alongside its terminator.
        if joiner.len() + 1 > self.peer_name_capacity {
            bus.reply_accept_session(reply_to, false)?;
            return Err(ConsoleError::PeerNameTooLong {
                len: joiner.len(),
                capacity: self.peer_name_capacity,
            });
        }

        bus.reply_accept_session(reply_to, true)?;
        tracing::info!(session_id, joiner = %joiner, "Accepted session");
        self.active = Some(ConsoleSession {
            session_id,
            peer_name: joiner,
        });
        Ok(GateOutcome::Accepted)
    }

    /// Handles a session-lost signal carrying `(session_id: u32, ..)`.
    pub fn session_lost<A: MessageArgs + ?Sized>(&mut self, args: &mut A) -> Result<GateOutcome> {
        let session_id = args.unmarshal_u32()?;
        match &self.active {
            Some(active) if active.session_id == session_id => {
                tracing::info!(session_id, "Console session lost");
                self.active = None;
                Ok(GateOutcome::Released)
            }
            _ => {
                args.rewind()?;
                Ok(GateOutcome::NotOurs)
            }
        }
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}
