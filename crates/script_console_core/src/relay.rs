//! Forwarding of script print/alert output to the controller.

use crate::bus::Bus;
use crate::codec::{Endianness, RawBody, LENGTH_PREFIX_LEN};
use crate::session::ConsoleSession;
use crate::types::OutputKind;
use crate::Result;

/// Sends `args` to the controller as a single string signal, or renders them
/// locally when there is no session or the debugger asked for quiet output.
/// Delivery failures are logged and never reach the script.
pub fn relay_output<B: Bus + ?Sized>(
    bus: &mut B,
    kind: OutputKind,
    args: &[String],
    session: Option<&ConsoleSession>,
    quiet: bool,
) {
    match session {
        Some(session) if !quiet => {
            if let Err(e) = signal_console(bus, kind, args, session) {
                tracing::error!(error = %e, ?kind, "Failed to deliver signal");
            }
        }
        _ => render_locally(kind, args),
    }
}

fn signal_console<B: Bus + ?Sized>(
    bus: &mut B,
    kind: OutputKind,
    args: &[String],
    session: &ConsoleSession,
) -> Result<()> {
    // The signal declares its size before anything is marshalled.
    let text_len: usize = args.iter().map(String::len).sum();
    let mut body = RawBody::with_declared_len(LENGTH_PREFIX_LEN + text_len + 1);

    body.marshal_raw(&Endianness::native().encode_u32(text_len as u32))?;
    for arg in args {
        body.marshal_raw(arg.as_bytes())?;
    }
    body.marshal_raw(&[0])?;

    bus.deliver_signal(kind, &session.peer_name, session.session_id, body.finish()?)
}

fn render_locally(kind: OutputKind, args: &[String]) {
    tracing::info!(target: "console_output", "{}: {}", kind.label(), args.concat());
}
