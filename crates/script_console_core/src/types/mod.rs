mod requests;
mod responses;

pub use requests::{ConsoleProperty, DebugMethod, MessageId};
pub use responses::{BusStatus, OutputKind, PropertyValue, ReplyBody, ReplyCode};
