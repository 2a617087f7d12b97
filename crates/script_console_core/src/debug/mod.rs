//! Bridge between debugger method calls on the bus and the byte-oriented
//! protocol spoken by the engine's debugger.

mod bridge;
pub mod frame;

pub use bridge::{DebugBridge, PendingRequest};
pub use frame::{DebugInput, Frame, FrameBuilder};
