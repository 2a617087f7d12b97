//! Script Console Core
//!
//! A remote console and debugger bridge for an embedded script engine. A single
//! controller session on a message bus can evaluate expressions, install a
//! persistent startup script, reset the engine, and drive the engine's debugger
//! through request/reply method calls. Script output is relayed back as signals.

pub mod bus;
pub mod codec;
pub mod config;
pub mod console;
pub mod debug;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod relay;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::ConsoleConfig;
pub use console::{Dispatch, ScriptConsole};
pub use error::ConsoleError;

/// Result type alias using ConsoleError
pub type Result<T> = std::result::Result<T, ConsoleError>;
