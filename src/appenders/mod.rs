//! Transport implementations

pub mod console;
#[cfg(feature = "network")]
pub mod network;

pub use console::{ConsoleBackend, ConsoleSeverity, ConsoleTransport, StdConsole};
#[cfg(feature = "network")]
pub use network::{NetworkTransport, DEFAULT_ENDPOINT};
