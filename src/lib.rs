//! # Rust Remote Logger
//!
//! Client-side logging for applications that ship their logs elsewhere.
//! Events flow through a hierarchy of named loggers into appenders, which
//! buffer, batch and deliver them to a log endpoint or the console.
//!
//! ## Features
//!
//! - **Logger hierarchy**: dotted names, attributes inherited from the parent
//! - **Hold buffer**: keep recent low-level events and ship them only when
//!   something important happens
//! - **Batching**: by size or age, with one delivery in flight per appender
//! - **Backpressure**: bounded send queue with loss reporting, and a global
//!   message quota
//! - **At-least-once delivery**: unacknowledged batches are sent again after
//!   the send timeout
//!
//! ## Example
//!
//! ```
//! use rust_remote_logger::prelude::*;
//!
//! let registry = LogRegistry::builder().root_sink(RootSink::Console).build();
//!
//! let appender = registry.create_console_appender("checkout");
//! appender
//!     .set_options(
//!         AppenderOptions::new()
//!             .level(Level::WARN)
//!             .buffer_size(20)
//!             .send_with_buffer_level(Level::ERROR),
//!     )
//!     .unwrap();
//!
//! let logger = registry.logger("shop.checkout");
//! logger.set_options(LoggerOptions::new().level(Level::TRACE).appenders(vec![appender]));
//!
//! logger.debug("cart loaded"); // held
//! logger.error("payment failed"); // sent, followed by "cart loaded"
//! ```

pub mod appenders;
pub mod core;
pub mod macros;

use std::sync::Arc;

pub mod prelude {
    pub use crate::appenders::{ConsoleBackend, ConsoleSeverity, ConsoleTransport, StdConsole};
    #[cfg(feature = "network")]
    pub use crate::appenders::NetworkTransport;
    pub use crate::core::{
        global_registry, init_global_registry, Appender, AppenderOptions, Completion,
        ErrorReport, GlobalOptions, Level, LogEvent, LogPayload, LogRegistry, Logger,
        LoggerError, LoggerOptions, LoggingConfig, ManualScheduler, RegistryBuilder, Result,
        RootSink, Scheduler, Transport,
    };
}

pub use appenders::{ConsoleTransport, StdConsole};
#[cfg(feature = "network")]
pub use appenders::NetworkTransport;
pub use core::{
    global_registry, init_global_registry, Appender, AppenderMetrics, AppenderOptions,
    AppenderSettings, AppenderStats, Completion, ErrorReport, GlobalConfig, GlobalOptions, Level,
    LogBatch, LogEvent, LogPayload, LogRegistry, Logger, LoggerError, LoggerOptions,
    LoggingConfig, ManualScheduler, OutgoingRequest, Patch, RegistryBuilder, Result, RootSink,
    Scheduler, ThreadScheduler, TimestampFormat, Transport,
};

/// Get or create a logger in the process-wide registry.
pub fn logger(name: &str) -> Arc<Logger> {
    global_registry().logger(name)
}
