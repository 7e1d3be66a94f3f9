//! Logging macros with `format!`-style arguments.
//!
//! The message is only formatted when the logger's level and filters let the
//! event through, so disabled log statements cost a level check.
//!
//! # Examples
//!
//! ```
//! use rust_remote_logger::prelude::*;
//! use rust_remote_logger::info;
//!
//! let registry = LogRegistry::builder().root_sink(RootSink::Console).build();
//! let logger = registry.logger("server");
//!
//! // Basic logging
//! info!(logger, "Server started");
//!
//! // With format arguments
//! let port = 8080;
//! info!(logger, "Server listening on port {}", port);
//! ```

/// Log a formatted message at any level.
///
/// # Examples
///
/// ```
/// # use rust_remote_logger::prelude::*;
/// # let registry = LogRegistry::builder().root_sink(RootSink::Console).build();
/// # let logger = registry.logger("app");
/// use rust_remote_logger::log;
/// log!(logger, Level::INFO, "Simple message");
/// log!(logger, Level::new(3500), "Between info and warn: {}", 35);
/// ```
#[macro_export]
macro_rules! log {
    ($logger:expr, $level:expr, $($arg:tt)+) => {
        $logger.log_lazy($level, || format!($($arg)+))
    };
}

/// Log a trace-level message.
///
/// # Examples
///
/// ```
/// # use rust_remote_logger::prelude::*;
/// # let registry = LogRegistry::builder().root_sink(RootSink::Console).build();
/// # let logger = registry.logger("app");
/// # logger.set_options(LoggerOptions::new().level(Level::TRACE));
/// use rust_remote_logger::trace;
/// trace!(logger, "Entering function: calculate()");
/// trace!(logger, "Variable value: {}", 42);
/// ```
#[macro_export]
macro_rules! trace {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::TRACE, $($arg)+)
    };
}

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::DEBUG, $($arg)+)
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::INFO, $($arg)+)
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::WARN, $($arg)+)
    };
}

/// Log an error-level message.
///
/// # Examples
///
/// ```
/// # use rust_remote_logger::prelude::*;
/// # let registry = LogRegistry::builder().root_sink(RootSink::Console).build();
/// # let logger = registry.logger("app");
/// use rust_remote_logger::error;
/// let path = "/var/data/orders.db";
/// error!(logger, "Failed to open {}", path);
/// ```
#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::ERROR, $($arg)+)
    };
}

#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $crate::log!($logger, $crate::Level::FATAL, $($arg)+)
    };
}
