//! Console transport
//!
//! Writes each event as one line and acknowledges synchronously. The line's
//! severity is chosen from the level; if the backend lacks that severity it
//! falls back (debug to info, anything else to plain log).

use crate::core::{Completion, Level, LogEvent, TimestampFormat, Transport};
use colored::Colorize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleSeverity {
    Log,
    Debug,
    Info,
    Warn,
    Error,
}

impl ConsoleSeverity {
    pub fn for_level(level: Level) -> Self {
        if level <= Level::DEBUG {
            ConsoleSeverity::Debug
        } else if level <= Level::INFO {
            ConsoleSeverity::Info
        } else if level <= Level::WARN {
            ConsoleSeverity::Warn
        } else {
            ConsoleSeverity::Error
        }
    }

    /// Next severity to try when this one is unavailable.
    pub fn fallback(self) -> Option<Self> {
        match self {
            ConsoleSeverity::Debug => Some(ConsoleSeverity::Info),
            ConsoleSeverity::Info | ConsoleSeverity::Warn | ConsoleSeverity::Error => {
                Some(ConsoleSeverity::Log)
            }
            ConsoleSeverity::Log => None,
        }
    }
}

/// Where console lines end up.
pub trait ConsoleBackend: Send + Sync {
    fn supports(&self, _severity: ConsoleSeverity) -> bool {
        true
    }

    fn write(&self, severity: ConsoleSeverity, level: Level, line: &str);
}

/// Standard output and error, colored by level.
pub struct StdConsole {
    use_colors: bool,
}

impl StdConsole {
    pub fn new() -> Self {
        Self { use_colors: true }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }
}

impl Default for StdConsole {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleBackend for StdConsole {
    fn write(&self, severity: ConsoleSeverity, level: Level, line: &str) {
        let output = if self.use_colors {
            line.color(level.color_code()).to_string()
        } else {
            line.to_string()
        };

        // Route warn and error to stderr, others to stdout
        match severity {
            ConsoleSeverity::Warn | ConsoleSeverity::Error => eprintln!("{}", output),
            _ => println!("{}", output),
        }
    }
}

pub struct ConsoleTransport {
    backend: Arc<dyn ConsoleBackend>,
    timestamp_format: Option<TimestampFormat>,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::with_backend(Arc::new(StdConsole::new()))
    }

    pub fn with_backend(backend: Arc<dyn ConsoleBackend>) -> Self {
        Self {
            backend,
            timestamp_format: Some(TimestampFormat::default()),
        }
    }

    /// Set the timestamp format
    ///
    /// # Examples
    ///
    /// ```
    /// use rust_remote_logger::appenders::ConsoleTransport;
    /// use rust_remote_logger::TimestampFormat;
    ///
    /// let transport = ConsoleTransport::new()
    ///     .with_timestamp_format(TimestampFormat::TimeOfDay);
    /// ```
    #[must_use]
    pub fn with_timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = Some(format);
        self
    }

    /// Print `logger: message` only, e.g. when the console already stamps lines.
    #[must_use]
    pub fn without_timestamp(mut self) -> Self {
        self.timestamp_format = None;
        self
    }

    pub fn format_line(&self, event: &LogEvent) -> String {
        match &self.timestamp_format {
            Some(format) => format!(
                "{} | {}: {}",
                format.format_millis(event.timestamp_ms),
                event.logger_name,
                event.message
            ),
            None => format!("{}: {}", event.logger_name, event.message),
        }
    }

    fn severity_for(&self, level: Level) -> Option<ConsoleSeverity> {
        let mut severity = Some(ConsoleSeverity::for_level(level));
        while let Some(candidate) = severity {
            if self.backend.supports(candidate) {
                return Some(candidate);
            }
            severity = candidate.fallback();
        }
        None
    }
}

impl Default for ConsoleTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for ConsoleTransport {
    fn deliver(&self, events: Vec<LogEvent>, completion: Completion) {
        let written = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            for event in &events {
                if let Some(severity) = self.severity_for(event.level) {
                    self.backend.write(severity, event.level, &self.format_line(event));
                }
            }
        }));

        if written.is_err() {
            tracing::debug!("console backend panicked while writing log events");
        }

        // Console output cannot be retried meaningfully; always acknowledge.
        completion.succeed();
    }

    fn name(&self) -> &str {
        "console"
    }
}
