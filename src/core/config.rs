//! Declarative configuration
//!
//! A [`LoggingConfig`] is a JSON document applied with
//! [`LogRegistry::configure`](crate::core::LogRegistry::configure). Every
//! option is a patch: an absent key leaves the current value alone, `null`
//! clears it, anything else sets it.
//!
//! ```
//! use rust_remote_logger::core::LoggingConfig;
//!
//! let config = LoggingConfig::from_json_str(r#"{
//!     "options": { "max_messages": 500, "default_url": "https://logs.example.com/jsnlog.logger" },
//!     "appenders": [
//!         { "name": "remote", "kind": "network",
//!           "options": { "level": "WARN", "buffer_size": 20, "send_with_buffer_level": "ERROR" } }
//!     ],
//!     "loggers": [
//!         { "name": "checkout", "level": "TRACE", "appenders": ["remote"] }
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(config.appenders.len(), 1);
//! ```

use super::{
    appender::{Appender, AppenderOptions},
    error::{LoggerError, Result},
    global::GlobalOptions,
    log_level::Level,
    logger::LoggerOptions,
    patch::Patch,
};
use serde::Deserialize;
use std::path::Path;

#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub options: GlobalOptions,
    pub appenders: Vec<AppenderConfig>,
    pub loggers: Vec<LoggerConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppenderKind {
    Console,
    Network,
}

/// An appender to create (if its name is new) and configure.
#[derive(Clone, Deserialize)]
pub struct AppenderConfig {
    pub name: String,
    pub kind: AppenderKind,
    #[serde(default)]
    pub options: AppenderOptions,
}

/// A logger to patch. The empty name is the root logger.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub name: String,
    pub level: Patch<Level>,
    pub user_agent_regex: Patch<String>,
    pub ip_regex: Patch<String>,
    pub disallow: Patch<String>,
    /// Appender names
    pub appenders: Patch<Vec<String>>,
    pub once_only: Patch<Vec<String>>,
}

impl LoggerConfig {
    /// Turn appender names into appenders with `lookup`.
    pub(crate) fn to_options(
        &self,
        lookup: impl Fn(&str) -> Result<Appender>,
    ) -> Result<LoggerOptions> {
        let appenders = match &self.appenders {
            Patch::Keep => Patch::Keep,
            Patch::Clear => Patch::Clear,
            Patch::Set(names) => Patch::Set(
                names
                    .iter()
                    .map(|name| lookup(name))
                    .collect::<Result<Vec<_>>>()?,
            ),
        };

        Ok(LoggerOptions {
            level: self.level.clone(),
            user_agent_regex: self.user_agent_regex.clone(),
            ip_regex: self.ip_regex.clone(),
            disallow: self.disallow.clone(),
            appenders,
            once_only: self.once_only.clone(),
        })
    }
}

impl LoggingConfig {
    /// # Errors
    ///
    /// Returns error if the text is not a valid configuration document
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// # Errors
    ///
    /// Returns error if the file cannot be read or is not a valid configuration document
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LoggerError::io_operation(
                "reading logging configuration",
                path.display().to_string(),
                e,
            )
        })?;
        Self::from_json_str(&text)
    }
}
