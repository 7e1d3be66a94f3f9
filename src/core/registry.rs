//! Logger registry
//!
//! Owns the global configuration, the scheduler, the logger tree and the
//! named appenders. Loggers are created on first use together with any
//! missing ancestors and live as long as the registry.

use super::{
    appender::{Appender, Transport},
    config::{AppenderKind, LoggingConfig},
    error::{LoggerError, Result},
    global::{GlobalConfig, GlobalOptions},
    logger::Logger,
    scheduler::{Scheduler, ThreadScheduler},
    timestamp::TimestampFormat,
};
use crate::appenders::{ConsoleBackend, ConsoleTransport, StdConsole};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Name of the appender the root logger starts with.
pub const DEFAULT_APPENDER_NAME: &str = "";

/// Which transport the root logger's default appender uses.
pub enum RootSink {
    Console,
    #[cfg(feature = "network")]
    Network,
    Custom(Arc<dyn Transport>),
}

impl Default for RootSink {
    #[cfg(feature = "network")]
    fn default() -> Self {
        RootSink::Network
    }

    #[cfg(not(feature = "network"))]
    fn default() -> Self {
        RootSink::Console
    }
}

pub struct RegistryBuilder {
    scheduler: Option<Arc<dyn Scheduler>>,
    root_sink: RootSink,
    console_backend: Option<Arc<dyn ConsoleBackend>>,
    timestamp_format: TimestampFormat,
    options: GlobalOptions,
    #[cfg(feature = "network")]
    runtime: Option<tokio::runtime::Handle>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            scheduler: None,
            root_sink: RootSink::default(),
            console_backend: None,
            timestamp_format: TimestampFormat::default(),
            options: GlobalOptions::default(),
            #[cfg(feature = "network")]
            runtime: None,
        }
    }

    /// Clock and timers for every appender; a [`ThreadScheduler`] by default.
    #[must_use]
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    #[must_use]
    pub fn root_sink(mut self, sink: RootSink) -> Self {
        self.root_sink = sink;
        self
    }

    #[must_use]
    pub fn console_backend(mut self, backend: Arc<dyn ConsoleBackend>) -> Self {
        self.console_backend = Some(backend);
        self
    }

    #[must_use]
    pub fn timestamp_format(mut self, format: TimestampFormat) -> Self {
        self.timestamp_format = format;
        self
    }

    /// Global options applied before the first logger exists.
    #[must_use]
    pub fn options(mut self, options: GlobalOptions) -> Self {
        self.options = options;
        self
    }

    /// Spawn network requests on this runtime instead of one per transport.
    #[cfg(feature = "network")]
    #[must_use]
    pub fn runtime(mut self, handle: tokio::runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    pub fn build(self) -> LogRegistry {
        let global = Arc::new(GlobalConfig::new());
        global.set_options(self.options);

        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(ThreadScheduler::new()));
        let console_backend = self
            .console_backend
            .unwrap_or_else(|| Arc::new(StdConsole::new()));

        let transport: Arc<dyn Transport> = match self.root_sink {
            RootSink::Console => Arc::new(console_transport(&console_backend, &self.timestamp_format)),
            #[cfg(feature = "network")]
            RootSink::Network => match network_transport(&global, self.runtime.as_ref()) {
                Ok(transport) => Arc::new(transport),
                Err(e) => {
                    tracing::warn!(error = %e, "network transport unavailable, logging to the console");
                    Arc::new(console_transport(&console_backend, &self.timestamp_format))
                }
            },
            RootSink::Custom(transport) => transport,
        };

        let default_appender = Appender::new(
            DEFAULT_APPENDER_NAME,
            transport,
            Arc::clone(&global),
            Arc::clone(&scheduler),
        );
        let root = Arc::new(Logger::root(Arc::clone(&global), default_appender.clone()));

        let mut appenders = HashMap::new();
        appenders.insert(DEFAULT_APPENDER_NAME.to_string(), default_appender);

        LogRegistry {
            global,
            scheduler,
            console_backend,
            timestamp_format: self.timestamp_format,
            #[cfg(feature = "network")]
            runtime: self.runtime,
            root,
            loggers: RwLock::new(HashMap::new()),
            appenders: RwLock::new(appenders),
        }
    }
}

fn console_transport(backend: &Arc<dyn ConsoleBackend>, format: &TimestampFormat) -> ConsoleTransport {
    ConsoleTransport::with_backend(Arc::clone(backend)).with_timestamp_format(format.clone())
}

#[cfg(feature = "network")]
fn network_transport(
    global: &Arc<GlobalConfig>,
    runtime: Option<&tokio::runtime::Handle>,
) -> Result<crate::appenders::NetworkTransport> {
    use crate::appenders::NetworkTransport;

    match runtime {
        Some(handle) => NetworkTransport::with_handle(Arc::clone(global), handle.clone()),
        None => NetworkTransport::new(Arc::clone(global)),
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LogRegistry {
    global: Arc<GlobalConfig>,
    scheduler: Arc<dyn Scheduler>,
    console_backend: Arc<dyn ConsoleBackend>,
    timestamp_format: TimestampFormat,
    #[cfg(feature = "network")]
    runtime: Option<tokio::runtime::Handle>,
    root: Arc<Logger>,
    loggers: RwLock<HashMap<String, Arc<Logger>>>,
    appenders: RwLock<HashMap<String, Appender>>,
}

impl LogRegistry {
    pub fn new() -> Self {
        RegistryBuilder::new().build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn global(&self) -> &Arc<GlobalConfig> {
        &self.global
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Patch the process-wide options.
    pub fn set_options(&self, options: GlobalOptions) {
        self.global.set_options(options);
    }

    pub fn root(&self) -> Arc<Logger> {
        Arc::clone(&self.root)
    }

    /// Get or create the logger `name`, creating missing ancestors on the way.
    /// The empty name is the root logger.
    pub fn logger(&self, name: &str) -> Arc<Logger> {
        if name.is_empty() {
            return self.root();
        }

        if let Some(existing) = self.loggers.read().get(name) {
            return Arc::clone(existing);
        }

        let mut loggers = self.loggers.write();
        let mut parent = self.root();
        let mut path = String::with_capacity(name.len());
        for segment in name.split('.') {
            if !path.is_empty() {
                path.push('.');
            }
            path.push_str(segment);

            let logger = loggers
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Logger::child(path.clone(), Arc::clone(&parent))));
            parent = Arc::clone(logger);
        }
        parent
    }

    /// Names of all loggers created so far, root excluded.
    pub fn logger_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loggers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Create an appender on `transport` and register it under `name`,
    /// replacing any earlier appender of that name.
    pub fn create_appender(&self, name: &str, transport: Arc<dyn Transport>) -> Appender {
        let appender = Appender::new(
            name,
            transport,
            Arc::clone(&self.global),
            Arc::clone(&self.scheduler),
        );
        self.appenders
            .write()
            .insert(name.to_string(), appender.clone());
        appender
    }

    pub fn create_console_appender(&self, name: &str) -> Appender {
        let transport = console_transport(&self.console_backend, &self.timestamp_format);
        self.create_appender(name, Arc::new(transport))
    }

    /// # Errors
    ///
    /// Returns error if the transport's runtime or HTTP client cannot be created
    #[cfg(feature = "network")]
    pub fn create_network_appender(&self, name: &str) -> Result<Appender> {
        let transport = network_transport(&self.global, self.runtime.as_ref())?;
        Ok(self.create_appender(name, Arc::new(transport)))
    }

    pub fn appender(&self, name: &str) -> Option<Appender> {
        self.appenders.read().get(name).cloned()
    }

    /// Apply a declarative configuration: global options, then appenders,
    /// then loggers.
    ///
    /// # Errors
    ///
    /// Returns error if an appender's options are invalid, a network
    /// appender cannot be created, or a logger names an unknown appender.
    /// Everything before the failing entry has already been applied.
    pub fn configure(&self, config: &LoggingConfig) -> Result<()> {
        self.global.set_options(config.options.clone());

        for entry in &config.appenders {
            let appender = match self.appender(&entry.name) {
                Some(existing) => existing,
                None => self.create_kind(&entry.name, entry.kind)?,
            };
            appender.set_options(entry.options.clone())?;
        }

        let resolved = config
            .loggers
            .iter()
            .map(|entry| {
                entry
                    .to_options(|name| {
                        self.appender(name)
                            .ok_or_else(|| LoggerError::unknown_appender(name))
                    })
                    .map(|options| (entry.name.as_str(), options))
            })
            .collect::<Result<Vec<_>>>()?;

        for (name, options) in resolved {
            self.logger(name).set_options(options);
        }

        tracing::debug!(
            appenders = config.appenders.len(),
            loggers = config.loggers.len(),
            "applied logging configuration"
        );
        Ok(())
    }

    fn create_kind(&self, name: &str, kind: AppenderKind) -> Result<Appender> {
        match kind {
            AppenderKind::Console => Ok(self.create_console_appender(name)),
            #[cfg(feature = "network")]
            AppenderKind::Network => self.create_network_appender(name),
            #[cfg(not(feature = "network"))]
            AppenderKind::Network => Err(LoggerError::config(
                format!("appender '{}'", name),
                "network appenders need the `network` feature",
            )),
        }
    }
}

impl Default for LogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_REGISTRY: OnceLock<LogRegistry> = OnceLock::new();

/// The process-wide registry, created with defaults on first use.
pub fn global_registry() -> &'static LogRegistry {
    GLOBAL_REGISTRY.get_or_init(LogRegistry::new)
}

/// Create the process-wide registry from `builder`. Call once at startup,
/// before anything logs.
///
/// # Errors
///
/// Returns [`LoggerError::AlreadyInitialized`] if the registry already exists
pub fn init_global_registry(builder: RegistryBuilder) -> Result<&'static LogRegistry> {
    let mut initialized = false;
    let registry = GLOBAL_REGISTRY.get_or_init(|| {
        initialized = true;
        builder.build()
    });

    if initialized {
        Ok(registry)
    } else {
        Err(LoggerError::AlreadyInitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AppenderOptions, Level, LoggerOptions, ManualScheduler};

    fn registry() -> LogRegistry {
        LogRegistry::builder()
            .scheduler(Arc::new(ManualScheduler::new(0)))
            .root_sink(RootSink::Console)
            .build()
    }

    #[test]
    fn test_root_logger() {
        let registry = registry();
        let root = registry.root();
        assert!(root.is_root());
        assert!(Arc::ptr_eq(&root, &registry.logger("")));
        assert_eq!(root.level(), Level::DEBUG);

        let default = registry.appender(DEFAULT_APPENDER_NAME).expect("default appender");
        assert!(root.appenders()[0].ptr_eq(&default));
        assert_eq!(default.transport_name(), "console");
    }

    #[test]
    fn test_ancestors_created_lazily() {
        let registry = registry();
        let leaf = registry.logger("a.b.c");

        assert_eq!(registry.logger_names(), vec!["a", "a.b", "a.b.c"]);
        let parent = leaf.parent().expect("a.b");
        assert_eq!(parent.name(), "a.b");
        let grandparent = parent.parent().expect("a");
        assert_eq!(grandparent.name(), "a");
        assert!(grandparent.parent().expect("root").is_root());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let registry = registry();
        let first = registry.logger("app.db");
        let second = registry.logger("app.db");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(first.parent().unwrap(), &registry.logger("app")));
    }

    #[test]
    fn test_create_appender_registers_by_name() {
        let registry = registry();
        let appender = registry.create_console_appender("audit");
        assert!(registry.appender("audit").unwrap().ptr_eq(&appender));
        assert!(registry.appender("missing").is_none());
    }

    #[test]
    fn test_configure() {
        let registry = registry();
        let config = LoggingConfig::from_json_str(
            r#"{
                "options": { "request_id": "r-9", "max_messages": 100 },
                "appenders": [
                    { "name": "console", "kind": "console",
                      "options": { "level": "WARN", "buffer_size": 10, "batch_size": 2 } }
                ],
                "loggers": [
                    { "name": "app.db", "level": 1000, "appenders": ["console"], "once_only": ["^retry"] }
                ]
            }"#,
        )
        .unwrap();

        registry.configure(&config).unwrap();

        assert_eq!(registry.global().request_id(), "r-9");
        assert_eq!(registry.global().max_messages(), Some(100));

        let appender = registry.appender("console").unwrap();
        let settings = appender.settings();
        assert_eq!(settings.level, Level::WARN);
        assert_eq!(settings.buffer_size, 10);
        assert_eq!(settings.batch_size, 2);

        let logger = registry.logger("app.db");
        assert_eq!(logger.level(), Level::TRACE);
        assert!(logger.appenders()[0].ptr_eq(&appender));
        assert_eq!(logger.once_only(), vec!["^retry"]);
    }

    #[test]
    fn test_configure_unknown_appender() {
        let registry = registry();
        let config = LoggingConfig::from_json_str(
            r#"{ "loggers": [ { "name": "x", "level": "ERROR", "appenders": ["nope"] } ] }"#,
        )
        .unwrap();

        let err = registry.configure(&config).unwrap_err();
        assert!(matches!(err, LoggerError::UnknownAppender { ref name } if name == "nope"));
        // Loggers are only patched once every reference resolved.
        assert_eq!(registry.logger("x").level(), Level::DEBUG);
    }

    #[test]
    fn test_configure_rejects_invalid_batch_sizes() {
        let registry = registry();
        let appender = registry.create_console_appender("c");
        appender
            .set_options(AppenderOptions::new().batch_size(3))
            .unwrap();

        let config = LoggingConfig::from_json_str(
            r#"{ "appenders": [ { "name": "c", "kind": "console", "options": { "max_batch_size": 2 } } ] }"#,
        )
        .unwrap();
        assert!(matches!(
            registry.configure(&config),
            Err(LoggerError::InvalidConfiguration { .. })
        ));
        assert_eq!(appender.settings().max_batch_size, 20);
    }

    #[test]
    fn test_clearing_logger_level_restores_inheritance() {
        let registry = registry();
        registry.logger("svc").set_options(LoggerOptions::new().level(Level::ERROR));
        let child = registry.logger("svc.http");
        child.set_options(LoggerOptions::new().level(Level::TRACE));
        child.set_options(LoggerOptions::new().clear_level());
        assert_eq!(child.level(), Level::ERROR);
    }
}
