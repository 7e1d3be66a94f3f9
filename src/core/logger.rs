//! Named loggers with inherited attributes
//!
//! A logger only stores the attributes that were set on it. Everything else
//! resolves through the parent chain up to the root logger, which always
//! holds a level and a list of appenders.

use super::{
    appender::Appender,
    filter::{passes_content_filter, passes_entity_filter, FilterSet, Pattern},
    global::GlobalConfig,
    log_event::LogRecord,
    log_level::Level,
    patch::Patch,
    payload::{ErrorReport, LogPayload},
};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

/// Patch for a logger's local attributes.
///
/// `Clear` removes the local value so it is inherited from the parent again.
#[derive(Clone, Default)]
pub struct LoggerOptions {
    pub level: Patch<Level>,
    pub user_agent_regex: Patch<String>,
    pub ip_regex: Patch<String>,
    pub disallow: Patch<String>,
    pub appenders: Patch<Vec<Appender>>,
    pub once_only: Patch<Vec<String>>,
}

impl LoggerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn level(mut self, level: Level) -> Self {
        self.level = Patch::Set(level);
        self
    }

    #[must_use]
    pub fn clear_level(mut self) -> Self {
        self.level = Patch::Clear;
        self
    }

    #[must_use]
    pub fn user_agent_regex(mut self, pattern: impl Into<String>) -> Self {
        self.user_agent_regex = Patch::Set(pattern.into());
        self
    }

    #[must_use]
    pub fn ip_regex(mut self, pattern: impl Into<String>) -> Self {
        self.ip_regex = Patch::Set(pattern.into());
        self
    }

    #[must_use]
    pub fn disallow(mut self, pattern: impl Into<String>) -> Self {
        self.disallow = Patch::Set(pattern.into());
        self
    }

    #[must_use]
    pub fn clear_disallow(mut self) -> Self {
        self.disallow = Patch::Clear;
        self
    }

    #[must_use]
    pub fn appenders(mut self, appenders: Vec<Appender>) -> Self {
        self.appenders = Patch::Set(appenders);
        self
    }

    #[must_use]
    pub fn clear_appenders(mut self) -> Self {
        self.appenders = Patch::Clear;
        self
    }

    #[must_use]
    pub fn once_only<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.once_only = Patch::Set(patterns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn clear_once_only(mut self) -> Self {
        self.once_only = Patch::Clear;
        self
    }
}

#[derive(Default)]
struct LoggerLocal {
    level: Option<Level>,
    user_agent_regex: Option<Pattern>,
    ip_regex: Option<Pattern>,
    disallow: Option<Pattern>,
    appenders: Option<Arc<Vec<Appender>>>,
    once_only: Option<Arc<Vec<Pattern>>>,
}

/// Seen flags, indexed like the pattern list they were built for.
#[derive(Default)]
struct SeenFlags {
    patterns: Option<Arc<Vec<Pattern>>>,
    flags: Vec<bool>,
}

impl SeenFlags {
    /// Flags for `patterns`, starting over if the effective list was replaced,
    /// locally or on an ancestor.
    fn flags_for(&mut self, patterns: &Arc<Vec<Pattern>>) -> &mut [bool] {
        let current = matches!(&self.patterns, Some(built_for) if Arc::ptr_eq(built_for, patterns));
        if !current {
            self.patterns = Some(Arc::clone(patterns));
            self.flags = vec![false; patterns.len()];
        }
        &mut self.flags
    }
}

pub struct Logger {
    name: String,
    parent: Option<Arc<Logger>>,
    global: Arc<GlobalConfig>,
    local: RwLock<LoggerLocal>,
    /// Never inherited.
    seen: Mutex<SeenFlags>,
    /// Root only: what a cleared appender list falls back to.
    default_appender: Option<Appender>,
}

impl Logger {
    pub(crate) fn root(global: Arc<GlobalConfig>, default_appender: Appender) -> Self {
        let local = LoggerLocal {
            level: Some(Level::DEBUG),
            appenders: Some(Arc::new(vec![default_appender.clone()])),
            ..Default::default()
        };
        Self {
            name: String::new(),
            parent: None,
            global,
            local: RwLock::new(local),
            seen: Mutex::new(SeenFlags::default()),
            default_appender: Some(default_appender),
        }
    }

    pub(crate) fn child(name: impl Into<String>, parent: Arc<Logger>) -> Self {
        Self {
            name: name.into(),
            global: Arc::clone(&parent.global),
            parent: Some(parent),
            local: RwLock::new(LoggerLocal::default()),
            seen: Mutex::new(SeenFlags::default()),
            default_appender: None,
        }
    }

    /// Full dotted name; the root logger's name is empty.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&Arc<Logger>> {
        self.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn set_options(&self, options: LoggerOptions) {
        let LoggerOptions {
            level,
            user_agent_regex,
            ip_regex,
            disallow,
            appenders,
            once_only,
        } = options;

        let reset_seen = !once_only.is_keep();
        {
            let mut local = self.local.write();
            level.apply(&mut local.level);
            user_agent_regex.map(Pattern::new).apply(&mut local.user_agent_regex);
            ip_regex.map(Pattern::new).apply(&mut local.ip_regex);
            disallow.map(Pattern::new).apply(&mut local.disallow);
            appenders.map(Arc::new).apply(&mut local.appenders);
            once_only
                .map(|patterns| Arc::new(patterns.into_iter().map(Pattern::new).collect()))
                .apply(&mut local.once_only);

            // The root is where resolution ends, so it cannot lose these.
            if self.is_root() {
                local.level.get_or_insert(Level::DEBUG);
                if local.appenders.is_none() {
                    let fallback = self.default_appender.iter().cloned().collect();
                    local.appenders = Some(Arc::new(fallback));
                }
            }
        }

        if reset_seen {
            *self.seen.lock() = SeenFlags::default();
        }
    }

    fn resolve<T>(&self, pick: impl Fn(&LoggerLocal) -> Option<T>) -> Option<T> {
        let mut current = Some(self);
        while let Some(logger) = current {
            if let Some(value) = pick(&logger.local.read()) {
                return Some(value);
            }
            current = logger.parent.as_deref();
        }
        None
    }

    /// Effective level.
    pub fn level(&self) -> Level {
        self.resolve(|local| local.level).unwrap_or(Level::DEBUG)
    }

    /// Effective appenders, in attachment order.
    pub fn appenders(&self) -> Vec<Appender> {
        self.resolve(|local| local.appenders.clone())
            .map(|appenders| appenders.as_ref().clone())
            .unwrap_or_default()
    }

    pub fn disallow(&self) -> Option<String> {
        self.resolve(|local| local.disallow.as_ref().map(|p| p.as_str().to_string()))
    }

    pub fn user_agent_regex(&self) -> Option<String> {
        self.resolve(|local| local.user_agent_regex.as_ref().map(|p| p.as_str().to_string()))
    }

    pub fn ip_regex(&self) -> Option<String> {
        self.resolve(|local| local.ip_regex.as_ref().map(|p| p.as_str().to_string()))
    }

    pub fn once_only(&self) -> Vec<String> {
        self.resolve(|local| local.once_only.clone())
            .map(|patterns| patterns.iter().map(|p| p.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    fn filters(&self) -> FilterSet {
        FilterSet {
            user_agent_regex: self.resolve(|local| local.user_agent_regex.clone()),
            ip_regex: self.resolve(|local| local.ip_regex.clone()),
            disallow: self.resolve(|local| local.disallow.clone()),
        }
    }

    /// True if level and entity filters would let an event at `level` through.
    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.level() && passes_entity_filter(&self.filters(), &self.global.host_context())
    }

    /// The whole emit pipeline. `produce` runs only once the level and filter gate passed.
    fn emit(&self, level: Level, produce: impl FnOnce() -> LogPayload, error: Option<&ErrorReport>) {
        let Some(appenders) = self.resolve(|local| local.appenders.clone()) else {
            return;
        };

        let filters = self.filters();
        if level < self.level() || !passes_entity_filter(&filters, &self.global.host_context()) {
            return;
        }

        let payload = produce();
        let content = match error {
            Some(report) => LogPayload::Structured(report.envelope(payload)),
            None => payload,
        };
        let rendered = content.render(&self.global);

        if !passes_content_filter(filters.disallow.as_ref(), &rendered.final_string) {
            return;
        }

        if self.is_repeat(&rendered.final_string) {
            return;
        }

        let record = LogRecord {
            level,
            message: rendered.final_string,
            meta: rendered.meta,
            logger_name: self.name.clone(),
        };

        for appender in appenders.iter().rev() {
            appender.append(&record);
        }
    }

    /// Once-only check. Scans from the last pattern to the first and stops
    /// at the first match that was already seen, so earlier patterns are not
    /// marked on that call.
    fn is_repeat(&self, message: &str) -> bool {
        let Some(patterns) = self.resolve(|local| local.once_only.clone()) else {
            return false;
        };

        let mut flags = self.seen.lock();
        let seen = flags.flags_for(&patterns);

        for (index, pattern) in patterns.iter().enumerate().rev() {
            if pattern.matches(message) == Some(true) {
                if seen[index] {
                    return true;
                }
                seen[index] = true;
            }
        }
        false
    }

    pub fn log(&self, level: Level, payload: impl Into<LogPayload>) {
        self.emit(level, || payload.into(), None);
    }

    /// Like [`Logger::log`], but the payload is only built when it will be used.
    pub fn log_lazy<P, F>(&self, level: Level, produce: F)
    where
        P: Into<LogPayload>,
        F: FnOnce() -> P,
    {
        self.emit(level, || produce().into(), None);
    }

    /// Log `payload` wrapped in an exception envelope built from `error`.
    pub fn log_exception(&self, level: Level, payload: impl Into<LogPayload>, error: &ErrorReport) {
        self.emit(level, || payload.into(), Some(error));
    }

    pub fn trace(&self, payload: impl Into<LogPayload>) {
        self.log(Level::TRACE, payload);
    }

    pub fn debug(&self, payload: impl Into<LogPayload>) {
        self.log(Level::DEBUG, payload);
    }

    pub fn info(&self, payload: impl Into<LogPayload>) {
        self.log(Level::INFO, payload);
    }

    pub fn warn(&self, payload: impl Into<LogPayload>) {
        self.log(Level::WARN, payload);
    }

    pub fn error(&self, payload: impl Into<LogPayload>) {
        self.log(Level::ERROR, payload);
    }

    pub fn fatal(&self, payload: impl Into<LogPayload>) {
        self.log(Level::FATAL, payload);
    }

    pub fn fatal_exception(&self, payload: impl Into<LogPayload>, error: &ErrorReport) {
        self.log_exception(Level::FATAL, payload, error);
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::appender::{Completion, Transport};
    use crate::core::global::GlobalOptions;
    use crate::core::log_event::LogEvent;
    use crate::core::scheduler::{ManualScheduler, Scheduler};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Acknowledges immediately and records (tag, message) pairs.
    struct TaggedTransport {
        tag: &'static str,
        sink: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl Transport for TaggedTransport {
        fn deliver(&self, events: Vec<LogEvent>, completion: Completion) {
            let mut sink = self.sink.lock();
            for event in events {
                sink.push((self.tag.to_string(), event.message));
            }
            drop(sink);
            completion.succeed();
        }

        fn name(&self) -> &str {
            self.tag
        }
    }

    struct Fixture {
        global: Arc<GlobalConfig>,
        scheduler: Arc<dyn Scheduler>,
        sink: Arc<Mutex<Vec<(String, String)>>>,
        root: Arc<Logger>,
    }

    fn tagged_appender(
        tag: &'static str,
        sink: &Arc<Mutex<Vec<(String, String)>>>,
        global: &Arc<GlobalConfig>,
        scheduler: &Arc<dyn Scheduler>,
    ) -> Appender {
        Appender::new(
            tag,
            Arc::new(TaggedTransport {
                tag,
                sink: Arc::clone(sink),
            }),
            Arc::clone(global),
            Arc::clone(scheduler),
        )
    }

    impl Fixture {
        fn new() -> Self {
            let global = Arc::new(GlobalConfig::new());
            let scheduler: Arc<dyn Scheduler> = Arc::new(ManualScheduler::new(0));
            let sink = Arc::new(Mutex::new(Vec::new()));
            let default = tagged_appender("root", &sink, &global, &scheduler);
            let root = Arc::new(Logger::root(Arc::clone(&global), default));
            Self {
                global,
                scheduler,
                sink,
                root,
            }
        }

        fn appender(&self, tag: &'static str) -> Appender {
            tagged_appender(tag, &self.sink, &self.global, &self.scheduler)
        }

        fn messages(&self) -> Vec<String> {
            self.sink.lock().iter().map(|(_, m)| m.clone()).collect()
        }
    }

    #[test]
    fn test_root_defaults() {
        let f = Fixture::new();
        assert!(f.root.is_root());
        assert_eq!(f.root.name(), "");
        assert_eq!(f.root.level(), Level::DEBUG);
        assert_eq!(f.root.appenders().len(), 1);
    }

    #[test]
    fn test_inheritance_and_clear() {
        let f = Fixture::new();
        let parent = Arc::new(Logger::child("a", Arc::clone(&f.root)));
        let child = Logger::child("a.b", Arc::clone(&parent));

        parent.set_options(LoggerOptions::new().level(Level::WARN).disallow("secret"));
        assert_eq!(child.level(), Level::WARN);
        assert_eq!(child.disallow().as_deref(), Some("secret"));

        child.set_options(LoggerOptions::new().level(Level::TRACE));
        assert_eq!(child.level(), Level::TRACE);

        child.set_options(LoggerOptions::new().clear_level());
        assert_eq!(child.level(), Level::WARN);

        // Empty patch changes nothing
        child.set_options(LoggerOptions::new());
        assert_eq!(child.level(), Level::WARN);
    }

    #[test]
    fn test_root_cannot_lose_level_or_appenders() {
        let f = Fixture::new();
        f.root
            .set_options(LoggerOptions::new().clear_level().clear_appenders());
        assert_eq!(f.root.level(), Level::DEBUG);
        assert_eq!(f.root.appenders().len(), 1);
    }

    #[test]
    fn test_producer_not_called_when_gated() {
        let f = Fixture::new();
        let calls = AtomicUsize::new(0);

        f.root.log_lazy(Level::TRACE, || {
            calls.fetch_add(1, Ordering::SeqCst);
            "expensive"
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        f.global.set_options(GlobalOptions::new().enabled(false));
        f.root.log_lazy(Level::FATAL, || {
            calls.fetch_add(1, Ordering::SeqCst);
            "expensive"
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        f.global.set_options(GlobalOptions::new().clear_enabled());
        f.root.log_lazy(Level::INFO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            "expensive"
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.messages(), vec!["expensive"]);
    }

    #[test]
    fn test_appenders_called_in_reverse_order() {
        let f = Fixture::new();
        let logger = Logger::child("multi", Arc::clone(&f.root));
        logger.set_options(LoggerOptions::new().appenders(vec![f.appender("first"), f.appender("second")]));

        logger.info("hello");
        let tags: Vec<String> = f.sink.lock().iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(tags, vec!["second", "first"]);
    }

    #[test]
    fn test_empty_appender_list_is_silent() {
        let f = Fixture::new();
        let logger = Logger::child("quiet", Arc::clone(&f.root));
        logger.set_options(LoggerOptions::new().appenders(Vec::new()));
        logger.fatal("nobody hears this");
        assert!(f.messages().is_empty());
    }

    #[test]
    fn test_disallow_checks_final_string() {
        let f = Fixture::new();
        f.root.set_options(LoggerOptions::new().disallow("token"));
        f.root.info(json!({"token": "abc"}));
        f.root.info("plain");
        assert_eq!(f.messages(), vec!["plain"]);
    }

    #[test]
    fn test_once_only_suppresses_repeats() {
        let f = Fixture::new();
        f.root.set_options(LoggerOptions::new().once_only(["^Timeout"]));
        f.root.warn("Timeout after 3s");
        f.root.warn("Timeout after 5s");
        f.root.warn("Other problem");
        assert_eq!(f.messages(), vec!["Timeout after 3s", "Other problem"]);

        // Reassigning the patterns forgets what was seen
        f.root.set_options(LoggerOptions::new().once_only(["^Timeout"]));
        f.root.warn("Timeout after 9s");
        assert_eq!(f.messages().len(), 3);
    }

    #[test]
    fn test_once_only_scan_stops_at_first_seen_match() {
        let f = Fixture::new();
        // Scanned last to first: "b" then "a".
        f.root.set_options(LoggerOptions::new().once_only(["a", "b"]));

        f.root.info("b"); // marks "b"
        f.root.info("ab"); // "b" already seen: suppressed, "a" never evaluated
        f.root.info("a"); // so "a" is still unseen here and passes
        f.root.info("a"); // now it is a repeat

        assert_eq!(f.messages(), vec!["b", "a"]);
    }

    #[test]
    fn test_seen_flags_are_per_logger() {
        let f = Fixture::new();
        f.root.set_options(LoggerOptions::new().once_only(["dup"]));
        let child = Logger::child("c", Arc::clone(&f.root));

        f.root.info("dup");
        child.info("dup");
        child.info("dup");
        assert_eq!(f.messages(), vec!["dup", "dup"]);
    }

    #[test]
    fn test_seen_flags_follow_inherited_patterns() {
        let f = Fixture::new();
        f.root.set_options(LoggerOptions::new().once_only(["^retry", "^dup"]));
        let child = Logger::child("c", Arc::clone(&f.root));

        child.info("dup 1"); // marks index 1
        child.info("dup 2");
        assert_eq!(f.messages(), vec!["dup 1"]);

        // The ancestor's list changes; the child's old flags no longer apply.
        f.root.set_options(LoggerOptions::new().once_only(["^dup", "^retry"]));
        child.info("retry 1");
        child.info("dup 3");
        child.info("dup 4");
        assert_eq!(f.messages(), vec!["dup 1", "retry 1", "dup 3"]);
    }

    #[test]
    fn test_exception_envelope() {
        let f = Fixture::new();
        let error = ErrorReport::new("boom").with_name("Crash");
        f.root.fatal_exception(json!({"step": 2}), &error);

        let message = f.messages().pop().expect("event delivered");
        let value: serde_json::Value = serde_json::from_str(&message).unwrap();
        assert_eq!(value["message"], "boom");
        assert_eq!(value["name"], "Crash");
        assert_eq!(value["logData"]["step"], 2);
    }

    #[test]
    fn test_logger_ip_filter() {
        let f = Fixture::new();
        f.root.set_options(LoggerOptions::new().ip_regex("^127\\."));
        f.global.set_options(GlobalOptions::new().client_ip("10.9.9.9"));
        assert!(!f.root.is_enabled(Level::FATAL));
        f.root.error("dropped");
        assert!(f.messages().is_empty());
    }
}
