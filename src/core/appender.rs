//! Appender: buffering, batching and delivery engine
//!
//! An appender receives records from loggers and decides, per record, whether
//! to drop it, park it in the hold buffer, or queue it for sending:
//!
//! - records below `store_in_buffer_level` are dropped,
//! - records below `level` go to the hold buffer (a ring of `buffer_size`),
//!   which is only shipped when a record at or above
//!   `send_with_buffer_level` arrives,
//! - everything else joins the send queue.
//!
//! The send queue is handed to a [`Transport`] when it reaches `batch_size`,
//! when any item is older than `batch_timeout_ms`, or when the global quota
//! is exhausted and queued items would otherwise never leave. At most one
//! delivery is outstanding per appender. If the transport does not
//! acknowledge within `send_timeout_ms` the attempt is considered failed and
//! the same items are sent again later, so delivery is at-least-once.
//!
//! The send queue never grows past `max_batch_size`; records that do not fit
//! are counted and reported with a synthetic WARN event after the next
//! successful delivery.

use super::{
    error::{LoggerError, Result},
    filter::{passes_content_filter, passes_entity_filter, FilterSet, Pattern},
    global::{BeforeSendHook, GlobalConfig},
    log_event::{LogEvent, LogRecord},
    log_level::Level,
    metrics::AppenderMetrics,
    patch::Patch,
    scheduler::{Scheduler, TimerHandle},
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

pub const DEFAULT_BUFFER_SIZE: usize = 0;
pub const DEFAULT_BATCH_SIZE: usize = 1;
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = i32::MAX as u64;
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 5_000;

/// Acknowledgement handed to a transport with each delivery.
///
/// Call [`Completion::succeed`] once the events were definitely received.
/// Dropping it instead means "no news"; the appender's send timeout then
/// unblocks the next attempt.
#[must_use = "dropping a completion leaves the delivery to the send timeout"]
pub struct Completion {
    on_success: Box<dyn FnOnce() + Send>,
}

impl Completion {
    pub fn new(on_success: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_success: Box::new(on_success),
        }
    }

    pub fn succeed(self) {
        (self.on_success)()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Completion")
    }
}

/// Options only some transports understand.
#[derive(Clone, Default)]
pub struct TransportOptions {
    pub url: Patch<String>,
    pub before_send: Patch<BeforeSendHook>,
}

/// Delivery contract between an appender and its destination.
///
/// `deliver` must not block on the network. It calls `completion.succeed()`
/// at most once, and only on definitive success; failures are swallowed.
pub trait Transport: Send + Sync {
    fn deliver(&self, events: Vec<LogEvent>, completion: Completion);

    fn configure(&self, _options: TransportOptions) {}

    fn name(&self) -> &str;
}

/// Patch for an appender's configuration.
///
/// # Example
///
/// ```
/// use rust_remote_logger::{AppenderOptions, Level};
///
/// let options = AppenderOptions::new()
///     .level(Level::WARN)
///     .store_in_buffer_level(Level::TRACE)
///     .send_with_buffer_level(Level::ERROR)
///     .buffer_size(50)
///     .batch_size(5)
///     .max_batch_size(100);
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppenderOptions {
    pub level: Patch<Level>,
    pub user_agent_regex: Patch<String>,
    pub ip_regex: Patch<String>,
    pub disallow: Patch<String>,
    pub send_with_buffer_level: Patch<Level>,
    pub store_in_buffer_level: Patch<Level>,
    pub buffer_size: Patch<usize>,
    pub batch_size: Patch<usize>,
    pub max_batch_size: Patch<usize>,
    pub batch_timeout_ms: Patch<u64>,
    pub send_timeout_ms: Patch<u64>,
    /// Network transports only
    pub url: Patch<String>,
    /// Network transports only
    #[serde(skip)]
    pub before_send: Patch<BeforeSendHook>,
}

impl AppenderOptions {
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
    pub fn send_with_buffer_level(mut self, level: Level) -> Self {
        self.send_with_buffer_level = Patch::Set(level);
        self
    }

    #[must_use]
    pub fn store_in_buffer_level(mut self, level: Level) -> Self {
        self.store_in_buffer_level = Patch::Set(level);
        self
    }

    #[must_use]
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = Patch::Set(size);
        self
    }

    #[must_use]
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Patch::Set(size);
        self
    }

    #[must_use]
    pub fn clear_batch_size(mut self) -> Self {
        self.batch_size = Patch::Clear;
        self
    }

    #[must_use]
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = Patch::Set(size);
        self
    }

    #[must_use]
    pub fn batch_timeout_ms(mut self, timeout: u64) -> Self {
        self.batch_timeout_ms = Patch::Set(timeout);
        self
    }

    #[must_use]
    pub fn send_timeout_ms(mut self, timeout: u64) -> Self {
        self.send_timeout_ms = Patch::Set(timeout);
        self
    }

    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Patch::Set(url.into());
        self
    }

    #[must_use]
    pub fn clear_url(mut self) -> Self {
        self.url = Patch::Clear;
        self
    }

    #[must_use]
    pub fn before_send(mut self, hook: BeforeSendHook) -> Self {
        self.before_send = Patch::Set(hook);
        self
    }
}

/// Local overrides; unset values fall back to the defaults.
#[derive(Debug, Clone, Default)]
struct AppenderConfig {
    level: Option<Level>,
    user_agent_regex: Option<Pattern>,
    ip_regex: Option<Pattern>,
    disallow: Option<Pattern>,
    send_with_buffer_level: Option<Level>,
    store_in_buffer_level: Option<Level>,
    buffer_size: Option<usize>,
    batch_size: Option<usize>,
    max_batch_size: Option<usize>,
    batch_timeout_ms: Option<u64>,
    send_timeout_ms: Option<u64>,
}

impl AppenderConfig {
    fn level(&self) -> Level {
        self.level.unwrap_or(Level::TRACE)
    }

    fn send_with_buffer_level(&self) -> Level {
        self.send_with_buffer_level.unwrap_or(Level::OFF)
    }

    fn store_in_buffer_level(&self) -> Level {
        self.store_in_buffer_level.unwrap_or(Level::ALL)
    }

    fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE)
    }

    fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    fn max_batch_size(&self) -> usize {
        self.max_batch_size.unwrap_or(DEFAULT_MAX_BATCH_SIZE)
    }

    fn batch_timeout_ms(&self) -> u64 {
        self.batch_timeout_ms.unwrap_or(DEFAULT_BATCH_TIMEOUT_MS)
    }

    fn send_timeout_ms(&self) -> u64 {
        self.send_timeout_ms.unwrap_or(DEFAULT_SEND_TIMEOUT_MS)
    }

    fn filters(&self) -> FilterSet {
        FilterSet {
            user_agent_regex: self.user_agent_regex.clone(),
            ip_regex: self.ip_regex.clone(),
            disallow: self.disallow.clone(),
        }
    }

    fn settings(&self) -> AppenderSettings {
        AppenderSettings {
            level: self.level(),
            user_agent_regex: self.user_agent_regex.as_ref().map(|p| p.as_str().to_string()),
            ip_regex: self.ip_regex.as_ref().map(|p| p.as_str().to_string()),
            disallow: self.disallow.as_ref().map(|p| p.as_str().to_string()),
            send_with_buffer_level: self.send_with_buffer_level(),
            store_in_buffer_level: self.store_in_buffer_level(),
            buffer_size: self.buffer_size(),
            batch_size: self.batch_size(),
            max_batch_size: self.max_batch_size(),
            batch_timeout_ms: self.batch_timeout_ms(),
            send_timeout_ms: self.send_timeout_ms(),
        }
    }
}

/// Effective configuration of an appender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppenderSettings {
    pub level: Level,
    pub user_agent_regex: Option<String>,
    pub ip_regex: Option<String>,
    pub disallow: Option<String>,
    pub send_with_buffer_level: Level,
    pub store_in_buffer_level: Level,
    pub buffer_size: usize,
    pub batch_size: usize,
    pub max_batch_size: usize,
    pub batch_timeout_ms: u64,
    pub send_timeout_ms: u64,
}

/// Point-in-time view of the engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppenderStats {
    pub hold_buffer_len: usize,
    pub send_queue_len: usize,
    /// Events in the outstanding delivery, 0 when none.
    pub in_flight: usize,
    /// Events lost to a full send queue since the last report.
    pub skipped: usize,
    pub batch_timer_armed: bool,
    pub send_timer_armed: bool,
}

#[derive(Debug, Clone, Copy)]
struct ArmedTimer {
    handle: TimerHandle,
    token: u64,
}

#[derive(Default)]
struct AppenderState {
    config: AppenderConfig,
    hold_buffer: VecDeque<LogEvent>,
    send_queue: VecDeque<LogEvent>,
    in_flight: usize,
    skipped: usize,
    batch_timer: Option<ArmedTimer>,
    send_timer: Option<ArmedTimer>,
    batch_token: u64,
    /// Incremented per delivery; late acknowledgements of older attempts are ignored.
    attempt: u64,
}

struct Dispatch {
    attempt: u64,
    events: Vec<LogEvent>,
}

struct AppenderShared {
    name: String,
    transport: Arc<dyn Transport>,
    global: Arc<GlobalConfig>,
    scheduler: Arc<dyn Scheduler>,
    metrics: AppenderMetrics,
    state: Mutex<AppenderState>,
}

/// A log sink. Cloning shares the same buffers, so one appender can be
/// attached to many loggers.
#[derive(Clone)]
pub struct Appender {
    shared: Arc<AppenderShared>,
}

impl Appender {
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        global: Arc<GlobalConfig>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        Self {
            shared: Arc::new(AppenderShared {
                name: name.into(),
                transport,
                global,
                scheduler,
                metrics: AppenderMetrics::new(),
                state: Mutex::new(AppenderState::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn transport_name(&self) -> &str {
        self.shared.transport.name()
    }

    /// Patch the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LoggerError::InvalidConfiguration`] when the result would
    /// have `max_batch_size < batch_size`; nothing is changed in that case.
    pub fn set_options(&self, options: AppenderOptions) -> Result<()> {
        let AppenderOptions {
            level,
            user_agent_regex,
            ip_regex,
            disallow,
            send_with_buffer_level,
            store_in_buffer_level,
            buffer_size,
            batch_size,
            max_batch_size,
            batch_timeout_ms,
            send_timeout_ms,
            url,
            before_send,
        } = options;

        {
            let mut state = self.shared.state.lock();
            let mut config = state.config.clone();

            level.apply(&mut config.level);
            user_agent_regex.map(Pattern::new).apply(&mut config.user_agent_regex);
            ip_regex.map(Pattern::new).apply(&mut config.ip_regex);
            disallow.map(Pattern::new).apply(&mut config.disallow);
            send_with_buffer_level.apply(&mut config.send_with_buffer_level);
            store_in_buffer_level.apply(&mut config.store_in_buffer_level);
            buffer_size.apply(&mut config.buffer_size);
            batch_size.apply(&mut config.batch_size);
            max_batch_size.apply(&mut config.max_batch_size);
            batch_timeout_ms.apply(&mut config.batch_timeout_ms);
            send_timeout_ms.apply(&mut config.send_timeout_ms);

            if config.max_batch_size() < config.batch_size() {
                return Err(LoggerError::config(
                    format!("appender '{}'", self.shared.name),
                    format!(
                        "max_batch_size ({}) cannot be smaller than batch_size ({})",
                        config.max_batch_size(),
                        config.batch_size()
                    ),
                ));
            }

            let capacity = config.buffer_size();
            state.config = config;
            state.hold_buffer.truncate(capacity);
        }

        if !url.is_keep() || !before_send.is_keep() {
            self.shared
                .transport
                .configure(TransportOptions { url, before_send });
        }
        Ok(())
    }

    pub fn settings(&self) -> AppenderSettings {
        self.shared.state.lock().config.settings()
    }

    /// Handle one record from a logger. Never blocks and never fails.
    pub fn append(&self, record: &LogRecord) {
        self.shared.append(record);
    }

    /// Send whatever is queued now, unless a delivery is already outstanding.
    pub fn send_batch(&self) {
        let dispatch = {
            let mut state = self.shared.state.lock();
            self.shared.send_now(&mut state)
        };
        self.shared.dispatch(dispatch);
    }

    pub fn stats(&self) -> AppenderStats {
        let state = self.shared.state.lock();
        AppenderStats {
            hold_buffer_len: state.hold_buffer.len(),
            send_queue_len: state.send_queue.len(),
            in_flight: state.in_flight,
            skipped: state.skipped,
            batch_timer_armed: state.batch_timer.is_some(),
            send_timer_armed: state.send_timer.is_some(),
        }
    }

    pub fn send_queue(&self) -> Vec<LogEvent> {
        self.shared.state.lock().send_queue.iter().cloned().collect()
    }

    pub fn hold_buffer(&self) -> Vec<LogEvent> {
        self.shared.state.lock().hold_buffer.iter().cloned().collect()
    }

    pub fn metrics(&self) -> &AppenderMetrics {
        &self.shared.metrics
    }

    /// True when both handles refer to the same appender.
    pub fn ptr_eq(&self, other: &Appender) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Appender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Appender")
            .field("name", &self.shared.name)
            .field("transport", &self.shared.transport.name())
            .finish()
    }
}

impl AppenderShared {
    fn append(self: &Arc<Self>, record: &LogRecord) {
        let dispatch = {
            let mut state = self.state.lock();

            let filters = state.config.filters();
            if !passes_entity_filter(&filters, &self.global.host_context())
                || !passes_content_filter(filters.disallow.as_ref(), &record.message)
            {
                return;
            }

            if record.level < state.config.store_in_buffer_level() {
                return;
            }

            let event = LogEvent::new(
                record.level,
                record.message.clone(),
                record.logger_name.clone(),
                self.scheduler.now_ms(),
            );

            if record.level < state.config.level() {
                let capacity = state.config.buffer_size();
                if capacity > 0 {
                    state.hold_buffer.push_back(event);
                    while state.hold_buffer.len() > capacity {
                        state.hold_buffer.pop_front();
                    }
                }
                return;
            }

            self.enqueue(&mut state, vec![event]);

            // The trigger goes first so backlog never crowds it out under
            // quota or queue pressure, at the cost of timestamp order.
            if record.level >= state.config.send_with_buffer_level() && !state.hold_buffer.is_empty()
            {
                let held: Vec<LogEvent> = state.hold_buffer.drain(..).collect();
                self.enqueue(&mut state, held);
            }

            self.maybe_send_now(&mut state)
        };

        self.dispatch(dispatch);
    }

    fn enqueue(self: &Arc<Self>, state: &mut AppenderState, events: Vec<LogEvent>) {
        let count = events.len();

        if state.send_queue.len() >= state.config.max_batch_size() {
            state.skipped += count;
            self.metrics.record_skipped(count);
            tracing::warn!(
                appender = %self.name,
                dropped = count,
                queued = state.send_queue.len(),
                "send queue full, dropping events"
            );
            return;
        }

        if !self.global.try_consume_quota(count) {
            self.metrics.record_quota_dropped(count);
            tracing::debug!(appender = %self.name, dropped = count, "message quota exhausted");
            return;
        }

        state.send_queue.extend(events);

        if state.batch_timer.is_none() {
            self.arm_batch_timer(state);
        }
    }

    fn arm_batch_timer(self: &Arc<Self>, state: &mut AppenderState) {
        state.batch_token += 1;
        let token = state.batch_token;
        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            Duration::from_millis(state.config.batch_timeout_ms()),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_batch_timeout(token);
                }
            }),
        );
        state.batch_timer = Some(ArmedTimer { handle, token });
    }

    fn has_overdue(&self, state: &AppenderState) -> bool {
        let now = self.scheduler.now_ms();
        let timeout = i64::try_from(state.config.batch_timeout_ms()).unwrap_or(i64::MAX);
        state.send_queue.iter().any(|event| event.age_ms(now) > timeout)
    }

    fn maybe_send_now(self: &Arc<Self>, state: &mut AppenderState) -> Option<Dispatch> {
        let complete = state.send_queue.len() >= state.config.batch_size();
        // With the quota gone nothing new will fill the batch, so send what is there.
        let stranded = !state.send_queue.is_empty() && self.global.quota_exhausted();

        if complete || self.has_overdue(state) || stranded {
            self.send_now(state)
        } else {
            None
        }
    }

    fn send_now(self: &Arc<Self>, state: &mut AppenderState) -> Option<Dispatch> {
        if state.in_flight > 0 {
            return None;
        }

        if let Some(timer) = state.batch_timer.take() {
            self.scheduler.cancel(timer.handle);
        }

        if state.send_queue.is_empty() {
            return None;
        }

        state.in_flight = state.send_queue.len();
        state.attempt += 1;
        let attempt = state.attempt;

        let weak: Weak<Self> = Arc::downgrade(self);
        let handle = self.scheduler.schedule(
            Duration::from_millis(state.config.send_timeout_ms()),
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.on_send_timeout(attempt);
                }
            }),
        );
        state.send_timer = Some(ArmedTimer {
            handle,
            token: attempt,
        });

        self.metrics.record_attempt();
        Some(Dispatch {
            attempt,
            events: state.send_queue.iter().cloned().collect(),
        })
    }

    /// Hand a batch to the transport. Must be called without the state lock held.
    fn dispatch(self: &Arc<Self>, dispatch: Option<Dispatch>) {
        let Some(Dispatch { attempt, events }) = dispatch else {
            return;
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let completion = Completion::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_delivery_success(attempt);
            }
        });

        tracing::trace!(appender = %self.name, attempt, events = events.len(), "delivering batch");

        let transport = Arc::clone(&self.transport);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            transport.deliver(events, completion)
        }));

        if let Err(panic_info) = result {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };
            tracing::error!(
                appender = %self.name,
                transport = transport.name(),
                panic = %panic_msg,
                "transport panicked; the send timeout will retry the batch"
            );
        }
    }

    fn on_batch_timeout(self: &Arc<Self>, token: u64) {
        let dispatch = {
            let mut state = self.state.lock();
            match state.batch_timer {
                Some(timer) if timer.token == token => state.batch_timer = None,
                _ => return,
            }
            self.send_now(&mut state)
        };
        self.dispatch(dispatch);
    }

    fn on_send_timeout(self: &Arc<Self>, attempt: u64) {
        let dispatch = {
            let mut state = self.state.lock();
            match state.send_timer {
                Some(timer) if timer.token == attempt && state.in_flight > 0 => {
                    state.send_timer = None
                }
                _ => return,
            }

            self.metrics.record_timeout();
            tracing::warn!(
                appender = %self.name,
                in_flight = state.in_flight,
                "delivery not acknowledged in time, events stay queued"
            );
            self.on_delivery_ended(&mut state)
        };
        self.dispatch(dispatch);
    }

    fn on_delivery_success(self: &Arc<Self>, attempt: u64) {
        let dispatch = {
            let mut state = self.state.lock();
            if state.in_flight == 0 || state.attempt != attempt {
                tracing::debug!(appender = %self.name, attempt, "ignoring stale delivery acknowledgement");
                return;
            }

            // Only what was sent; events queued meanwhile wait for the next cycle.
            let sent = state.in_flight.min(state.send_queue.len());
            state.send_queue.drain(..sent);
            self.metrics.record_delivered(sent);

            if state.skipped > 0 {
                let report = LogEvent::new(
                    Level::WARN,
                    format!(
                        "Lost {} messages while the log endpoint was unreachable. \
                         Reduce lost messages by increasing the appender option max_batch_size.",
                        state.skipped
                    ),
                    self.name.clone(),
                    self.scheduler.now_ms(),
                );
                state.send_queue.push_back(report);
                state.skipped = 0;
            }

            self.on_delivery_ended(&mut state)
        };
        self.dispatch(dispatch);
    }

    fn on_delivery_ended(self: &Arc<Self>, state: &mut AppenderState) -> Option<Dispatch> {
        if let Some(timer) = state.send_timer.take() {
            self.scheduler.cancel(timer.handle);
        }
        state.in_flight = 0;

        let next = self.maybe_send_now(state);

        // A batch timer that fired during the delivery was spent; give the leftovers a new one.
        if next.is_none() && !state.send_queue.is_empty() && state.batch_timer.is_none() {
            self.arm_batch_timer(state);
        }
        next
    }
}
