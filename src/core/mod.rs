//! Core logger types and traits

pub mod appender;
pub mod config;
pub mod error;
pub mod filter;
pub mod global;
pub mod log_event;
pub mod log_level;
pub mod logger;
pub mod metrics;
pub mod patch;
pub mod payload;
pub mod registry;
pub mod scheduler;
pub mod timestamp;

pub use appender::{
    Appender, AppenderOptions, AppenderSettings, AppenderStats, Completion, Transport,
    TransportOptions,
};
pub use config::{AppenderConfig, AppenderKind, LoggerConfig, LoggingConfig};
pub use error::{LoggerError, Result};
pub use filter::{passes_content_filter, passes_entity_filter, FilterSet, HostContext, Pattern};
pub use global::{BeforeSendHook, GlobalConfig, GlobalOptions, SerializeHook};
pub use log_event::{LogBatch, LogEvent, LogRecord, OutgoingRequest, REQUEST_ID_HEADER};
pub use log_level::Level;
pub use logger::{Logger, LoggerOptions};
pub use metrics::AppenderMetrics;
pub use patch::Patch;
pub use payload::{ErrorReport, LogPayload, RenderedMessage};
pub use registry::{
    global_registry, init_global_registry, LogRegistry, RegistryBuilder, RootSink,
    DEFAULT_APPENDER_NAME,
};
pub use scheduler::{ManualScheduler, Scheduler, ThreadScheduler, TimerHandle, TimerTask};
pub use timestamp::TimestampFormat;
