//! Network transport for remote logging
//!
//! POSTs each batch as JSON to the log endpoint. One request at a time: an
//! unfinished earlier request is aborted before a new one is sent, so a late
//! response can never acknowledge the wrong batch.
//!
//! The endpoint is looked up on every send, in this order: the appender's
//! `url` option, the global `default_url`, then [`DEFAULT_ENDPOINT`].
//! Relative endpoints are resolved against `http://localhost`.

use crate::core::{
    BeforeSendHook, Completion, GlobalConfig, LogBatch, LogEvent, LoggerError, OutgoingRequest,
    Result, Transport, TransportOptions,
};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio::task::AbortHandle;

pub const DEFAULT_ENDPOINT: &str = "/jsnlog.logger";

const LOCAL_ORIGIN: &str = "http://localhost";

#[derive(Default)]
struct NetworkSettings {
    url: Option<String>,
    before_send: Option<BeforeSendHook>,
}

/// HTTP transport
///
/// # Example
///
/// ```no_run
/// use rust_remote_logger::appenders::NetworkTransport;
/// use rust_remote_logger::core::GlobalConfig;
/// use std::sync::Arc;
///
/// let global = Arc::new(GlobalConfig::new());
/// let transport = NetworkTransport::new(global).expect("Failed to start transport runtime");
/// ```
pub struct NetworkTransport {
    client: reqwest::Client,
    global: Arc<GlobalConfig>,
    settings: RwLock<NetworkSettings>,
    in_flight: Mutex<Option<AbortHandle>>,
    handle: Handle,
    /// Set when the transport owns its runtime
    runtime: Option<Runtime>,
}

impl NetworkTransport {
    /// Create a transport with its own single-worker runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the runtime or the HTTP client cannot be created
    pub fn new(global: Arc<GlobalConfig>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("log-transport")
            .enable_all()
            .build()
            .map_err(|e| LoggerError::io_operation("start transport runtime", e.to_string(), e))?;
        let handle = runtime.handle().clone();
        let mut transport = Self::with_handle(global, handle)?;
        transport.runtime = Some(runtime);
        Ok(transport)
    }

    /// Create a transport that spawns its requests on an existing runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be created
    pub fn with_handle(global: Arc<GlobalConfig>, handle: Handle) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LoggerError::transport(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            global,
            settings: RwLock::new(NetworkSettings::default()),
            in_flight: Mutex::new(None),
            handle,
            runtime: None,
        })
    }

    /// The endpoint the next request will go to, before any pre-send hook runs.
    pub fn endpoint(&self) -> String {
        self.settings
            .read()
            .url
            .clone()
            .or_else(|| self.global.default_url())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
    }

    /// Assemble the request for `events` and let the pre-send hook adjust it.
    pub fn build_request(&self, events: Vec<LogEvent>) -> OutgoingRequest {
        let batch = LogBatch {
            request_id: self.global.request_id(),
            events,
        };
        let mut request = OutgoingRequest::new(self.endpoint(), batch);

        let hook = self
            .settings
            .read()
            .before_send
            .clone()
            .or_else(|| self.global.default_before_send());
        if let Some(hook) = hook {
            hook(&mut request);
        }
        request
    }

    fn send(&self, request: OutgoingRequest, completion: Completion) -> Result<()> {
        let url = absolute_url(&request.url)?;
        let body = serde_json::to_vec(&request.batch)?;

        let mut builder = self.client.post(url).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.take() {
            if !previous.is_finished() {
                tracing::debug!("aborting unfinished log request");
                previous.abort();
            }
        }

        let task = self.handle.spawn(async move {
            match builder.send().await {
                Ok(response) if response.status().is_success() => completion.succeed(),
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "log endpoint did not accept batch")
                }
                Err(e) => tracing::debug!(error = %e, "log request failed"),
            }
        });
        *in_flight = Some(task.abort_handle());
        Ok(())
    }
}

fn absolute_url(raw: &str) -> Result<reqwest::Url> {
    reqwest::Url::parse(raw)
        .or_else(|_| reqwest::Url::parse(LOCAL_ORIGIN).and_then(|base| base.join(raw)))
        .map_err(|e| LoggerError::transport(format!("invalid log endpoint '{}': {}", raw, e)))
}

impl Transport for NetworkTransport {
    fn deliver(&self, events: Vec<LogEvent>, completion: Completion) {
        let request = self.build_request(events);
        if let Err(e) = self.send(request, completion) {
            tracing::debug!(error = %e, "log batch not sent");
        }
    }

    fn configure(&self, options: TransportOptions) {
        let mut settings = self.settings.write();
        options.url.apply(&mut settings.url);
        options.before_send.apply(&mut settings.before_send);
    }

    fn name(&self) -> &str {
        "network"
    }
}

impl Drop for NetworkTransport {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
