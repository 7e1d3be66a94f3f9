//! Log event structure and the batch shipped to a log endpoint

use super::log_level::Level;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Header carrying the request id, for servers that detect log requests without parsing the body.
pub const REQUEST_ID_HEADER: &str = "JSNLog-RequestId";

// Process-wide, so ids stay unique across registries.
static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

/// What a logger hands to each of its appenders after its own gates passed.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    /// Final string form of the payload.
    pub message: String,
    /// The structured payload, when one was logged.
    pub meta: Option<Value>,
    pub logger_name: String,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>, logger_name: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            meta: None,
            logger_name: logger_name.into(),
        }
    }

    #[must_use]
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

/// The wire unit. Keys are kept short because every event is sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(rename = "l")]
    pub level: Level,
    #[serde(rename = "m")]
    pub message: String,
    #[serde(rename = "n")]
    pub logger_name: String,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    /// Diagnostics only; never used for deduplication.
    #[serde(rename = "u")]
    pub sequence_id: u64,
}

impl LogEvent {
    pub fn new(
        level: Level,
        message: impl Into<String>,
        logger_name: impl Into<String>,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            level,
            message: message.into(),
            logger_name: logger_name.into(),
            timestamp_ms,
            sequence_id: NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Age of the event at `now_ms`.
    #[inline]
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }
}

/// POST body of one delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogBatch {
    #[serde(rename = "r")]
    pub request_id: String,
    #[serde(rename = "lg")]
    pub events: Vec<LogEvent>,
}

/// A request about to be sent by the network transport. Pre-send hooks may change any part of it.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub batch: LogBatch,
}

impl OutgoingRequest {
    pub fn new(url: impl Into<String>, batch: LogBatch) -> Self {
        let headers = vec![
            ("Content-Type".to_string(), "application/json".to_string()),
            (REQUEST_ID_HEADER.to_string(), batch.request_id.clone()),
        ];
        Self {
            url: url.into(),
            headers,
            batch,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace a header, or add it when absent.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.headers.iter_mut().find(|(key, _)| key.eq_ignore_ascii_case(&name)) {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name, value)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_ids_increase() {
        let first = LogEvent::new(Level::INFO, "a", "x", 0);
        let second = LogEvent::new(Level::INFO, "b", "x", 0);
        assert!(second.sequence_id > first.sequence_id);
    }

    #[test]
    fn test_short_wire_keys() {
        let event = LogEvent {
            level: Level::WARN,
            message: "disk low".to_string(),
            logger_name: "app.storage".to_string(),
            timestamp_ms: 1_700_000_000_000,
            sequence_id: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "l": 4000,
                "m": "disk low",
                "n": "app.storage",
                "t": 1_700_000_000_000i64,
                "u": 42
            })
        );
    }

    #[test]
    fn test_batch_wire_shape() {
        let batch = LogBatch {
            request_id: "req-7".to_string(),
            events: vec![LogEvent::new(Level::ERROR, "boom", "", 5)],
        };
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json["r"], "req-7");
        assert_eq!(json["lg"][0]["m"], "boom");
        assert_eq!(json["lg"][0]["l"], 5000);
    }

    #[test]
    fn test_outgoing_request_headers() {
        let batch = LogBatch {
            request_id: "abc".to_string(),
            events: Vec::new(),
        };
        let mut request = OutgoingRequest::new("http://localhost/jsnlog.logger", batch);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header(REQUEST_ID_HEADER), Some("abc"));

        request.set_header("jsnlog-requestid", "def");
        request.set_header("X-Tenant", "blue");
        assert_eq!(request.header(REQUEST_ID_HEADER), Some("def"));
        assert_eq!(request.header("x-tenant"), Some("blue"));
        assert_eq!(request.headers.len(), 3);
    }

    #[test]
    fn test_age() {
        let event = LogEvent::new(Level::INFO, "m", "n", 1_000);
        assert_eq!(event.age_ms(1_250), 250);
    }
}
