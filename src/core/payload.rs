//! What callers can log, and how it becomes a message string
//!
//! A payload is either a scalar (its canonical string is the message) or a
//! structured JSON value (rendered by the serialization hook and kept
//! alongside as metadata).

use super::global::GlobalConfig;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum LogPayload {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    /// Logged "nothing"; renders as `undefined`.
    Undefined,
    /// A regular expression, rendered as `/pattern/`.
    Regex(String),
    Structured(Value),
}

/// The string forms of a realized payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    /// Set for scalars only.
    pub message: Option<String>,
    /// Set for structured payloads only.
    pub meta: Option<Value>,
    pub final_string: String,
}

impl LogPayload {
    pub fn render(self, global: &GlobalConfig) -> RenderedMessage {
        let scalar = |text: String| RenderedMessage {
            message: Some(text.clone()),
            meta: None,
            final_string: text,
        };

        match self {
            LogPayload::Text(text) => scalar(text),
            LogPayload::Integer(n) => scalar(n.to_string()),
            LogPayload::Float(n) => scalar(n.to_string()),
            LogPayload::Bool(b) => scalar(b.to_string()),
            LogPayload::Undefined => scalar("undefined".to_string()),
            LogPayload::Regex(pattern) => scalar(format!("/{}/", pattern)),
            LogPayload::Structured(value) => RenderedMessage {
                message: None,
                final_string: global.serialize(&value),
                meta: Some(value),
            },
        }
    }

    /// JSON form used when the payload is attached to an exception envelope.
    /// `Undefined` has none, so the key is left out.
    pub fn into_json(self) -> Option<Value> {
        match self {
            LogPayload::Text(text) => Some(Value::String(text)),
            LogPayload::Integer(n) => Some(Value::from(n)),
            LogPayload::Float(n) => Some(Value::from(n)),
            LogPayload::Bool(b) => Some(Value::Bool(b)),
            LogPayload::Undefined => None,
            LogPayload::Regex(pattern) => Some(Value::String(format!("/{}/", pattern))),
            LogPayload::Structured(value) => Some(value),
        }
    }
}

impl From<&str> for LogPayload {
    fn from(text: &str) -> Self {
        LogPayload::Text(text.to_string())
    }
}

impl From<String> for LogPayload {
    fn from(text: String) -> Self {
        LogPayload::Text(text)
    }
}

impl From<&String> for LogPayload {
    fn from(text: &String) -> Self {
        LogPayload::Text(text.clone())
    }
}

impl From<i64> for LogPayload {
    fn from(n: i64) -> Self {
        LogPayload::Integer(n)
    }
}

impl From<i32> for LogPayload {
    fn from(n: i32) -> Self {
        LogPayload::Integer(i64::from(n))
    }
}

impl From<u32> for LogPayload {
    fn from(n: u32) -> Self {
        LogPayload::Integer(i64::from(n))
    }
}

impl From<f64> for LogPayload {
    fn from(n: f64) -> Self {
        LogPayload::Float(n)
    }
}

impl From<bool> for LogPayload {
    fn from(b: bool) -> Self {
        LogPayload::Bool(b)
    }
}

impl From<()> for LogPayload {
    fn from(_: ()) -> Self {
        LogPayload::Undefined
    }
}

impl From<regex::Regex> for LogPayload {
    fn from(regex: regex::Regex) -> Self {
        LogPayload::Regex(regex.as_str().to_string())
    }
}

impl From<&regex::Regex> for LogPayload {
    fn from(regex: &regex::Regex) -> Self {
        LogPayload::Regex(regex.as_str().to_string())
    }
}

/// JSON scalars are logged as scalars; only arrays, objects and null are structured.
impl From<Value> for LogPayload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => LogPayload::Text(text),
            Value::Bool(b) => LogPayload::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => LogPayload::Integer(i),
                None => LogPayload::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            other => LogPayload::Structured(other),
        }
    }
}

/// Error details attached to a log call, e.g. by `fatal_exception`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorReport {
    pub name: Option<String>,
    pub message: Option<String>,
    pub stack: Option<String>,
    pub data: Option<Value>,
    pub inner: Option<Box<ErrorReport>>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Capture an error and its `source()` chain as nested inner reports.
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        Self {
            message: Some(error.to_string()),
            inner: error.source().map(|source| Box::new(Self::from_error(source))),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn with_inner(mut self, inner: ErrorReport) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    fn to_json(&self) -> Map<String, Value> {
        let mut object = Map::new();
        match &self.stack {
            Some(stack) => object.insert("stack".to_string(), Value::String(stack.clone())),
            None => object.insert(
                "e".to_string(),
                Value::String(self.message.clone().unwrap_or_default()),
            ),
        };
        if let Some(message) = &self.message {
            object.insert("message".to_string(), Value::String(message.clone()));
        }
        if let Some(name) = &self.name {
            object.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(data) = &self.data {
            object.insert("data".to_string(), data.clone());
        }
        if let Some(inner) = &self.inner {
            object.insert("inner".to_string(), Value::Object(inner.to_json()));
        }
        object
    }

    /// The exception envelope with the logged payload attached under `logData`.
    pub fn envelope(&self, log_data: LogPayload) -> Value {
        let mut object = self.to_json();
        if let Some(data) = log_data.into_json() {
            object.insert("logData".to_string(), data);
        }
        Value::Object(object)
    }
}

impl<E: std::error::Error + 'static> From<&E> for ErrorReport {
    fn from(error: &E) -> Self {
        ErrorReport::from_error(error)
    }
}
