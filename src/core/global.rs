//! Process-wide configuration shared by a registry, its loggers and appenders
//!
//! Mutated only through [`GlobalConfig::set_options`]. Unlike logger options
//! nothing is inherited here: clearing a value falls back to the hard default.

use super::filter::HostContext;
use super::log_event::OutgoingRequest;
use super::patch::Patch;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// Turns a structured payload into the string that is filtered, deduplicated and sent.
pub type SerializeHook = Arc<dyn Fn(&Value) -> String + Send + Sync>;

/// Called right before the network transport sends a request.
pub type BeforeSendHook = Arc<dyn Fn(&mut OutgoingRequest) + Send + Sync>;

/// Patch for the process-wide options.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct GlobalOptions {
    pub enabled: Patch<bool>,
    /// Messages that may still be sent. May go negative.
    pub max_messages: Patch<i64>,
    pub default_url: Patch<String>,
    pub client_ip: Patch<String>,
    pub user_agent: Patch<String>,
    pub request_id: Patch<String>,
    #[serde(skip)]
    pub default_before_send: Patch<BeforeSendHook>,
    #[serde(skip)]
    pub serialize: Patch<SerializeHook>,
}

impl GlobalOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Patch::Set(enabled);
        self
    }

    #[must_use]
    pub fn clear_enabled(mut self) -> Self {
        self.enabled = Patch::Clear;
        self
    }

    #[must_use]
    pub fn max_messages(mut self, quota: i64) -> Self {
        self.max_messages = Patch::Set(quota);
        self
    }

    #[must_use]
    pub fn clear_max_messages(mut self) -> Self {
        self.max_messages = Patch::Clear;
        self
    }

    #[must_use]
    pub fn default_url(mut self, url: impl Into<String>) -> Self {
        self.default_url = Patch::Set(url.into());
        self
    }

    #[must_use]
    pub fn client_ip(mut self, ip: impl Into<String>) -> Self {
        self.client_ip = Patch::Set(ip.into());
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Patch::Set(user_agent.into());
        self
    }

    #[must_use]
    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Patch::Set(request_id.into());
        self
    }

    #[must_use]
    pub fn clear_request_id(mut self) -> Self {
        self.request_id = Patch::Clear;
        self
    }

    #[must_use]
    pub fn default_before_send(mut self, hook: BeforeSendHook) -> Self {
        self.default_before_send = Patch::Set(hook);
        self
    }

    #[must_use]
    pub fn serialize(mut self, hook: SerializeHook) -> Self {
        self.serialize = Patch::Set(hook);
        self
    }

    #[must_use]
    pub fn clear_serialize(mut self) -> Self {
        self.serialize = Patch::Clear;
        self
    }
}

#[derive(Default)]
struct GlobalState {
    enabled: Option<bool>,
    max_messages: Option<i64>,
    default_url: Option<String>,
    client_ip: Option<String>,
    user_agent: Option<String>,
    request_id: Option<String>,
    default_before_send: Option<BeforeSendHook>,
    serialize: Option<SerializeHook>,
}

#[derive(Default)]
pub struct GlobalConfig {
    state: RwLock<GlobalState>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_options(&self, options: GlobalOptions) {
        let mut state = self.state.write();
        options.enabled.apply(&mut state.enabled);
        options.max_messages.apply(&mut state.max_messages);
        options.default_url.apply(&mut state.default_url);
        options.client_ip.apply(&mut state.client_ip);
        options.user_agent.apply(&mut state.user_agent);
        options.request_id.apply(&mut state.request_id);
        options.default_before_send.apply(&mut state.default_before_send);
        options.serialize.apply(&mut state.serialize);
    }

    pub fn enabled(&self) -> Option<bool> {
        self.state.read().enabled
    }

    pub fn max_messages(&self) -> Option<i64> {
        self.state.read().max_messages
    }

    pub fn default_url(&self) -> Option<String> {
        self.state.read().default_url.clone()
    }

    pub fn client_ip(&self) -> Option<String> {
        self.state.read().client_ip.clone()
    }

    pub fn user_agent(&self) -> Option<String> {
        self.state.read().user_agent.clone()
    }

    /// Empty string until set, so the request id header is always present.
    pub fn request_id(&self) -> String {
        self.state.read().request_id.clone().unwrap_or_default()
    }

    pub fn default_before_send(&self) -> Option<BeforeSendHook> {
        self.state.read().default_before_send.clone()
    }

    /// Render a structured payload with the configured hook, or as JSON.
    pub fn serialize(&self, value: &Value) -> String {
        let hook = self.state.read().serialize.clone();
        match hook {
            Some(hook) => hook(value),
            None => value.to_string(),
        }
    }

    pub(crate) fn host_context(&self) -> HostContext {
        let state = self.state.read();
        HostContext {
            enabled: state.enabled,
            user_agent: state.user_agent.clone(),
            client_ip: state.client_ip.clone(),
        }
    }

    /// Charge `count` messages against the quota.
    ///
    /// Refuses only when a quota is configured and already below one; a
    /// multi-event charge may therefore take the quota negative.
    pub(crate) fn try_consume_quota(&self, count: usize) -> bool {
        let mut state = self.state.write();
        match state.max_messages.as_mut() {
            None => true,
            Some(remaining) if *remaining < 1 => false,
            Some(remaining) => {
                *remaining -= i64::try_from(count).unwrap_or(i64::MAX);
                true
            }
        }
    }

    /// Quota configured and used up: nothing more will ever be enqueued.
    pub(crate) fn quota_exhausted(&self) -> bool {
        matches!(self.state.read().max_messages, Some(remaining) if remaining < 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let global = GlobalConfig::new();
        assert_eq!(global.enabled(), None);
        assert_eq!(global.max_messages(), None);
        assert_eq!(global.request_id(), "");
        assert!(global.default_before_send().is_none());
    }

    #[test]
    fn test_patch_semantics() {
        let global = GlobalConfig::new();
        global.set_options(GlobalOptions::new().enabled(false).request_id("r-1").max_messages(5));
        assert_eq!(global.enabled(), Some(false));
        assert_eq!(global.request_id(), "r-1");

        // Absent keys leave values alone
        global.set_options(GlobalOptions::new());
        assert_eq!(global.enabled(), Some(false));
        assert_eq!(global.max_messages(), Some(5));

        // Clear falls back to the hard default
        global.set_options(GlobalOptions::new().clear_enabled().clear_request_id());
        assert_eq!(global.enabled(), None);
        assert_eq!(global.request_id(), "");
        assert_eq!(global.max_messages(), Some(5));
    }

    #[test]
    fn test_quota_consumption() {
        let global = GlobalConfig::new();
        assert!(global.try_consume_quota(100));
        assert!(!global.quota_exhausted());

        global.set_options(GlobalOptions::new().max_messages(2));
        assert!(global.try_consume_quota(3));
        assert_eq!(global.max_messages(), Some(-1));
        assert!(global.quota_exhausted());
        assert!(!global.try_consume_quota(1));
        assert_eq!(global.max_messages(), Some(-1));
    }

    #[test]
    fn test_serialize_hook() {
        let global = GlobalConfig::new();
        let value = serde_json::json!({"a": 1});
        assert_eq!(global.serialize(&value), r#"{"a":1}"#);

        global.set_options(
            GlobalOptions::new().serialize(Arc::new(|v: &Value| format!("custom:{}", v["a"]))),
        );
        assert_eq!(global.serialize(&value), "custom:1");

        global.set_options(GlobalOptions::new().clear_serialize());
        assert_eq!(global.serialize(&value), r#"{"a":1}"#);
    }

    #[test]
    fn test_deserialize_options() {
        let options: GlobalOptions =
            serde_json::from_str(r#"{ "max_messages": 10, "client_ip": null }"#).unwrap();
        assert_eq!(options.max_messages, Patch::Set(10));
        assert!(matches!(options.client_ip, Patch::Clear));
        assert!(options.enabled.is_keep());
    }

    #[test]
    fn test_host_context_snapshot() {
        let global = GlobalConfig::new();
        global.set_options(GlobalOptions::new().client_ip("10.0.0.2").user_agent("agent/1"));
        let host = global.host_context();
        assert_eq!(host.client_ip.as_deref(), Some("10.0.0.2"));
        assert_eq!(host.user_agent.as_deref(), Some("agent/1"));
        assert_eq!(host.enabled, None);
    }
}
