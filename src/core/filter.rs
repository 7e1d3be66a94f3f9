//! Entity and content filters shared by loggers and appenders
//!
//! Both predicates are fail-open: a pattern that does not compile lets the
//! event through, since losing log data is worse than logging too much.

use regex::Regex;
use std::fmt;

/// A user-supplied regular expression, compiled once when it is configured.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    compiled: Option<Regex>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = match Regex::new(&source) {
            Ok(regex) => Some(regex),
            Err(e) => {
                tracing::debug!(pattern = %source, error = %e, "ignoring filter pattern that does not compile");
                None
            }
        };
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    /// `None` when the pattern could not be compiled.
    pub fn matches(&self, text: &str) -> Option<bool> {
        self.compiled.as_ref().map(|regex| regex.is_match(text))
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl From<&str> for Pattern {
    fn from(source: &str) -> Self {
        Pattern::new(source)
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Pattern::new(source)
    }
}

/// Filters an entity (logger or appender) resolves before it handles an event.
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    pub user_agent_regex: Option<Pattern>,
    pub ip_regex: Option<Pattern>,
    pub disallow: Option<Pattern>,
}

/// Snapshot of the process-wide values the entity filter tests against.
#[derive(Debug, Clone, Default)]
pub struct HostContext {
    pub enabled: Option<bool>,
    pub user_agent: Option<String>,
    pub client_ip: Option<String>,
}

/// Global enable switch plus user-agent and client-IP filters. Does not look at the level.
pub fn passes_entity_filter(filters: &FilterSet, host: &HostContext) -> bool {
    if host.enabled == Some(false) {
        return false;
    }

    if let (Some(pattern), Some(user_agent)) = (&filters.user_agent_regex, &host.user_agent) {
        if pattern.matches(user_agent) == Some(false) {
            return false;
        }
    }

    if let (Some(pattern), Some(client_ip)) = (&filters.ip_regex, &host.client_ip) {
        if pattern.matches(client_ip) == Some(false) {
            return false;
        }
    }

    true
}

/// False only when `disallow` is set, compiles, and matches the message.
pub fn passes_content_filter(disallow: Option<&Pattern>, message: &str) -> bool {
    match disallow {
        Some(pattern) => pattern.matches(message) != Some(true),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(enabled: Option<bool>, ua: Option<&str>, ip: Option<&str>) -> HostContext {
        HostContext {
            enabled,
            user_agent: ua.map(String::from),
            client_ip: ip.map(String::from),
        }
    }

    #[test]
    fn test_unset_filters_pass() {
        assert!(passes_entity_filter(&FilterSet::default(), &host(None, None, None)));
        assert!(passes_entity_filter(
            &FilterSet::default(),
            &host(Some(true), Some("Mozilla"), Some("10.0.0.1"))
        ));
    }

    #[test]
    fn test_global_disable_wins() {
        assert!(!passes_entity_filter(&FilterSet::default(), &host(Some(false), None, None)));
    }

    #[test]
    fn test_user_agent_filter() {
        let filters = FilterSet {
            user_agent_regex: Some(Pattern::new("Firefox")),
            ..Default::default()
        };
        assert!(passes_entity_filter(&filters, &host(None, Some("Mozilla Firefox/120"), None)));
        assert!(!passes_entity_filter(&filters, &host(None, Some("Chrome/119"), None)));
        // No user agent known: nothing to test against.
        assert!(passes_entity_filter(&filters, &host(None, None, None)));
    }

    #[test]
    fn test_ip_filter_only_applies_with_client_ip() {
        let filters = FilterSet {
            ip_regex: Some(Pattern::new(r"^10\.")),
            ..Default::default()
        };
        assert!(passes_entity_filter(&filters, &host(None, None, Some("10.1.2.3"))));
        assert!(!passes_entity_filter(&filters, &host(None, None, Some("192.168.0.1"))));
        assert!(passes_entity_filter(&filters, &host(None, None, None)));
    }

    #[test]
    fn test_invalid_pattern_fails_open() {
        let broken = Pattern::new("([unclosed");
        assert!(!broken.is_valid());
        assert_eq!(broken.matches("anything"), None);

        let filters = FilterSet {
            user_agent_regex: Some(broken.clone()),
            ip_regex: Some(broken.clone()),
            disallow: Some(broken.clone()),
        };
        assert!(passes_entity_filter(&filters, &host(None, Some("ua"), Some("1.1.1.1"))));
        assert!(passes_content_filter(Some(&broken), "anything"));
    }

    #[test]
    fn test_content_filter() {
        let disallow = Pattern::new("password");
        assert!(!passes_content_filter(Some(&disallow), "user password=hunter2"));
        assert!(passes_content_filter(Some(&disallow), "user logged in"));
        assert!(passes_content_filter(None, "password"));
    }
}
