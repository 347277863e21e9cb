//! The per-call invocation model: method, arguments, and the attachment bag.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;

use crate::url::EndpointUrl;

/// Well-known attachment keys consulted by routers, filters, and cluster
/// invokers.
pub mod keys {
    /// Request traffic tag; takes precedence over the consumer URL's `tag`
    /// parameter when runtime rule consultation is enabled.
    pub const TAG: &str = "tag";
    /// Per-call force-tag override for static tag routing (`"true"`/`"false"`).
    pub const FORCE_TAG: &str = "tag.force";
    /// Per-call sticky-selection override (`"true"`/`"false"`).
    pub const STICKY: &str = "sticky";
    /// When `"true"`, the router chain records a per-stage trace for this call.
    pub const TRACE_ROUTE: &str = "route.trace";
    /// Stamped by the consumer context filter (`consumer` / `provider`).
    pub const SIDE: &str = "side";
    /// Logical service key, stamped by the consumer context filter.
    pub const SERVICE_KEY: &str = "service.key";
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// One logical call flowing through routing, filtering, and failover.
///
/// The identity fields (`service`, `method`, `parameter_types`, `arguments`)
/// are fixed once dispatch begins. The attachment bag is shared behind an
/// `Arc<DashMap>`: clones made while descending the filter chain all observe
/// the same bag, so attachments added by an inner filter are visible to outer
/// completion hooks.
#[derive(Clone)]
pub struct Invocation {
    service: String,
    method: String,
    parameter_types: Vec<String>,
    arguments: Vec<rmpv::Value>,
    attachments: Arc<DashMap<String, String>>,
}

impl Invocation {
    /// Creates an invocation with no arguments and an empty attachment bag.
    #[must_use]
    pub fn new(service: &str, method: &str) -> Self {
        Self {
            service: service.to_string(),
            method: method.to_string(),
            parameter_types: Vec::new(),
            arguments: Vec::new(),
            attachments: Arc::new(DashMap::new()),
        }
    }

    /// Builder-style argument list.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<rmpv::Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Builder-style parameter type list (one entry per argument).
    #[must_use]
    pub fn with_parameter_types(mut self, parameter_types: Vec<String>) -> Self {
        self.parameter_types = parameter_types;
        self
    }

    /// Builder-style attachment addition.
    #[must_use]
    pub fn with_attachment(self, key: &str, value: &str) -> Self {
        self.set_attachment(key, value);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn parameter_types(&self) -> &[String] {
        &self.parameter_types
    }

    #[must_use]
    pub fn arguments(&self) -> &[rmpv::Value] {
        &self.arguments
    }

    /// `service.method`, the key used for per-method state such as
    /// round-robin cursors.
    #[must_use]
    pub fn target_key(&self) -> String {
        format!("{}.{}", self.service, self.method)
    }

    /// Returns an attachment value, if present.
    pub fn attachment(&self, key: &str) -> Option<String> {
        self.attachments.get(key).map(|entry| entry.value().clone())
    }

    /// Returns an attachment value, treating an empty string as absent.
    pub fn attachment_nonempty(&self, key: &str) -> Option<String> {
        self.attachment(key).filter(|v| !v.is_empty())
    }

    /// Sets an attachment. Takes `&self`: the bag is shared and concurrent.
    pub fn set_attachment(&self, key: &str, value: &str) {
        self.attachments.insert(key.to_string(), value.to_string());
    }

    /// Removes an attachment, returning the previous value if any.
    pub fn remove_attachment(&self, key: &str) -> Option<String> {
        self.attachments.remove(key).map(|(_, v)| v)
    }

    /// Boolean attachment, defaulting when absent or unparsable.
    #[must_use]
    pub fn attachment_bool(&self, key: &str, default: bool) -> bool {
        self.attachment(key)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default)
    }

    /// Attachment-first lookup with URL-parameter fallback, blank treated as
    /// absent in both places. This is the request-tag resolution rule.
    pub fn attachment_or_param(&self, key: &str, url: &EndpointUrl) -> Option<String> {
        self.attachment_nonempty(key)
            .or_else(|| url.param_nonempty(key).map(ToString::to_string))
    }
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("service", &self.service)
            .field("method", &self.method)
            .field("arguments", &self.arguments.len())
            .field("attachments", &self.attachments.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_bag_is_shared_across_clones() {
        let invocation = Invocation::new("demo.Echo", "say");
        let clone = invocation.clone();
        clone.set_attachment("added-by-clone", "yes");
        assert_eq!(
            invocation.attachment("added-by-clone").as_deref(),
            Some("yes")
        );
    }

    #[test]
    fn blank_attachment_is_absent_for_nonempty_lookup() {
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "");
        assert_eq!(invocation.attachment(keys::TAG).as_deref(), Some(""));
        assert!(invocation.attachment_nonempty(keys::TAG).is_none());
    }

    #[test]
    fn attachment_or_param_prefers_attachment() {
        let url = EndpointUrl::new("shunt", "h", 1).with_param(keys::TAG, "from-url");
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "from-call");
        assert_eq!(
            invocation.attachment_or_param(keys::TAG, &url).as_deref(),
            Some("from-call")
        );

        invocation.remove_attachment(keys::TAG);
        assert_eq!(
            invocation.attachment_or_param(keys::TAG, &url).as_deref(),
            Some("from-url")
        );
    }

    #[test]
    fn blank_attachment_falls_through_to_url() {
        let url = EndpointUrl::new("shunt", "h", 1).with_param(keys::TAG, "from-url");
        let invocation = Invocation::new("demo.Echo", "say").with_attachment(keys::TAG, "");
        assert_eq!(
            invocation.attachment_or_param(keys::TAG, &url).as_deref(),
            Some("from-url")
        );
    }

    #[test]
    fn target_key_combines_service_and_method() {
        let invocation = Invocation::new("demo.Echo", "say");
        assert_eq!(invocation.target_key(), "demo.Echo.say");
    }
}
