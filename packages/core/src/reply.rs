//! The success-path result model flowing back up the filter chain.

use std::collections::HashMap;

/// Successful outcome of an invocation: a value plus server-observed
/// metadata. Failures travel as `RpcError` in the `Err` branch of
/// `Result<Reply, RpcError>`.
///
/// Filters may rewrite both the value and the attachments in their
/// `on_response` hook before the reply reaches the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    value: rmpv::Value,
    attachments: HashMap<String, String>,
}

impl Reply {
    /// Creates a reply carrying the given value.
    #[must_use]
    pub fn new(value: rmpv::Value) -> Self {
        Self {
            value,
            attachments: HashMap::new(),
        }
    }

    /// A nil-valued reply, used by filters that short-circuit without a
    /// payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(rmpv::Value::Nil)
    }

    pub fn value(&self) -> &rmpv::Value {
        &self.value
    }

    pub fn set_value(&mut self, value: rmpv::Value) {
        self.value = value;
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn set_attachment(&mut self, key: &str, value: &str) {
        self.attachments.insert(key.to_string(), value.to_string());
    }

    #[must_use]
    pub fn attachments(&self) -> &HashMap<String, String> {
        &self.attachments
    }
}

impl Default for Reply {
    fn default() -> Self {
        Self::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_can_rewrite_value_and_attachments() {
        let mut reply = Reply::new(rmpv::Value::from("original"));
        reply.set_value(rmpv::Value::from("rewritten"));
        reply.set_attachment("server.elapsed_ms", "12");

        assert_eq!(reply.value(), &rmpv::Value::from("rewritten"));
        assert_eq!(reply.attachment("server.elapsed_ms"), Some("12"));
    }

    #[test]
    fn empty_reply_is_nil() {
        assert_eq!(Reply::empty().value(), &rmpv::Value::Nil);
    }
}
