//! Tag routing rules: YAML text format, validation, and atomic hot-swap.
//!
//! Rule text format:
//!
//! ```yaml
//! force: false
//! runtime: true
//! enabled: true
//! priority: 1
//! key: demo.Echo
//! tags:
//!   - name: canary
//!     addresses: ["10.0.0.3:20880"]
//!   - name: staging
//!     addresses: null
//! ```
//!
//! A `null` or empty address list declares the tag name without binding any
//! addresses to it — distinct from the tag being absent entirely: declared
//! tags are excluded from the default bucket even while unbound.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Deserialize;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Raw (wire) form
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct RawTagDefinition {
    name: String,
    #[serde(default)]
    addresses: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawTagRule {
    #[serde(default)]
    force: bool,
    #[serde(default)]
    runtime: bool,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    priority: i32,
    key: String,
    #[serde(default)]
    tags: Vec<RawTagDefinition>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Rejection reasons for a pushed rule. A rejected rule leaves the previous
/// rule active.
#[derive(Debug, thiserror::Error)]
pub enum RuleParseError {
    #[error("rule text is not valid yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("rule key must not be empty")]
    EmptyKey,
    #[error("tag name must not be empty")]
    EmptyTagName,
    #[error("tag `{0}` declared more than once")]
    DuplicateTag(String),
}

// ---------------------------------------------------------------------------
// TagRule (validated form)
// ---------------------------------------------------------------------------

/// A fully validated, precomputed tag routing rule.
///
/// Instances are immutable; updates replace the whole rule behind an
/// `ArcSwapOption`, so concurrent route passes never observe a rule with a
/// new tag-name set but stale address mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRule {
    pub key: String,
    pub force: bool,
    pub runtime: bool,
    pub enabled: bool,
    pub priority: i32,
    tag_names: Vec<String>,
    tag_addresses: HashMap<String, Vec<String>>,
    address_to_tag: HashMap<String, String>,
}

impl TagRule {
    /// Parses and validates rule text. All validation happens before any
    /// state is visible to readers.
    pub fn parse(text: &str) -> Result<Self, RuleParseError> {
        let raw: RawTagRule = serde_yaml::from_str(text)?;
        if raw.key.is_empty() {
            return Err(RuleParseError::EmptyKey);
        }

        let mut tag_names = Vec::with_capacity(raw.tags.len());
        let mut tag_addresses = HashMap::new();
        let mut address_to_tag: HashMap<String, String> = HashMap::new();

        for tag in raw.tags {
            if tag.name.is_empty() {
                return Err(RuleParseError::EmptyTagName);
            }
            if tag_names.contains(&tag.name) {
                return Err(RuleParseError::DuplicateTag(tag.name));
            }
            tag_names.push(tag.name.clone());

            let addresses = tag.addresses.unwrap_or_default();
            if addresses.is_empty() {
                continue;
            }
            for address in &addresses {
                if let Some(previous) = address_to_tag.insert(address.clone(), tag.name.clone()) {
                    // Conflicting mapping: the later declaration wins.
                    warn!(
                        address = address.as_str(),
                        previous = previous.as_str(),
                        winner = tag.name.as_str(),
                        "address bound to multiple tags, keeping the later tag"
                    );
                }
            }
            tag_addresses.insert(tag.name.clone(), addresses);
        }

        Ok(Self {
            key: raw.key,
            force: raw.force,
            runtime: raw.runtime,
            enabled: raw.enabled,
            priority: raw.priority,
            tag_names,
            tag_addresses,
            address_to_tag,
        })
    }

    /// All declared tag names, bound or not, in declaration order.
    #[must_use]
    pub fn tag_names(&self) -> &[String] {
        &self.tag_names
    }

    /// Whether the rule declares the given tag name.
    #[must_use]
    pub fn declares(&self, tag: &str) -> bool {
        self.tag_names.iter().any(|name| name == tag)
    }

    /// Addresses bound to a tag. `None` for undeclared tags *and* for
    /// declared-but-unbound tags.
    pub fn addresses_for(&self, tag: &str) -> Option<&[String]> {
        self.tag_addresses.get(tag).map(Vec::as_slice)
    }

    /// The tag claiming the given endpoint address, if any.
    pub fn tag_for_address(&self, address: &str) -> Option<&str> {
        self.address_to_tag.get(address).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Hot-swap helper
// ---------------------------------------------------------------------------

/// Applies a governance push to a rule slot.
///
/// `None` clears the slot (tag governance removed). `Some(text)` parses and
/// validates; on success the new rule replaces the old atomically, on
/// failure the error is returned and the old rule stays active.
pub fn apply_rule_text(
    slot: &ArcSwapOption<TagRule>,
    text: Option<&str>,
) -> Result<(), RuleParseError> {
    match text {
        None => {
            slot.store(None);
            info!("tag rule cleared");
            Ok(())
        }
        Some(text) => {
            let rule = TagRule::parse(text)?;
            info!(key = rule.key.as_str(), enabled = rule.enabled, "tag rule applied");
            slot.store(Some(Arc::new(rule)));
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const RULE: &str = r"
force: false
runtime: true
enabled: true
priority: 1
key: demo.Echo
tags:
  - name: t1
    addresses: null
  - name: t2
    addresses: ['30.5.120.37:20880']
";

    #[test]
    fn parses_null_addresses_as_declared_but_unbound() {
        let rule = TagRule::parse(RULE).unwrap();
        assert_eq!(rule.key, "demo.Echo");
        assert!(rule.runtime);
        assert!(!rule.force);
        assert_eq!(rule.tag_names(), ["t1", "t2"]);
        assert!(rule.declares("t1"));
        assert_eq!(rule.addresses_for("t1"), None);
        assert_eq!(rule.addresses_for("t2").map(<[String]>::len), Some(1));
        assert_eq!(rule.tag_for_address("30.5.120.37:20880"), Some("t2"));
    }

    #[test]
    fn empty_addresses_behave_like_null() {
        let rule = TagRule::parse(
            "key: demo\ntags:\n  - name: t1\n    addresses: []\n",
        )
        .unwrap();
        assert!(rule.declares("t1"));
        assert_eq!(rule.addresses_for("t1"), None);
    }

    #[test]
    fn conflicting_address_keeps_last_applied_tag() {
        let rule = TagRule::parse(
            "key: demo\ntags:\n  - name: a\n    addresses: ['h:1']\n  - name: b\n    addresses: ['h:1']\n",
        )
        .unwrap();
        assert_eq!(rule.tag_for_address("h:1"), Some("b"));
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(matches!(
            TagRule::parse("key: ''\ntags: []\n"),
            Err(RuleParseError::EmptyKey)
        ));
        assert!(matches!(
            TagRule::parse("key: demo\ntags:\n  - name: x\n  - name: x\n"),
            Err(RuleParseError::DuplicateTag(_))
        ));
        assert!(matches!(
            TagRule::parse(":::not yaml"),
            Err(RuleParseError::Yaml(_))
        ));
    }

    #[test]
    fn rejected_push_keeps_previous_rule_active() {
        let slot = ArcSwapOption::<TagRule>::empty();
        apply_rule_text(&slot, Some(RULE)).unwrap();
        assert!(slot.load().is_some());

        let err = apply_rule_text(&slot, Some(":::not yaml"));
        assert!(err.is_err());
        let active = slot.load_full().unwrap();
        assert_eq!(active.key, "demo.Echo");

        apply_rule_text(&slot, None).unwrap();
        assert!(slot.load().is_none());
    }

    #[test]
    fn defaults_when_fields_omitted() {
        let rule = TagRule::parse("key: demo\n").unwrap();
        assert!(rule.enabled);
        assert!(!rule.force);
        assert!(!rule.runtime);
        assert_eq!(rule.priority, 0);
        assert!(rule.tag_names().is_empty());
    }
}
