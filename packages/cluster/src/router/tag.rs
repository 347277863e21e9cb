//! Tag routing: exact-match traffic partitioning with default/downgrade
//! fallback.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use shunt_core::invocation::keys;
use shunt_core::{EndpointUrl, Invocation, InvokerRef};

use super::rule::{apply_rule_text, RuleParseError, TagRule};
use super::{Router, RouterDecision, RouteTrace};
use crate::bitlist::BitList;

// ---------------------------------------------------------------------------
// Shared tag decisions
// ---------------------------------------------------------------------------

/// The tag an endpoint effectively carries: the active rule's address overlay
/// when the rule claims this address, otherwise the endpoint's own static
/// `tag` URL parameter.
pub(crate) fn effective_tag(rule: Option<&TagRule>, url: &EndpointUrl) -> Option<String> {
    if let Some(rule) = rule {
        if let Some(tag) = rule.tag_for_address(&url.address()) {
            return Some(tag.to_string());
        }
    }
    url.tag().map(ToString::to_string)
}

/// The tag the request asks for. With `runtime=false` the rule pins the tag
/// source to the consumer URL; otherwise the attachment takes precedence.
/// Blank values count as unset in both places.
pub(crate) fn request_tag(
    rule: Option<&TagRule>,
    invocation: &Invocation,
    url: &EndpointUrl,
) -> Option<String> {
    match rule {
        Some(rule) if !rule.runtime => url.param_nonempty(keys::TAG).map(ToString::to_string),
        _ => invocation.attachment_or_param(keys::TAG, url),
    }
}

/// Whether a non-matching request tag denies the call. The rule's `force`
/// flag governs when a rule is active; without one, the per-call `tag.force`
/// attachment decides.
pub(crate) fn force_flag(rule: Option<&TagRule>, invocation: &Invocation) -> bool {
    rule.map_or_else(|| invocation.attachment_bool(keys::FORCE_TAG, false), |r| r.force)
}

/// Whether an endpoint serves tag-less ("default") traffic: it carries no
/// effective tag, or a static tag the active rule does not declare.
/// Rule-declared tags never leak into the default bucket, bound or not.
pub(crate) fn serves_default(rule: Option<&TagRule>, url: &EndpointUrl) -> bool {
    match effective_tag(rule, url) {
        None => true,
        Some(tag) => match rule {
            Some(rule) => !rule.declares(&tag),
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// TagRouter
// ---------------------------------------------------------------------------

/// Predicate-filtering tag router. `TagStateRouter` implements the same
/// decisions directly on the bitmap.
pub struct TagRouter {
    rule: ArcSwapOption<TagRule>,
}

impl TagRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rule: ArcSwapOption::empty(),
        }
    }

    /// Governance push callback. `None` clears tag governance; invalid text
    /// is rejected and the previous rule stays active.
    pub fn on_rule_changed(&self, text: Option<&str>) -> Result<(), RuleParseError> {
        apply_rule_text(&self.rule, text)
    }

    /// The currently active rule, if any.
    #[must_use]
    pub fn active_rule(&self) -> Option<Arc<TagRule>> {
        self.rule.load_full()
    }
}

impl Default for TagRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for TagRouter {
    fn name(&self) -> &'static str {
        "tag"
    }

    fn priority(&self) -> i32 {
        100
    }

    fn route(
        &self,
        set: BitList<InvokerRef>,
        url: &EndpointUrl,
        invocation: &Invocation,
        trace: Option<&mut RouteTrace>,
    ) -> RouterDecision {
        let input = set.len();
        // One atomic load per call: the decision below can never see a
        // half-applied rule.
        let loaded = self.rule.load_full();
        let rule = loaded.as_deref().filter(|r| r.enabled);

        let (decision, message) = match request_tag(rule, invocation, url) {
            Some(tag) => {
                let matched = set
                    .clone()
                    .narrow(|invoker| effective_tag(rule, invoker.url()).as_deref() == Some(tag.as_str()));
                if matched.is_empty() {
                    if force_flag(rule, invocation) {
                        let reason = format!("no endpoint tagged `{tag}` and tag routing is forced");
                        if let Some(trace) = trace {
                            trace.record(self.name(), input, 0, Some(reason.clone()));
                        }
                        return RouterDecision::Denied { reason };
                    }
                    (set, Some(format!("no endpoint tagged `{tag}`, downgraded to full set")))
                } else {
                    (matched, None)
                }
            }
            None => (
                set.narrow(|invoker| serves_default(rule, invoker.url())),
                None,
            ),
        };

        if let Some(trace) = trace {
            trace.record(self.name(), input, decision.len(), message);
        }
        RouterDecision::Narrowed(decision)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
