//! Mesh routing: externally-fed label/subset rules.
//!
//! A mesh rule partitions endpoints into named subsets by URL-parameter
//! labels. The request picks a subset through an attachment; endpoints whose
//! parameters carry all of the subset's labels stay in. Rules arrive from
//! the control plane fully formed and are swapped atomically, exactly like
//! tag rules. Rule text:
//!
//! ```yaml
//! key: demo.Echo
//! enabled: true
//! attachment-key: mesh.subset
//! subsets:
//!   - name: v2
//!     labels: { release: v2, env: prod }
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use serde::Deserialize;
use shunt_core::{EndpointUrl, Invocation, InvokerRef};
use tracing::info;

use super::rule::RuleParseError;
use super::{Router, RouterDecision, RouteTrace};
use crate::bitlist::BitList;

// ---------------------------------------------------------------------------
// MeshRule
// ---------------------------------------------------------------------------

fn default_enabled() -> bool {
    true
}

fn default_attachment_key() -> String {
    "mesh.subset".to_string()
}

/// One named subset: endpoints whose URL parameters contain every label.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeshSubset {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// A control-plane-fed subset routing rule.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MeshRule {
    pub key: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Attachment consulted for the requested subset name.
    #[serde(default = "default_attachment_key", rename = "attachment-key")]
    pub attachment_key: String,
    #[serde(default)]
    pub subsets: Vec<MeshSubset>,
}

impl MeshRule {
    /// Parses and validates rule text.
    pub fn parse(text: &str) -> Result<Self, RuleParseError> {
        let rule: Self = serde_yaml::from_str(text)?;
        if rule.key.is_empty() {
            return Err(RuleParseError::EmptyKey);
        }
        Ok(rule)
    }

    fn subset(&self, name: &str) -> Option<&MeshSubset> {
        self.subsets.iter().find(|s| s.name == name)
    }
}

// ---------------------------------------------------------------------------
// MeshRouter
// ---------------------------------------------------------------------------

/// Subset router driven by externally pushed `MeshRule`s.
///
/// An unmatched or unknown subset falls through to the full input set: mesh
/// governance has no force concept, so denial is never produced here.
pub struct MeshRouter {
    rule: ArcSwapOption<MeshRule>,
}

impl MeshRouter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rule: ArcSwapOption::empty(),
        }
    }

    /// Control-plane push callback; invalid text keeps the previous rule.
    pub fn on_rule_changed(&self, text: Option<&str>) -> Result<(), RuleParseError> {
        match text {
            None => {
                self.rule.store(None);
                info!("mesh rule cleared");
                Ok(())
            }
            Some(text) => {
                let rule = MeshRule::parse(text)?;
                info!(key = rule.key.as_str(), subsets = rule.subsets.len(), "mesh rule applied");
                self.rule.store(Some(Arc::new(rule)));
                Ok(())
            }
        }
    }
}

impl Default for MeshRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl Router for MeshRouter {
    fn name(&self) -> &'static str {
        "mesh"
    }

    fn priority(&self) -> i32 {
        200
    }

    fn route(
        &self,
        set: BitList<InvokerRef>,
        _url: &EndpointUrl,
        invocation: &Invocation,
        trace: Option<&mut RouteTrace>,
    ) -> RouterDecision {
        let input = set.len();
        let loaded = self.rule.load_full();
        let rule = loaded.as_deref().filter(|r| r.enabled);

        let (result, message) = match rule {
            Some(rule) => match invocation
                .attachment_nonempty(&rule.attachment_key)
                .and_then(|name| rule.subset(&name).cloned())
            {
                Some(subset) => {
                    let narrowed = set.clone().narrow(|invoker| {
                        subset
                            .labels
                            .iter()
                            .all(|(k, v)| invoker.url().param(k) == Some(v.as_str()))
                    });
                    if narrowed.is_empty() {
                        (set, Some(format!("subset `{}` matched nothing, fell through", subset.name)))
                    } else {
                        (narrowed, Some(format!("subset `{}`", subset.name)))
                    }
                }
                None => (set, None),
            },
            None => (set, None),
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

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use shunt_core::{Invoker, Reply, RpcError};

    use super::*;

    struct StaticEndpoint {
        url: EndpointUrl,
    }

    #[async_trait]
    impl Invoker for StaticEndpoint {
        fn url(&self) -> &EndpointUrl {
            &self.url
        }

        async fn invoke(&self, _invocation: Invocation) -> Result<Reply, RpcError> {
            Ok(Reply::empty())
        }
    }

    fn endpoint(host: &str, labels: &[(&str, &str)]) -> InvokerRef {
        let mut url = EndpointUrl::new("shunt", host, 20880);
        for (k, v) in labels {
            url.set_param(k, v);
        }
        Arc::new(StaticEndpoint { url })
    }

    fn hosts(set: &BitList<InvokerRef>) -> Vec<String> {
        set.iter().map(|i| i.url().host().to_string()).collect()
    }

    const RULE: &str = r"
key: demo.Echo
subsets:
  - name: v2
    labels: { release: v2 }
  - name: empty-subset
    labels: { release: v9 }
";

    fn sample_set() -> BitList<InvokerRef> {
        BitList::from_vec(vec![
            endpoint("a", &[("release", "v1")]),
            endpoint("b", &[("release", "v2")]),
            endpoint("c", &[]),
        ])
    }

    fn narrowed(decision: RouterDecision) -> BitList<InvokerRef> {
        match decision {
            RouterDecision::Narrowed(set) => set,
            RouterDecision::Denied { reason } => panic!("unexpected denial: {reason}"),
        }
    }

    #[test]
    fn narrows_to_the_requested_subset() {
        let router = MeshRouter::new();
        router.on_rule_changed(Some(RULE)).unwrap();
        let invocation = Invocation::new("demo.Echo", "say").with_attachment("mesh.subset", "v2");
        let url = EndpointUrl::new("shunt", "consumer", 0);
        let set = narrowed(router.route(sample_set(), &url, &invocation, None));
        assert_eq!(hosts(&set), ["b"]);
    }

    #[test]
    fn unmatched_subset_falls_through() {
        let router = MeshRouter::new();
        router.on_rule_changed(Some(RULE)).unwrap();
        let invocation =
            Invocation::new("demo.Echo", "say").with_attachment("mesh.subset", "empty-subset");
        let url = EndpointUrl::new("shunt", "consumer", 0);
        let set = narrowed(router.route(sample_set(), &url, &invocation, None));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn no_rule_or_no_attachment_passes_through() {
        let router = MeshRouter::new();
        let url = EndpointUrl::new("shunt", "consumer", 0);
        let invocation = Invocation::new("demo.Echo", "say").with_attachment("mesh.subset", "v2");
        let set = narrowed(router.route(sample_set(), &url, &invocation, None));
        assert_eq!(set.len(), 3);

        router.on_rule_changed(Some(RULE)).unwrap();
        let invocation = Invocation::new("demo.Echo", "say");
        let set = narrowed(router.route(sample_set(), &url, &invocation, None));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn unknown_subset_name_passes_through() {
        let router = MeshRouter::new();
        router.on_rule_changed(Some(RULE)).unwrap();
        let invocation =
            Invocation::new("demo.Echo", "say").with_attachment("mesh.subset", "nonexistent");
        let url = EndpointUrl::new("shunt", "consumer", 0);
        let set = narrowed(router.route(sample_set(), &url, &invocation, None));
        assert_eq!(set.len(), 3);
    }
}
