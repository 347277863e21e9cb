//! Metrics filter: exactly one sample per terminal call outcome.
//!
//! The filter speaks to a narrow `MetricsCollector` seam rather than a
//! concrete sink; the default collector forwards to the `metrics` facade.
//! Samples are tagged with interface, method, group, and version — a tag
//! that is unavailable is omitted, never defaulted to an empty string.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use shunt_core::{ErrorCode, Invocation, Invoker, Reply, RpcError};

use super::Filter;

/// Sample name recorded for every completed call.
const SAMPLE_NAME: &str = "shunt_requests";

/// Internal attachments carrying call-start state to the completion hooks.
mod attachments {
    pub const BEGIN_MS: &str = "metrics.begin-ms";
    pub const GROUP: &str = "metrics.group";
    pub const VERSION: &str = "metrics.version";
}

// ---------------------------------------------------------------------------
// MetricsCollector
// ---------------------------------------------------------------------------

/// Sink seam: one call per terminal outcome, value is the elapsed
/// milliseconds.
pub trait MetricsCollector: Send + Sync {
    fn record_sample(&self, name: &'static str, labels: &[(&'static str, String)], value: f64);
}

/// Default collector forwarding to the `metrics` facade: an outcome counter
/// plus a duration histogram per sample.
pub struct RuntimeCollector;

impl MetricsCollector for RuntimeCollector {
    fn record_sample(&self, name: &'static str, labels: &[(&'static str, String)], value: f64) {
        let labels: Vec<metrics::Label> = labels
            .iter()
            .map(|(key, value)| metrics::Label::new(*key, value.clone()))
            .collect();
        metrics::counter!(format!("{name}_total"), labels.clone()).increment(1);
        metrics::histogram!(format!("{name}_duration_ms"), labels).record(value);
    }
}

// ---------------------------------------------------------------------------
// MetricsFilter
// ---------------------------------------------------------------------------

/// Records one sample when the wrapped call reaches a terminal outcome:
/// `success`, `biz_failure`, `timeout`, or `failure`.
pub struct MetricsFilter {
    collector: Arc<dyn MetricsCollector>,
}

impl MetricsFilter {
    #[must_use]
    pub fn new(collector: Arc<dyn MetricsCollector>) -> Self {
        Self { collector }
    }

    /// Filter wired to the `metrics` facade.
    #[must_use]
    pub fn with_runtime_collector() -> Self {
        Self::new(Arc::new(RuntimeCollector))
    }

    fn outcome_of(code: ErrorCode) -> &'static str {
        match code {
            ErrorCode::Biz => "biz_failure",
            ErrorCode::Timeout => "timeout",
            _ => "failure",
        }
    }

    fn record(&self, invocation: &Invocation, outcome: &'static str) {
        let begin_ms: u64 = invocation
            .attachment(attachments::BEGIN_MS)
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(now_ms);
        let elapsed_ms = now_ms().saturating_sub(begin_ms);

        let mut labels: Vec<(&'static str, String)> = vec![
            ("interface", invocation.service().to_string()),
            ("method", invocation.method().to_string()),
            ("outcome", outcome.to_string()),
        ];
        if let Some(group) = invocation.attachment_nonempty(attachments::GROUP) {
            labels.push(("group", group));
        }
        if let Some(version) = invocation.attachment_nonempty(attachments::VERSION) {
            labels.push(("version", version));
        }

        #[allow(clippy::cast_precision_loss)]
        self.collector
            .record_sample(SAMPLE_NAME, &labels, elapsed_ms as f64);
    }
}

#[allow(clippy::cast_possible_truncation)]
fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[async_trait]
impl Filter for MetricsFilter {
    fn name(&self) -> &'static str {
        "metrics"
    }

    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> Result<Reply, RpcError> {
        invocation.set_attachment(attachments::BEGIN_MS, &now_ms().to_string());
        // Group/version live on the endpoint URL; carry them to the
        // completion hooks through the shared attachment bag.
        if let Some(group) = next.url().group() {
            invocation.set_attachment(attachments::GROUP, group);
        }
        if let Some(version) = next.url().version() {
            invocation.set_attachment(attachments::VERSION, version);
        }
        next.invoke(invocation).await
    }

    fn on_response(&self, _reply: &mut Reply, invocation: &Invocation) -> anyhow::Result<()> {
        self.record(invocation, "success");
        Ok(())
    }

    fn on_error(&self, error: &RpcError, invocation: &Invocation) -> anyhow::Result<()> {
        self.record(invocation, Self::outcome_of(error.code()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
