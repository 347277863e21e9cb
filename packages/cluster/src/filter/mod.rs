//! Cross-cutting filters wrapping an invoker's call path.
//!
//! Filters run in two phases. `invoke` is the call-path wrapper: pre-logic,
//! then descend into `next`. `on_response`/`on_error` fire when the inner
//! future completes — on the completion continuation, which is generally not
//! the thread that started the call. Hook failures are logged by the chain
//! and never crash the call.

pub mod chain;
pub mod context;
pub mod metrics;
pub mod registry;
pub mod trace;
pub mod validation;

use async_trait::async_trait;
use shunt_core::{Invocation, Invoker, Reply, RpcError};

pub use chain::{FilterChainBuilder, FilterChainInvoker};
pub use context::ConsumerContextFilter;
pub use metrics::{MetricsCollector, MetricsFilter, RuntimeCollector};
pub use registry::{FilterEntry, FilterRegistry};
pub use trace::TraceFilter;
pub use validation::ValidationFilter;

// ---------------------------------------------------------------------------
// FilterRole
// ---------------------------------------------------------------------------

/// Which side of a call a filter participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRole {
    Consumer,
    Provider,
    Both,
}

impl FilterRole {
    /// Whether a filter declared for `self` activates when building a chain
    /// for `side`.
    #[must_use]
    pub fn matches(self, side: FilterRole) -> bool {
        matches!(
            (self, side),
            (FilterRole::Both, _) | (_, FilterRole::Both)
        ) || self == side
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// A cross-cutting interceptor around an invoker.
///
/// `invoke` may short-circuit by returning without calling `next`; a
/// pre-logic error fails fast and inner filters are never entered. The
/// completion hooks may rewrite the reply or observe the error; errors they
/// return are logged, not propagated.
#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Call-path wrapper. The default forwards unchanged.
    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> Result<Reply, RpcError> {
        next.invoke(invocation).await
    }

    /// Fires once when the wrapped call completes successfully.
    fn on_response(&self, _reply: &mut Reply, _invocation: &Invocation) -> anyhow::Result<()> {
        Ok(())
    }

    /// Fires once when the wrapped call completes with an error.
    fn on_error(&self, _error: &RpcError, _invocation: &Invocation) -> anyhow::Result<()> {
        Ok(())
    }

    /// Releases resources held by the filter when its chain is torn down.
    fn destroy(&self) {}
}
