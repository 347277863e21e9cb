//! Tracing filter: one span per call with outcome and duration fields.

use std::time::Instant;

use async_trait::async_trait;
use shunt_core::{Invocation, Invoker, Reply, RpcError};
use tracing::{info_span, Instrument};

use super::Filter;

/// Wraps the downstream call in a `tracing` span recording service, method,
/// outcome, and duration.
pub struct TraceFilter;

#[async_trait]
impl Filter for TraceFilter {
    fn name(&self) -> &'static str {
        "trace"
    }

    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> Result<Reply, RpcError> {
        let span = info_span!(
            "rpc_call",
            service = invocation.service(),
            method = invocation.method(),
            outcome = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let start = Instant::now();
        let result = next.invoke(invocation).instrument(span.clone()).await;

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = start.elapsed().as_millis() as u64;
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(error) => error.code().to_string(),
        };
        span.record("duration_ms", duration_ms);
        span.record("outcome", outcome.as_str());

        result
    }
}
