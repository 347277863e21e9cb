//! Validation filter: rejects structurally invalid invocations before any
//! network work happens.

use async_trait::async_trait;
use shunt_core::{Invocation, Invoker, Reply, RpcError};

use super::Filter;

/// Opt-in structural checks. A rejection is a pre-logic failure: inner
/// filters and the terminal invoker are never entered.
pub struct ValidationFilter;

#[async_trait]
impl Filter for ValidationFilter {
    fn name(&self) -> &'static str {
        "validation"
    }

    async fn invoke(&self, next: &dyn Invoker, invocation: Invocation) -> Result<Reply, RpcError> {
        if invocation.method().is_empty() {
            return Err(RpcError::serialization("method name must not be empty"));
        }
        if !invocation.parameter_types().is_empty()
            && invocation.parameter_types().len() != invocation.arguments().len()
        {
            return Err(RpcError::serialization(format!(
                "{} parameter types declared but {} arguments supplied",
                invocation.parameter_types().len(),
                invocation.arguments().len()
            )));
        }
        next.invoke(invocation).await
    }
}
