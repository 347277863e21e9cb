//! The callable-endpoint contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RpcError;
use crate::invocation::Invocation;
use crate::reply::Reply;
use crate::url::EndpointUrl;

/// One concrete network-reachable service instance.
///
/// Created when a directory resolves a provider URL, destroyed when the
/// provider deregisters or the consumer shuts down. Routers and cluster
/// invokers hold `Arc<dyn Invoker>` references only for the duration of a
/// single call's routing decision.
#[async_trait]
pub trait Invoker: Send + Sync {
    /// The endpoint's address URL, including its routing parameters.
    fn url(&self) -> &EndpointUrl;

    /// Connection-health availability. Unavailable endpoints are skipped by
    /// selection when the availability check is enabled.
    fn is_available(&self) -> bool {
        true
    }

    /// Executes the invocation against this endpoint.
    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError>;

    /// Releases any resources held by this endpoint handle. Idempotent.
    fn destroy(&self) {}
}

/// Shared endpoint handle, the unit routers and cluster invokers pass around.
pub type InvokerRef = Arc<dyn Invoker>;
