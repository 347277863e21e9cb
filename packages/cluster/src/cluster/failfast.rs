//! Failfast cluster invoker: one attempt, errors propagate immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shunt_core::{Invocation, Reply, RpcError};
use tokio::time::timeout;

use super::directory::Directory;
use super::invoker::{ClusterInvoker, SelectionCore};
use super::loadbalance::LoadBalanceRegistry;
use crate::config::ConsumerConfig;

/// Single-shot policy for non-idempotent operations: no failover, no retry.
pub struct FailfastClusterInvoker {
    directory: Arc<dyn Directory>,
    core: SelectionCore,
    loadbalances: Arc<LoadBalanceRegistry>,
    destroyed: AtomicBool,
}

impl FailfastClusterInvoker {
    #[must_use]
    pub fn new(directory: Arc<dyn Directory>, loadbalances: Arc<LoadBalanceRegistry>) -> Self {
        let config = ConsumerConfig::from_url(directory.consumer_url());
        Self::with_config(directory, loadbalances, config)
    }

    #[must_use]
    pub fn with_config(
        directory: Arc<dyn Directory>,
        loadbalances: Arc<LoadBalanceRegistry>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            directory,
            core: SelectionCore::new(config),
            loadbalances,
            destroyed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ClusterInvoker for FailfastClusterInvoker {
    fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RpcError::no_endpoint(
                self.directory.service_key(),
                "cluster invoker is destroyed",
            ));
        }

        let config = self.core.config();
        let candidates = self.directory.list(&invocation)?;
        if candidates.is_empty() {
            return Err(RpcError::no_endpoint(
                self.directory.service_key(),
                "no provider after routing",
            ));
        }

        let loadbalance = self.loadbalances.get_or_default(&config.loadbalance);
        let invoker = self
            .core
            .select(
                loadbalance.as_ref(),
                self.directory.consumer_url(),
                &invocation,
                &candidates,
                &[],
            )
            .ok_or_else(|| {
                RpcError::no_endpoint(self.directory.service_key(), "no selectable endpoint")
            })?;

        let budget = Duration::from_millis(config.timeout_ms);
        match timeout(budget, invoker.invoke(invocation)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RpcError::Timeout {
                budget_ms: config.timeout_ms,
                attempts: Vec::new(),
            }),
        }
    }

    fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.directory.destroy();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use shunt_core::{EndpointUrl, Invoker, InvokerRef};

    use super::super::directory::StaticDirectory;
    use super::*;

    struct FlakyEndpoint {
        url: EndpointUrl,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Invoker for FlakyEndpoint {
        fn url(&self) -> &EndpointUrl {
            &self.url
        }

        async fn invoke(&self, _invocation: Invocation) -> Result<Reply, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RpcError::network("connection refused"))
        }
    }

    #[tokio::test]
    async fn a_failure_is_not_retried() {
        let endpoint = Arc::new(FlakyEndpoint {
            url: EndpointUrl::new("shunt", "h1", 20880),
            calls: AtomicUsize::new(0),
        });
        let spare = Arc::new(FlakyEndpoint {
            url: EndpointUrl::new("shunt", "h2", 20880),
            calls: AtomicUsize::new(0),
        });
        let directory = Arc::new(StaticDirectory::new(
            "demo.Echo",
            EndpointUrl::new("shunt", "consumer", 0),
            vec![endpoint.clone() as InvokerRef, spare.clone() as InvokerRef],
        ));
        let invoker = FailfastClusterInvoker::new(
            directory,
            Arc::new(LoadBalanceRegistry::with_defaults()),
        );

        let err = invoker
            .invoke(Invocation::new("demo.Echo", "say"))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Network { .. }));
        // Exactly one attempt across both endpoints.
        assert_eq!(
            endpoint.calls.load(Ordering::SeqCst) + spare.calls.load(Ordering::SeqCst),
            1
        );
    }
}
