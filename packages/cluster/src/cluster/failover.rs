//! Failover cluster invoker: retry against remaining endpoints on failure.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shunt_core::{
    AttemptFailure, EndpointUrl, ErrorCode, Invocation, Invoker, InvokerRef, Reply, RpcError,
};
use tokio::time::Instant;
use tracing::warn;

use super::directory::Directory;
use super::invoker::{ClusterInvoker, SelectionCore};
use super::loadbalance::LoadBalanceRegistry;
use crate::config::ConsumerConfig;

// ---------------------------------------------------------------------------
// FailoverClusterInvoker
// ---------------------------------------------------------------------------

/// Retries failed calls against endpoints not yet tried in this call.
///
/// The per-call time budget is fixed before the first attempt; every retry
/// checks the remaining budget first and each attempt runs under a timeout
/// of what is left. Business-class errors never retry. Exhaustion surfaces
/// one aggregated error listing every attempted endpoint and its cause.
pub struct FailoverClusterInvoker {
    directory: Arc<dyn Directory>,
    core: SelectionCore,
    loadbalances: Arc<LoadBalanceRegistry>,
    destroyed: AtomicBool,
}

impl FailoverClusterInvoker {
    /// Configuration is read from the directory's consumer URL.
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

    fn check_destroyed(&self) -> Result<(), RpcError> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(RpcError::no_endpoint(
                self.directory.service_key(),
                "cluster invoker is destroyed",
            ));
        }
        Ok(())
    }

    async fn do_invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        let config = self.core.config().clone();
        let service = self.directory.service_key().to_string();
        let budget = Duration::from_millis(config.timeout_ms);
        let deadline = Instant::now() + budget;

        let loadbalance = self.loadbalances.get_or_default(&config.loadbalance);
        let consumer_url = self.directory.consumer_url().clone();

        let mut candidates = self.directory.list(&invocation)?;
        if candidates.is_empty() {
            return Err(RpcError::no_endpoint(&service, "no provider after routing"));
        }

        let mut excluded: Vec<InvokerRef> = Vec::new();
        let mut failures: Vec<AttemptFailure> = Vec::new();

        for attempt in 0..=config.retries {
            if attempt > 0 {
                self.check_destroyed()?;
                // Re-list so a retry picks up topology changes that landed
                // since the call started.
                candidates = self.directory.list(&invocation)?;
                if candidates.is_empty() {
                    break;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(RpcError::Timeout {
                    budget_ms: config.timeout_ms,
                    attempts: failures,
                });
            }

            let Some(invoker) = self.core.select(
                loadbalance.as_ref(),
                &consumer_url,
                &invocation,
                &candidates,
                &excluded,
            ) else {
                break;
            };
            excluded.push(Arc::clone(&invoker));

            let address = invoker.url().address();
            let remaining = deadline - now;
            match tokio::time::timeout(remaining, invoker.invoke(invocation.clone())).await {
                Ok(Ok(reply)) => {
                    if attempt > 0 {
                        warn!(
                            service = service.as_str(),
                            method = invocation.method(),
                            attempt,
                            address = address.as_str(),
                            prior_failures = failures.len(),
                            "call succeeded after failover"
                        );
                    }
                    return Ok(reply);
                }
                Ok(Err(error)) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    warn!(
                        service = service.as_str(),
                        method = invocation.method(),
                        attempt,
                        address = address.as_str(),
                        error = %error,
                        "attempt failed, failing over"
                    );
                    failures.push(AttemptFailure {
                        address,
                        code: error.code(),
                        message: error.to_string(),
                    });
                }
                Err(_elapsed) => {
                    failures.push(AttemptFailure {
                        address,
                        code: ErrorCode::Timeout,
                        message: format!("attempt exceeded the remaining {}ms budget", remaining.as_millis()),
                    });
                }
            }
        }

        let attempts_made = failures.len();
        Err(RpcError::NoEndpointAvailable {
            service,
            reason: format!(
                "failed after {attempts_made} attempt(s) with retries={}",
                config.retries
            ),
            attempts: failures,
        })
    }
}

#[async_trait]
impl ClusterInvoker for FailoverClusterInvoker {
    fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        self.check_destroyed()?;
        self.do_invoke(invocation).await
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

/// Cluster invokers are themselves invokers, so a filter chain can wrap the
/// whole cluster the same way it wraps a single endpoint.
#[async_trait]
impl Invoker for FailoverClusterInvoker {
    fn url(&self) -> &EndpointUrl {
        self.directory.consumer_url()
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.directory.is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        ClusterInvoker::invoke(self, invocation).await
    }

    fn destroy(&self) {
        ClusterInvoker::destroy(self);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::super::directory::StaticDirectory;
    use super::*;

    /// Endpoint with a scripted outcome and a call counter.
    struct ScriptedEndpoint {
        url: EndpointUrl,
        outcome: Outcome,
        calls: AtomicUsize,
    }

    enum Outcome {
        Ok,
        NetworkError,
        BizError,
        Hang(Duration),
    }

    impl ScriptedEndpoint {
        fn new(host: &str, outcome: Outcome) -> Arc<Self> {
            Arc::new(Self {
                url: EndpointUrl::new("shunt", host, 20880),
                outcome,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Invoker for ScriptedEndpoint {
        fn url(&self) -> &EndpointUrl {
            &self.url
        }

        async fn invoke(&self, _invocation: Invocation) -> Result<Reply, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.outcome {
                Outcome::Ok => Ok(Reply::empty()),
                Outcome::NetworkError => Err(RpcError::network("connection refused")),
                Outcome::BizError => Err(RpcError::biz("order already exists")),
                Outcome::Hang(duration) => {
                    tokio::time::sleep(*duration).await;
                    Ok(Reply::empty())
                }
            }
        }
    }

    fn invoker_over(
        endpoints: Vec<Arc<ScriptedEndpoint>>,
        config: ConsumerConfig,
    ) -> FailoverClusterInvoker {
        let directory = Arc::new(StaticDirectory::new(
            "demo.Echo",
            EndpointUrl::new("shunt", "consumer", 0),
            endpoints.into_iter().map(|e| e as InvokerRef).collect(),
        ));
        FailoverClusterInvoker::with_config(
            directory,
            Arc::new(LoadBalanceRegistry::with_defaults()),
            config,
        )
    }

    fn invocation() -> Invocation {
        Invocation::new("demo.Echo", "say")
    }

    #[tokio::test]
    async fn fails_over_to_a_healthy_endpoint() {
        let bad = ScriptedEndpoint::new("bad", Outcome::NetworkError);
        let good = ScriptedEndpoint::new("good", Outcome::Ok);
        let invoker = invoker_over(
            vec![bad.clone(), good.clone()],
            ConsumerConfig {
                retries: 2,
                ..ConsumerConfig::default()
            },
        );

        let reply = ClusterInvoker::invoke(&invoker, invocation()).await;
        assert!(reply.is_ok());
        // The failed endpoint was tried at most once; the healthy one
        // finished the call.
        assert!(bad.calls.load(Ordering::SeqCst) <= 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failed_endpoint_is_never_retried_within_one_call() {
        let always_fails = ScriptedEndpoint::new("flaky", Outcome::NetworkError);
        let also_fails = ScriptedEndpoint::new("flaky2", Outcome::NetworkError);
        let third = ScriptedEndpoint::new("flaky3", Outcome::NetworkError);
        let invoker = invoker_over(
            vec![always_fails.clone(), also_fails.clone(), third.clone()],
            ConsumerConfig {
                retries: 2,
                ..ConsumerConfig::default()
            },
        );

        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        assert!(matches!(err, RpcError::NoEndpointAvailable { .. }));
        for endpoint in [&always_fails, &also_fails, &third] {
            assert!(endpoint.calls.load(Ordering::SeqCst) <= 1);
        }
    }

    #[tokio::test]
    async fn business_errors_are_never_retried() {
        let biz = ScriptedEndpoint::new("biz", Outcome::BizError);
        let never_reached = ScriptedEndpoint::new("spare", Outcome::Ok);
        let invoker = invoker_over(
            vec![biz.clone(), never_reached.clone()],
            ConsumerConfig {
                retries: 5,
                // Round-robin's first tick deterministically picks the first
                // endpoint in backing order: the business-failing one.
                loadbalance: "roundrobin".to_string(),
                ..ConsumerConfig::default()
            },
        );

        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        assert!(matches!(err, RpcError::Biz { .. }));
        // Exactly one attempt total: the spare endpoint was never consulted.
        assert_eq!(biz.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never_reached.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_lists_every_attempted_endpoint() {
        let first = ScriptedEndpoint::new("h1", Outcome::NetworkError);
        let second = ScriptedEndpoint::new("h2", Outcome::NetworkError);
        let invoker = invoker_over(
            vec![first, second],
            ConsumerConfig {
                retries: 4,
                ..ConsumerConfig::default()
            },
        );

        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        match err {
            RpcError::NoEndpointAvailable { attempts, .. } => {
                let mut addresses: Vec<&str> =
                    attempts.iter().map(|a| a.address.as_str()).collect();
                addresses.sort_unstable();
                assert_eq!(addresses, ["h1:20880", "h2:20880"]);
                assert!(attempts.iter().all(|a| a.code == ErrorCode::Network));
            }
            other => panic!("expected NoEndpointAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn exhausted_budget_stops_further_attempts() {
        let slow = ScriptedEndpoint::new("slow", Outcome::Hang(Duration::from_millis(200)));
        let spare = ScriptedEndpoint::new("spare", Outcome::Hang(Duration::from_millis(200)));
        let invoker = invoker_over(
            vec![slow.clone(), spare.clone()],
            ConsumerConfig {
                retries: 5,
                timeout_ms: 60,
                ..ConsumerConfig::default()
            },
        );

        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        match err {
            RpcError::Timeout { budget_ms, attempts } => {
                assert_eq!(budget_ms, 60);
                assert_eq!(attempts.len(), 1);
                assert_eq!(attempts[0].code, ErrorCode::Timeout);
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        // Only one endpoint was attempted before the budget ran out.
        assert_eq!(
            slow.calls.load(Ordering::SeqCst) + spare.calls.load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn empty_directory_fails_with_no_endpoint() {
        let invoker = invoker_over(Vec::new(), ConsumerConfig::default());
        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        assert!(matches!(err, RpcError::NoEndpointAvailable { .. }));
    }

    #[tokio::test]
    async fn destroyed_invoker_rejects_calls() {
        let good = ScriptedEndpoint::new("good", Outcome::Ok);
        let invoker = invoker_over(vec![good], ConsumerConfig::default());
        ClusterInvoker::destroy(&invoker);
        let err = ClusterInvoker::invoke(&invoker, invocation()).await.unwrap_err();
        assert!(matches!(err, RpcError::NoEndpointAvailable { .. }));
    }
}
