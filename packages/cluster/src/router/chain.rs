//! Router chain: priority-ordered composition of routers.

use std::sync::Arc;

use shunt_core::invocation::keys;
use shunt_core::{EndpointUrl, Invocation, InvokerRef, RpcError};
use tracing::debug;

use super::{Router, RouterDecision, RouteTrace};
use crate::bitlist::BitList;

/// Audit stage that always observes the completed routing pass, including
/// short-circuited and denied ones.
pub trait RouteObserver: Send + Sync {
    fn on_route_complete(&self, service: &str, trace: &RouteTrace, eligible: usize);
}

// ---------------------------------------------------------------------------
// RouterChain
// ---------------------------------------------------------------------------

/// Applies routers in ascending priority order, narrowing the endpoint set
/// from "all known" to "eligible for this call".
///
/// An empty intermediate set short-circuits the remaining routers; a denial
/// stops the chain and surfaces as `RpcError::Forbidden`. In both cases the
/// observer still runs.
pub struct RouterChain {
    routers: Vec<Arc<dyn Router>>,
    observer: Option<Arc<dyn RouteObserver>>,
}

impl RouterChain {
    /// Builds a chain, sorting by priority. The sort is stable: equal
    /// priorities keep their registration order.
    #[must_use]
    pub fn new(mut routers: Vec<Arc<dyn Router>>) -> Self {
        routers.sort_by_key(|router| router.priority());
        Self {
            routers,
            observer: None,
        }
    }

    /// Attaches the mandatory audit stage.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RouteObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The composed routers in application order.
    #[must_use]
    pub fn routers(&self) -> &[Arc<dyn Router>] {
        &self.routers
    }

    /// Narrows the full set to the endpoints eligible for this call.
    ///
    /// # Errors
    ///
    /// `RpcError::Forbidden` when a router denies the call outright.
    pub fn route(
        &self,
        set: BitList<InvokerRef>,
        url: &EndpointUrl,
        invocation: &Invocation,
    ) -> Result<BitList<InvokerRef>, RpcError> {
        let trace_requested = invocation.attachment_bool(keys::TRACE_ROUTE, false);
        let mut trace = RouteTrace::new();

        let mut current = set;
        let mut denial: Option<String> = None;
        for router in &self.routers {
            if current.is_empty() {
                break;
            }
            match router.route(current.clone(), url, invocation, Some(&mut trace)) {
                RouterDecision::Narrowed(narrowed) => current = narrowed,
                RouterDecision::Denied { reason } => {
                    denial = Some(reason);
                    break;
                }
            }
        }

        if trace_requested {
            debug!(
                service = invocation.service(),
                method = invocation.method(),
                trace = trace.summary().as_str(),
                "route trace"
            );
        }
        let eligible = if denial.is_some() { 0 } else { current.len() };
        if let Some(observer) = &self.observer {
            observer.on_route_complete(invocation.service(), &trace, eligible);
        }

        match denial {
            Some(reason) => Err(RpcError::forbidden(reason)),
            None => Ok(current),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use shunt_core::{Invoker, Reply};

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

    fn sample_set(n: u16) -> BitList<InvokerRef> {
        BitList::from_vec(
            (0..n)
                .map(|i| {
                    Arc::new(StaticEndpoint {
                        url: EndpointUrl::new("shunt", &format!("h{i}"), 20880),
                    }) as InvokerRef
                })
                .collect(),
        )
    }

    /// Router that keeps the first `keep` endpoints and records its call order.
    struct TruncatingRouter {
        name: &'static str,
        priority: i32,
        keep: usize,
        call_log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Router for TruncatingRouter {
        fn name(&self) -> &'static str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn route(
            &self,
            set: BitList<InvokerRef>,
            _url: &EndpointUrl,
            _invocation: &Invocation,
            trace: Option<&mut RouteTrace>,
        ) -> RouterDecision {
            self.call_log.lock().push(self.name);
            let input = set.len();
            let mut kept = 0;
            let narrowed = set.narrow(|_| {
                kept += 1;
                kept <= self.keep
            });
            if let Some(trace) = trace {
                trace.record(self.name, input, narrowed.len(), None);
            }
            RouterDecision::Narrowed(narrowed)
        }
    }

    struct DenyingRouter;

    impl Router for DenyingRouter {
        fn name(&self) -> &'static str {
            "deny"
        }

        fn priority(&self) -> i32 {
            50
        }

        fn route(
            &self,
            _set: BitList<InvokerRef>,
            _url: &EndpointUrl,
            _invocation: &Invocation,
            _trace: Option<&mut RouteTrace>,
        ) -> RouterDecision {
            RouterDecision::Denied {
                reason: "policy says no".to_string(),
            }
        }
    }

    struct CountingObserver {
        calls: AtomicUsize,
    }

    impl RouteObserver for CountingObserver {
        fn on_route_complete(&self, _service: &str, _trace: &RouteTrace, _eligible: usize) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn invocation() -> Invocation {
        Invocation::new("demo.Echo", "say")
    }

    #[test]
    fn applies_routers_in_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = RouterChain::new(vec![
            Arc::new(TruncatingRouter {
                name: "second",
                priority: 20,
                keep: 2,
                call_log: log.clone(),
            }),
            Arc::new(TruncatingRouter {
                name: "first",
                priority: 10,
                keep: 3,
                call_log: log.clone(),
            }),
        ]);

        let url = EndpointUrl::new("shunt", "consumer", 0);
        let result = chain.route(sample_set(5), &url, &invocation()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(*log.lock(), vec!["first", "second"]);
    }

    #[test]
    fn empty_set_short_circuits_remaining_routers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
        });
        let chain = RouterChain::new(vec![
            Arc::new(TruncatingRouter {
                name: "empties",
                priority: 1,
                keep: 0,
                call_log: log.clone(),
            }),
            Arc::new(TruncatingRouter {
                name: "never-runs",
                priority: 2,
                keep: 5,
                call_log: log.clone(),
            }),
        ])
        .with_observer(observer.clone());

        let url = EndpointUrl::new("shunt", "consumer", 0);
        let result = chain.route(sample_set(4), &url, &invocation()).unwrap();
        assert!(result.is_empty());
        assert_eq!(*log.lock(), vec!["empties"]);
        // The audit stage still ran.
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denial_surfaces_as_forbidden_and_still_notifies_observer() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let observer = Arc::new(CountingObserver {
            calls: AtomicUsize::new(0),
        });
        let chain = RouterChain::new(vec![
            Arc::new(DenyingRouter) as Arc<dyn Router>,
            Arc::new(TruncatingRouter {
                name: "after-deny",
                priority: 99,
                keep: 5,
                call_log: log.clone(),
            }),
        ])
        .with_observer(observer.clone());

        let url = EndpointUrl::new("shunt", "consumer", 0);
        let err = chain.route(sample_set(4), &url, &invocation()).unwrap_err();
        assert!(matches!(err, RpcError::Forbidden { .. }));
        assert!(log.lock().is_empty());
        assert_eq!(observer.calls.load(Ordering::SeqCst), 1);
    }
}
