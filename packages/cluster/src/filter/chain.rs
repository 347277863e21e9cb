//! Filter chain construction: nested wrappers around a terminal invoker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use shunt_core::{EndpointUrl, Invocation, Invoker, InvokerRef, Reply, RpcError};
use tracing::warn;

use super::{Filter, FilterRegistry, FilterRole};

// ---------------------------------------------------------------------------
// FilterChainNode
// ---------------------------------------------------------------------------

/// One link: a filter wrapping the rest of the chain.
///
/// The completion hooks fire here, after the inner future resolves — i.e. on
/// the completion continuation. Hooks ascend in LIFO order because each node
/// fires its own filter's hook as the result passes back through it. A node
/// whose `invoke` was never entered (an outer filter failed fast) never
/// fires its hooks.
struct FilterChainNode {
    filter: Arc<dyn Filter>,
    next: InvokerRef,
}

#[async_trait]
impl Invoker for FilterChainNode {
    fn url(&self) -> &EndpointUrl {
        self.next.url()
    }

    fn is_available(&self) -> bool {
        self.next.is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        match self.filter.invoke(&*self.next, invocation.clone()).await {
            Ok(mut reply) => {
                if let Err(hook_error) = self.filter.on_response(&mut reply, &invocation) {
                    warn!(
                        filter = self.filter.name(),
                        error = %hook_error,
                        "on_response hook failed, ignoring"
                    );
                }
                Ok(reply)
            }
            Err(error) => {
                if let Err(hook_error) = self.filter.on_error(&error, &invocation) {
                    warn!(
                        filter = self.filter.name(),
                        error = %hook_error,
                        "on_error hook failed, ignoring"
                    );
                }
                Err(error)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// FilterChainInvoker
// ---------------------------------------------------------------------------

/// Teardown callback released when the chain is destroyed (e.g. an
/// export/unexport notification subscription).
pub type Subscription = Box<dyn FnOnce() + Send>;

/// The built chain: entry invoker plus the teardown surface.
pub struct FilterChainInvoker {
    entry: InvokerRef,
    filters: Vec<Arc<dyn Filter>>,
    terminal: InvokerRef,
    subscriptions: Mutex<Vec<Subscription>>,
    destroyed: AtomicBool,
}

impl FilterChainInvoker {
    /// Registers a teardown callback to run on `destroy()`.
    pub fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions.lock().push(subscription);
    }

    /// Filter instances in chain order (outermost first).
    #[must_use]
    pub fn filters(&self) -> &[Arc<dyn Filter>] {
        &self.filters
    }
}

#[async_trait]
impl Invoker for FilterChainInvoker {
    fn url(&self) -> &EndpointUrl {
        self.terminal.url()
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire) && self.terminal.is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError> {
        self.entry.invoke(invocation).await
    }

    fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        for subscription in self.subscriptions.lock().drain(..) {
            subscription();
        }
        for filter in &self.filters {
            filter.destroy();
        }
        self.terminal.destroy();
    }
}

// ---------------------------------------------------------------------------
// FilterChainBuilder
// ---------------------------------------------------------------------------

/// Builds and caches filter chains per service reference.
///
/// A chain is resolved once per (service, filter key, role) and shared by
/// every call to that reference; it is rebuilt only after
/// `on_filter_config_changed` invalidates the cached entry.
pub struct FilterChainBuilder {
    registry: Arc<FilterRegistry>,
    cache: DashMap<String, Arc<FilterChainInvoker>>,
}

impl FilterChainBuilder {
    #[must_use]
    pub fn new(registry: Arc<FilterRegistry>) -> Self {
        Self {
            registry,
            cache: DashMap::new(),
        }
    }

    /// Wraps `invoker` in the filter chain resolved from its URL.
    ///
    /// # Errors
    ///
    /// Configuration errors from filter resolution (unknown name, role
    /// mismatch).
    pub fn build_chain(
        &self,
        invoker: InvokerRef,
        filter_key: &str,
        side: FilterRole,
    ) -> anyhow::Result<Arc<FilterChainInvoker>> {
        let filters = self.registry.resolve(invoker.url(), filter_key, side)?;

        let mut entry = Arc::clone(&invoker);
        for filter in filters.iter().rev() {
            entry = Arc::new(FilterChainNode {
                filter: Arc::clone(filter),
                next: entry,
            });
        }

        Ok(Arc::new(FilterChainInvoker {
            entry,
            filters,
            terminal: invoker,
            subscriptions: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        }))
    }

    /// Cached variant keyed by the service identity.
    ///
    /// # Errors
    ///
    /// Same as `build_chain`.
    pub fn build_chain_cached(
        &self,
        service_key: &str,
        invoker: InvokerRef,
        filter_key: &str,
        side: FilterRole,
    ) -> anyhow::Result<Arc<FilterChainInvoker>> {
        let cache_key = format!("{service_key}|{filter_key}|{side:?}");
        if let Some(chain) = self.cache.get(&cache_key) {
            return Ok(Arc::clone(&chain));
        }
        let chain = self.build_chain(invoker, filter_key, side)?;
        self.cache.insert(cache_key, Arc::clone(&chain));
        Ok(chain)
    }

    /// Drops cached chains for a service after its filter configuration
    /// changed; the next build re-resolves.
    pub fn on_filter_config_changed(&self, service_key: &str) {
        let prefix = format!("{service_key}|");
        self.cache.retain(|key, _| !key.starts_with(&prefix));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
