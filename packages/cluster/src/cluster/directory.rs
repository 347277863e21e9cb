//! Directories: the authoritative live endpoint list for a logical service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use shunt_core::{EndpointUrl, Invocation, InvokerRef, RpcError};
use tracing::info;

use crate::bitlist::BitList;
use crate::router::RouterChain;

// ---------------------------------------------------------------------------
// Directory trait
// ---------------------------------------------------------------------------

/// Maintains the live endpoint list and answers per-call eligibility.
///
/// `snapshot` returns the full known set; `list` additionally runs the
/// routing pass. Both derive from one consistent snapshot taken at call
/// start: a registry update lands atomically and in-flight calls keep the
/// set they started with.
pub trait Directory: Send + Sync {
    /// The logical service this directory resolves.
    fn service_key(&self) -> &str;

    /// The consumer-side URL carrying reference configuration.
    fn consumer_url(&self) -> &EndpointUrl;

    /// The endpoints eligible for this call, after routing.
    ///
    /// # Errors
    ///
    /// `RpcError::Forbidden` when a routing rule denies the call.
    fn list(&self, invocation: &Invocation) -> Result<BitList<InvokerRef>, RpcError>;

    /// The full known endpoint set, unrouted.
    fn snapshot(&self) -> BitList<InvokerRef>;

    /// Whether any endpoint is currently available.
    fn is_available(&self) -> bool {
        self.snapshot().iter().any(|invoker| invoker.is_available())
    }

    /// Releases held endpoints. Idempotent.
    fn destroy(&self);
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// Fixed endpoint list with no routing: point-to-point references and tests.
pub struct StaticDirectory {
    service_key: String,
    consumer_url: EndpointUrl,
    endpoints: Arc<Vec<InvokerRef>>,
    destroyed: AtomicBool,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(service_key: &str, consumer_url: EndpointUrl, endpoints: Vec<InvokerRef>) -> Self {
        Self {
            service_key: service_key.to_string(),
            consumer_url,
            endpoints: Arc::new(endpoints),
            destroyed: AtomicBool::new(false),
        }
    }
}

impl Directory for StaticDirectory {
    fn service_key(&self) -> &str {
        &self.service_key
    }

    fn consumer_url(&self) -> &EndpointUrl {
        &self.consumer_url
    }

    fn list(&self, _invocation: &Invocation) -> Result<BitList<InvokerRef>, RpcError> {
        Ok(self.snapshot())
    }

    fn snapshot(&self) -> BitList<InvokerRef> {
        BitList::full(Arc::clone(&self.endpoints))
    }

    fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            for invoker in self.endpoints.iter() {
                invoker.destroy();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// RoutedDirectory
// ---------------------------------------------------------------------------

/// Registry-fed directory owning the router chain.
///
/// The endpoint list is replaced wholesale on every registry notification
/// (`ArcSwap` store); a routing pass loads the list once and works on that
/// snapshot for the whole call.
pub struct RoutedDirectory {
    service_key: String,
    consumer_url: EndpointUrl,
    endpoints: ArcSwap<Vec<InvokerRef>>,
    chain: RouterChain,
    destroyed: AtomicBool,
}

impl RoutedDirectory {
    #[must_use]
    pub fn new(
        service_key: &str,
        consumer_url: EndpointUrl,
        endpoints: Vec<InvokerRef>,
        chain: RouterChain,
    ) -> Self {
        Self {
            service_key: service_key.to_string(),
            consumer_url,
            endpoints: ArcSwap::from_pointee(endpoints),
            chain,
            destroyed: AtomicBool::new(false),
        }
    }

    /// Registry notification: replaces the endpoint list atomically.
    /// Endpoints no longer present are destroyed.
    pub fn on_endpoints_changed(&self, endpoints: Vec<InvokerRef>) {
        let next = Arc::new(endpoints);
        let previous = self.endpoints.swap(Arc::clone(&next));
        let mut dropped = 0usize;
        for old in previous.iter() {
            if !next.iter().any(|new| Arc::ptr_eq(new, old)) {
                old.destroy();
                dropped += 1;
            }
        }
        info!(
            service = self.service_key.as_str(),
            endpoints = next.len(),
            dropped,
            "endpoint list updated"
        );
    }

    /// The router chain applied by `list`.
    #[must_use]
    pub fn chain(&self) -> &RouterChain {
        &self.chain
    }
}

impl Directory for RoutedDirectory {
    fn service_key(&self) -> &str {
        &self.service_key
    }

    fn consumer_url(&self) -> &EndpointUrl {
        &self.consumer_url
    }

    fn list(&self, invocation: &Invocation) -> Result<BitList<InvokerRef>, RpcError> {
        self.chain
            .route(self.snapshot(), &self.consumer_url, invocation)
    }

    fn snapshot(&self) -> BitList<InvokerRef> {
        BitList::full(self.endpoints.load_full())
    }

    fn destroy(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            let endpoints = self.endpoints.swap(Arc::new(Vec::new()));
            for invoker in endpoints.iter() {
                invoker.destroy();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
