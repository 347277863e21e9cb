//! Load-balance strategies and their registration table.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use shunt_core::{EndpointUrl, Invocation, InvokerRef};

use crate::bitlist::BitList;

// ---------------------------------------------------------------------------
// LoadBalance trait
// ---------------------------------------------------------------------------

/// Picks one endpoint from the routed candidate set.
///
/// Candidates iterate in backing-list order, so position-based strategies
/// break ties deterministically.
pub trait LoadBalance: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(
        &self,
        candidates: &BitList<InvokerRef>,
        url: &EndpointUrl,
        invocation: &Invocation,
    ) -> Option<InvokerRef>;
}

// ---------------------------------------------------------------------------
// RandomLoadBalance
// ---------------------------------------------------------------------------

/// Uniform random selection. The default strategy.
pub struct RandomLoadBalance;

impl LoadBalance for RandomLoadBalance {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(
        &self,
        candidates: &BitList<InvokerRef>,
        _url: &EndpointUrl,
        _invocation: &Invocation,
    ) -> Option<InvokerRef> {
        if candidates.is_empty() {
            return None;
        }
        let position = rand::rng().random_range(0..candidates.len());
        candidates.get(position).cloned()
    }
}

// ---------------------------------------------------------------------------
// RoundRobinLoadBalance
// ---------------------------------------------------------------------------

/// Per-`service.method` rotating cursor.
pub struct RoundRobinLoadBalance {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobinLoadBalance {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cursors: DashMap::new(),
        }
    }
}

impl Default for RoundRobinLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn select(
        &self,
        candidates: &BitList<InvokerRef>,
        _url: &EndpointUrl,
        invocation: &Invocation,
    ) -> Option<InvokerRef> {
        if candidates.is_empty() {
            return None;
        }
        let cursor = self
            .cursors
            .entry(invocation.target_key())
            .or_insert_with(|| AtomicUsize::new(0));
        let tick = cursor.fetch_add(1, Ordering::Relaxed);
        candidates.get(tick % candidates.len()).cloned()
    }
}

// ---------------------------------------------------------------------------
// LoadBalanceRegistry
// ---------------------------------------------------------------------------

/// Explicit name-to-strategy table built at process init.
pub struct LoadBalanceRegistry {
    strategies: DashMap<&'static str, Arc<dyn LoadBalance>>,
}

impl LoadBalanceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategies: DashMap::new(),
        }
    }

    /// A registry seeded with the built-in strategies.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(RandomLoadBalance));
        registry.register(Arc::new(RoundRobinLoadBalance::new()));
        registry
    }

    pub fn register(&self, strategy: Arc<dyn LoadBalance>) {
        self.strategies.insert(strategy.name(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LoadBalance>> {
        self.strategies.get(name).map(|entry| Arc::clone(&entry))
    }

    /// Named strategy, falling back to random for unknown names.
    #[must_use]
    pub fn get_or_default(&self, name: &str) -> Arc<dyn LoadBalance> {
        self.get(name)
            .unwrap_or_else(|| Arc::new(RandomLoadBalance))
    }
}

impl Default for LoadBalanceRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
