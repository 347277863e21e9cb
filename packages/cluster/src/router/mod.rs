//! Routing: stages that narrow the eligible endpoint set per call.
//!
//! Routers are pure functions of (endpoint set, consumer URL, invocation,
//! current rule). Rules are swapped atomically behind `ArcSwapOption`, so a
//! route pass loads its rule exactly once and can never observe a torn
//! update.

pub mod chain;
pub mod mesh;
pub mod rule;
pub mod tag;
pub mod tag_state;

use std::sync::Arc;

use dashmap::DashMap;
use shunt_core::{EndpointUrl, Invocation, InvokerRef};

use crate::bitlist::BitList;

pub use chain::{RouteObserver, RouterChain};
pub use mesh::{MeshRouter, MeshRule};
pub use rule::{RuleParseError, TagRule};
pub use tag::TagRouter;
pub use tag_state::TagStateRouter;

// ---------------------------------------------------------------------------
// Router contract
// ---------------------------------------------------------------------------

/// Outcome of one router stage.
#[derive(Debug)]
pub enum RouterDecision {
    /// The narrowed (possibly unchanged, possibly empty) endpoint set.
    Narrowed(BitList<InvokerRef>),
    /// A routing rule denied the call outright. Distinct from an empty
    /// narrowed set: denial surfaces as a policy error, not topology failure.
    Denied { reason: String },
}

/// A polymorphic filter stage over the endpoint set.
///
/// `route` must not mutate the input set's backing list; all narrowing is
/// bitmap-local. Implementations read their rule state through one atomic
/// load per call.
pub trait Router: Send + Sync {
    fn name(&self) -> &'static str;

    /// Chain position; lower priorities run first. Ties keep registration
    /// order.
    fn priority(&self) -> i32;

    fn route(
        &self,
        set: BitList<InvokerRef>,
        url: &EndpointUrl,
        invocation: &Invocation,
        trace: Option<&mut RouteTrace>,
    ) -> RouterDecision;
}

// ---------------------------------------------------------------------------
// RouteTrace
// ---------------------------------------------------------------------------

/// Per-stage report of one routing pass, collected when the call asks for it.
#[derive(Debug, Clone)]
pub struct TraceStage {
    pub router: &'static str,
    pub input: usize,
    pub output: usize,
    pub message: Option<String>,
}

/// Accumulates stage reports for diagnostics and the audit observer.
#[derive(Debug, Clone, Default)]
pub struct RouteTrace {
    stages: Vec<TraceStage>,
}

impl RouteTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        router: &'static str,
        input: usize,
        output: usize,
        message: Option<String>,
    ) {
        self.stages.push(TraceStage {
            router,
            input,
            output,
            message,
        });
    }

    #[must_use]
    pub fn stages(&self) -> &[TraceStage] {
        &self.stages
    }

    /// One-line rendering in stage order, for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        self.stages
            .iter()
            .map(|s| {
                let note = s
                    .message
                    .as_ref()
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default();
                format!("[{} {} -> {}{note}]", s.router, s.input, s.output)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ---------------------------------------------------------------------------
// RouterRegistry
// ---------------------------------------------------------------------------

/// Factory producing a router for one consumer reference.
pub type RouterFactory = Arc<dyn Fn(&EndpointUrl) -> Arc<dyn Router> + Send + Sync>;

/// Explicit name-to-factory table, built once at process init and passed to
/// the components that assemble router chains.
pub struct RouterRegistry {
    factories: DashMap<&'static str, RouterFactory>,
}

impl RouterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: DashMap::new(),
        }
    }

    /// A registry seeded with the built-in router factories.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("tag", Arc::new(|_url| Arc::new(TagRouter::new())));
        registry.register("tag-state", Arc::new(|_url| Arc::new(TagStateRouter::new())));
        registry.register("mesh", Arc::new(|_url| Arc::new(MeshRouter::new())));
        registry
    }

    pub fn register(&self, name: &'static str, factory: RouterFactory) {
        self.factories.insert(name, factory);
    }

    /// Instantiates the named router for the given consumer URL.
    pub fn create(&self, name: &str, url: &EndpointUrl) -> Option<Arc<dyn Router>> {
        self.factories.get(name).map(|factory| factory(url))
    }
}

impl Default for RouterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
