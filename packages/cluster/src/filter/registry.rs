//! Explicit filter registration table and URL-driven resolution.
//!
//! Replaces service-loader-style ambient lookup: the table is built once at
//! process init and handed to every `FilterChainBuilder` that needs it.

use std::sync::Arc;

use anyhow::bail;
use shunt_core::EndpointUrl;

use super::{Filter, FilterRole};

/// Token in a filter-list URL parameter that splices in the activated
/// defaults at that position.
const DEFAULT_TOKEN: &str = "default";

pub type FilterFactory = Arc<dyn Fn() -> Arc<dyn Filter> + Send + Sync>;

// ---------------------------------------------------------------------------
// FilterEntry
// ---------------------------------------------------------------------------

/// One registered filter: its factory plus activation metadata.
pub struct FilterEntry {
    pub name: &'static str,
    pub role: FilterRole,
    /// Explicit chain position; lower runs first (outermost). Entries
    /// sharing an order keep their registration order.
    pub order: i32,
    /// Whether the filter joins every chain of a matching role without being
    /// named explicitly.
    pub default_activated: bool,
    factory: FilterFactory,
}

impl FilterEntry {
    pub fn new(
        name: &'static str,
        role: FilterRole,
        order: i32,
        default_activated: bool,
        factory: FilterFactory,
    ) -> Self {
        Self {
            name,
            role,
            order,
            default_activated,
            factory,
        }
    }

    fn instantiate(&self) -> Arc<dyn Filter> {
        (self.factory)()
    }
}

// ---------------------------------------------------------------------------
// FilterRegistry
// ---------------------------------------------------------------------------

/// Ordered registration table. Registration order is the declaration order
/// used for default-ordered ties.
pub struct FilterRegistry {
    entries: parking_lot::RwLock<Vec<Arc<FilterEntry>>>,
}

impl FilterRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: parking_lot::RwLock::new(Vec::new()),
        }
    }

    /// A registry seeded with the built-in consumer filters.
    #[must_use]
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(FilterEntry::new(
            "context",
            FilterRole::Consumer,
            -100,
            true,
            Arc::new(|| Arc::new(super::ConsumerContextFilter)),
        ));
        registry.register(FilterEntry::new(
            "trace",
            FilterRole::Both,
            -50,
            true,
            Arc::new(|| Arc::new(super::TraceFilter)),
        ));
        registry.register(FilterEntry::new(
            "metrics",
            FilterRole::Both,
            -10,
            true,
            Arc::new(|| Arc::new(super::MetricsFilter::with_runtime_collector())),
        ));
        registry.register(FilterEntry::new(
            "validation",
            FilterRole::Both,
            0,
            false,
            Arc::new(|| Arc::new(super::ValidationFilter)),
        ));
        registry
    }

    pub fn register(&self, entry: FilterEntry) {
        self.entries.write().push(Arc::new(entry));
    }

    fn entry(&self, name: &str) -> Option<Arc<FilterEntry>> {
        self.entries
            .read()
            .iter()
            .find(|e| e.name == name)
            .cloned()
    }

    fn activated_defaults(&self, side: FilterRole) -> Vec<Arc<FilterEntry>> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.default_activated && e.role.matches(side))
            .cloned()
            .collect()
    }

    /// Resolves the ordered filter list for one service reference.
    ///
    /// The URL parameter named by `filter_key` holds a comma-separated list:
    /// explicit filter names, the `default` token splicing in the activated
    /// defaults, and `-name` entries excluding a filter. With no parameter,
    /// the activated defaults apply. Explicit-order entries sort ascending;
    /// ties keep list position (stable sort).
    ///
    /// # Errors
    ///
    /// An unknown filter name or a role mismatch is a configuration error.
    pub fn resolve(
        &self,
        url: &EndpointUrl,
        filter_key: &str,
        side: FilterRole,
    ) -> anyhow::Result<Vec<Arc<dyn Filter>>> {
        let mut names: Vec<String> = Vec::new();
        let mut excluded: Vec<String> = Vec::new();
        let defaults = self.activated_defaults(side);

        let param = url.param(filter_key).unwrap_or(DEFAULT_TOKEN).to_string();
        for token in param.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(name) = token.strip_prefix('-') {
                excluded.push(name.to_string());
            } else if token == DEFAULT_TOKEN {
                for entry in &defaults {
                    if !names.iter().any(|n| n == entry.name) {
                        names.push(entry.name.to_string());
                    }
                }
            } else if !names.iter().any(|n| n == token) {
                names.push(token.to_string());
            }
        }
        names.retain(|name| !excluded.contains(name));

        let mut selected: Vec<Arc<FilterEntry>> = Vec::with_capacity(names.len());
        for name in &names {
            let Some(entry) = self.entry(name) else {
                bail!("unknown filter `{name}` in `{filter_key}`");
            };
            if !entry.role.matches(side) {
                bail!("filter `{name}` does not apply to {side:?} chains");
            }
            selected.push(entry);
        }
        selected.sort_by_key(|entry| entry.order);

        Ok(selected.iter().map(|entry| entry.instantiate()).collect())
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
