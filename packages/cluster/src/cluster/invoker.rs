//! Cluster invoker contract and the shared endpoint-selection core.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shunt_core::invocation::keys;
use shunt_core::{EndpointUrl, Invocation, Invoker, InvokerRef, Reply, RpcError};

use super::directory::Directory;
use super::loadbalance::LoadBalance;
use crate::bitlist::BitList;
use crate::config::ConsumerConfig;

// ---------------------------------------------------------------------------
// ClusterInvoker trait
// ---------------------------------------------------------------------------

/// Fault-tolerance policy over a routed endpoint set: selects endpoints via
/// a load-balance strategy and decides retry-vs-fail on errors.
#[async_trait]
pub trait ClusterInvoker: Send + Sync {
    fn directory(&self) -> &Arc<dyn Directory>;

    fn is_available(&self) -> bool {
        self.directory().is_available()
    }

    async fn invoke(&self, invocation: Invocation) -> Result<Reply, RpcError>;

    /// Tears down the invoker and its directory. Idempotent.
    fn destroy(&self);
}

// ---------------------------------------------------------------------------
// SelectionCore
// ---------------------------------------------------------------------------

fn in_set(set: &BitList<InvokerRef>, target: &InvokerRef) -> bool {
    set.iter().any(|invoker| Arc::ptr_eq(invoker, target))
}

fn is_excluded(excluded: &[InvokerRef], target: &InvokerRef) -> bool {
    excluded.iter().any(|invoker| Arc::ptr_eq(invoker, target))
}

/// Endpoint selection shared by the cluster policies: sticky reuse,
/// availability policy, and load-balance selection with exclusion-aware
/// reselection. Policies compose this rather than inheriting from a base.
pub struct SelectionCore {
    config: ConsumerConfig,
    sticky_invoker: Mutex<Option<InvokerRef>>,
}

impl SelectionCore {
    #[must_use]
    pub fn new(config: ConsumerConfig) -> Self {
        Self {
            config,
            sticky_invoker: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Applies the availability policy to the candidate set.
    ///
    /// Returns `None` when the check empties a non-empty set and the
    /// fallback flag forbids attempting unavailable endpoints.
    fn availability_pool(&self, candidates: &BitList<InvokerRef>) -> Option<BitList<InvokerRef>> {
        if !self.config.availability_check {
            return Some(candidates.clone());
        }
        let available = candidates.clone().narrow(|invoker| invoker.is_available());
        if !available.is_empty() || candidates.is_empty() {
            return Some(available);
        }
        if self.config.fallback_to_unavailable {
            Some(candidates.clone())
        } else {
            None
        }
    }

    /// Selects one endpoint, never one from `excluded`.
    ///
    /// Sticky reuse applies first when enabled (config default, overridable
    /// per call through the `sticky` attachment) and the remembered endpoint
    /// is still eligible. Selection falls back to exclusion-aware
    /// reselection when the strategy picks an already-tried endpoint.
    pub fn select(
        &self,
        loadbalance: &dyn LoadBalance,
        url: &EndpointUrl,
        invocation: &Invocation,
        candidates: &BitList<InvokerRef>,
        excluded: &[InvokerRef],
    ) -> Option<InvokerRef> {
        if candidates.is_empty() {
            return None;
        }

        let sticky_requested = invocation.attachment_bool(keys::STICKY, self.config.sticky);
        {
            let mut slot = self.sticky_invoker.lock();
            // Drop the sticky endpoint once it leaves the eligible set.
            if let Some(current) = slot.as_ref() {
                if !in_set(candidates, current) {
                    *slot = None;
                }
            }
            if sticky_requested {
                if let Some(current) = slot.as_ref() {
                    if !is_excluded(excluded, current)
                        && (!self.config.availability_check || current.is_available())
                    {
                        return Some(Arc::clone(current));
                    }
                }
            }
        }

        let pool = self.availability_pool(candidates)?;
        if pool.is_empty() {
            return None;
        }
        let chosen = self.do_select(loadbalance, url, invocation, &pool, excluded)?;
        if sticky_requested {
            *self.sticky_invoker.lock() = Some(Arc::clone(&chosen));
        }
        Some(chosen)
    }

    fn do_select(
        &self,
        loadbalance: &dyn LoadBalance,
        url: &EndpointUrl,
        invocation: &Invocation,
        pool: &BitList<InvokerRef>,
        excluded: &[InvokerRef],
    ) -> Option<InvokerRef> {
        if pool.len() == 1 {
            let only = pool.first().cloned()?;
            return (!is_excluded(excluded, &only)).then_some(only);
        }

        let chosen = loadbalance.select(pool, url, invocation)?;
        if !is_excluded(excluded, &chosen) {
            return Some(chosen);
        }

        // The strategy picked an already-tried endpoint: reselect among the
        // untried ones, examining at most `reselect_count` of them.
        let mut budget = self.config.reselect_count;
        let fresh = pool.clone().narrow(|invoker| {
            if budget == 0 || is_excluded(excluded, invoker) {
                false
            } else {
                budget -= 1;
                true
            }
        });
        if !fresh.is_empty() {
            return loadbalance.select(&fresh, url, invocation);
        }

        // Collision fallback: walk forward from the strategy's pick to the
        // next untried endpoint, wrapping around.
        let positions: Vec<InvokerRef> = pool.iter().cloned().collect();
        let start = positions
            .iter()
            .position(|invoker| Arc::ptr_eq(invoker, &chosen))?;
        for offset in 1..positions.len() {
            let candidate = &positions[(start + offset) % positions.len()];
            if !is_excluded(excluded, candidate) {
                return Some(Arc::clone(candidate));
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
