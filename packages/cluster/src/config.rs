//! Consumer-side cluster configuration.

use serde::{Deserialize, Serialize};
use shunt_core::EndpointUrl;

/// URL parameter names consulted by `ConsumerConfig::from_url`.
pub mod keys {
    pub const RETRIES: &str = "retries";
    pub const TIMEOUT: &str = "timeout";
    pub const LOADBALANCE: &str = "loadbalance";
    pub const STICKY: &str = "cluster.sticky";
    pub const AVAILABLE_CHECK: &str = "cluster.availablecheck";
    pub const FALLBACK_UNAVAILABLE: &str = "cluster.fallback-unavailable";
    pub const RESELECT_COUNT: &str = "cluster.reselect-count";
}

/// Per-reference configuration for cluster invocation behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerConfig {
    /// Extra attempts after the first failed one.
    pub retries: u32,
    /// Total per-call time budget across all failover attempts.
    pub timeout_ms: u64,
    /// When true, only endpoints reporting `is_available()` participate in
    /// selection.
    pub availability_check: bool,
    /// When the availability check empties a non-empty eligible set: `true`
    /// attempts the unavailable endpoints as a last resort, `false` fails
    /// fast with a no-endpoint error.
    pub fallback_to_unavailable: bool,
    /// Reuse the previously selected endpoint while it stays eligible.
    pub sticky: bool,
    /// Upper bound on candidates examined during reselection.
    pub reselect_count: usize,
    /// Name of the load-balance strategy to resolve from the registry.
    pub loadbalance: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            retries: 2,
            timeout_ms: 1000,
            availability_check: true,
            fallback_to_unavailable: false,
            sticky: false,
            reselect_count: 10,
            loadbalance: "random".to_string(),
        }
    }
}

impl ConsumerConfig {
    /// Defaults overridden by the consumer URL's parameters.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_url(url: &EndpointUrl) -> Self {
        let defaults = Self::default();
        Self {
            retries: url.param_u64(keys::RETRIES, u64::from(defaults.retries)) as u32,
            timeout_ms: url.param_u64(keys::TIMEOUT, defaults.timeout_ms),
            availability_check: url.param_bool(keys::AVAILABLE_CHECK, defaults.availability_check),
            fallback_to_unavailable: url
                .param_bool(keys::FALLBACK_UNAVAILABLE, defaults.fallback_to_unavailable),
            sticky: url.param_bool(keys::STICKY, defaults.sticky),
            reselect_count: url.param_u64(keys::RESELECT_COUNT, defaults.reselect_count as u64)
                as usize,
            loadbalance: url
                .param(keys::LOADBALANCE)
                .unwrap_or(&defaults.loadbalance)
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ConsumerConfig::default();
        assert_eq!(config.retries, 2);
        assert_eq!(config.timeout_ms, 1000);
        assert!(config.availability_check);
        assert!(!config.fallback_to_unavailable);
        assert!(!config.sticky);
        assert_eq!(config.loadbalance, "random");
    }

    #[test]
    fn url_parameters_override_defaults() {
        let url = EndpointUrl::new("shunt", "consumer", 0)
            .with_param(keys::RETRIES, "5")
            .with_param(keys::TIMEOUT, "250")
            .with_param(keys::STICKY, "true")
            .with_param(keys::LOADBALANCE, "roundrobin");
        let config = ConsumerConfig::from_url(&url);
        assert_eq!(config.retries, 5);
        assert_eq!(config.timeout_ms, 250);
        assert!(config.sticky);
        assert_eq!(config.loadbalance, "roundrobin");
        // Untouched parameters keep their defaults.
        assert!(config.availability_check);
        assert_eq!(config.reselect_count, 10);
    }
}
