//! Endpoint address URLs: `scheme://host:port?key=value&...` plus a parameter bag.
//!
//! Every endpoint carries its routing-relevant metadata (tag, group, version,
//! side) as URL parameters, so routers and filters read one uniform surface.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Well-known URL parameter keys.
pub mod params {
    /// Traffic tag assigned to an endpoint (e.g., a canary group name).
    pub const TAG: &str = "tag";
    /// Service group.
    pub const GROUP: &str = "group";
    /// Service version.
    pub const VERSION: &str = "version";
    /// Which side of the call this URL describes (`consumer` / `provider`).
    pub const SIDE: &str = "side";
    /// Filter list parameter consulted by the filter chain builder.
    pub const REFERENCE_FILTER: &str = "reference.filter";
    /// Provider-side filter list parameter.
    pub const SERVICE_FILTER: &str = "service.filter";
}

// ---------------------------------------------------------------------------
// EndpointUrl
// ---------------------------------------------------------------------------

/// Address and parameter bag for one network-reachable service instance.
///
/// Parameters use a `BTreeMap` for deterministic ordering in `Display` and
/// serialized forms. The struct is a plain value: cloning it never aliases
/// the parameter bag, so a router can never mutate an endpoint's URL behind
/// another router's back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointUrl {
    scheme: String,
    host: String,
    port: u16,
    params: BTreeMap<String, String>,
}

impl EndpointUrl {
    /// Creates a URL with an empty parameter bag.
    #[must_use]
    pub fn new(scheme: &str, host: &str, port: u16) -> Self {
        Self {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
            params: BTreeMap::new(),
        }
    }

    /// Builder-style parameter addition.
    #[must_use]
    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Sets a parameter in place.
    pub fn set_param(&mut self, key: &str, value: &str) {
        self.params.insert(key.to_string(), value.to_string());
    }

    /// Returns a parameter value, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns a parameter value, treating an empty string as absent.
    ///
    /// Routing keys (tag, group, version) use this accessor: an explicitly
    /// blank value must behave exactly like an unset one.
    pub fn param_nonempty(&self, key: &str) -> Option<&str> {
        self.param(key).filter(|v| !v.is_empty())
    }

    /// Returns a boolean parameter, defaulting when absent or unparsable.
    #[must_use]
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.param(key)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default)
    }

    /// Returns an integer parameter, defaulting when absent or unparsable.
    #[must_use]
    pub fn param_u64(&self, key: &str, default: u64) -> u64 {
        self.param(key)
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(default)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the identity routers match rule addresses against.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Endpoint traffic tag. Blank is absent.
    pub fn tag(&self) -> Option<&str> {
        self.param_nonempty(params::TAG)
    }

    /// Service group. Blank is absent.
    pub fn group(&self) -> Option<&str> {
        self.param_nonempty(params::GROUP)
    }

    /// Service version. Blank is absent.
    pub fn version(&self) -> Option<&str> {
        self.param_nonempty(params::VERSION)
    }

    /// Call side (`consumer` / `provider`).
    pub fn side(&self) -> Option<&str> {
        self.param_nonempty(params::SIDE)
    }
}

impl fmt::Display for EndpointUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)?;
        let mut sep = '?';
        for (k, v) in &self.params {
            write!(f, "{sep}{k}={v}")?;
            sep = '&';
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Errors from parsing an endpoint URL string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlParseError {
    #[error("missing scheme separator in `{0}`")]
    MissingScheme(String),
    #[error("missing or empty host in `{0}`")]
    MissingHost(String),
    #[error("invalid port in `{0}`")]
    InvalidPort(String),
}

impl FromStr for EndpointUrl {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s
            .split_once("://")
            .ok_or_else(|| UrlParseError::MissingScheme(s.to_string()))?;
        let (authority, query) = match rest.split_once('?') {
            Some((a, q)) => (a, Some(q)),
            None => (rest, None),
        };
        let (host, port_str) = authority
            .rsplit_once(':')
            .ok_or_else(|| UrlParseError::InvalidPort(s.to_string()))?;
        if scheme.is_empty() || host.is_empty() {
            return Err(UrlParseError::MissingHost(s.to_string()));
        }
        let port: u16 = port_str
            .parse()
            .map_err(|_| UrlParseError::InvalidPort(s.to_string()))?;

        let mut url = EndpointUrl::new(scheme, host, port);
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                match pair.split_once('=') {
                    Some((k, v)) => url.set_param(k, v),
                    None => url.set_param(pair, ""),
                }
            }
        }
        Ok(url)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
