//! RPC error taxonomy with stable numeric codes.
//!
//! The cluster invoker's retry policy is driven entirely by `is_retryable()`,
//! keeping the retry-vs-fail decision in one testable place. Policy denial
//! (`Forbidden`) is deliberately distinct from topology failure
//! (`NoEndpointAvailable`) so operators can tell a routing rule that said
//! "no" apart from an empty provider list.

use std::fmt;

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Stable numeric classification carried by every `RpcError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCode {
    Unknown = 0,
    Network = 1,
    Timeout = 2,
    Biz = 3,
    Forbidden = 4,
    Serialization = 5,
    NoEndpointAvailable = 6,
    LimitExceeded = 7,
}

impl ErrorCode {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Network => "NETWORK",
            Self::Timeout => "TIMEOUT",
            Self::Biz => "BIZ",
            Self::Forbidden => "FORBIDDEN",
            Self::Serialization => "SERIALIZATION",
            Self::NoEndpointAvailable => "NO_ENDPOINT_AVAILABLE",
            Self::LimitExceeded => "LIMIT_EXCEEDED",
        };
        write!(f, "{name}({})", self.as_u8())
    }
}

// ---------------------------------------------------------------------------
// AttemptFailure
// ---------------------------------------------------------------------------

/// One failed attempt against one endpoint, recorded by the failover loop so
/// the terminal error lists every endpoint tried and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    pub address: String,
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}: {}", self.address, self.code, self.message)
    }
}

fn format_attempts(attempts: &[AttemptFailure]) -> String {
    if attempts.is_empty() {
        return "no attempts made".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// RpcError
// ---------------------------------------------------------------------------

/// Failure outcome of an invocation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RpcError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("call exceeded its {budget_ms}ms budget ({})", format_attempts(.attempts))]
    Timeout {
        budget_ms: u64,
        attempts: Vec<AttemptFailure>,
    },

    /// Raised by the callee's own logic. Never retried: the call may already
    /// have had its side effects.
    #[error("business exception from provider: {message}")]
    Biz { message: String },

    /// A routing rule denied the call (e.g., forced tag with no match).
    #[error("routing denied: {reason}")]
    Forbidden { reason: String },

    #[error("serialization failure: {message}")]
    Serialization { message: String },

    /// No endpoint left to try. Carries the full per-attempt failure history
    /// when raised after failover exhaustion.
    #[error("no endpoint available for {service}: {reason} ({})", format_attempts(.attempts))]
    NoEndpointAvailable {
        service: String,
        reason: String,
        attempts: Vec<AttemptFailure>,
    },

    #[error("limit exceeded: {message}")]
    LimitExceeded { message: String },

    #[error("unknown rpc failure: {message}")]
    Unknown { message: String },
}

impl RpcError {
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn biz(message: impl Into<String>) -> Self {
        Self::Biz {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Topology failure with no attempt history (routing produced nothing).
    #[must_use]
    pub fn no_endpoint(service: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoEndpointAvailable {
            service: service.into(),
            reason: reason.into(),
            attempts: Vec::new(),
        }
    }

    /// The stable numeric classification of this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Network { .. } => ErrorCode::Network,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Biz { .. } => ErrorCode::Biz,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::NoEndpointAvailable { .. } => ErrorCode::NoEndpointAvailable,
            Self::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            Self::Unknown { .. } => ErrorCode::Unknown,
        }
    }

    /// Whether the failover policy may try another endpoint after this error.
    ///
    /// Business exceptions are never retried (the callee may have executed);
    /// policy denials and serialization failures would fail identically on
    /// every endpoint.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::Network | ErrorCode::Timeout | ErrorCode::NoEndpointAvailable
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
