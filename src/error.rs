//! Error types for gateway calls and persistence.
//!
//! Two closed enums, one per subsystem:
//! - [`ApiError`] for calls that leave the device (weather, places, geocoding).
//! - [`StoreError`] for the document/blob store and auth boundary.
//!
//! Catch sites match exhaustively; there are no stringly-typed error codes.
//! Retry eligibility is a property of the variant, exposed via
//! `is_transient`, so the retry policy never has to inspect messages.

use std::time::Duration;

/// How a provider's non-success HTTP response is categorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 401: key missing/invalid.
    Unauthorized,
    /// 403: key valid but not allowed.
    Forbidden,
    /// 404: the resource does not exist upstream.
    NotFound,
    /// 429: the provider itself throttled us.
    RateLimited,
    /// 5xx.
    ServerError,
    /// 2xx with a body we could not interpret.
    Malformed,
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotFound => "not found",
            Self::RateLimited => "rate limited by server",
            Self::ServerError => "server error",
            Self::Malformed => "malformed response",
        };
        f.write_str(s)
    }
}

/// Errors surfaced by the API gateway functions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// Caller-supplied input violates a precondition. Never retried.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Our own limiter denied admission; carries the caller-facing wait.
    #[error("rate limit reached for {service}; try again in {} seconds", .wait.as_secs().max(1))]
    RateLimited { service: &'static str, wait: Duration },

    /// The provider answered with a non-success status.
    #[error("{service}: {kind}")]
    Provider { service: &'static str, kind: ProviderErrorKind },

    /// The call did not complete within the configured timeout.
    #[error("request to {service} timed out after {timeout:?}")]
    Timeout { service: &'static str, timeout: Duration },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("network error talking to {service}: {message}")]
    Network { service: &'static str, message: String },
}

impl ApiError {
    /// True for failures worth retrying at a later time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Provider { kind, .. } => {
                matches!(kind, ProviderErrorKind::ServerError | ProviderErrorKind::RateLimited)
            }
            Self::Validation(_) | Self::RateLimited { .. } => false,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
            || matches!(self, Self::Provider { kind: ProviderErrorKind::RateLimited, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Errors surfaced by the document store, blob store, and auth boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No signed-in user for an operation that requires one.
    #[error("not signed in")]
    Unauthenticated,

    /// The store denied the operation (ownership mismatch, revoked session).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The caller handed the store something it refuses to hold.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced document/blob does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient backend failure; a later attempt may succeed.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Retrying `Unauthenticated`/`PermissionDenied`/`InvalidArgument`/
    /// `NotFound` can never succeed; only `Unavailable` is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
