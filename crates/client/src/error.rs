//! Ticket cache error types.
//!
//! This module defines the errors the exchange collaborator reports
//! ([`ExchangeError`]), the errors the lifecycle manager surfaces to its
//! callers ([`CacheError`]), and configuration validation errors
//! ([`ConfigError`]).
//!
//! A cache miss is not an error. It is reported as
//! [`TicketLookup::Miss`](crate::TicketLookup::Miss).

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A shared error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for exchange collaborator calls.
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Result type alias for lifecycle manager operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors reported by a [`TicketExchange`](crate::TicketExchange)
/// implementation.
///
/// Implementations map their transport and protocol failures onto these
/// variants. Source chains are preserved through `#[source]`.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExchangeError {
    /// The KDC could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection failure.
        message: String,
        /// The underlying transport error.
        #[source]
        source: Option<BoxError>,
    },

    /// The exchange did not complete in time.
    #[error("Exchange timeout")]
    Timeout,

    /// The KDC answered with a KRB-ERROR (e.g. the ticket is past its
    /// renewable lifetime on the server side).
    #[error("KDC rejected request ({code}): {message}")]
    Rejected {
        /// Kerberos error code from the KRB-ERROR message.
        code: i32,
        /// Error text from the KRB-ERROR message, if any.
        message: String,
    },

    /// The reply could not be decoded or failed an integrity check.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol failure.
        message: String,
        /// The underlying decoding error.
        #[source]
        source: Option<BoxError>,
    },

    /// Any other collaborator failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl ExchangeError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(code: i32, message: impl Into<String>) -> Self {
        Self::Rejected { code, message: message.into() }
    }

    /// Creates a new `Protocol` error.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol { message: message.into(), source: None }
    }

    /// Creates a new `Protocol` error with a source error.
    #[must_use]
    pub fn protocol_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Protocol { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Returns `true` for failures that may succeed if retried later
    /// (connection and timeout errors).
    ///
    /// The cache never retries on its own; this is a hint for callers.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout)
    }
}

/// Errors surfaced by the [`TicketLifecycleManager`](crate::TicketLifecycleManager).
///
/// `CacheError` is `Clone` so that the outcome of a single in-flight renewal
/// can be handed to every caller waiting on it.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The exchange collaborator failed to renew the ticket. The cached entry
    /// was left untouched.
    #[error("Ticket renewal failed for {spn}: {source}")]
    RenewalFailed {
        /// Canonical SPN of the entry being renewed.
        spn: String,
        /// The collaborator error.
        #[source]
        source: Arc<ExchangeError>,
    },

    /// Invalid cache configuration.
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl CacheError {
    /// Creates a new `RenewalFailed` error.
    #[must_use]
    pub fn renewal_failed(spn: impl Into<String>, source: ExchangeError) -> Self {
        Self::RenewalFailed { spn: spn.into(), source: Arc::new(source) }
    }

    /// Returns the collaborator error behind a renewal failure, if any.
    #[must_use]
    pub fn exchange_error(&self) -> Option<&ExchangeError> {
        match self {
            Self::RenewalFailed { source, .. } => Some(source.as_ref()),
            Self::Config(_) => None,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A duration setting is below its allowed minimum.
    #[error("{field} must be at least {min:?}, got {value:?}")]
    BelowMinimum {
        /// Name of the offending setting.
        field: &'static str,
        /// Smallest accepted value.
        min: Duration,
        /// Value that was supplied.
        value: Duration,
    },
}
