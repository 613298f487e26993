//! # Kerberos Client Ticket Cache
//!
//! Validity tracking and renewal for cached Kerberos service tickets.
//!
//! This crate provides:
//! - **Validity bands**: classification of a cached entry as fresh, renewable,
//!   expired or not yet valid against a single sampled instant
//! - **Lifecycle manager**: lookups that serve, renew or miss, with at most
//!   one renewal in flight per service principal
//! - **Background refresh**: optional proactive renewal ahead of expiry
//!
//! Storage lives in [`krb_ccache_storage`]; the network exchange is supplied
//! by the caller through [`TicketExchange`].
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use krb_ccache::{CacheConfig, TicketExchange, TicketLifecycleManager};
//! use krb_ccache_storage::TicketStore;
//!
//! # async fn example(exchange: Arc<dyn TicketExchange>) -> Result<(), krb_ccache::CacheError> {
//! let config = CacheConfig::builder()
//!     .refresh_interval(std::time::Duration::from_secs(60))
//!     .build()?;
//! let manager = TicketLifecycleManager::from_config(TicketStore::new(), exchange, &config)?;
//!
//! let (ticket, valid) = manager.fetch("HTTP/web.example.com").await.into_parts();
//! if valid {
//!     println!("ticket realm: {}", ticket.map(|t| t.realm().to_owned()).unwrap_or_default());
//! }
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a manual clock and a scripted exchange.
//! - **`failpoints`**: Enables `fail` fail points for fault-injection tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Time source abstraction.
pub mod clock;
/// Lifecycle manager configuration.
pub mod config;
/// Cache error types.
pub mod error;
/// TGS exchange boundary.
pub mod exchange;
/// Ticket lifecycle manager.
pub mod lifecycle;
/// Lookup results.
pub mod lookup;
mod metrics;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
/// Validity classification.
pub mod validity;

pub use clock::{Clock, SystemClock};
pub use config::{CacheConfig, DEFAULT_RENEW_AHEAD, MIN_REFRESH_INTERVAL};
pub use error::{BoxError, CacheError, ConfigError, ExchangeError, ExchangeResult, Result};
pub use exchange::{RenewalResult, TicketExchange};
pub use lifecycle::TicketLifecycleManager;
pub use lookup::TicketLookup;
pub use metrics::CacheMetricsSnapshot;
pub use validity::{Validity, renewal_due};
