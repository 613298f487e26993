//! Boundary with the ticket-granting exchange.
//!
//! The cache does not build, encrypt or send protocol messages. Everything it
//! needs from the TGS exchange is captured by [`TicketExchange`]: given the
//! current ticket and session key for a service, obtain a renewed ticket.
//!
//! # Usage
//!
//! ```no_run
//! use async_trait::async_trait;
//! use krb_ccache::{ExchangeError, RenewalResult, TicketExchange};
//! use krb_ccache_storage::{ServicePrincipalName, SessionKey, Ticket};
//!
//! struct KdcClient;
//!
//! #[async_trait]
//! impl TicketExchange for KdcClient {
//!     async fn exchange(
//!         &self,
//!         spn: &ServicePrincipalName,
//!         ticket: &Ticket,
//!         session_key: &SessionKey,
//!         renew: bool,
//!     ) -> Result<RenewalResult, ExchangeError> {
//!         // Build a TGS-REQ with the RENEW option, send it, decrypt the reply.
//!         Err(ExchangeError::connection("not wired up"))
//!     }
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use krb_ccache_storage::{CacheEntry, ServicePrincipalName, SessionKey, Ticket};

use crate::error::ExchangeResult;

/// Performs TGS exchanges on behalf of the cache.
///
/// This is the only network-facing dependency of the lifecycle manager and
/// the only call that may suspend for an unbounded time. Implementations own
/// their timeout and retry policy; the cache calls each exchange at most once
/// per renewal attempt.
#[async_trait]
pub trait TicketExchange: Send + Sync {
    /// Requests a ticket for `spn` using `ticket` and `session_key` as the
    /// authenticating credentials.
    ///
    /// The cache always passes `renew = true`: the request must carry the
    /// RENEW KDC option so the KDC extends the presented ticket instead of
    /// issuing a fresh one.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`](crate::ExchangeError) if the KDC cannot
    /// be reached, rejects the request, or replies with something that cannot
    /// be decoded.
    async fn exchange(
        &self,
        spn: &ServicePrincipalName,
        ticket: &Ticket,
        session_key: &SessionKey,
        renew: bool,
    ) -> ExchangeResult<RenewalResult>;
}

/// Decrypted contents of a successful renewal reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenewalResult {
    /// The renewed ticket.
    pub ticket: Ticket,
    /// Authentication time carried over from the original ticket.
    pub auth_time: DateTime<Utc>,
    /// New end of the usable lifetime.
    pub end_time: DateTime<Utc>,
    /// End of the renewable window.
    pub renew_till: DateTime<Utc>,
    /// New session key.
    pub session_key: SessionKey,
}

impl From<RenewalResult> for CacheEntry {
    fn from(result: RenewalResult) -> Self {
        CacheEntry::new(
            result.ticket,
            result.auth_time,
            result.end_time,
            result.renew_till,
            result.session_key,
        )
    }
}
