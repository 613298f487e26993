//! Result of a cache lookup.

use krb_ccache_storage::Ticket;

use crate::error::CacheError;

/// Outcome of [`TicketLifecycleManager::fetch`](crate::TicketLifecycleManager::fetch).
///
/// Only [`Hit`](Self::Hit) carries a usable credential. A
/// [`Stale`](Self::Stale) result exposes the last-known ticket for diagnostics
/// together with the renewal error; that ticket is past its end time and must
/// not be presented to a service.
///
/// # Examples
///
/// ```
/// use krb_ccache::TicketLookup;
///
/// let lookup = TicketLookup::Miss;
/// assert!(!lookup.is_valid());
/// assert_eq!(lookup.into_parts(), (None, false));
/// ```
#[derive(Debug, Clone)]
#[must_use]
pub enum TicketLookup {
    /// A valid ticket, served from the cache or freshly renewed.
    Hit(Ticket),

    /// No usable entry: nothing cached, or the renewable window has closed.
    Miss,

    /// The ticket needed renewal and the renewal failed. The cache still
    /// holds the old entry unchanged.
    Stale {
        /// The expired ticket that could not be renewed.
        ticket: Ticket,
        /// Why renewal failed.
        error: CacheError,
    },
}

impl TicketLookup {
    /// Returns `true` only for [`Hit`](Self::Hit).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Hit(_))
    }

    /// Returns the usable ticket, if any. `Stale` yields `None`.
    #[must_use]
    pub fn ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Hit(ticket) => Some(ticket),
            Self::Miss | Self::Stale { .. } => None,
        }
    }

    /// Consumes the lookup, returning the usable ticket, if any.
    #[must_use]
    pub fn into_ticket(self) -> Option<Ticket> {
        match self {
            Self::Hit(ticket) => Some(ticket),
            Self::Miss | Self::Stale { .. } => None,
        }
    }

    /// Returns the expired ticket of a failed renewal.
    #[must_use]
    pub fn stale_ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Stale { ticket, .. } => Some(ticket),
            Self::Hit(_) | Self::Miss => None,
        }
    }

    /// Returns the renewal error of a `Stale` lookup.
    #[must_use]
    pub fn error(&self) -> Option<&CacheError> {
        match self {
            Self::Stale { error, .. } => Some(error),
            Self::Hit(_) | Self::Miss => None,
        }
    }

    /// Flattens the lookup into a `(ticket, valid)` pair.
    ///
    /// `Stale` produces `(Some(old_ticket), false)`. The flag is
    /// authoritative: a ticket paired with `false` is informational only.
    #[must_use]
    pub fn into_parts(self) -> (Option<Ticket>, bool) {
        match self {
            Self::Hit(ticket) => (Some(ticket), true),
            Self::Miss => (None, false),
            Self::Stale { ticket, .. } => (Some(ticket), false),
        }
    }

    /// Converts the lookup into a `Result`, turning a failed renewal into an
    /// error and a miss into `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the renewal error of a `Stale` lookup.
    pub fn into_result(self) -> Result<Option<Ticket>, CacheError> {
        match self {
            Self::Hit(ticket) => Ok(Some(ticket)),
            Self::Miss => Ok(None),
            Self::Stale { error, .. } => Err(error),
        }
    }
}
