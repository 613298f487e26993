//! Ticket validity classification.
//!
//! A cached entry falls into exactly one band relative to a sampled `now`:
//!
//! ```text
//!   auth_time            end_time              renew_till
//!       │     Fresh         │      Renewable        │     Expired
//! ──────┼───────────────────┼───────────────────────┼──────────────►
//!  NotYetValid          [auth, end)            [end, renew_till)
//! ```
//!
//! Upper bounds are exclusive: at exactly `end_time` a ticket is no longer
//! served as-is, and at exactly `renew_till` it can no longer be renewed.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use krb_ccache_storage::CacheEntry;

/// Where `now` falls within an entry's validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Validity {
    /// `auth_time <= now < end_time`: the ticket can be used as-is.
    Fresh,
    /// `end_time <= now < renew_till`: the ticket must be renewed before use.
    Renewable,
    /// `now >= renew_till`: the ticket is unusable and cannot be renewed.
    Expired,
    /// `now < auth_time`: the ticket is not usable yet.
    NotYetValid,
}

impl Validity {
    /// Classifies `entry` against `now`.
    #[must_use]
    pub fn classify(entry: &CacheEntry, now: DateTime<Utc>) -> Self {
        if now >= entry.end_time() {
            if now < entry.renew_till() { Self::Renewable } else { Self::Expired }
        } else if now >= entry.auth_time() {
            Self::Fresh
        } else {
            Self::NotYetValid
        }
    }

    /// Returns `true` if a ticket in this band can be served to a caller.
    #[must_use]
    pub fn is_usable(self) -> bool {
        self == Self::Fresh
    }

    /// Returns a short label for logging.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Renewable => "renewable",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
        }
    }
}

impl fmt::Display for Validity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` if `entry` should be renewed at `now` when renewing
/// `renew_ahead` before its end time.
///
/// With a zero `renew_ahead` this is exactly the [`Validity::Renewable`]
/// band. A positive `renew_ahead` also selects fresh tickets that are about
/// to run out.
#[must_use]
pub fn renewal_due(entry: &CacheEntry, now: DateTime<Utc>, renew_ahead: TimeDelta) -> bool {
    match Validity::classify(entry, now) {
        Validity::Renewable => true,
        Validity::Fresh => {
            now.checked_add_signed(renew_ahead).is_none_or(|due| due >= entry.end_time())
        },
        Validity::Expired | Validity::NotYetValid => false,
    }
}
