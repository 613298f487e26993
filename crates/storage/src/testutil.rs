//! Shared test utilities for ticket cache testing.
//!
//! Builders for tickets and cache entries with predictable contents. This
//! module is feature-gated behind `testutil` to keep it out of production
//! builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! krb-ccache-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use chrono::Duration;
//! use krb_ccache_storage::testutil::{entry_for, t0};
//!
//! let entry = entry_for("host/svc.example.com", t0(), Duration::hours(1), Duration::hours(2));
//! ```

use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{CacheEntry, ServicePrincipalName, SessionKey, Ticket};

/// Realm used by every ticket these helpers build.
pub const TEST_REALM: &str = "EXAMPLE.COM";

/// AES256-CTS-HMAC-SHA1-96.
pub const TEST_ETYPE: i32 = 18;

/// Fixed reference instant (`2024-01-01T00:00:00Z`) for deterministic tests.
///
/// # Panics
///
/// Never in practice; the literal date is valid.
#[must_use]
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid reference date")
}

/// Parses `spn` into a [`ServicePrincipalName`].
///
/// # Panics
///
/// Panics if `spn` is malformed.
#[must_use]
pub fn principal(spn: &str) -> ServicePrincipalName {
    spn.parse().expect("test principal must be well-formed")
}

/// Builds a ticket for `spn` whose opaque body is `body`.
///
/// # Panics
///
/// Panics if `spn` is malformed.
#[must_use]
pub fn ticket_with_body(spn: &str, body: impl Into<Bytes>) -> Ticket {
    Ticket::builder().realm(TEST_REALM).sname(principal(spn)).enc_part(body).build()
}

/// Builds a ticket for `spn` whose body encodes the issue time, so tickets
/// issued at different instants compare unequal.
///
/// # Panics
///
/// Panics if `spn` is malformed.
#[must_use]
pub fn ticket_for(spn: &str, issued_at: DateTime<Utc>) -> Ticket {
    ticket_with_body(spn, format!("{spn}@{}", issued_at.timestamp()).into_bytes())
}

/// Builds a 32-byte session key filled with `seed`.
#[must_use]
pub fn session_key(seed: u8) -> SessionKey {
    SessionKey::new(TEST_ETYPE, vec![seed; 32])
}

/// Builds an entry for `spn` authenticated at `auth_time`, usable for
/// `lifetime` and renewable for `renewable` (both measured from
/// `auth_time`).
///
/// # Panics
///
/// Panics if `spn` is malformed.
#[must_use]
pub fn entry_for(
    spn: &str,
    auth_time: DateTime<Utc>,
    lifetime: Duration,
    renewable: Duration,
) -> CacheEntry {
    CacheEntry::new(
        ticket_for(spn, auth_time),
        auth_time,
        auth_time + lifetime,
        auth_time + renewable,
        session_key((auth_time.timestamp() % 251) as u8),
    )
}
