//! In-memory Kerberos service ticket store.
//!
//! This crate holds the credential data model and the [`TicketStore`] that
//! the `krb-ccache` lifecycle manager builds on. It is deliberately free of
//! time logic and network access: the store answers "what is cached for this
//! service principal?" and nothing else.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              TicketLifecycleManager (krb-ccache)         │
//! │      validity window, renewal, single-flight registry    │
//! ├─────────────────────────────────────────────────────────┤
//! │                  TicketStore (this crate)                │
//! │             get / put / remove, RwLock-guarded           │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use chrono::{Duration, Utc};
//! use krb_ccache_storage::{CacheEntry, ServicePrincipalName, SessionKey, Ticket, TicketStore};
//!
//! let spn: ServicePrincipalName = "host/svc.example.com".parse()?;
//! let now = Utc::now();
//!
//! let store = TicketStore::new();
//! store.put(
//!     &spn.cache_key(),
//!     CacheEntry::new(
//!         Ticket::builder().realm("EXAMPLE.COM").sname(spn.clone()).build(),
//!         now,
//!         now + Duration::hours(10),
//!         now + Duration::days(7),
//!         SessionKey::new(18, vec![0; 32]),
//!     ),
//! );
//!
//! assert_eq!(store.spns(), ["host/svc.example.com"]);
//! # Ok::<(), krb_ccache_storage::PrincipalError>(())
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with ticket and entry builders for tests.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;
pub mod types;

pub use error::{PrincipalError, PrincipalResult};
pub use store::TicketStore;
pub use types::{
    COMPONENT_SEPARATOR, CacheEntry, EntrySummary, NT_SRV_INST, ServicePrincipalName, SessionKey,
    TICKET_VERSION, Ticket,
};
