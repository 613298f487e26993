//! In-memory ticket store keyed by service principal name.
//!
//! [`TicketStore`] is pure storage: it never looks at ticket lifetimes and
//! never talks to the network. Stale entries stay in place until they are
//! overwritten by a renewal or removed explicitly; deciding whether a stored
//! ticket is still usable is the lifecycle manager's job.
//!
//! # Thread Safety
//!
//! The map is wrapped in a [`parking_lot::RwLock`]. Every operation takes the
//! lock for the duration of a single map access and never across an `.await`,
//! so concurrent callers cannot observe a torn entry and no operation blocks
//! on I/O. Cloning a `TicketStore` yields another handle to the same map.
//!
//! # Example
//!
//! ```
//! use chrono::{Duration, Utc};
//! use krb_ccache_storage::{CacheEntry, SessionKey, Ticket, TicketStore};
//!
//! let store = TicketStore::new();
//! let now = Utc::now();
//! let ticket = Ticket::builder()
//!     .realm("EXAMPLE.COM")
//!     .sname("host/svc.example.com".parse().unwrap())
//!     .build();
//! let entry = CacheEntry::new(
//!     ticket,
//!     now,
//!     now + Duration::hours(10),
//!     now + Duration::days(7),
//!     SessionKey::new(18, vec![0; 32]),
//! );
//!
//! store.add_entry(entry);
//! assert!(store.get("host/svc.example.com").is_some());
//!
//! store.remove("host/svc.example.com");
//! assert!(store.is_empty());
//! ```

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use parking_lot::RwLock;

use crate::types::{CacheEntry, EntrySummary};

/// Thread-safe map from canonical SPN string to [`CacheEntry`].
///
/// At most one entry exists per SPN key; [`put`](Self::put) replaces any
/// existing entry wholesale.
#[derive(Debug, Default, Clone)]
pub struct TicketStore {
    /// Entries indexed by canonical SPN string.
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl TicketStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the entry stored under `spn`, if any.
    #[tracing::instrument(skip(self))]
    pub fn get(&self, spn: &str) -> Option<CacheEntry> {
        self.entries.read().get(spn).cloned()
    }

    /// Inserts `entry` under `spn`, replacing any previous entry, and returns
    /// the stored entry.
    ///
    /// Storing the same entry twice leaves exactly one copy in the store.
    #[tracing::instrument(skip(self, entry))]
    pub fn put(&self, spn: &str, entry: CacheEntry) -> CacheEntry {
        let mut entries = self.entries.write();
        entries.insert(spn.to_owned(), entry.clone());
        entry
    }

    /// Inserts `entry` under the canonical name of its ticket's service
    /// principal.
    pub fn add_entry(&self, entry: CacheEntry) -> CacheEntry {
        let spn = entry.spn();
        self.put(&spn, entry)
    }

    /// Removes the entry stored under `spn`.
    ///
    /// Removing an absent SPN is a no-op. Returns whether an entry was
    /// removed.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, spn: &str) -> bool {
        self.entries.write().remove(spn).is_some()
    }

    /// Removes every entry, returning how many were removed.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.write();
        let count = entries.len();
        entries.clear();
        count
    }

    /// Returns the number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the stored SPN keys in sorted order.
    #[must_use]
    pub fn spns(&self) -> Vec<String> {
        let mut spns: Vec<String> = self.entries.read().keys().cloned().collect();
        spns.sort_unstable();
        spns
    }

    /// Returns a sorted diagnostics snapshot of every entry, without key
    /// material.
    #[must_use]
    pub fn entries(&self) -> BTreeMap<String, EntrySummary> {
        self.entries
            .read()
            .iter()
            .map(|(spn, entry)| (spn.clone(), entry.summary()))
            .collect()
    }

    /// Renders [`entries`](Self::entries) as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.entries())
    }
}
