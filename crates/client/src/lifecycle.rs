//! Ticket lifecycle manager.
//!
//! [`TicketLifecycleManager`] sits between callers and the [`TicketStore`].
//! On every lookup it classifies the cached entry against the current time
//! and decides whether to serve it, renew it through the [`TicketExchange`],
//! or report a miss.
//!
//! ```text
//! fetch(spn)
//!   │
//!   ├─ no entry ─────────────────────────────► Miss
//!   │
//!   └─ classify(entry, now)
//!        ├─ Fresh ───────────────────────────► Hit(ticket)
//!        ├─ Renewable ─► single-flight renew ─┬► Hit(new ticket)
//!        │                                    └► Stale { old ticket, error }
//!        └─ Expired / NotYetValid ───────────► Miss
//! ```
//!
//! # Single-flight renewal
//!
//! Concurrent lookups that find the same SPN in the renewable band share one
//! exchange. The first caller registers a flight for the SPN; later callers
//! await the same flight and receive its outcome, including failures. The
//! flight re-reads the store before exchanging, so a caller that arrives just
//! after a renewal completed serves the new entry instead of renewing again.
//! Flights for different SPNs never wait on each other.
//!
//! # Background refresh
//!
//! With [`with_refresh_interval`](TicketLifecycleManager::with_refresh_interval)
//! a Tokio task periodically renews entries that are within `renew_ahead` of
//! their end time, so foreground lookups rarely hit the renewable band.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use krb_ccache::{TicketExchange, TicketLifecycleManager, TicketLookup};
//! use krb_ccache_storage::TicketStore;
//!
//! async fn example(exchange: Arc<dyn TicketExchange>) {
//!     let manager = TicketLifecycleManager::new(TicketStore::new(), exchange);
//!
//!     match manager.fetch("HTTP/web.example.com").await {
//!         TicketLookup::Hit(ticket) => println!("using ticket for {}", ticket.sname()),
//!         TicketLookup::Miss => println!("no ticket, need a fresh TGS exchange"),
//!         TicketLookup::Stale { error, .. } => println!("renewal failed: {error}"),
//!     }
//! }
//! ```

use std::{
    collections::{BTreeMap, HashMap, hash_map::Entry},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use chrono::TimeDelta;
use fail::fail_point;
use krb_ccache_storage::{CacheEntry, EntrySummary, ServicePrincipalName, TicketStore};
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{Clock, SystemClock},
    config::{CacheConfig, DEFAULT_RENEW_AHEAD},
    error::{CacheError, Result},
    exchange::TicketExchange,
    lookup::TicketLookup,
    metrics::{CacheMetrics, CacheMetricsSnapshot},
    validity::{Validity, renewal_due},
};

/// Outcome of one renewal flight, shared by every caller that joined it.
#[derive(Debug, Clone)]
enum FlightOutcome {
    /// The exchange succeeded and the store now holds this entry.
    Renewed(CacheEntry),
    /// No renewal was needed; the stored entry is usable as-is.
    Current(CacheEntry),
    /// The exchange failed; the store still holds `stale`.
    Failed { stale: CacheEntry, error: CacheError },
    /// The entry disappeared or left the renewable window.
    Gone,
}

/// One registered renewal for an SPN.
#[derive(Debug, Default)]
struct Flight {
    outcome: OnceCell<FlightOutcome>,
    /// Callers currently awaiting `outcome`. Only changed under the registry lock.
    waiters: AtomicUsize,
}

type FlightRegistry = Mutex<HashMap<String, Arc<Flight>>>;

/// A caller's membership in a flight.
///
/// Dropping the guard (on completion or when the caller's future is
/// cancelled) deregisters the flight once it has resolved or once no caller
/// is left waiting on it. A flight whose leader was cancelled stays
/// registered while other callers wait; one of them takes over the exchange.
struct FlightGuard<'a> {
    flights: &'a FlightRegistry,
    key: &'a str,
    flight: Arc<Flight>,
}

impl<'a> FlightGuard<'a> {
    fn join(flights: &'a FlightRegistry, key: &'a str, metrics: &CacheMetrics) -> Self {
        let mut registry = flights.lock();
        let flight = match registry.entry(key.to_owned()) {
            Entry::Occupied(occupied) => {
                tracing::debug!(spn = key, "joining in-flight renewal");
                CacheMetrics::incr(&metrics.coalesced_waits);
                Arc::clone(occupied.get())
            },
            Entry::Vacant(vacant) => Arc::clone(vacant.insert(Arc::new(Flight::default()))),
        };
        flight.waiters.fetch_add(1, Ordering::Relaxed);
        Self { flights, key, flight }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let mut registry = self.flights.lock();
        let remaining = self.flight.waiters.fetch_sub(1, Ordering::Relaxed).saturating_sub(1);
        if (remaining == 0 || self.flight.outcome.initialized())
            && registry.get(self.key).is_some_and(|current| Arc::ptr_eq(current, &self.flight))
        {
            registry.remove(self.key);
        }
    }
}

/// Serves cached tickets and renews them when their lifetime runs out.
///
/// All methods take `&self`; share the manager behind an [`Arc`]. Dropping
/// the manager (or calling [`shutdown`](Self::shutdown)) stops the background
/// refresh task.
pub struct TicketLifecycleManager {
    store: TicketStore,
    exchange: Arc<dyn TicketExchange>,
    clock: Arc<dyn Clock>,
    /// Lead time used by the background refresh task.
    renew_ahead: TimeDelta,
    /// In-flight renewals keyed by SPN.
    flights: FlightRegistry,
    metrics: CacheMetrics,
    cancel_token: CancellationToken,
    /// Wrapped in `Mutex` so `shutdown()` can take ownership via `&self`.
    refresh_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl fmt::Debug for TicketLifecycleManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TicketLifecycleManager")
            .field("store", &self.store)
            .field("clock", &self.clock)
            .field("renew_ahead", &self.renew_ahead)
            .field("in_flight", &self.flights.lock().len())
            .finish_non_exhaustive()
    }
}

impl TicketLifecycleManager {
    /// Creates a manager over `store` that renews through `exchange`, using
    /// the system clock and the default renewal lead time.
    #[must_use]
    pub fn new(store: TicketStore, exchange: Arc<dyn TicketExchange>) -> Self {
        Self {
            store,
            exchange,
            clock: Arc::new(SystemClock),
            renew_ahead: to_time_delta(DEFAULT_RENEW_AHEAD),
            flights: Mutex::new(HashMap::new()),
            metrics: CacheMetrics::default(),
            cancel_token: CancellationToken::new(),
            refresh_handle: Mutex::new(None),
        }
    }

    /// Replaces the time source used for validity decisions.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets how long before `end_time` the background refresh task renews a
    /// ticket. Foreground [`fetch`](Self::fetch) calls ignore this setting.
    #[must_use]
    pub fn with_renew_ahead(mut self, renew_ahead: Duration) -> Self {
        self.renew_ahead = to_time_delta(renew_ahead);
        self
    }

    /// Creates a manager from a [`CacheConfig`], starting the background
    /// refresh task if the config enables it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context when
    /// `refresh_interval` is set.
    pub fn from_config(
        store: TicketStore,
        exchange: Arc<dyn TicketExchange>,
        config: &CacheConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let manager = Arc::new(Self::new(store, exchange).with_renew_ahead(config.renew_ahead()));
        Ok(match config.refresh_interval() {
            Some(interval) => manager.with_refresh_interval(interval),
            None => manager,
        })
    }

    /// Looks up the ticket for `spn`, renewing it first if its lifetime has
    /// ended but its renewable window is still open.
    ///
    /// The current time is sampled once per call. A miss and a failed
    /// renewal are both reported through [`TicketLookup`]; neither is logged
    /// above `debug`, and the cached entry is never removed here.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, spn: &str) -> TicketLookup {
        let Some(entry) = self.store.get(spn) else {
            if let Err(error) = spn.parse::<ServicePrincipalName>() {
                tracing::debug!(%error, "cache miss: malformed service principal name");
            } else {
                tracing::debug!(validity = "absent", "cache miss");
            }
            CacheMetrics::incr(&self.metrics.misses);
            return TicketLookup::Miss;
        };

        let validity = Validity::classify(&entry, self.clock.now());
        match validity {
            Validity::Fresh => {
                tracing::debug!(%validity, "cache hit");
                CacheMetrics::incr(&self.metrics.hits);
                TicketLookup::Hit(entry.into_ticket())
            },
            Validity::Renewable => {
                tracing::debug!(%validity, end_time = %entry.end_time(), "renewal required");
                self.lookup_after_renewal(spn).await
            },
            Validity::Expired | Validity::NotYetValid => {
                tracing::debug!(%validity, "cache miss");
                CacheMetrics::incr(&self.metrics.misses);
                TicketLookup::Miss
            },
        }
    }

    /// Looks up the ticket for an already-validated principal.
    ///
    /// Same as [`fetch`](Self::fetch) keyed by [`ServicePrincipalName::cache_key`].
    /// Callers holding a raw string can parse it first to reject a malformed
    /// name with a [`PrincipalError`](krb_ccache_storage::PrincipalError)
    /// instead of getting a miss.
    pub async fn fetch_principal(&self, spn: &ServicePrincipalName) -> TicketLookup {
        self.fetch(&spn.cache_key()).await
    }

    /// Renews `entry` and stores the result under the entry's SPN.
    ///
    /// This always performs an exchange, whatever the entry's validity, and
    /// bypasses the single-flight registry. The store is only written on
    /// success; on failure it is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::RenewalFailed`] if the exchange fails.
    pub async fn renew(&self, entry: &CacheEntry) -> Result<CacheEntry> {
        self.renew_keyed(&entry.spn(), entry).await
    }

    /// Removes the entry for `spn` (e.g. on logout).
    ///
    /// Removing an absent SPN is a no-op. An audit event is emitted at INFO
    /// level either way.
    #[tracing::instrument(skip(self))]
    pub fn remove(&self, spn: &str) -> bool {
        let removed = self.store.remove(spn);
        tracing::info!(
            audit.action = "remove_ticket",
            audit.resource = spn,
            audit.result = if removed { "success" } else { "not_found" },
            "audit_event"
        );
        removed
    }

    /// Removes every cached entry, returning how many were removed.
    #[tracing::instrument(skip(self))]
    pub fn clear(&self) -> usize {
        let removed = self.store.clear();
        tracing::info!(
            audit.action = "clear_tickets",
            audit.resource = "all_tickets",
            audit.result = "success",
            audit.removed = removed,
            "audit_event"
        );
        removed
    }

    /// Returns a sorted snapshot of every cached entry, without key material.
    #[must_use]
    pub fn list_entries(&self) -> BTreeMap<String, EntrySummary> {
        self.store.entries()
    }

    /// Returns the underlying store.
    #[must_use]
    pub fn store(&self) -> &TicketStore {
        &self.store
    }

    /// Returns a snapshot of the manager's counters.
    #[must_use]
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Returns the number of renewals currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.flights.lock().len()
    }

    /// Returns the cancellation token for the background refresh task.
    ///
    /// Callers can use this to integrate with external shutdown signals.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }

    /// Stops the background refresh task, if running, and waits for it to
    /// exit. Cached entries are kept.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        let handle = self.refresh_handle.lock().take();
        if let Some(handle) = handle
            && let Err(err) = handle.await
        {
            tracing::warn!(error = %err, "background refresh task panicked");
        }
    }

    /// Enables background renewal at the given interval.
    ///
    /// A `tokio::spawn`ed task wakes every `interval` and renews each entry
    /// whose end time is within `renew_ahead` of now (or already passed)
    /// while its renewable window is still open. Renewals share the
    /// single-flight registry with [`fetch`](Self::fetch). Failures are
    /// logged at WARN and counted; entries are never evicted.
    ///
    /// The task holds only a weak reference to the manager and stops when
    /// [`shutdown`](Self::shutdown) is called or the manager is dropped.
    ///
    /// # Panics
    ///
    /// Must be called within a Tokio runtime context.
    #[must_use]
    pub fn with_refresh_interval(self: Arc<Self>, interval: Duration) -> Arc<Self> {
        let manager = Arc::downgrade(&self);
        let token = self.cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; consume it so we start
            // with a full interval wait.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        tracing::info!("background refresh task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.do_refresh_cycle().await;
                    }
                }
            }
        });

        *self.refresh_handle.lock() = Some(handle);
        self
    }

    /// Runs a single background refresh cycle.
    async fn do_refresh_cycle(&self) {
        let now = self.clock.now();
        let due: Vec<String> = self
            .store
            .spns()
            .into_iter()
            .filter(|spn| {
                self.store.get(spn).is_some_and(|entry| renewal_due(&entry, now, self.renew_ahead))
            })
            .collect();

        let start = Instant::now();
        let mut renewed: u64 = 0;
        let mut errors: u64 = 0;

        for spn in &due {
            match self.renew_single_flight(spn, self.renew_ahead).await {
                FlightOutcome::Renewed(_) => renewed += 1,
                FlightOutcome::Failed { error, .. } => {
                    tracing::warn!(spn = %spn, error = %error, "background refresh: renewal failed");
                    errors += 1;
                },
                FlightOutcome::Current(_) | FlightOutcome::Gone => {},
            }
        }

        self.metrics.refresh_cycles.fetch_add(1, Ordering::Relaxed);
        self.metrics.refresh_renewals.fetch_add(renewed, Ordering::Relaxed);
        self.metrics.refresh_errors.fetch_add(errors, Ordering::Relaxed);

        if due.is_empty() {
            tracing::debug!("background refresh cycle: nothing due");
            return;
        }

        tracing::info!(
            renewed,
            errors,
            elapsed_ms = start.elapsed().as_millis() as u64,
            due = due.len(),
            "background refresh cycle complete"
        );
    }

    /// Resolves a renewable lookup through the single-flight registry.
    async fn lookup_after_renewal(&self, spn: &str) -> TicketLookup {
        match self.renew_single_flight(spn, TimeDelta::zero()).await {
            FlightOutcome::Renewed(entry) | FlightOutcome::Current(entry) => {
                CacheMetrics::incr(&self.metrics.hits);
                TicketLookup::Hit(entry.into_ticket())
            },
            FlightOutcome::Failed { stale, error } => {
                tracing::debug!(error = %error, "serving stale ticket after failed renewal");
                CacheMetrics::incr(&self.metrics.stale);
                TicketLookup::Stale { ticket: stale.into_ticket(), error }
            },
            FlightOutcome::Gone => {
                tracing::debug!("entry left the renewable window during renewal");
                CacheMetrics::incr(&self.metrics.misses);
                TicketLookup::Miss
            },
        }
    }

    /// Joins the in-flight renewal for `key`, starting one if none exists.
    async fn renew_single_flight(&self, key: &str, renew_ahead: TimeDelta) -> FlightOutcome {
        let guard = FlightGuard::join(&self.flights, key, &self.metrics);
        let outcome = guard.flight.outcome.get_or_init(|| self.run_flight(key, renew_ahead)).await;
        outcome.clone()
    }

    /// Body of a renewal flight. Runs once per flight, on behalf of every
    /// caller that joined it.
    async fn run_flight(&self, key: &str, renew_ahead: TimeDelta) -> FlightOutcome {
        let Some(entry) = self.store.get(key) else {
            return FlightOutcome::Gone;
        };

        let now = self.clock.now();
        if !renewal_due(&entry, now, renew_ahead) {
            return if Validity::classify(&entry, now).is_usable() {
                FlightOutcome::Current(entry)
            } else {
                FlightOutcome::Gone
            };
        }

        match self.renew_keyed(key, &entry).await {
            Ok(renewed) => FlightOutcome::Renewed(renewed),
            Err(error) => FlightOutcome::Failed { stale: entry, error },
        }
    }

    /// Exchanges `entry` for a renewed ticket and stores it under `key`.
    #[tracing::instrument(skip(self, entry))]
    async fn renew_keyed(&self, key: &str, entry: &CacheEntry) -> Result<CacheEntry> {
        fail_point!("ccache-before-renewal-exchange", |_| {
            CacheMetrics::incr(&self.metrics.renewal_failures);
            Err(CacheError::renewal_failed(
                key,
                crate::error::ExchangeError::internal("injected failure before renewal exchange"),
            ))
        });

        let ticket = entry.ticket();
        match self.exchange.exchange(ticket.sname(), ticket, entry.session_key(), true).await {
            Ok(result) => {
                let renewed = self.store.put(key, CacheEntry::from(result));
                CacheMetrics::incr(&self.metrics.renewals);
                tracing::debug!(
                    end_time = %renewed.end_time(),
                    renew_till = %renewed.renew_till(),
                    "ticket renewed"
                );
                Ok(renewed)
            },
            Err(err) => {
                CacheMetrics::incr(&self.metrics.renewal_failures);
                tracing::debug!(error = %err, transient = err.is_transient(), "ticket renewal failed");
                Err(CacheError::renewal_failed(key, err))
            },
        }
    }
}

impl Drop for TicketLifecycleManager {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

fn to_time_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use chrono::Duration as ChronoDuration;
    use krb_ccache_storage::testutil::{entry_for, t0};
    use tokio::task::JoinSet;

    use super::*;
    use crate::{
        error::ExchangeError,
        testutil::{ManualClock, MockExchange, renewal_result},
    };

    const SPN: &str = "host/svc.example.com";

    struct Harness {
        manager: Arc<TicketLifecycleManager>,
        clock: Arc<ManualClock>,
        exchange: Arc<MockExchange>,
    }

    /// Manager holding one entry for [`SPN`]: authenticated at T0, usable
    /// until T0+1h, renewable until T0+2h. The clock starts at T0.
    fn harness() -> Harness {
        let store = TicketStore::new();
        store.add_entry(entry_for(SPN, t0(), ChronoDuration::hours(1), ChronoDuration::hours(2)));
        let clock = Arc::new(ManualClock::new(t0()));
        let exchange = Arc::new(MockExchange::new());
        let manager = TicketLifecycleManager::new(store, exchange.clone()).with_clock(clock.clone());
        Harness { manager: Arc::new(manager), clock, exchange }
    }

    fn original_entry() -> CacheEntry {
        entry_for(SPN, t0(), ChronoDuration::hours(1), ChronoDuration::hours(2))
    }

    #[tokio::test]
    async fn test_fresh_ticket_served_without_exchange() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(30));

        let lookup = h.manager.fetch(SPN).await;

        assert_eq!(lookup.into_parts(), (Some(original_entry().into_ticket()), true));
        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.manager.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_renewable_ticket_is_renewed_and_replaced() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        let result =
            renewal_result(SPN, t0(), ChronoDuration::minutes(150), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());

        let lookup = h.manager.fetch(SPN).await;

        assert_eq!(lookup.into_parts(), (Some(result.ticket.clone()), true));
        let stored = h.manager.store().get(SPN).expect("entry still cached");
        assert_eq!(stored, CacheEntry::from(result));
        assert_eq!(stored.end_time(), t0() + ChronoDuration::minutes(150));
        assert_eq!(h.manager.store().len(), 1);

        let requests = h.exchange.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].spn, SPN);
        assert!(requests[0].renew);
        assert_eq!(&requests[0].session_key, original_entry().session_key());
        assert_eq!(requests[0].ticket, original_entry().into_ticket());
        assert_eq!(h.manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failed_renewal_returns_stale_and_keeps_entry() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        h.exchange.push_err(ExchangeError::connection("kdc unreachable"));

        let lookup = h.manager.fetch(SPN).await;

        assert!(!lookup.is_valid());
        assert!(matches!(
            lookup.error().and_then(CacheError::exchange_error),
            Some(ExchangeError::Connection { .. })
        ));
        assert_eq!(lookup.into_parts(), (Some(original_entry().into_ticket()), false));
        assert_eq!(h.manager.store().get(SPN), Some(original_entry()));

        let metrics = h.manager.metrics();
        assert_eq!(metrics.stale, 1);
        assert_eq!(metrics.renewal_failures, 1);
    }

    #[tokio::test]
    async fn test_absent_spn_is_miss() {
        let h = harness();

        let lookup = h.manager.fetch("HTTP/other.example.com").await;

        assert_eq!(lookup.into_parts(), (None, false));
        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.manager.metrics().misses, 1);
    }

    #[tokio::test]
    async fn test_at_renew_till_is_miss() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::hours(2));

        let lookup = h.manager.fetch(SPN).await;

        assert_eq!(lookup.into_parts(), (None, false));
        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.manager.store().get(SPN), Some(original_entry()));
    }

    #[tokio::test]
    async fn test_at_end_time_triggers_renewal() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::hours(1));
        h.exchange.push_ok(renewal_result(
            SPN,
            t0(),
            ChronoDuration::hours(3),
            ChronoDuration::hours(4),
        ));

        assert!(h.manager.fetch(SPN).await.is_valid());
        assert_eq!(h.exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_not_yet_valid_is_miss() {
        let h = harness();
        h.clock.set(t0() - ChronoDuration::minutes(1));

        assert!(matches!(h.manager.fetch(SPN).await, TicketLookup::Miss));
        assert_eq!(h.exchange.calls(), 0);
    }

    #[tokio::test]
    async fn test_renew_stores_under_same_spn() {
        let h = harness();
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());

        let renewed = h.manager.renew(&original_entry()).await.unwrap();

        assert_eq!(renewed, CacheEntry::from(result));
        assert_eq!(h.manager.store().get(SPN), Some(renewed));
        assert_eq!(h.manager.metrics().renewals, 1);
    }

    #[tokio::test]
    async fn test_renew_failure_leaves_store_untouched() {
        let h = harness();
        h.exchange.push_err(ExchangeError::rejected(11, "KDC_ERR_TKT_EXPIRED"));

        let err = h.manager.renew(&original_entry()).await.unwrap_err();

        match &err {
            CacheError::RenewalFailed { spn, .. } => assert_eq!(spn, SPN),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(err.exchange_error(), Some(ExchangeError::Rejected { code: 11, .. })));
        assert_eq!(h.manager.store().get(SPN), Some(original_entry()));
    }

    #[tokio::test]
    async fn test_fetch_after_failure_retries_exchange() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        h.exchange.push_err(ExchangeError::timeout());
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());

        assert!(matches!(h.manager.fetch(SPN).await, TicketLookup::Stale { .. }));
        assert_eq!(h.manager.fetch(SPN).await.into_ticket(), Some(result.ticket));
        assert_eq!(h.exchange.calls(), 2);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let h = harness();
        h.manager.store().add_entry(entry_for(
            "HTTP/web.example.com",
            t0(),
            ChronoDuration::hours(1),
            ChronoDuration::hours(2),
        ));

        assert!(h.manager.remove(SPN));
        assert!(!h.manager.remove(SPN));
        assert!(matches!(h.manager.fetch(SPN).await, TicketLookup::Miss));

        assert_eq!(h.manager.list_entries().keys().collect::<Vec<_>>(), ["HTTP/web.example.com"]);
        assert_eq!(h.manager.clear(), 1);
        assert!(h.manager.list_entries().is_empty());
    }

    #[tokio::test]
    async fn test_renewal_of_one_spn_leaves_others_alone() {
        let h = harness();
        let other = "HTTP/web.example.com";
        let other_entry = entry_for(
            other,
            t0() + ChronoDuration::hours(1),
            ChronoDuration::hours(1),
            ChronoDuration::hours(2),
        );
        h.manager.store().add_entry(other_entry.clone());
        h.clock.set(t0() + ChronoDuration::minutes(90));
        h.exchange.push_ok(renewal_result(
            SPN,
            t0(),
            ChronoDuration::hours(3),
            ChronoDuration::hours(4),
        ));

        assert!(h.manager.fetch(SPN).await.is_valid());
        assert_eq!(h.manager.fetch(other).await.into_ticket(), Some(other_entry.into_ticket()));
        assert_eq!(h.exchange.calls(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fetches_coalesce_into_one_exchange() {
        const CALLERS: usize = 16;

        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());
        h.exchange.close_gate();

        let mut set = JoinSet::new();
        for _ in 0..CALLERS {
            let manager = Arc::clone(&h.manager);
            set.spawn(async move { manager.fetch(SPN).await });
        }

        // Hold the leader at the gate until every other caller has joined.
        while h.exchange.calls() < 1
            || h.manager.metrics().coalesced_waits < (CALLERS - 1) as u64
        {
            tokio::task::yield_now().await;
        }
        h.exchange.open_gate();

        while let Some(joined) = set.join_next().await {
            let lookup = joined.expect("task panicked");
            assert_eq!(lookup.into_ticket(), Some(result.ticket.clone()));
        }

        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.manager.metrics().renewals, 1);
        assert_eq!(h.manager.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_coalesced_callers_share_failure() {
        const CALLERS: usize = 8;

        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        h.exchange.push_err(ExchangeError::timeout());
        h.exchange.close_gate();

        let mut set = JoinSet::new();
        for _ in 0..CALLERS {
            let manager = Arc::clone(&h.manager);
            set.spawn(async move { manager.fetch(SPN).await });
        }

        while h.exchange.calls() < 1
            || h.manager.metrics().coalesced_waits < (CALLERS - 1) as u64
        {
            tokio::task::yield_now().await;
        }
        h.exchange.open_gate();

        while let Some(joined) = set.join_next().await {
            let lookup = joined.expect("task panicked");
            assert!(matches!(
                lookup.error().and_then(CacheError::exchange_error),
                Some(ExchangeError::Timeout)
            ));
        }

        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.manager.store().get(SPN), Some(original_entry()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_sole_caller_deregisters_flight() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());
        h.exchange.close_gate();

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), h.manager.fetch(SPN)).await;

        assert!(timed_out.is_err());
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.manager.in_flight(), 0);

        // The next caller starts a fresh flight instead of waiting on the dead one.
        h.exchange.open_gate();
        let lookup = h.manager.fetch(SPN).await;

        assert_eq!(lookup.into_parts(), (Some(result.ticket.clone()), true));
        assert_eq!(h.exchange.calls(), 2);
        assert_eq!(h.manager.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_leaves_flight_registered() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());
        h.exchange.close_gate();

        let manager = Arc::clone(&h.manager);
        let leader = tokio::spawn(async move { manager.fetch(SPN).await });
        while h.exchange.calls() < 1 {
            tokio::task::yield_now().await;
        }

        let timed_out =
            tokio::time::timeout(Duration::from_millis(20), h.manager.fetch(SPN)).await;

        assert!(timed_out.is_err());
        assert_eq!(h.manager.metrics().coalesced_waits, 1);
        assert_eq!(h.manager.in_flight(), 1);

        h.exchange.open_gate();
        let lookup = leader.await.expect("leader panicked");

        assert_eq!(lookup.into_parts(), (Some(result.ticket.clone()), true));
        assert_eq!(h.exchange.calls(), 1);
        assert_eq!(h.manager.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fetch_principal_matches_fetch_by_name() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(30));
        let spn: ServicePrincipalName = SPN.parse().expect("valid SPN");

        let lookup = h.manager.fetch_principal(&spn).await;

        assert_eq!(lookup.into_parts(), (Some(original_entry().into_ticket()), true));
        assert_eq!(h.manager.metrics().hits, 1);
    }

    #[tokio::test]
    async fn test_malformed_spn_is_miss() {
        let h = harness();

        for malformed in ["", "host//svc.example.com", "/svc.example.com"] {
            assert!(malformed.parse::<ServicePrincipalName>().is_err());
            let lookup = h.manager.fetch(malformed).await;
            assert_eq!(lookup.into_parts(), (None, false));
        }

        assert_eq!(h.exchange.calls(), 0);
        assert_eq!(h.manager.metrics().misses, 3);
    }

    #[tokio::test]
    async fn test_late_caller_serves_renewed_entry() {
        let h = harness();
        h.clock.set(t0() + ChronoDuration::minutes(90));
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        h.exchange.push_ok(result.clone());
        assert!(h.manager.fetch(SPN).await.is_valid());

        // A caller that classified the old entry before the renewal landed
        // finds the new one when its flight re-reads the store.
        let outcome = h.manager.renew_single_flight(SPN, TimeDelta::zero()).await;

        assert!(matches!(outcome, FlightOutcome::Current(entry) if entry == CacheEntry::from(result)));
        assert_eq!(h.exchange.calls(), 1);
    }

    #[tokio::test]
    async fn test_from_config_rejects_invalid_interval() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"refresh_interval":"100ms"}"#).unwrap();

        let result = TicketLifecycleManager::from_config(
            TicketStore::new(),
            Arc::new(MockExchange::new()),
            &config,
        );

        assert!(matches!(result, Err(CacheError::Config(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_renews_ahead_of_expiry() {
        let store = TicketStore::new();
        store.add_entry(original_entry());
        let clock = Arc::new(ManualClock::new(t0() + ChronoDuration::minutes(58)));
        let exchange = Arc::new(MockExchange::new());
        let result = renewal_result(SPN, t0(), ChronoDuration::hours(3), ChronoDuration::hours(4));
        exchange.push_ok(result.clone());

        let manager = Arc::new(
            TicketLifecycleManager::new(store, exchange.clone())
                .with_clock(clock.clone())
                .with_renew_ahead(Duration::from_secs(300)),
        )
        .with_refresh_interval(Duration::from_secs(60));

        for _ in 0..10 {
            if manager.metrics().refresh_cycles > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(61)).await;
        }

        let metrics = manager.metrics();
        assert!(metrics.refresh_cycles >= 1);
        assert_eq!(metrics.refresh_renewals, 1);
        assert_eq!(exchange.calls(), 1);
        assert_eq!(manager.store().get(SPN), Some(CacheEntry::from(result)));

        manager.shutdown().await;
        assert!(manager.cancel_token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_counts_failures_without_evicting() {
        let store = TicketStore::new();
        store.add_entry(original_entry());
        let clock = Arc::new(ManualClock::new(t0() + ChronoDuration::minutes(90)));
        let exchange = Arc::new(MockExchange::new());
        exchange.push_err(ExchangeError::connection("kdc unreachable"));

        let manager = Arc::new(TicketLifecycleManager::new(store, exchange.clone()).with_clock(clock))
            .with_refresh_interval(Duration::from_secs(60));

        for _ in 0..10 {
            if manager.metrics().refresh_cycles > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(61)).await;
        }
        manager.shutdown().await;

        let metrics = manager.metrics();
        assert!(metrics.refresh_errors >= 1);
        assert_eq!(metrics.refresh_renewals, 0);
        assert_eq!(manager.store().get(SPN), Some(original_entry()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_refresh_skips_entries_outside_window() {
        let store = TicketStore::new();
        store.add_entry(original_entry());
        let clock = Arc::new(ManualClock::new(t0() + ChronoDuration::minutes(10)));
        let exchange = Arc::new(MockExchange::new());

        let manager = Arc::new(TicketLifecycleManager::new(store, exchange.clone()).with_clock(clock))
            .with_refresh_interval(Duration::from_secs(60));

        for _ in 0..10 {
            if manager.metrics().refresh_cycles > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(61)).await;
        }
        manager.shutdown().await;

        assert!(manager.metrics().refresh_cycles >= 1);
        assert_eq!(exchange.calls(), 0);
    }
}
