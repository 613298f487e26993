//! Test doubles for the lifecycle manager.
//!
//! [`ManualClock`] pins `now` to a chosen instant. [`MockExchange`] replays
//! scripted renewal outcomes, records every request, and can hold calls in
//! flight until the test releases them. This module is feature-gated behind
//! `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use std::sync::Arc;
//! use chrono::Duration;
//! use krb_ccache::testutil::{ManualClock, MockExchange, renewal_result};
//! use krb_ccache_storage::testutil::t0;
//!
//! let clock = Arc::new(ManualClock::new(t0()));
//! let exchange = Arc::new(MockExchange::new());
//! exchange.push_ok(renewal_result("host/svc.example.com", t0(), Duration::hours(1), Duration::hours(2)));
//! clock.advance(Duration::minutes(90));
//! ```

use std::{
    collections::VecDeque,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use krb_ccache_storage::{
    ServicePrincipalName, SessionKey, Ticket,
    testutil::{session_key, ticket_for},
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{
    clock::Clock,
    error::{ExchangeError, ExchangeResult},
    exchange::{RenewalResult, TicketExchange},
};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// One exchange request as seen by [`MockExchange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRequest {
    /// Canonical SPN the request was made for.
    pub spn: String,
    /// The presented ticket.
    pub ticket: Ticket,
    /// The session key sent alongside the ticket.
    pub session_key: SessionKey,
    /// Whether the RENEW option was requested.
    pub renew: bool,
}

/// Scripted [`TicketExchange`] implementation.
///
/// Responses are consumed in the order they were pushed. A call with nothing
/// scripted fails with [`ExchangeError::Internal`].
#[derive(Debug)]
pub struct MockExchange {
    script: Mutex<VecDeque<ExchangeResult<RenewalResult>>>,
    requests: Mutex<Vec<ExchangeRequest>>,
    calls: AtomicUsize,
    /// `true` while calls may complete.
    gate: watch::Sender<bool>,
}

impl Default for MockExchange {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExchange {
    /// Creates an exchange with an empty script and an open gate.
    #[must_use]
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            gate,
        }
    }

    /// Queues a successful renewal.
    pub fn push_ok(&self, result: RenewalResult) {
        self.script.lock().push_back(Ok(result));
    }

    /// Queues a failed renewal.
    pub fn push_err(&self, error: ExchangeError) {
        self.script.lock().push_back(Err(error));
    }

    /// Returns the number of exchange calls made so far, including calls
    /// still held at the gate.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns every request received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<ExchangeRequest> {
        self.requests.lock().clone()
    }

    /// Holds subsequent calls in flight until [`open_gate`](Self::open_gate).
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    /// Releases held calls.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }
}

#[async_trait]
impl TicketExchange for MockExchange {
    async fn exchange(
        &self,
        spn: &ServicePrincipalName,
        ticket: &Ticket,
        session_key: &SessionKey,
        renew: bool,
    ) -> ExchangeResult<RenewalResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(ExchangeRequest {
            spn: spn.cache_key(),
            ticket: ticket.clone(),
            session_key: session_key.clone(),
            renew,
        });

        let mut gate = self.gate.subscribe();
        if gate.wait_for(|open| *open).await.is_err() {
            return Err(ExchangeError::internal("mock exchange gate dropped"));
        }

        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(ExchangeError::internal("no scripted exchange response")))
    }
}

/// Builds a renewal reply for `spn`: a new ticket issued at `auth_time`,
/// usable for `lifetime` and renewable for `renewable`, both measured from
/// `auth_time`.
///
/// # Panics
///
/// Panics if `spn` is malformed.
#[must_use]
pub fn renewal_result(
    spn: &str,
    auth_time: DateTime<Utc>,
    lifetime: Duration,
    renewable: Duration,
) -> RenewalResult {
    RenewalResult {
        ticket: ticket_for(spn, auth_time + lifetime),
        auth_time,
        end_time: auth_time + lifetime,
        renew_till: auth_time + renewable,
        session_key: session_key(0xA5),
    }
}
