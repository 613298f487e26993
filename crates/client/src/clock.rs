//! Time source abstraction.
//!
//! The lifecycle manager samples the current time exactly once per decision
//! through a [`Clock`], so the validity bands are compared against a single
//! instant. Production code uses [`SystemClock`]; tests inject a manual clock
//! (see `testutil::ManualClock`) for deterministic boundary checks.

use std::fmt;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for validity decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current UTC time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
