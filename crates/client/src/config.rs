//! Configuration for the ticket lifecycle manager.
//!
//! [`CacheConfig`] controls the optional background refresh task. The
//! foreground [`fetch`](crate::TicketLifecycleManager::fetch) path has no
//! tunables: its validity bands are fixed by the ticket's own timestamps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default lead time before `end_time` at which the background task renews
/// a ticket (5 minutes).
pub const DEFAULT_RENEW_AHEAD: Duration = Duration::from_secs(300);

/// Smallest accepted background refresh interval (1 second).
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Settings for [`TicketLifecycleManager`](crate::TicketLifecycleManager).
///
/// Durations use humantime notation when deserialized (`"30s"`, `"5m"`).
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use krb_ccache::CacheConfig;
///
/// let config = CacheConfig::builder()
///     .refresh_interval(Duration::from_secs(60))
///     .renew_ahead(Duration::from_secs(600))
///     .build()?;
///
/// assert_eq!(config.refresh_interval(), Some(Duration::from_secs(60)));
/// # Ok::<(), krb_ccache::ConfigError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Background refresh period. `None` disables background refresh.
    #[serde(with = "humantime_serde", default)]
    refresh_interval: Option<Duration>,

    /// How long before `end_time` the background task renews a ticket.
    #[serde(with = "humantime_serde", default = "default_renew_ahead")]
    renew_ahead: Duration,
}

fn default_renew_ahead() -> Duration {
    DEFAULT_RENEW_AHEAD
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { refresh_interval: None, renew_ahead: DEFAULT_RENEW_AHEAD }
    }
}

#[bon::bon]
impl CacheConfig {
    /// Creates a validated configuration.
    ///
    /// # Optional Fields
    ///
    /// * `refresh_interval` - Background refresh period (default: disabled).
    /// * `renew_ahead` - Renewal lead time for the background task (default: 5 minutes).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `refresh_interval` is shorter
    /// than [`MIN_REFRESH_INTERVAL`].
    #[builder]
    pub fn new(
        refresh_interval: Option<Duration>,
        #[builder(default = DEFAULT_RENEW_AHEAD)] renew_ahead: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { refresh_interval, renew_ahead };
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants that deserialization cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BelowMinimum`] if `refresh_interval` is shorter
    /// than [`MIN_REFRESH_INTERVAL`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(interval) = self.refresh_interval
            && interval < MIN_REFRESH_INTERVAL
        {
            return Err(ConfigError::BelowMinimum {
                field: "refresh_interval",
                min: MIN_REFRESH_INTERVAL,
                value: interval,
            });
        }
        Ok(())
    }

    /// Returns the background refresh period, if enabled.
    #[must_use]
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval
    }

    /// Returns the background renewal lead time.
    #[must_use]
    pub fn renew_ahead(&self) -> Duration {
        self.renew_ahead
    }
}
