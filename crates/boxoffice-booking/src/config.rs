//! Coordinator configuration.
//!
//! Reads configuration from environment variables:
//! - `BOXOFFICE_LOCK_TIMEOUT_MS`: bound on a request's whole lock acquisition
//!   phase; `0` or unset waits forever
//! - `BOXOFFICE_MAX_IN_FLIGHT`: booking tasks allowed to run at once
//!   (default: 64)
//! - `BOXOFFICE_HOLD_DELAY_MS`: pause after every lock acquisition, used to
//!   widen race windows in contention drills (default: 0)

use std::time::Duration;

use crate::error::BookingError;

pub const LOCK_TIMEOUT_VAR: &str = "BOXOFFICE_LOCK_TIMEOUT_MS";
pub const MAX_IN_FLIGHT_VAR: &str = "BOXOFFICE_MAX_IN_FLIGHT";
pub const HOLD_DELAY_VAR: &str = "BOXOFFICE_HOLD_DELAY_MS";

/// Tuning knobs for [`BookingCoordinator`](crate::concurrency::BookingCoordinator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingConfig {
    /// A request still waiting for seat locks after this long is rejected.
    pub lock_wait_timeout: Option<Duration>,
    /// Maximum number of booking tasks running concurrently.
    pub max_in_flight: usize,
    /// Pause after each lock acquisition.
    pub hold_delay: Duration,
}

impl Default for BookingConfig {
    fn default() -> Self {
        BookingConfig {
            lock_wait_timeout: None,
            max_in_flight: 64,
            hold_delay: Duration::ZERO,
        }
    }
}

impl BookingConfig {
    /// Builds a config from `BOXOFFICE_*` environment variables, falling back
    /// to [`BookingConfig::default`] for anything unset.
    pub fn from_env() -> Result<Self, BookingError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, BookingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = BookingConfig::default();

        if let Some(ms) = parse_var::<u64>(&lookup, LOCK_TIMEOUT_VAR)? {
            config.lock_wait_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }
        if let Some(n) = parse_var::<usize>(&lookup, MAX_IN_FLIGHT_VAR)? {
            config.max_in_flight = n;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, HOLD_DELAY_VAR)? {
            config.hold_delay = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_lock_wait_timeout(mut self, timeout: Duration) -> Self {
        self.lock_wait_timeout = Some(timeout);
        self
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn with_hold_delay(mut self, delay: Duration) -> Self {
        self.hold_delay = delay;
        self
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.max_in_flight == 0 {
            return Err(BookingError::Config(format!(
                "{MAX_IN_FLIGHT_VAR} must be at least 1"
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Result<Option<T>, BookingError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| BookingError::Config(format!("{name}={raw:?}: {e}"))),
    }
}
