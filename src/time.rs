//! Clock abstraction so tests can control time instead of sleeping real durations.
//!
//! Mirrors the process-wide-default-with-per-caller-override shape used for the error
//! handler singleton: a [`TimeProvider`] can be injected per [`crate::foundry::Foundry`],
//! and a process-wide default is available via [`default_time_provider`] for code paths
//! that don't thread one through explicitly (timing middleware, for instance).

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;

/// Abstraction over wall-clock and monotonic time.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn monotonic_now(&self) -> Instant;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_now(&self) -> Instant {
        Instant::now()
    }
}

static DEFAULT_TIME_PROVIDER: OnceCell<Arc<dyn TimeProvider>> = OnceCell::new();

/// Set the process-wide default time provider. Only the first call takes effect; later
/// calls are ignored, matching the once-at-bootstrap singleton pattern used elsewhere in
/// this crate.
pub fn set_default_time_provider(provider: Arc<dyn TimeProvider>) {
    let _ = DEFAULT_TIME_PROVIDER.set(provider);
}

/// The process-wide default, falling back to [`SystemTimeProvider`] if nothing was set.
pub fn default_time_provider() -> Arc<dyn TimeProvider> {
    DEFAULT_TIME_PROVIDER
        .get_or_init(|| Arc::new(SystemTimeProvider))
        .clone()
}
