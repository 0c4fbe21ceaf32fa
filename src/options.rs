//! Contains the options for constructing a
//! [`ConnectionDriver`](crate::ConnectionDriver).
//!
//! [`DriverOptions`] uses the
//! [`typed-builder`](https://crates.io/crates/typed-builder) crate to
//! derive a type-safe builder API. For example, to create an instance
//! with only `max_batch_size` set:
//!
//! ```rust
//! # use wireline::options::DriverOptions;
//! #
//! let options = DriverOptions::builder().max_batch_size(10).build();
//! ```

use std::{
    fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use typed_builder::TypedBuilder;

use crate::{
    clock::Clock,
    event::{LifecycleListener, QueueMonitor},
};

/// The default upper bound on the number of jobs drained and executed by
/// one call to [`process_next_batch`](crate::ConnectionDriver::process_next_batch).
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// How long an idle drain waits for a job before asking the state machine
/// to revalidate its open transaction.
pub(crate) const DEFAULT_JOB_WAIT_INTERVAL: Duration = Duration::from_secs(10);

/// Environment variable overriding [`DEFAULT_MAX_BATCH_SIZE`] process-wide.
pub const MAX_BATCH_SIZE_ENV: &str = "WIRELINE_MAX_BATCH_SIZE";

/// The process-wide batch size: the environment override if present and a
/// positive integer, the default otherwise. Read once and cached;
/// changing the variable afterwards has no effect.
pub(crate) fn configured_max_batch_size() -> usize {
    static CONFIGURED: OnceLock<usize> = OnceLock::new();
    *CONFIGURED.get_or_init(|| {
        std::env::var(MAX_BATCH_SIZE_ENV)
            .ok()
            .and_then(|raw| raw.parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_MAX_BATCH_SIZE)
    })
}

/// Options for constructing a [`ConnectionDriver`](crate::ConnectionDriver).
#[derive(Clone, Default, TypedBuilder)]
#[non_exhaustive]
pub struct DriverOptions {
    /// The maximum number of jobs drained and executed by a single batch.
    /// Defaults to the process-wide configured value.
    #[builder(default, setter(strip_option))]
    pub max_batch_size: Option<usize>,

    /// How long an idle drain waits for a job before revalidating the
    /// open transaction. Defaults to ten seconds.
    #[builder(default, setter(strip_option))]
    pub job_wait_interval: Option<Duration>,

    /// Receives `created` and `closed` notifications for the connection.
    #[builder(default, setter(strip_option))]
    pub lifecycle_listener: Option<Arc<dyn LifecycleListener>>,

    /// Observes jobs entering and leaving the queue.
    #[builder(default, setter(strip_option))]
    pub queue_monitor: Option<Arc<dyn QueueMonitor>>,

    /// The wall clock used for latency accounting. Defaults to the system
    /// clock.
    #[builder(default, setter(strip_option))]
    pub clock: Option<Arc<dyn Clock>>,
}

impl fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverOptions")
            .field("max_batch_size", &self.max_batch_size)
            .field("job_wait_interval", &self.job_wait_interval)
            .field(
                "lifecycle_listener",
                &self.lifecycle_listener.as_ref().map(|_| ".."),
            )
            .field("queue_monitor", &self.queue_monitor.as_ref().map(|_| ".."))
            .field("clock", &self.clock.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_leave_everything_unset() {
        let options = DriverOptions::builder().build();
        assert!(options.max_batch_size.is_none());
        assert!(options.job_wait_interval.is_none());
        assert!(options.lifecycle_listener.is_none());
        assert!(options.queue_monitor.is_none());
        assert!(options.clock.is_none());
    }

    #[test]
    fn configured_batch_size_has_a_positive_default() {
        assert!(configured_max_batch_size() > 0);
    }
}
