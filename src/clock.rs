//! Wall-clock abstraction used for message latency accounting.

use std::time::{SystemTime, UNIX_EPOCH};

/// A millisecond-precision wall clock. The driver reads it when a message
/// is enqueued and again around its execution to derive the queue and
/// processing latencies reported to the
/// [`MetricsListener`](crate::event::MetricsListener).
pub trait Clock: Send + Sync + 'static {
    /// The current time, in milliseconds since an arbitrary fixed epoch.
    fn millis(&self) -> u64;
}

/// The system wall clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn millis(&self) -> u64 {
        // A clock before the epoch reads as zero rather than failing;
        // latencies degrade to zero in that case.
        #[allow(clippy::cast_possible_truncation)]
        {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as u64)
                .unwrap_or_default()
        }
    }
}
