//! Contains the traits through which external components observe the
//! lifecycle and activity of a connection.
//!
//! All observers must be thread-safe: lifecycle notifications fire on
//! whichever thread reaches the transition first, and queue notifications
//! fire on producer threads as well as the drain.

pub mod metrics;

pub use metrics::{MetricsEmitter, MetricsListener};

use crate::conn::{job::BoxedJob, ConnectionDriver};

/// Receives the two lifecycle notifications of a connection. `created`
/// fires exactly once, from [`ConnectionDriver::start`]; `closed` fires
/// exactly once, during teardown. A server typically uses this to
/// maintain its set of live connections.
pub trait LifecycleListener: Send + Sync + 'static {
    /// The connection has been started.
    fn created(&self, conn: &ConnectionDriver);

    /// The connection has been torn down. The driver will touch neither
    /// the state machine nor the output sink again.
    fn closed(&self, conn: &ConnectionDriver);
}

/// Observes jobs entering and leaving a connection's queue.
pub trait QueueMonitor: Send + Sync + 'static {
    /// A job was appended to the queue. Fires on the producer's thread.
    fn enqueued(&self, conn: &ConnectionDriver);

    /// A non-empty batch of jobs was drained for execution. Fires on the
    /// drain thread, before the first job of the batch runs.
    fn drained(&self, conn: &ConnectionDriver, jobs: &[BoxedJob]);
}
