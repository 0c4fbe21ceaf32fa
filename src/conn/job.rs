//! Contains the unit of work executed against a connection's state
//! machine.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use super::machine::StateMachine;
use crate::{clock::Clock, error::Result, event::MetricsEmitter};

/// A unit of protocol work. A protocol decoder turns each inbound request
/// message into a job; the driver executes jobs serially, in enqueue
/// order, on the single worker currently draining the connection.
///
/// An error returned from [`perform`](Job::perform) is fatal for the
/// session: the driver abandons the rest of the current batch and tears
/// the connection down.
#[async_trait]
pub trait Job: Send + 'static {
    /// Performs one protocol step against the state machine.
    async fn perform(&mut self, machine: &dyn StateMachine) -> Result<()>;
}

/// An owned, type-erased [`Job`].
pub type BoxedJob = Box<dyn Job>;

/// Wraps a client job with latency accounting: queue time on dispatch,
/// processing time on success, a failure event on error.
pub(crate) struct MeteredJob {
    inner: BoxedJob,
    enqueued_at: u64,
    clock: Arc<dyn Clock>,
    metrics: MetricsEmitter,
}

impl MeteredJob {
    pub(crate) fn new(
        inner: BoxedJob,
        enqueued_at: u64,
        clock: Arc<dyn Clock>,
        metrics: MetricsEmitter,
    ) -> Self {
        Self {
            inner,
            enqueued_at,
            clock,
            metrics,
        }
    }
}

#[async_trait]
impl Job for MeteredJob {
    async fn perform(&mut self, machine: &dyn StateMachine) -> Result<()> {
        let started_at = self.clock.millis();
        let queue_time = Duration::from_millis(started_at.saturating_sub(self.enqueued_at));
        self.metrics.message_processing_started(queue_time);

        match self.inner.perform(machine).await {
            Ok(()) => {
                let processing_time =
                    Duration::from_millis(self.clock.millis().saturating_sub(started_at));
                self.metrics.message_processing_completed(processing_time);
                Ok(())
            }
            Err(error) => {
                self.metrics.message_processing_failed();
                Err(error)
            }
        }
    }
}

/// Does nothing when performed. Enqueued by
/// [`ConnectionDriver::stop`](super::ConnectionDriver::stop) purely to
/// wake a drain parked waiting for jobs so that teardown runs on the
/// worker thread.
pub(crate) struct WakeJob;

#[async_trait]
impl Job for WakeJob {
    async fn perform(&mut self, _machine: &dyn StateMachine) -> Result<()> {
        Ok(())
    }
}
