//! The seams between the driver and the protocol layer: the state
//! machine it executes jobs against, and the sink it flushes responses
//! through.

use async_trait::async_trait;

use crate::error::{Error, Result};

/// The per-connection protocol state machine. Owned by the driver;
/// [`perform`](super::Job::perform)-driven mutation happens only on the
/// task currently draining the connection's batch, so implementations
/// need interior mutability only for the cross-thread signals
/// ([`interrupt`](StateMachine::interrupt),
/// [`mark_for_termination`](StateMachine::mark_for_termination),
/// [`mark_failed`](StateMachine::mark_failed)).
#[async_trait]
pub trait StateMachine: Send + Sync + 'static {
    /// Aborts the currently running operation, if any. Safe to call from
    /// any thread while a job is executing; does not affect queued jobs.
    fn interrupt(&self);

    /// Marks the machine for termination: subsequent jobs fast-fail
    /// instead of doing work. Called by
    /// [`ConnectionDriver::stop`](super::ConnectionDriver::stop).
    fn mark_for_termination(&self);

    /// Records a failure to be delivered to the client as the response to
    /// its next processed message.
    fn mark_failed(&self, error: Error);

    /// Checks that the open transaction, if any, is still valid. Invoked
    /// periodically while the connection is idle so that server-side
    /// timeouts terminate silent sessions. An error is fatal for the
    /// session.
    async fn validate_transaction(&self) -> Result<()>;

    /// Releases the machine's resources. Invoked exactly once, during
    /// teardown.
    async fn close(&self) -> Result<()>;
}

/// The scoped sink protocol responses are buffered into. Owned
/// exclusively by the driver: flushed at the end of each successful
/// batch, closed exactly once on teardown (without a preceding flush on
/// failure paths).
#[async_trait]
pub trait PackOutput: Send + 'static {
    /// Writes buffered responses to the transport.
    async fn flush(&mut self) -> Result<()>;

    /// Releases the sink. Buffered but unflushed responses are dropped.
    async fn close(&mut self) -> Result<()>;
}
