//! Contains the types for monitoring the throughput and latency of a
//! connection.

use std::{fmt, sync::Arc, time::Duration};

/// Receives counter and timing events for a connection. Implementations
/// typically forward to a metrics registry; every callback is invoked on
/// a hot path and must not block.
pub trait MetricsListener: Send + Sync + 'static {
    /// A connection was started.
    fn connection_opened(&self);

    /// A worker began draining a batch for a connection.
    fn connection_activated(&self);

    /// A worker finished draining a batch; the connection is waiting for
    /// its next scheduling.
    fn connection_waiting(&self);

    /// A connection was torn down.
    fn connection_closed(&self);

    /// A request message was received and enqueued.
    fn message_received(&self);

    /// A message began executing after spending `queue_time` enqueued.
    fn message_processing_started(&self, queue_time: Duration);

    /// A message finished executing successfully after `processing_time`.
    fn message_processing_completed(&self, processing_time: Duration);

    /// A message raised an error during execution.
    fn message_processing_failed(&self);
}

/// The type responsible for emitting metrics events to the
/// user-specified listener. Cheap to clone; clones share the listener.
#[derive(Clone)]
pub struct MetricsEmitter {
    listener: Arc<dyn MetricsListener>,
}

impl MetricsEmitter {
    /// Creates an emitter forwarding to the given listener.
    pub fn new(listener: Arc<dyn MetricsListener>) -> Self {
        Self { listener }
    }

    pub(crate) fn connection_opened(&self) {
        self.listener.connection_opened();
    }

    pub(crate) fn connection_activated(&self) {
        self.listener.connection_activated();
    }

    pub(crate) fn connection_waiting(&self) {
        self.listener.connection_waiting();
    }

    pub(crate) fn connection_closed(&self) {
        self.listener.connection_closed();
    }

    pub(crate) fn message_received(&self) {
        self.listener.message_received();
    }

    pub(crate) fn message_processing_started(&self, queue_time: Duration) {
        self.listener.message_processing_started(queue_time);
    }

    pub(crate) fn message_processing_completed(&self, processing_time: Duration) {
        self.listener.message_processing_completed(processing_time);
    }

    pub(crate) fn message_processing_failed(&self) {
        self.listener.message_processing_failed();
    }
}

impl fmt::Debug for MetricsEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsEmitter").finish_non_exhaustive()
    }
}
