//! Contains the connection driver itself.

use std::{collections::VecDeque, fmt, net::SocketAddr, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{
    flags::LifecycleFlags,
    job::{BoxedJob, MeteredJob, WakeJob},
    machine::{PackOutput, StateMachine},
    queue::{self, JobConsumer, JobQueue},
    Channel,
};
use crate::{
    clock::{Clock, SystemClock},
    error::{Error, ErrorKind, Result},
    event::{LifecycleListener, MetricsEmitter, MetricsListener, QueueMonitor},
    options::{self, DriverOptions, DEFAULT_JOB_WAIT_INTERVAL},
    trace::{DRIVER_TRACING_TARGET, USER_TRACING_TARGET},
};

/// The execution driver of one accepted connection.
///
/// The driver sits between the transport's decoder and the protocol
/// state machine. Producers append jobs with [`enqueue`](Self::enqueue)
/// from any thread; a worker pool awaits
/// [`process_next_batch`](Self::process_next_batch) whenever the
/// connection has pending work. The worker pool must never run two
/// batches for the same connection concurrently; under that contract the
/// driver guarantees that the state machine is touched by one task at a
/// time, that jobs execute in enqueue order, and that teardown happens
/// exactly once.
///
/// The driver owns no thread. Teardown, whether triggered by
/// [`stop`](Self::stop), by a fatal job, or by
/// [`handle_scheduling_error`](Self::handle_scheduling_error), always
/// runs on the worker executing the final batch.
pub struct ConnectionDriver {
    id: String,
    channel: Arc<dyn Channel>,
    machine: Arc<dyn StateMachine>,
    queue: JobQueue,
    drain: Mutex<DrainState>,
    flags: LifecycleFlags,
    max_batch_size: usize,
    job_wait_interval: Duration,
    listener: Option<Arc<dyn LifecycleListener>>,
    queue_monitor: Option<Arc<dyn QueueMonitor>>,
    metrics: MetricsEmitter,
    clock: Arc<dyn Clock>,
}

/// State touched only by the task currently draining the connection. The
/// worker-pool contract keeps the lock uncontended; it exists so the
/// shared driver can own the consumer, the batch scratch buffer, and the
/// output sink. `enqueue`, `stop`, and `interrupt` never take it.
struct DrainState {
    consumer: JobConsumer,
    batch: VecDeque<BoxedJob>,
    output: Box<dyn PackOutput>,
}

impl ConnectionDriver {
    /// Creates a driver for an accepted channel. The connection id is
    /// taken from the channel. No notifications fire until
    /// [`start`](Self::start).
    pub fn new(
        channel: Arc<dyn Channel>,
        machine: Arc<dyn StateMachine>,
        output: Box<dyn PackOutput>,
        metrics: Arc<dyn MetricsListener>,
        options: DriverOptions,
    ) -> Self {
        // A batch size below one would stall the drain.
        let max_batch_size = options
            .max_batch_size
            .unwrap_or_else(options::configured_max_batch_size)
            .max(1);
        let (queue, consumer) = queue::channel();

        Self {
            id: channel.id().to_string(),
            channel,
            machine,
            queue,
            drain: Mutex::new(DrainState {
                consumer,
                batch: VecDeque::with_capacity(max_batch_size),
                output,
            }),
            flags: LifecycleFlags::new(),
            max_batch_size,
            job_wait_interval: options.job_wait_interval.unwrap_or(DEFAULT_JOB_WAIT_INTERVAL),
            listener: options.lifecycle_listener,
            queue_monitor: options.queue_monitor,
            metrics: MetricsEmitter::new(metrics),
            clock: options.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        }
    }

    /// Announces the connection: fires the lifecycle `created`
    /// notification and the `connection_opened` metric. Called exactly
    /// once, before any job is enqueued.
    pub fn start(&self) {
        if let Some(ref listener) = self.listener {
            listener.created(self);
        }
        self.metrics.connection_opened();
    }

    /// Appends a request job to the queue. Never blocks and never fails.
    ///
    /// The job is wrapped with latency accounting: when it is eventually
    /// dispatched the driver reports the time it spent enqueued, and on
    /// completion the time it spent executing (or a failure event).
    pub fn enqueue(&self, job: BoxedJob) {
        self.metrics.message_received();
        let metered = MeteredJob::new(
            job,
            self.clock.millis(),
            self.clock.clone(),
            self.metrics.clone(),
        );
        self.enqueue_internal(Box::new(metered));
    }

    fn enqueue_internal(&self, job: BoxedJob) {
        self.queue.offer(job);
        if let Some(ref monitor) = self.queue_monitor {
            monitor.enqueued(self);
        }
    }

    /// Drains and executes up to `max_batch_size` jobs, flushes the
    /// output sink, and returns whether the connection is still alive.
    /// If the queue is empty, parks waiting for a job, periodically
    /// asking the state machine to revalidate its open transaction.
    ///
    /// The worker pool must not invoke this concurrently for one
    /// connection. A `false` return means the connection has closed and
    /// must be dropped from the pool's active set.
    pub async fn process_next_batch(&self) -> bool {
        self.process_batch(self.max_batch_size, false).await
    }

    pub(crate) async fn process_batch(&self, limit: usize, exit_if_no_jobs: bool) -> bool {
        let mut drain = self.drain.lock().await;
        if self.flags.closed() {
            return false;
        }

        self.flags.set_idle(false);
        self.metrics.connection_activated();

        if let Err(error) = self.drain_loop(&mut drain, limit, exit_if_no_jobs).await {
            self.handle_fatal_error(&error);
        }
        if self.flags.should_close() {
            self.close(&mut drain).await;
        }

        self.flags.set_idle(true);
        self.metrics.connection_waiting();
        !self.flags.closed()
    }

    async fn drain_loop(
        &self,
        drain: &mut DrainState,
        limit: usize,
        exit_if_no_jobs: bool,
    ) -> Result<()> {
        let mut remaining = limit;
        loop {
            if self.flags.should_close() {
                break;
            }

            drain.consumer.drain_up_to(&mut drain.batch, remaining);
            if drain.batch.is_empty() {
                if exit_if_no_jobs {
                    break;
                }
                self.wait_for_jobs(drain).await?;
            }

            if !drain.batch.is_empty() {
                if let Some(ref monitor) = self.queue_monitor {
                    monitor.drained(self, drain.batch.make_contiguous());
                }
                // Reduced by jobs drained, not executed: a job that fails
                // abandons the rest of its batch.
                remaining = remaining.saturating_sub(drain.batch.len());
                // Jobs are popped before execution so that a failure
                // leaves the undispatched remainder to be discarded by
                // the final close.
                while let Some(mut job) = drain.batch.pop_front() {
                    job.perform(self.machine.as_ref()).await?;
                }
            }

            if remaining == 0 || !self.queue.has_pending() {
                break;
            }
        }

        // Reached only when every dispatched job succeeded; failure paths
        // close the output without flushing.
        drain.output.flush().await?;
        Ok(())
    }

    /// Parks until a job arrives or teardown is requested. Each time the
    /// poll interval elapses with nothing enqueued, the state machine is
    /// asked to revalidate its open transaction so that server-side
    /// timeouts can terminate a session whose client has gone silent.
    async fn wait_for_jobs(&self, drain: &mut DrainState) -> Result<()> {
        while !self.flags.should_close() {
            match drain.consumer.poll_with_timeout(self.job_wait_interval).await {
                Some(job) => {
                    drain.batch.push_back(job);
                    break;
                }
                None => self.machine.validate_transaction().await?,
            }
        }
        Ok(())
    }

    fn handle_fatal_error(&self, error: &Error) {
        self.flags.mark_should_close();
        match error.kind.as_ref() {
            ErrorKind::Authentication { message, loggable } => {
                if *loggable {
                    warn!(
                        target: USER_TRACING_TARGET,
                        connection_id = %self.id,
                        "{}",
                        message,
                    );
                }
            }
            ErrorKind::ProtocolBreach { .. } => {
                error!(
                    target: DRIVER_TRACING_TARGET,
                    connection_id = %self.id,
                    error = %error,
                    "Protocol breach detected in connection",
                );
            }
            ErrorKind::Interrupted => {
                info!(
                    target: DRIVER_TRACING_TARGET,
                    connection_id = %self.id,
                    "Connection interrupted during server shutdown",
                );
            }
            _ => {
                error!(
                    target: USER_TRACING_TARGET,
                    connection_id = %self.id,
                    error = %error,
                    "Unexpected error while processing connection",
                );
            }
        }
    }

    /// Requests orderly teardown. Idempotent. The state machine is marked
    /// for termination immediately, so jobs still queued fast-fail; the
    /// teardown itself runs on the worker executing the final batch. A
    /// wake job is enqueued so that a drain parked waiting for jobs
    /// notices the request, and so that an empty queue still yields one
    /// final batch.
    pub fn stop(&self) {
        if self.flags.mark_should_close() {
            self.machine.mark_for_termination();
            self.enqueue_internal(Box::new(WakeJob));
        }
    }

    /// Aborts the job the state machine is currently running, if any.
    /// Safe from any thread; queued jobs and lifecycle flags are
    /// untouched.
    pub fn interrupt(&self) {
        self.machine.interrupt();
    }

    /// Invoked by the worker pool when it failed to schedule this
    /// connection. Delivers a structured failure to the client if
    /// possible, then closes the connection on the caller's task.
    ///
    /// A cause chain containing a
    /// [`SchedulingRejected`](crate::error::ErrorKind::SchedulingRejected)
    /// error is reported to the client as
    /// [`NoThreadsAvailable`](crate::error::ErrorKind::NoThreadsAvailable);
    /// anything else is treated as unexpected.
    pub async fn handle_scheduling_error(&self, cause: Error) {
        if self.flags.should_close() {
            return;
        }

        let error = if cause.is_scheduling_rejection() {
            Error::no_threads_available()
        } else {
            Error::internal("unexpected error while scheduling connection for execution")
                .with_source(cause)
        };
        error!(
            target: DRIVER_TRACING_TARGET,
            connection_id = %self.id,
            error = %error,
            "Unable to schedule connection for execution",
        );
        error!(
            target: USER_TRACING_TARGET,
            connection_id = %self.id,
            "Unable to serve connection: {}",
            error,
        );

        self.machine.mark_failed(error);
        // One single-job pass on the caller's task lets the state machine
        // emit the failure response; exit_if_no_jobs avoids parking when
        // the queue is empty. The pass may itself close the connection,
        // which makes the close below a no-op.
        self.process_batch(1, true).await;

        let mut drain = self.drain.lock().await;
        self.close(&mut drain).await;
    }

    /// Tears the connection down: closes the output sink, then the state
    /// machine, then notifies observers. Errors from either close are
    /// logged and swallowed so that the second resource is still released
    /// and the lifecycle notification still fires. Idempotent via the
    /// `closed` flag.
    async fn close(&self, drain: &mut DrainState) {
        // closed implies should_close, including on paths that bypass
        // stop().
        self.flags.mark_should_close();
        if !self.flags.mark_closed() {
            return;
        }

        // Jobs drained but never dispatched die with the connection.
        drain.batch.clear();

        if let Err(error) = drain.output.close().await {
            error!(
                target: DRIVER_TRACING_TARGET,
                connection_id = %self.id,
                error = %error,
                "Failed to close the output sink",
            );
        }
        if let Err(error) = self.machine.close().await {
            error!(
                target: DRIVER_TRACING_TARGET,
                connection_id = %self.id,
                error = %error,
                "Failed to close the state machine",
            );
        }

        if let Some(ref listener) = self.listener {
            listener.closed(self);
        }
        self.metrics.connection_closed();
    }

    /// The connection's stable identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The channel the connection was accepted on.
    pub fn channel(&self) -> &Arc<dyn Channel> {
        &self.channel
    }

    /// The server-side address of the connection.
    pub fn local_address(&self) -> SocketAddr {
        self.channel.local_addr()
    }

    /// The client's address.
    pub fn remote_address(&self) -> SocketAddr {
        self.channel.remote_addr()
    }

    /// Whether any jobs are queued and not yet drained.
    pub fn has_pending_jobs(&self) -> bool {
        self.queue.has_pending()
    }

    /// The composite "nothing is happening here" predicate: no worker is
    /// draining the connection and the queue is empty. External sweepers
    /// use this to find quiescent sessions.
    pub fn idle(&self) -> bool {
        self.flags.idle() && !self.queue.has_pending()
    }
}

impl fmt::Debug for ConnectionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDriver")
            .field("id", &self.id)
            .field("flags", &self.flags)
            .field("max_batch_size", &self.max_batch_size)
            .finish_non_exhaustive()
    }
}

/// Stamps out a [`ConnectionDriver`] per accepted channel, binding the
/// collaborators that are shared server-wide (metrics listener,
/// lifecycle listener, queue monitor, clock, tuning) once.
pub struct ConnectionDriverFactory {
    metrics: Arc<dyn MetricsListener>,
    options: DriverOptions,
}

impl ConnectionDriverFactory {
    /// Creates a factory from the shared collaborators.
    pub fn new(metrics: Arc<dyn MetricsListener>, options: DriverOptions) -> Self {
        Self { metrics, options }
    }

    /// Creates a driver for a newly accepted channel. The caller still
    /// invokes [`ConnectionDriver::start`] once the connection is
    /// registered.
    pub fn create(
        &self,
        channel: Arc<dyn Channel>,
        machine: Arc<dyn StateMachine>,
        output: Box<dyn PackOutput>,
    ) -> ConnectionDriver {
        ConnectionDriver::new(
            channel,
            machine,
            output,
            self.metrics.clone(),
            self.options.clone(),
        )
    }
}

impl fmt::Debug for ConnectionDriverFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionDriverFactory")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
