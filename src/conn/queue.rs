//! The multi-producer, single-consumer job queue of a connection.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use futures_util::FutureExt;
use tokio::sync::mpsc;

use super::job::BoxedJob;

/// Creates the producer and consumer halves of a connection's queue.
/// Producers are cheap to clone; exactly one consumer exists, owned by
/// the drain state.
pub(crate) fn channel() -> (JobQueue, JobConsumer) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    (
        JobQueue {
            sender,
            pending: pending.clone(),
        },
        JobConsumer { receiver, pending },
    )
}

/// The producer half: unbounded, non-blocking appends from any thread.
/// Backpressure is the transport layer's responsibility; a decoder must
/// never stall its event loop on enqueue.
#[derive(Clone)]
pub(crate) struct JobQueue {
    sender: mpsc::UnboundedSender<BoxedJob>,
    pending: Arc<AtomicUsize>,
}

impl JobQueue {
    /// Appends a job at the tail. Never fails: the consumer half lives as
    /// long as the driver, so a send error can only happen after
    /// teardown, when queued jobs are discarded anyway.
    pub(crate) fn offer(&self, job: BoxedJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }
}

/// The consumer half. Held behind the drain lock; at most one task reads
/// from it at a time.
pub(crate) struct JobConsumer {
    receiver: mpsc::UnboundedReceiver<BoxedJob>,
    pending: Arc<AtomicUsize>,
}

impl JobConsumer {
    /// Moves up to `limit` jobs from the head of the queue into `batch`,
    /// returning how many were moved. Never waits: `recv` is polled once
    /// per element and abandoned as soon as the queue comes up empty.
    pub(crate) fn drain_up_to(&mut self, batch: &mut VecDeque<BoxedJob>, limit: usize) -> usize {
        let mut moved = 0;
        while moved < limit {
            match self.receiver.recv().now_or_never() {
                Some(Some(job)) => {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    batch.push_back(job);
                    moved += 1;
                }
                _ => break,
            }
        }
        moved
    }

    /// Waits up to `wait` for one job to arrive.
    pub(crate) async fn poll_with_timeout(&mut self, wait: Duration) -> Option<BoxedJob> {
        match tokio::time::timeout(wait, self.receiver.recv()).await {
            Ok(Some(job)) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(job)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::{
        conn::{machine::StateMachine, Job},
        error::Result,
    };

    struct NoopJob;

    #[async_trait]
    impl Job for NoopJob {
        async fn perform(&mut self, _machine: &dyn StateMachine) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn drain_respects_the_limit() {
        let (queue, mut consumer) = channel();
        for _ in 0..5 {
            queue.offer(Box::new(NoopJob));
        }

        let mut batch = VecDeque::new();
        assert_eq!(consumer.drain_up_to(&mut batch, 3), 3);
        assert_eq!(batch.len(), 3);
        assert!(queue.has_pending());

        assert_eq!(consumer.drain_up_to(&mut batch, 3), 2);
        assert_eq!(batch.len(), 5);
        assert!(!queue.has_pending());

        assert_eq!(consumer.drain_up_to(&mut batch, 3), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn poll_times_out_when_nothing_arrives() {
        let (_queue, mut consumer) = channel();
        let polled = consumer.poll_with_timeout(Duration::from_secs(10)).await;
        assert!(polled.is_none());
    }

    #[tokio::test]
    async fn poll_returns_an_enqueued_job() {
        let (queue, mut consumer) = channel();
        queue.offer(Box::new(NoopJob));
        let polled = consumer.poll_with_timeout(Duration::from_secs(10)).await;
        assert!(polled.is_some());
        assert!(!queue.has_pending());
    }
}
