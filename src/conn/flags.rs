//! The minimal lifecycle state machine of a connection, encoded as three
//! booleans.

use std::sync::atomic::{AtomicBool, Ordering};

/// `should_close` and `closed` are monotonic: each transitions
/// false-to-true at most once, and `closed` implies `should_close`.
/// `idle` toggles with the drain: false while a worker is running the
/// connection's batch, true otherwise.
#[derive(Debug)]
pub(crate) struct LifecycleFlags {
    should_close: AtomicBool,
    closed: AtomicBool,
    idle: AtomicBool,
}

impl LifecycleFlags {
    pub(crate) fn new() -> Self {
        Self {
            should_close: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            idle: AtomicBool::new(true),
        }
    }

    pub(crate) fn should_close(&self) -> bool {
        self.should_close.load(Ordering::SeqCst)
    }

    /// Requests teardown. Returns whether this call made the transition.
    pub(crate) fn mark_should_close(&self) -> bool {
        self.should_close
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Records teardown. Returns whether this call made the transition.
    pub(crate) fn mark_closed(&self) -> bool {
        self.closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_transitions_happen_once() {
        let flags = LifecycleFlags::new();
        assert!(!flags.should_close());
        assert!(flags.mark_should_close());
        assert!(!flags.mark_should_close());
        assert!(flags.should_close());

        assert!(flags.mark_closed());
        assert!(!flags.mark_closed());
        assert!(flags.closed());
    }

    #[test]
    fn idle_toggles_freely() {
        let flags = LifecycleFlags::new();
        assert!(flags.idle());
        flags.set_idle(false);
        assert!(!flags.idle());
        flags.set_idle(true);
        assert!(flags.idle());
    }
}
