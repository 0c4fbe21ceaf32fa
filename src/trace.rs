//! Tracing targets for the two log channels the driver writes to.
//!
//! The internal channel carries operator-facing diagnostics (stack-level
//! detail, scheduling failures); the user channel carries the messages a
//! database administrator is expected to act on. Subscribers can route
//! them to separate sinks by filtering on target.

/// Target for operator-facing diagnostic events.
pub(crate) const DRIVER_TRACING_TARGET: &str = "wireline::driver";

/// Target for administrator-facing events.
pub(crate) const USER_TRACING_TARGET: &str = "wireline::user";
