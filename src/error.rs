//! Contains the `Error` and `Result` types that `wireline` uses.

use std::sync::Arc;

use thiserror::Error;

/// The result type for all fallible operations in the `wireline` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while driving a connection. The inner
/// [`ErrorKind`] is boxed to keep the type cheap to move through the job
/// queue, and the whole error is cloneable so it can be handed to the
/// state machine for the failure response while also being logged.
#[derive(Clone, Debug, Error)]
#[error("Kind: {kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
    #[source]
    pub(crate) source: Option<Box<Error>>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            source: None,
        }
    }

    /// Creates an authentication error. Errors marked loggable are
    /// reported on the user log channel when they terminate a session;
    /// unloggable ones close the session silently.
    pub fn authentication(message: impl Into<String>, loggable: bool) -> Self {
        ErrorKind::Authentication {
            message: message.into(),
            loggable,
        }
        .into()
    }

    /// Creates an error signalling that the client violated the wire
    /// protocol.
    pub fn protocol_breach(message: impl Into<String>) -> Self {
        ErrorKind::ProtocolBreach {
            message: message.into(),
        }
        .into()
    }

    /// Creates the error used when a session is interrupted as part of an
    /// orderly shutdown.
    pub fn interrupted() -> Self {
        ErrorKind::Interrupted.into()
    }

    /// Creates the error reported by a worker pool that refused to
    /// schedule a connection for execution.
    pub fn scheduling_rejected(message: impl Into<String>) -> Self {
        ErrorKind::SchedulingRejected {
            message: message.into(),
        }
        .into()
    }

    pub(crate) fn no_threads_available() -> Self {
        ErrorKind::NoThreadsAvailable {
            message: "There are no available worker threads to serve this connection at the \
                      moment. You can retry at a later time or consider increasing the size of \
                      the worker pool serving connections."
                .to_string(),
        }
        .into()
    }

    /// Creates an error for a failure that has no more specific category.
    pub fn internal(message: impl Into<String>) -> Self {
        ErrorKind::Internal {
            message: message.into(),
        }
        .into()
    }

    /// Attaches a causing error, replacing any previous cause.
    pub fn with_source(mut self, source: impl Into<Option<Error>>) -> Self {
        self.source = source.into().map(Box::new);
        self
    }

    /// Whether this error, or any error in its cause chain, is a
    /// scheduling rejection reported by a worker pool.
    pub fn is_scheduling_rejection(&self) -> bool {
        matches!(self.kind.as_ref(), ErrorKind::SchedulingRejected { .. })
            || self
                .source
                .as_ref()
                .is_some_and(|source| source.is_scheduling_rejection())
    }

    #[cfg(test)]
    pub(crate) fn message(&self) -> Option<String> {
        match self.kind.as_ref() {
            ErrorKind::Authentication { message, .. }
            | ErrorKind::ProtocolBreach { message }
            | ErrorKind::NoThreadsAvailable { message }
            | ErrorKind::SchedulingRejected { message }
            | ErrorKind::Internal { message } => Some(message.clone()),
            _ => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        ErrorKind::Io(Arc::new(error)).into()
    }
}

impl From<std::io::ErrorKind> for Error {
    fn from(error: std::io::ErrorKind) -> Self {
        ErrorKind::Io(Arc::new(error.into())).into()
    }
}

/// The types of errors that can occur while driving a connection. Every
/// variant is fatal for the session it occurs on; the categories exist to
/// select the log channel and level used when the session is torn down.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The client failed to authenticate, or its authorization expired.
    #[error("authentication failure: {message}")]
    #[non_exhaustive]
    Authentication {
        /// A description of the failure.
        message: String,
        /// Whether the failure may be reported on the user log channel.
        loggable: bool,
    },

    /// The client violated the wire protocol, e.g. by sending a message
    /// that is not permitted in the current state.
    #[error("protocol breach: {message}")]
    #[non_exhaustive]
    ProtocolBreach {
        /// A description of the violation.
        message: String,
    },

    /// The session was interrupted by an orderly server shutdown.
    #[error("session interrupted during shutdown")]
    Interrupted,

    /// The worker pool had no capacity to run this connection. This is
    /// the structured error delivered to the client before the
    /// connection closes.
    #[error("scheduling failure: {message}")]
    #[non_exhaustive]
    NoThreadsAvailable {
        /// A description of the failure, including remediation advice.
        message: String,
    },

    /// A worker pool refused to schedule this connection. Recognized
    /// anywhere in a cause chain by
    /// [`ConnectionDriver::handle_scheduling_error`](crate::ConnectionDriver::handle_scheduling_error).
    #[error("scheduling rejected: {message}")]
    #[non_exhaustive]
    SchedulingRejected {
        /// The rejection reported by the pool.
        message: String,
    },

    /// An I/O error occurred, e.g. while flushing the output sink.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// An error with no more specific category.
    #[error("internal error: {message}")]
    #[non_exhaustive]
    Internal {
        /// A description of the failure.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduling_rejection_is_found_in_cause_chain() {
        let direct = Error::scheduling_rejected("queue full");
        assert!(direct.is_scheduling_rejection());

        let wrapped = Error::internal("could not hand off connection")
            .with_source(Error::scheduling_rejected("queue full"));
        assert!(wrapped.is_scheduling_rejection());

        let unrelated = Error::internal("broken").with_source(Error::interrupted());
        assert!(!unrelated.is_scheduling_rejection());
    }

    #[test]
    fn io_errors_convert_to_the_io_kind() {
        let error: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(error.kind.as_ref(), ErrorKind::Io(_)));
    }
}
