use std::time::Duration;

use thiserror::Error;

/// Error returned synchronously by the lifecycle methods of an [`OutputRelay`](super::OutputRelay).
///
/// When [`start`](super::OutputRelay::start) fails, no task is spawned but the completion token
/// it received is still released.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayError {
    /// The inbound channel has not been wired, or upstream has closed it.
    #[error("input channel not connected")]
    NotConnected,
    /// The inbound channel is already wired and open.
    #[error("input channel already connected")]
    AlreadyConnected,
    /// No sink adapter has been set.
    #[error("no sink adapter set")]
    NoSinkAdapter,
    /// The module owning the relay has not been configured successfully.
    #[error("module {0} is not ready, configure it first")]
    NotReady(String),
    /// `start` was called outside of a Tokio runtime.
    #[error("the relay must be started within a Tokio runtime")]
    NoRuntime,
}

/// A problem that happened inside a running relay loop or sink task.
///
/// These are never returned to the caller of `start`, which has already returned.
/// They are logged and, if a reporter is installed with
/// [`set_failure_reporter`](super::OutputRelay::set_failure_reporter), sent to it.
#[derive(Debug, Error)]
pub enum SinkFailure {
    /// The sink returned an error.
    #[error("sink of {relay} failed: {error:#}")]
    Failed {
        relay: String,
        #[source]
        error: anyhow::Error,
    },
    /// The sink did not accept an item before the deadline, the run has been cancelled.
    #[error("sink of {relay} did not accept an item within {timeout:?}")]
    Stalled { relay: String, timeout: Duration },
}

impl SinkFailure {
    /// Name of the relay in which the failure occurred.
    pub fn relay(&self) -> &str {
        match self {
            SinkFailure::Failed { relay, .. } | SinkFailure::Stalled { relay, .. } => relay,
        }
    }
}
