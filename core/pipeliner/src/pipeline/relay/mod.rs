//! The output relay and its lifecycle.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU8, AtomicUsize, Ordering},
    },
    time::Duration,
};

use tokio::sync::{Semaphore, mpsc};

use super::{
    cancel::CancelSignal,
    error::{RelayError, SinkFailure},
    sink::SinkAdapter,
    tracker::CompletionToken,
};

mod run;
mod state;

pub use state::InboundStatus;

/// Capacity of the inbound and per-run channels.
///
/// Tokio channels cannot be unbuffered, one slot is the closest we get to a rendezvous:
/// a slow sink quickly blocks the relay, which in turn blocks upstream.
pub const CHANNEL_CAPACITY: usize = 1;

/// Settings of an [`OutputRelay`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    /// Maximum time to wait for the sink to accept an item.
    ///
    /// When the deadline expires, the run is cancelled and a [`SinkFailure::Stalled`] is reported.
    /// `None` means waiting forever.
    pub forward_timeout: Option<Duration>,
}

/// Forwards the items of an inbound channel to a [`SinkAdapter`] running in its own task.
///
/// See the [module documentation](super) for an overview.
///
/// ## Lifecycle
/// - [`inbound_handle`](Self::inbound_handle) wires the relay and gives the sending half
///   of the inbound channel to the upstream stage.
/// - [`start`](Self::start) spawns a relay loop, which spawns the sink.
/// - [`stop`](Self::stop) cancels the current run. If upstream has not closed the inbound
///   channel, the relay can be started again and resumes where it was.
///
/// When upstream closes the inbound channel (by dropping every sender), the current run
/// delivers what has been received so far, the sink gets end-of-stream, and the relay
/// becomes [`InboundStatus::Closed`]. Further calls to `start` fail until the relay is wired again.
///
/// ## Buffering
/// Both the inbound channel and the per-run channel hold at most [`CHANNEL_CAPACITY`] item.
/// While the sink is busy, one item can thus wait in each channel, plus the one the relay is
/// forwarding. On `stop`, the item left in the per-run channel is dropped, the one in the
/// inbound channel is kept for the next run.
pub struct OutputRelay<T> {
    shared: Arc<Shared<T>>,
    sink: Mutex<Option<Arc<dyn SinkAdapter<T>>>>,
    config: Mutex<RelayConfig>,
}

/// State shared between the relay and its loops.
struct Shared<T> {
    name: String,
    status: AtomicU8,
    /// Armed by `start`, fired by `stop`, released by the runs that exit on their own.
    cancel: CancelSignal,
    /// The receiving half of the inbound channel. Taken by the running loop.
    inbound: Mutex<Option<mpsc::Receiver<T>>>,
    /// Only one loop can consume the inbound channel at a time.
    run_permit: Semaphore,
    /// Number of loops that have been spawned and have not finished yet.
    active_runs: AtomicUsize,
    failures: Mutex<Option<mpsc::UnboundedSender<SinkFailure>>>,
}

impl<T: Send + 'static> OutputRelay<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, RelayConfig::default())
    }

    pub fn with_config(name: impl Into<String>, config: RelayConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                status: AtomicU8::new(InboundStatus::Unwired as u8),
                cancel: CancelSignal::new(),
                inbound: Mutex::new(None),
                run_permit: Semaphore::new(1),
                active_runs: AtomicUsize::new(0),
                failures: Mutex::new(None),
            }),
            sink: Mutex::new(None),
            config: Mutex::new(config),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn status(&self) -> InboundStatus {
        self.shared.status()
    }

    /// Returns `true` if a relay loop is running or about to run.
    pub fn is_running(&self) -> bool {
        self.shared.active_runs.load(Ordering::Acquire) > 0
    }

    /// Creates the inbound channel and returns its sending half.
    ///
    /// The relay does not keep any sender: the channel is closed when every sender returned
    /// by this method (and its clones) is dropped.
    ///
    /// # Errors
    /// Returns [`RelayError::AlreadyConnected`] if the inbound channel is open.
    /// A relay whose channel has been closed by upstream can be wired again.
    pub fn inbound_handle(&self) -> Result<mpsc::Sender<T>, RelayError> {
        let mut slot = self.shared.inbound.lock().unwrap();
        let previous = self.shared.status();
        if previous == InboundStatus::Active {
            return Err(RelayError::AlreadyConnected);
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        *slot = Some(rx);
        self.shared.set_status(InboundStatus::Active);
        if previous == InboundStatus::Closed {
            log::warn!("{} has been wired again after its input was closed", self.shared.name);
        } else {
            log::debug!("{} is now wired", self.shared.name);
        }
        Ok(tx)
    }

    /// Replaces the sink adapter used by the next runs.
    ///
    /// A run that has already started keeps the adapter it was spawned with.
    pub fn set_sink_adapter(&self, sink: impl SinkAdapter<T>) {
        *self.sink.lock().unwrap() = Some(Arc::new(sink));
    }

    pub fn has_sink_adapter(&self) -> bool {
        self.sink.lock().unwrap().is_some()
    }

    /// Replaces the settings used by the next runs.
    pub fn set_config(&self, config: RelayConfig) {
        *self.config.lock().unwrap() = config;
    }

    pub fn config(&self) -> RelayConfig {
        self.config.lock().unwrap().clone()
    }

    /// Installs a channel on which the failures of the sink tasks are reported.
    ///
    /// Failures are always logged. Without a reporter, that is all that happens.
    pub fn set_failure_reporter(&self, reporter: mpsc::UnboundedSender<SinkFailure>) {
        *self.shared.failures.lock().unwrap() = Some(reporter);
    }

    /// Spawns a relay loop on the current Tokio runtime and returns immediately.
    ///
    /// `token` is released when the loop exits. If this method fails, no task is spawned
    /// and `token` is released before returning.
    ///
    /// If a previous run is still winding down (for instance right after [`stop`](Self::stop)),
    /// the new loop waits for it to exit before consuming the inbound channel.
    ///
    /// # Errors
    /// - [`RelayError::NotConnected`] if the inbound channel is not wired or has been closed.
    /// - [`RelayError::NoSinkAdapter`] if no sink adapter has been set.
    /// - [`RelayError::NoRuntime`] if called outside of a Tokio runtime.
    pub fn start(&self, token: CompletionToken) -> Result<(), RelayError> {
        if self.status() != InboundStatus::Active {
            return Err(RelayError::NotConnected);
        }
        let sink = self.sink.lock().unwrap().clone().ok_or(RelayError::NoSinkAdapter)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| RelayError::NoRuntime)?;

        let share = self.shared.cancel.arm();
        let run = run::RelayRun {
            cancel: share.token().clone(),
            active: run::ActiveRun::enter(self.shared.clone(), token, share),
            sink,
            forward_timeout: self.config.lock().unwrap().forward_timeout,
        };
        log::debug!("starting {}", self.shared.name);
        runtime.spawn(run.run());
        Ok(())
    }

    /// Cancels the current run without waiting for it to terminate.
    ///
    /// Items that have not been forwarded yet stay in the inbound channel, or are lost if
    /// the relay is never started again. The item waiting in the per-run channel, if any,
    /// is dropped with the channel: the sink never sees it. Calling `stop` when nothing runs
    /// (including after a run that ended on its own), or several times in a row, has no effect.
    ///
    /// Returns `true` if a run has been cancelled by this call.
    pub fn stop(&self) -> bool {
        let fired = self.shared.cancel.fire();
        if fired {
            log::debug!("stopping {}", self.shared.name);
        }
        fired
    }
}

impl<T> Shared<T> {
    fn status(&self) -> InboundStatus {
        self.status.load(Ordering::Acquire).into()
    }

    fn set_status(&self, status: InboundStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    fn take_inbound(&self) -> Option<mpsc::Receiver<T>> {
        self.inbound.lock().unwrap().take()
    }

    fn restore_inbound(&self, rx: mpsc::Receiver<T>) {
        *self.inbound.lock().unwrap() = Some(rx);
    }

    /// Upstream closed the channel: forget the receiver for good.
    fn close_inbound(&self, rx: mpsc::Receiver<T>) {
        let _slot = self.inbound.lock().unwrap();
        drop(rx);
        self.set_status(InboundStatus::Closed);
    }

    fn report(&self, failure: SinkFailure) {
        if let Some(reporter) = self.failures.lock().unwrap().as_ref() {
            // the receiver may be gone, there is nobody left to tell
            let _ = reporter.send(failure);
        }
    }
}

#[cfg(test)]
mod tests;
