use std::{
    ops::ControlFlow,
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{CHANNEL_CAPACITY, Shared, state::RunOutcome};
use crate::pipeline::{
    cancel::ArmedToken,
    error::SinkFailure,
    sink::{BoxedSinkTask, SinkAdapter},
    tracker::CompletionToken,
};

/// Counts a run as active until dropped, then gives back its share of the cancel signal
/// and releases its completion token.
pub(super) struct ActiveRun<T> {
    shared: Arc<Shared<T>>,
    share: Option<ArmedToken>,
    token: CompletionToken,
}

impl<T> ActiveRun<T> {
    pub(super) fn enter(shared: Arc<Shared<T>>, token: CompletionToken, share: ArmedToken) -> Self {
        shared.active_runs.fetch_add(1, Ordering::AcqRel);
        Self {
            shared,
            share: Some(share),
            token,
        }
    }
}

impl<T> Drop for ActiveRun<T> {
    fn drop(&mut self) {
        if let Some(share) = self.share.take() {
            if self.shared.cancel.release(share) {
                log::trace!("{}: no run left, stop signal disarmed", self.shared.name);
            }
        }
        // `token` is dropped after this, once the run no longer counts as active.
        self.shared.active_runs.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything a relay loop captures when it is spawned.
pub(super) struct RelayRun<T> {
    pub active: ActiveRun<T>,
    pub sink: Arc<dyn SinkAdapter<T>>,
    pub cancel: CancellationToken,
    pub forward_timeout: Option<Duration>,
}

impl<T: Send + 'static> RelayRun<T> {
    pub(super) async fn run(self) {
        let shared = self.active.shared.clone();
        let name = &shared.name;

        // Wait for the previous run, if any, to give the inbound channel back.
        let _permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                log::debug!("{name} stopped before it could run");
                return;
            }
            permit = shared.run_permit.acquire() => match permit {
                Ok(p) => p,
                Err(_) => return,
            },
        };

        let Some(mut inbound) = shared.take_inbound() else {
            log::debug!("{name}: the input has been closed by a previous run, nothing to relay");
            return;
        };

        let (sink_tx, sink_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let sink_cancel = CancellationToken::new();
        let sink_task = self.sink.run(sink_rx, sink_cancel.clone());
        tokio::spawn(supervise_sink(shared.clone(), sink_task, self.active.token.sibling()));

        let outcome = self.forward_all(&mut inbound, sink_tx).await;
        match outcome {
            RunOutcome::InputClosed => {
                // The sink has seen end-of-stream when `sink_tx` was dropped, let it finish.
                shared.close_inbound(inbound);
            }
            RunOutcome::Stopped | RunOutcome::Stalled => {
                sink_cancel.cancel();
                shared.restore_inbound(inbound);
            }
            RunOutcome::SinkGone => {
                shared.restore_inbound(inbound);
            }
        }
        log::debug!("{name}: relay loop finished ({outcome:?})");
    }

    async fn forward_all(&self, inbound: &mut mpsc::Receiver<T>, sink_tx: mpsc::Sender<T>) -> RunOutcome {
        let mut n_forwarded: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    log::trace!("{}: stop requested after {n_forwarded} items", self.active.shared.name);
                    return RunOutcome::Stopped;
                }
                maybe_item = inbound.recv() => match maybe_item {
                    Some(item) => {
                        if let ControlFlow::Break(outcome) = self.forward(item, &sink_tx).await {
                            return outcome;
                        }
                        n_forwarded += 1;
                        log::trace!("{}: forwarded item #{n_forwarded}", self.active.shared.name);
                    }
                    None => {
                        log::debug!(
                            "The input of {} was closed, it will stop after {n_forwarded} items.",
                            self.active.shared.name
                        );
                        return RunOutcome::InputClosed;
                    }
                }
            }
        }
    }

    /// Sends one item to the sink, waiting for it to have room.
    async fn forward(&self, item: T, sink_tx: &mpsc::Sender<T>) -> ControlFlow<RunOutcome> {
        let shared = &self.active.shared;
        let send = async {
            match self.forward_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, sink_tx.send(item)).await {
                    Ok(res) => res.map_err(|_| RunOutcome::SinkGone),
                    Err(_elapsed) => {
                        log::error!(
                            "The sink of {} did not accept an item within {timeout:?}, the run will be cancelled.",
                            shared.name
                        );
                        shared.report(SinkFailure::Stalled {
                            relay: shared.name.clone(),
                            timeout,
                        });
                        Err(RunOutcome::Stalled)
                    }
                },
                None => sink_tx.send(item).await.map_err(|_| RunOutcome::SinkGone),
            }
        };

        let res = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RunOutcome::Stopped),
            res = send => res,
        };
        match res {
            Ok(()) => ControlFlow::Continue(()),
            Err(RunOutcome::SinkGone) => {
                log::warn!("The sink of {} exited before the end of the input.", shared.name);
                ControlFlow::Break(RunOutcome::SinkGone)
            }
            Err(outcome) => ControlFlow::Break(outcome),
        }
    }
}

/// Runs the sink until it returns, then releases its completion token.
async fn supervise_sink<T>(shared: Arc<Shared<T>>, task: BoxedSinkTask, token: CompletionToken) {
    let name = &shared.name;
    match task.await {
        Ok(()) => log::debug!("The sink of {name} has finished."),
        Err(e) => {
            log::error!("Error in the sink of {name}: {e:?}");
            shared.report(SinkFailure::Failed {
                relay: name.clone(),
                error: e,
            });
        }
    }
    drop(token);
}
