//! Assembly and execution of the output stage.

use std::future::Future;

use anyhow::Context;
use pipeliner::{
    PipelineItem,
    module::{ModuleId, OutputModule},
    pipeline::{CompletionTracker, SinkFailure},
    registry::ModuleRegistry,
};
use pipeliner_email::EmailOutputModule;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};

use crate::config::AgentConfig;

/// Creates a registry that contains the prototype of every module shipped with the agent.
pub fn default_registry() -> anyhow::Result<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    registry.register(Box::new(EmailOutputModule::prototype()))?;
    Ok(registry)
}

/// Instantiates and configures the outputs listed in the config.
///
/// Every output reports the failures of its sink to `failures`.
/// Returns the ids of the new instances, in the order of the config.
pub fn assemble(
    registry: &mut ModuleRegistry,
    config: &AgentConfig,
    failures: &mpsc::UnboundedSender<SinkFailure>,
) -> anyhow::Result<Vec<ModuleId>> {
    let relay_config = config.relay.to_relay_config();
    let mut ids = Vec::with_capacity(config.outputs.len());
    for output in &config.outputs {
        let module = registry
            .instantiate(&output.module, &output.id)
            .context("invalid output")?;
        module
            .configure(&output.params)
            .with_context(|| format!("could not configure output {}", module.id()))?;
        module.relay().set_config(relay_config.clone());
        module.relay().set_failure_reporter(failures.clone());
        log::info!("Output {} ({}) is ready.", module.id(), module.metadata().name);
        ids.push(module.id().clone());
    }
    Ok(ids)
}

/// Runs the outputs `ids` until the end of `input`, or until `shutdown` completes.
///
/// Each line of `input` is sent to every output. Lines are not required to be valid UTF-8,
/// invalid sequences are replaced by `U+FFFD`. At the end of the input, the outputs receive
/// the end of the stream. On shutdown, or if the input cannot be read, they are stopped and
/// the pending items are dropped.
///
/// Once the outputs have been started, this function always returns after all their tasks
/// have finished. It returns the failures that have been reported, or the read error.
pub async fn run(
    registry: &ModuleRegistry,
    ids: &[ModuleId],
    input: impl AsyncBufRead + Unpin,
    shutdown: impl Future<Output = ()>,
    failures: &mut mpsc::UnboundedReceiver<SinkFailure>,
) -> anyhow::Result<Vec<SinkFailure>> {
    let outputs: Vec<&dyn OutputModule> = ids
        .iter()
        .map(|id| registry.get(id).with_context(|| format!("output {id} is not registered")))
        .collect::<anyhow::Result<_>>()?;

    let tracker = CompletionTracker::new();
    let mut inputs = Vec::with_capacity(outputs.len());
    let mut started = 0;
    let mut startup_error = None;
    for output in &outputs {
        let res = output
            .inbound_handle()
            .and_then(|input| output.start(tracker.track()).map(|()| input));
        match res {
            Ok(input) => {
                inputs.push(input);
                started += 1;
            }
            Err(e) => {
                let err = anyhow::Error::new(e).context(format!("could not start output {}", output.id()));
                startup_error = Some(err);
                break;
            }
        }
    }
    if let Some(err) = startup_error {
        for output in &outputs[..started] {
            output.stop();
        }
        drop(inputs);
        tracker.wait().await;
        return Err(err);
    }
    log::info!("{} output(s) started, reading the input.", outputs.len());

    let mut lines = input.split(b'\n');
    let mut n_lines: u64 = 0;
    let mut read_error = None;
    let mut stopped = false;
    tokio::pin!(shutdown);
    loop {
        let line = tokio::select! {
            biased;
            _ = &mut shutdown => {
                stopped = true;
                break;
            }
            line = lines.next_segment() => match line {
                Ok(line) => line,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            },
        };
        let Some(mut line) = line else {
            break;
        };
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        n_lines += 1;
        let item = PipelineItem::from(String::from_utf8_lossy(&line).into_owned());
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                stopped = true;
                break;
            }
            _ = broadcast(&inputs, item) => (),
        }
    }

    if stopped {
        log::info!("Shutdown requested after {n_lines} line(s), stopping the outputs.");
    } else if let Some(e) = &read_error {
        log::error!("Could not read the input after {n_lines} line(s), stopping the outputs: {e}");
    } else {
        log::info!("End of the input after {n_lines} line(s).");
    }
    if stopped || read_error.is_some() {
        for output in &outputs {
            output.stop();
        }
    }
    drop(inputs);
    tracker.wait().await;

    let mut reported = Vec::new();
    while let Ok(failure) = failures.try_recv() {
        reported.push(failure);
    }
    if let Some(e) = read_error {
        for failure in &reported {
            log::error!("{failure}");
        }
        return Err(e).context("could not read the input");
    }
    Ok(reported)
}

async fn broadcast(inputs: &[mpsc::Sender<PipelineItem>], item: PipelineItem) {
    for input in inputs {
        if input.send(item.clone()).await.is_err() {
            log::warn!("An output has dropped its input, the item {item} is not delivered to it.");
        }
    }
}
