use std::sync::Arc;

use anyhow::Context;
use pipeliner::{PipelineItem, pipeline::sink::recv_or_cancelled};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    body::MessageBody,
    config::EmailConfig,
    mailer::{Email, Mailer},
};

/// Collects the items of one run into a single email, sent when the run reaches its end of stream.
///
/// If the run is cancelled, what has been collected so far is discarded and nothing is sent.
pub async fn collect_and_send(
    mut items: mpsc::Receiver<PipelineItem>,
    cancel: CancellationToken,
    config: Arc<EmailConfig>,
    mailer: Arc<dyn Mailer>,
) -> anyhow::Result<()> {
    let mut body = MessageBody::new();
    while let Some(item) = recv_or_cancelled(&mut items, &cancel).await {
        body.push(&item);
    }
    if cancel.is_cancelled() {
        log::debug!("email output cancelled, discarding {} line(s)", body.lines());
        return Ok(());
    }

    let lines = body.lines();
    let email = Email {
        from: config.from.clone(),
        to: config.to.clone(),
        subject: config.subject.clone(),
        body: body.into_string(),
    };
    tokio::task::spawn_blocking(move || mailer.send(&email))
        .await
        .context("email task panicked")?
        .with_context(|| format!("could not send the email to {}", config.to))?;
    log::info!("sent {lines} line(s) to {}", config.to);
    Ok(())
}
