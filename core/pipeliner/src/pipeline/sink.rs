use std::future::Future;

use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The asynchronous task returned by a [`SinkAdapter`].
pub type BoxedSinkTask = BoxFuture<'static, anyhow::Result<()>>;

/// Terminal side effect of an output stage.
///
/// For every run of the relay, `run` is called with the receiving half of a fresh item channel
/// and a fresh cancellation token. The returned future must:
/// - consume items until the channel is closed (`recv` returns `None`), which means end-of-stream;
/// - or stop early, as soon as possible, when `cancel` is cancelled.
///
/// The relay spawns the future in a dedicated task and releases the completion token
/// of that task when the future completes, whatever its result.
/// An error returned by the future is logged and reported, the relay does not retry.
///
/// Blocking work (file or network I/O with a synchronous client) must be moved to
/// [`tokio::task::spawn_blocking`].
///
/// Any closure `Fn(mpsc::Receiver<T>, CancellationToken) -> impl Future<Output = anyhow::Result<()>>`
/// is a `SinkAdapter`.
pub trait SinkAdapter<T>: Send + Sync + 'static {
    fn run(&self, items: mpsc::Receiver<T>, cancel: CancellationToken) -> BoxedSinkTask;
}

impl<T, F, Fut> SinkAdapter<T> for F
where
    F: Fn(mpsc::Receiver<T>, CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self, items: mpsc::Receiver<T>, cancel: CancellationToken) -> BoxedSinkTask {
        Box::pin(self(items, cancel))
    }
}

/// Receives the next item, unless `cancel` fires first.
///
/// Returns `None` on end-of-stream or cancellation, which is the common exit condition of sinks.
/// Use [`CancellationToken::is_cancelled`] afterwards to tell them apart.
pub async fn recv_or_cancelled<T>(items: &mut mpsc::Receiver<T>, cancel: &CancellationToken) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        item = items.recv() => item,
    }
}
