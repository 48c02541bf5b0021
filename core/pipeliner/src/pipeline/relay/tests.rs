use std::time::Duration;

use anyhow::anyhow;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{InboundStatus, OutputRelay, RelayConfig};
use crate::pipeline::{
    error::{RelayError, SinkFailure},
    sink::{SinkAdapter, recv_or_cancelled},
    tracker::CompletionTracker,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// What a test sink has observed.
#[derive(Debug, PartialEq, Eq)]
enum Event {
    Item(u32),
    EndOfStream,
    Cancelled,
}

fn init_logger() {
    // Ignore errors because the logger can only be initialized once, and we run multiple tests.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).try_init();
}

/// A sink that reports everything it sees.
fn recording_sink(events: mpsc::UnboundedSender<Event>) -> impl SinkAdapter<u32> {
    move |mut items: mpsc::Receiver<u32>, cancel: CancellationToken| {
        let events = events.clone();
        async move {
            while let Some(item) = recv_or_cancelled(&mut items, &cancel).await {
                let _ = events.send(Event::Item(item));
            }
            let last = if cancel.is_cancelled() {
                Event::Cancelled
            } else {
                Event::EndOfStream
            };
            let _ = events.send(last);
            Ok::<_, anyhow::Error>(())
        }
    }
}

/// A sink that never reads anything and waits to be cancelled.
fn stuck_sink(events: mpsc::UnboundedSender<Event>) -> impl SinkAdapter<u32> {
    move |_items: mpsc::Receiver<u32>, cancel: CancellationToken| {
        let events = events.clone();
        async move {
            cancel.cancelled().await;
            let _ = events.send(Event::Cancelled);
            Ok::<_, anyhow::Error>(())
        }
    }
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

async fn wait_for(tracker: &CompletionTracker) {
    tokio::time::timeout(TIMEOUT, tracker.wait())
        .await
        .expect("every task should complete in time");
}

#[tokio::test]
async fn forward_then_close() {
    init_logger();
    for n in [0u32, 1, 64] {
        let relay = OutputRelay::new("test-relay");
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        relay.set_sink_adapter(recording_sink(events_tx));

        let input = relay.inbound_handle().unwrap();
        let tracker = CompletionTracker::new();
        relay.start(tracker.track()).unwrap();

        for i in 0..n {
            input.send(i).await.unwrap();
        }
        drop(input);
        wait_for(&tracker).await;

        let expected: Vec<Event> = (0..n).map(Event::Item).chain([Event::EndOfStream]).collect();
        assert_eq!(drain(&mut events_rx), expected, "with {n} items");
        assert_eq!(relay.status(), InboundStatus::Closed);
        assert!(!relay.is_running());
    }
}

#[tokio::test]
async fn abc_scenario() {
    init_logger();
    let relay = OutputRelay::new("letters");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(move |mut items: mpsc::Receiver<&'static str>, _cancel: CancellationToken| {
        let events = events_tx.clone();
        async move {
            while let Some(item) = items.recv().await {
                let _ = events.send(Some(item));
            }
            let _ = events.send(None);
            Ok::<_, anyhow::Error>(())
        }
    });

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    for item in ["A", "B", "C"] {
        input.send(item).await.unwrap();
    }
    drop(input);
    wait_for(&tracker).await;
    assert_eq!(tracker.count(), 0);

    let mut received = Vec::new();
    while let Ok(e) = events_rx.try_recv() {
        received.push(e);
    }
    assert_eq!(received, vec![Some("A"), Some("B"), Some("C"), None]);
}

#[test]
fn start_without_input() {
    let relay = OutputRelay::<u32>::new("unwired");
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));

    let tracker = CompletionTracker::new();
    let res = relay.start(tracker.track());
    assert_eq!(res, Err(RelayError::NotConnected));
    assert_eq!(tracker.count(), 0, "the token must be released when start fails");
    assert!(!relay.is_running());
    assert_eq!(relay.status(), InboundStatus::Unwired);
}

#[test]
fn start_outside_runtime() {
    let relay = OutputRelay::<u32>::new("no-runtime");
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));
    let _input = relay.inbound_handle().unwrap();

    let tracker = CompletionTracker::new();
    assert_eq!(relay.start(tracker.track()), Err(RelayError::NoRuntime));
    assert_eq!(tracker.count(), 0);
}

#[tokio::test]
async fn start_without_sink() {
    let relay = OutputRelay::<u32>::new("no-sink");
    let _input = relay.inbound_handle().unwrap();
    assert!(!relay.has_sink_adapter());

    let tracker = CompletionTracker::new();
    assert_eq!(relay.start(tracker.track()), Err(RelayError::NoSinkAdapter));
    assert_eq!(tracker.count(), 0);
}

#[tokio::test]
async fn wire_twice() {
    let relay = OutputRelay::<u32>::new("wired");
    let _input = relay.inbound_handle().unwrap();
    assert_eq!(relay.inbound_handle().err(), Some(RelayError::AlreadyConnected));
}

#[tokio::test]
async fn stop_is_idempotent() {
    init_logger();
    let relay = OutputRelay::new("idempotent");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(stuck_sink(events_tx));
    let _input = relay.inbound_handle().unwrap();

    assert!(!relay.stop(), "nothing to stop yet");

    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    assert!(relay.is_running());
    assert!(relay.stop());
    assert!(!relay.stop());
    assert!(!relay.stop());
    wait_for(&tracker).await;

    // the loop may have been cancelled before it spawned the sink
    let events = drain(&mut events_rx);
    assert!(events.is_empty() || events == vec![Event::Cancelled], "{events:?}");
    assert_eq!(relay.status(), InboundStatus::Active);
    assert!(!relay.is_running());
}

#[tokio::test]
async fn stop_then_resume() {
    init_logger();
    let relay = OutputRelay::new("resume");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(stuck_sink(events_tx.clone()));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();

    // The inbound channel and the sink channel have room for one item each.
    // When the third send returns, item 0 waits in the sink channel, item 1 is being
    // forwarded by the relay and item 2 waits in the inbound channel.
    for i in 0..3 {
        tokio::time::timeout(TIMEOUT, input.send(i))
            .await
            .expect("send should not block")
            .unwrap();
    }
    assert!(relay.stop());
    wait_for(&tracker).await;
    assert_eq!(drain(&mut events_rx), vec![Event::Cancelled]);
    assert_eq!(relay.status(), InboundStatus::Active);

    // The new adapter only applies to the new run.
    relay.set_sink_adapter(recording_sink(events_tx));
    relay.start(tracker.track()).unwrap();
    input.send(3).await.unwrap();
    drop(input);
    wait_for(&tracker).await;

    // Items 0 and 1 were in flight when the first run was stopped, they are lost.
    assert_eq!(
        drain(&mut events_rx),
        vec![Event::Item(2), Event::Item(3), Event::EndOfStream]
    );
    assert_eq!(relay.status(), InboundStatus::Closed);
}

#[tokio::test]
async fn restart_right_after_stop() {
    init_logger();
    let relay = OutputRelay::new("quick-restart");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    relay.stop();
    // the previous loop may still be running, the new one must wait for it
    relay.start(tracker.track()).unwrap();

    for i in 0..10 {
        input.send(i).await.unwrap();
    }
    drop(input);
    wait_for(&tracker).await;

    let items: Vec<Event> = drain(&mut events_rx)
        .into_iter()
        .filter(|e| *e != Event::Cancelled)
        .collect();
    let expected: Vec<Event> = (0..10).map(Event::Item).chain([Event::EndOfStream]).collect();
    assert_eq!(items, expected);
}

#[tokio::test]
async fn closed_input_cannot_restart() {
    init_logger();
    let relay = OutputRelay::new("closed");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    input.send(7).await.unwrap();
    drop(input);
    wait_for(&tracker).await;
    assert_eq!(drain(&mut events_rx), vec![Event::Item(7), Event::EndOfStream]);
    assert_eq!(relay.status(), InboundStatus::Closed);

    assert_eq!(relay.start(tracker.track()), Err(RelayError::NotConnected));
    assert_eq!(tracker.count(), 0);

    // external rewiring makes the relay usable again
    let input = relay.inbound_handle().unwrap();
    relay.start(tracker.track()).unwrap();
    input.send(8).await.unwrap();
    drop(input);
    wait_for(&tracker).await;
    assert_eq!(drain(&mut events_rx), vec![Event::Item(8), Event::EndOfStream]);
}

#[tokio::test]
async fn started_twice() {
    init_logger();
    let relay = OutputRelay::new("twice");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    relay.start(tracker.track()).unwrap();
    for i in 0..5 {
        input.send(i).await.unwrap();
    }
    drop(input);
    wait_for(&tracker).await;

    // only one loop consumed the input, the other one found it closed
    let expected: Vec<Event> = (0..5).map(Event::Item).chain([Event::EndOfStream]).collect();
    assert_eq!(drain(&mut events_rx), expected);
}

#[tokio::test]
async fn sink_failure_is_reported() {
    init_logger();
    let relay = OutputRelay::new("failing");
    relay.set_sink_adapter(|_items: mpsc::Receiver<u32>, _cancel: CancellationToken| async {
        Err::<(), _>(anyhow!("connection refused"))
    });
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    relay.set_failure_reporter(failures_tx);

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();

    let failure = tokio::time::timeout(TIMEOUT, failures_rx.recv())
        .await
        .expect("the failure should be reported")
        .unwrap();
    assert!(matches!(failure, SinkFailure::Failed { .. }));
    assert_eq!(failure.relay(), "failing");
    assert_eq!(failure.to_string(), "sink of failing failed: connection refused");

    // the relay notices that the sink is gone when it tries to forward something
    let _ = input.send(1).await;
    let _ = input.send(2).await;
    wait_for(&tracker).await;
    assert_eq!(relay.status(), InboundStatus::Active);
}

#[tokio::test]
async fn stalled_sink_is_cancelled() {
    init_logger();
    let config = RelayConfig {
        forward_timeout: Some(Duration::from_millis(50)),
    };
    let relay = OutputRelay::with_config("stalled", config);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(stuck_sink(events_tx));
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    relay.set_failure_reporter(failures_tx);

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    input.send(1).await.unwrap();
    input.send(2).await.unwrap();

    wait_for(&tracker).await;
    let failure = failures_rx.try_recv().expect("a stall should be reported");
    assert!(matches!(
        failure,
        SinkFailure::Stalled { timeout, .. } if timeout == Duration::from_millis(50)
    ));
    assert_eq!(drain(&mut events_rx), vec![Event::Cancelled]);
    assert_eq!(relay.status(), InboundStatus::Active);
}

#[tokio::test]
async fn nothing_to_stop_after_end_of_input() {
    init_logger();
    let relay = OutputRelay::new("ended");
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(events_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    input.send(1).await.unwrap();
    drop(input);
    wait_for(&tracker).await;

    assert_eq!(drain(&mut events_rx), vec![Event::Item(1), Event::EndOfStream]);
    assert!(!relay.is_running());
    assert!(!relay.stop(), "the run has ended, stop must not report a cancellation");
}

#[tokio::test]
async fn nothing_to_stop_after_stall() {
    init_logger();
    let config = RelayConfig {
        forward_timeout: Some(Duration::from_millis(20)),
    };
    let relay = OutputRelay::with_config("stalled-then-stopped", config);
    let (events_tx, _events_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(stuck_sink(events_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();
    input.send(1).await.unwrap();
    input.send(2).await.unwrap();
    wait_for(&tracker).await;

    assert!(!relay.stop());

    // a new run is armed again, and can be stopped
    relay.set_sink_adapter(stuck_sink(mpsc::unbounded_channel().0));
    relay.start(tracker.track()).unwrap();
    assert!(relay.stop());
    wait_for(&tracker).await;
}

#[tokio::test]
async fn adapter_swap_during_run() {
    init_logger();
    let relay = OutputRelay::new("swap");
    let (first_tx, mut first_rx) = mpsc::unbounded_channel();
    let (second_tx, mut second_rx) = mpsc::unbounded_channel();
    relay.set_sink_adapter(recording_sink(first_tx));

    let input = relay.inbound_handle().unwrap();
    let tracker = CompletionTracker::new();
    relay.start(tracker.track()).unwrap();

    input.send(0).await.unwrap();
    let seen = tokio::time::timeout(TIMEOUT, first_rx.recv()).await.unwrap();
    assert_eq!(seen, Some(Event::Item(0)));

    // the running sink keeps receiving the items
    relay.set_sink_adapter(recording_sink(second_tx));
    for i in 1..3 {
        input.send(i).await.unwrap();
        let seen = tokio::time::timeout(TIMEOUT, first_rx.recv()).await.unwrap();
        assert_eq!(seen, Some(Event::Item(i)));
    }
    assert_eq!(drain(&mut second_rx), vec![]);

    // the new adapter takes over at the next run
    assert!(relay.stop());
    wait_for(&tracker).await;
    assert_eq!(drain(&mut first_rx), vec![Event::Cancelled]);

    relay.start(tracker.track()).unwrap();
    input.send(3).await.unwrap();
    drop(input);
    wait_for(&tracker).await;
    assert_eq!(drain(&mut second_rx), vec![Event::Item(3), Event::EndOfStream]);
    assert_eq!(drain(&mut first_rx), vec![]);
}
