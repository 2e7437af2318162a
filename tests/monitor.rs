use std::time::Duration;

use zmq_monitor::{Events, EventStream, Monitor, MonitorError, State};

const SINK: &str = "tcp://127.0.0.1:23456";
const EVENTS: &str = "inproc://monitor-test-events";

async fn assert_next_event(stream: &mut EventStream, expected: Events, address: &str) {
    let event = tokio::time::timeout(Duration::from_secs(1), stream.recv())
        .await
        .expect("Test timed out.")
        .expect("Stream ended early.")
        .expect("Error event received.");

    assert!(event.is(expected), "Unexpected event encountered: {}", event.event);
    assert_eq!(event.address, address, "Unexpected event address encountered.");
}

#[test_log::test(tokio::test)]
async fn reports_connect_and_disconnect() {
    let ctx = zmq::Context::new();

    let sink = ctx.socket(zmq::PULL).unwrap();
    sink.bind(SINK).unwrap();

    let push = ctx.socket(zmq::PUSH).unwrap();
    let monitor = Monitor::new(&ctx, &push, EVENTS, Events::CONNECTED | Events::DISCONNECTED).unwrap();
    let mut stream = monitor.start().unwrap();

    push.connect(SINK).unwrap();
    assert_next_event(&mut stream, Events::CONNECTED, SINK).await;

    drop(sink);
    assert_next_event(&mut stream, Events::DISCONNECTED, SINK).await;

    monitor.close().unwrap().await;
    assert_eq!(monitor.state(), State::Closed);

    // Whatever was in flight, the stream ends
    while let Ok(Some(_)) = tokio::time::timeout(Duration::from_secs(1), stream.recv()).await {}
}

#[test_log::test(tokio::test)]
async fn stop_halts_delivery() {
    let ctx = zmq::Context::new();
    let endpoint = "tcp://127.0.0.1:23457";

    let sink = ctx.socket(zmq::PULL).unwrap();
    sink.bind(endpoint).unwrap();

    let push = ctx.socket(zmq::PUSH).unwrap();
    let monitor = Monitor::new(&ctx, &push, "inproc://monitor-test-stop", Events::CONNECTED).unwrap();
    let mut stream = monitor.start().unwrap();

    monitor.stop().unwrap();
    monitor.stop().unwrap();
    assert_eq!(monitor.state(), State::Stopped);

    push.connect(endpoint).unwrap();
    let quiet = tokio::time::timeout(Duration::from_millis(300), stream.recv()).await;
    assert!(quiet.is_err(), "no event expected after stop");

    monitor.close().unwrap().await;
    assert!(matches!(monitor.close(), Err(MonitorError::AlreadyClosed)));
}

#[test_log::test]
fn close_wait_returns_without_start() {
    let ctx = zmq::Context::new();
    let push = ctx.socket(zmq::PUSH).unwrap();

    let monitor = Monitor::new(&ctx, &push, "inproc://monitor-test-close-wait", Events::ALL).unwrap();

    monitor.close_wait().unwrap();
    assert_eq!(monitor.state(), State::Closed);
    assert!(matches!(monitor.close_wait(), Err(MonitorError::AlreadyClosed)));
}

#[test_log::test]
fn setup_failure_is_reported() {
    let ctx = zmq::Context::new();
    let push = ctx.socket(zmq::PUSH).unwrap();

    // Monitor endpoints must be inproc
    let result = Monitor::new(&ctx, &push, "tcp://127.0.0.1:23458", Events::ALL);

    assert!(matches!(result, Err(MonitorError::Setup { stage: "register the monitor endpoint", .. })));

    // Terminating the context blocks while any socket of it is still open,
    // so this only returns if the half-built monitor socket was closed
    drop(push);
    drop(ctx);
}
