use log::{info, warn};
use zmq_monitor::{Events, Monitor, MonitorError};

/*
    Example monitor:

    Binds a PULL sink, connects a PUSH socket to it, then closes the sink.
    Prints the PUSH socket's connect/disconnect events as JSON lines.
*/

const DEFAULT_SINK: &str = "tcp://127.0.0.1:23456";
const EVENTS_ENDPOINT: &str = "inproc://example-monitor";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let sink_endpoint = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_SINK.to_string());
    info!("Starting, sink at {}", sink_endpoint);

    let ctx = zmq::Context::new();

    let sink = ctx.socket(zmq::PULL)?;
    sink.bind(&sink_endpoint)?;

    let push = ctx.socket(zmq::PUSH)?;
    let monitor = Monitor::new(&ctx, &push, EVENTS_ENDPOINT, Events::CONNECTED | Events::DISCONNECTED)?;
    let mut events = monitor.start()?;

    push.connect(&sink_endpoint)?;

    let mut sink = Some(sink);
    while let Some(received) = events.blocking_recv() {
        match received {
            Ok(event) => {
                println!("{}", serde_json::to_string(&event)?);

                if event.is(Events::CONNECTED) {
                    // Trigger a disconnect
                    drop(sink.take());
                } else if event.is(Events::DISCONNECTED) {
                    break;
                }
            }
            Err(MonitorError::Receive(err)) => warn!("Skipping event: {}", err),
            Err(err) => return Err(err.into()),
        }
    }

    monitor.close_wait()?;
    info!("Monitor closed");

    Ok(())
}
