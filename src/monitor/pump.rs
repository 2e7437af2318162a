//! Job
//! - Wait for the poller to report the monitor socket readable
//! - Receive one multipart message, re-arm the poller, decode, deliver
//! - Report failures in-band, end the stream when polling ends
//! - Once close has begun, end quietly instead of touching torn down resources
//!
//! Delivery is bounded: a consumer that does not drain the stream holds the
//! pump at its next send, and with it the re-arm of the poller.

use log::{debug, trace, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use super::State;

use crate::{
    codec,
    error::MonitorError,
    poller::{Notifications, Poller},
    socket::Socket,
    stream::EventResult,
};

pub(super) async fn run<S: Socket, P: Poller<S>>(
    socket: Arc<S>,
    poller: Arc<P>,
    state: Arc<Mutex<State>>,
    mut notifications: Notifications,
    events: mpsc::Sender<EventResult>,
) {
    debug!("Event pump started");

    while let Some(readiness) = notifications.recv().await {
        if let Err(err) = readiness {
            warn!("Poller failed, ending event stream: {}", err);
            let _ = events.send(Err(MonitorError::Poll(err))).await;
            break;
        }

        // A notification left over from before close refers to a socket that is gone
        if closing(&state) {
            break;
        }

        let received = socket.recv_multipart(0).map_err(MonitorError::Receive);
        let mut last = false;

        if let Err(err) = poller.resume() {
            if closing(&state) {
                last = true;
            } else {
                warn!("Could not re-arm poller: {}", err);
                if events.send(Err(MonitorError::Rearm(err))).await.is_err() {
                    break;
                }
            }
        }

        if received.is_err() && closing(&state) {
            break;
        }

        let outcome = received.and_then(|frames| codec::parse_event(&frames).map_err(MonitorError::from));
        match &outcome {
            Ok(event) => trace!("Monitor event {:?}", event),
            Err(err) => warn!("Dropping malformed monitor message: {}", err),
        }

        if events.send(outcome).await.is_err() {
            debug!("Event stream dropped by consumer");
            break;
        }

        if last {
            break;
        }
    }

    debug!("Event pump finished");
}

fn closing(state: &Mutex<State>) -> bool {
    matches!(
        *state.lock().expect("Lock should not be poisoned"),
        State::Closing(_) | State::Closed
    )
}
