use log::debug;
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};
use tokio::sync::oneshot;

use super::{CloseStage, State};
use crate::socket::Socket;

/// Completion signal of an asynchronous close. Fires exactly once.
///
/// Await it from async code, or call [`CloseHandle::wait`] from blocking code.
pub struct CloseHandle {
    receiver: oneshot::Receiver<()>,
}

impl CloseHandle {
    /// Block until teardown has completed. Panics when called from within an async runtime.
    pub fn wait(self) {
        let _ = self.receiver.blocking_recv();
    }
}

impl Future for CloseHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.receiver).poll(cx).map(|_| ())
    }
}

/// Spawns the second half of the close sequence: wait for the poller to
/// confirm, close the socket, then fire the returned handle.
///
/// Without `poller_done` the socket is closed straight away.
pub(super) fn spawn<S: Socket>(
    socket: Arc<S>,
    state: Arc<Mutex<State>>,
    poller_done: Option<oneshot::Receiver<()>>,
) -> CloseHandle {
    let (sender, receiver) = oneshot::channel();

    std::thread::spawn(move || {
        if let Some(done) = poller_done {
            let _ = done.blocking_recv();
            debug!("Poller closed, closing monitor socket");
        }
        set(&state, State::Closing(CloseStage::Socket));

        // Only fails on an already closed socket
        if let Err(err) = socket.close() {
            debug!("Ignoring monitor socket close error: {}", err);
        }

        set(&state, State::Closed);
        debug!("Monitor closed");
        let _ = sender.send(());
    });

    CloseHandle { receiver }
}

fn set(state: &Mutex<State>, next: State) {
    *state.lock().expect("Lock should not be poisoned") = next;
}
