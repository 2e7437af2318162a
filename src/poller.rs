//! Readiness poller actor
//! - Wait for the target socket to become readable
//! - Notify once, then wait to be re-armed before polling again
//! - Stop notifying on request
//! - Exit on close, ending the notification stream and confirming via a done signal

use log::{debug, trace, warn};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};
use tokio::sync::{mpsc, oneshot};

use crate::socket::ZmqSocket;

/// A single readiness notification, or the failure that ended polling.
pub type PollResult = Result<(), zmq::Error>;

/// Stream of readiness notifications. Ends when the poller is closed.
pub type Notifications = mpsc::Receiver<PollResult>;

/// Readiness multiplexer for a monitor socket.
///
/// After each notification the poller stays quiet until [`Poller::resume`] is called.
pub trait Poller<S>: Send + Sync + 'static {
    /// Subscribe to readability of `socket`.
    fn poll(&self, socket: Arc<S>) -> Result<Notifications, zmq::Error>;

    /// Re-arm after a notification has been handled.
    fn resume(&self) -> Result<(), zmq::Error>;

    /// Stop delivering notifications, without releasing anything.
    fn stop(&self) -> Result<(), zmq::Error>;

    /// Shut down. The returned receiver fires once the notification stream has ended.
    fn close(&self) -> Result<oneshot::Receiver<()>, zmq::Error>;
}

static NEXT_POLLER: AtomicUsize = AtomicUsize::new(0);

/// Commands sent to the polling thread over its wake-up socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Continue,
    Stop,
    Close,
}

impl Command {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            Command::Continue => b"continue",
            Command::Stop => b"stop",
            Command::Close => b"close",
        }
    }

    fn parse(raw: &[u8]) -> Option<Self> {
        match raw {
            b"continue" => Some(Command::Continue),
            b"stop" => Some(Command::Stop),
            b"close" => Some(Command::Close),
            _ => None,
        }
    }
}

/// Handle to a zmq polling thread.
///
/// The thread is spawned by [`Poller::poll`] and owns the receiving half of
/// an in-process pair socket; every other call is a command sent down the
/// other half.
pub struct ZmqPoller {
    endpoint: String,
    wake: Mutex<Option<zmq::Socket>>,
    wake_worker: Mutex<Option<zmq::Socket>>,
    done: Mutex<Option<oneshot::Receiver<()>>>,
}

impl ZmqPoller {
    /// Create a poller bound to `ctx`. No thread is started until [`Poller::poll`].
    pub fn new(ctx: &zmq::Context) -> Result<Self, zmq::Error> {
        let endpoint = format!("inproc://zmq-monitor-poller-{}", NEXT_POLLER.fetch_add(1, Ordering::Relaxed));

        let wake = ctx.socket(zmq::PAIR)?;
        wake.bind(&endpoint)?;

        let wake_worker = ctx.socket(zmq::PAIR)?;
        wake_worker.connect(&endpoint)?;

        Ok(Self {
            endpoint,
            wake: Mutex::new(Some(wake)),
            wake_worker: Mutex::new(Some(wake_worker)),
            done: Mutex::new(None),
        })
    }

    fn send(&self, command: Command) -> Result<(), zmq::Error> {
        trace!("Sending {:?} to {}", command, self.endpoint);
        lock(&self.wake).as_ref().ok_or(zmq::Error::ETERM)?.send(command.as_bytes(), 0)
    }
}

impl Poller<ZmqSocket> for ZmqPoller {
    fn poll(&self, socket: Arc<ZmqSocket>) -> Result<Notifications, zmq::Error> {
        let wake = lock(&self.wake_worker).take().ok_or(zmq::Error::EINVAL)?;

        let (sender, receiver) = mpsc::channel(1);
        let (done_sender, done_receiver) = oneshot::channel();
        *lock(&self.done) = Some(done_receiver);

        let endpoint = self.endpoint.clone();
        std::thread::spawn(move || {
            let mut actor = Actor { socket, wake, notify: sender, state: ActorState::Polling };

            debug!("Poller {} started", endpoint);
            actor.run();
            debug!("Poller {} finished", endpoint);

            // Notification stream ends before the done signal fires
            drop(actor);
            let _ = done_sender.send(());
        });

        Ok(receiver)
    }

    fn resume(&self) -> Result<(), zmq::Error> {
        self.send(Command::Continue)
    }

    fn stop(&self) -> Result<(), zmq::Error> {
        self.send(Command::Stop)
    }

    fn close(&self) -> Result<oneshot::Receiver<()>, zmq::Error> {
        let mut wake = lock(&self.wake);
        let socket = wake.as_ref().ok_or(zmq::Error::ETERM)?;

        let pending = lock(&self.done).take();
        let done = match pending {
            Some(done) => match socket.send(Command::Close.as_bytes(), 0) {
                Ok(()) => done,
                Err(err) => {
                    *lock(&self.done) = Some(done);
                    return Err(err);
                }
            },
            None => {
                // Never polled, nothing to wait for
                lock(&self.wake_worker).take();
                let (sender, receiver) = oneshot::channel();
                let _ = sender.send(());
                receiver
            }
        };

        debug!("Poller {} closing", self.endpoint);
        wake.take();
        Ok(done)
    }
}

impl Drop for ZmqPoller {
    fn drop(&mut self) {
        if let Some(wake) = lock(&self.wake).take() {
            let _ = wake.send(Command::Close.as_bytes(), 0);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().expect("Lock should not be poisoned")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActorState {
    /// Blocked in zmq_poll on the target socket.
    Polling,
    /// Notified, waiting for `Continue`.
    Armed,
    /// Only `Close` matters now.
    Stopped,
}

enum Readiness {
    Readable,
    Command(Option<Command>),
    Spurious,
}

enum Step {
    Again,
    Command(Option<Command>),
}

struct Actor {
    socket: Arc<ZmqSocket>,
    wake: zmq::Socket,
    notify: mpsc::Sender<PollResult>,
    state: ActorState,
}

impl Actor {
    fn run(&mut self) {
        loop {
            let command = match self.state {
                ActorState::Polling => {
                    let polled = self.poll_once();
                    match self.handle_poll(polled) {
                        Step::Again => continue,
                        Step::Command(command) => command,
                    }
                }
                ActorState::Armed | ActorState::Stopped => match self.wake.recv_bytes(0) {
                    Ok(raw) => Command::parse(&raw),
                    Err(err) => {
                        warn!("Poller command channel failed: {}", err);
                        return;
                    }
                },
            };

            match command {
                Some(Command::Close) => return,
                Some(command) => self.handle_command(command),
                None => warn!("Ignoring unknown poller command"),
            }
        }
    }

    fn handle_poll(&mut self, polled: Result<Readiness, zmq::Error>) -> Step {
        match polled {
            Ok(Readiness::Readable) => {
                self.state = match self.notify.blocking_send(Ok(())) {
                    Ok(()) => ActorState::Armed,
                    Err(_) => ActorState::Stopped,
                };
                Step::Again
            }
            Ok(Readiness::Command(command)) => Step::Command(command),
            Ok(Readiness::Spurious) => Step::Again,
            // Signal delivered to this thread, not a socket failure
            Err(zmq::Error::EINTR) => {
                trace!("Poll interrupted, retrying");
                Step::Again
            }
            Err(err) => {
                warn!("Polling failed: {}", err);
                let _ = self.notify.blocking_send(Err(err));
                self.state = ActorState::Stopped;
                Step::Again
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        self.state = match (self.state, command) {
            (_, Command::Stop) => ActorState::Stopped,
            (ActorState::Armed, Command::Continue) => ActorState::Polling,
            (state, _) => state,
        };
        trace!("Poller handled {:?}, now {:?}", command, self.state);
    }

    fn poll_once(&self) -> Result<Readiness, zmq::Error> {
        let guard = self.socket.lock();
        let target = guard.as_ref().ok_or(zmq::Error::ENOTSOCK)?;

        let mut items = [target.as_poll_item(zmq::POLLIN), self.wake.as_poll_item(zmq::POLLIN)];
        zmq::poll(&mut items, -1)?;

        if items[1].is_readable() {
            let raw = self.wake.recv_bytes(0)?;
            return Ok(Readiness::Command(Command::parse(&raw)));
        }

        Ok(if items[0].is_readable() { Readiness::Readable } else { Readiness::Spurious })
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::sync::mpsc;

    use super::{Actor, ActorState, Command, Poller, Readiness, Step, ZmqPoller};
    use crate::socket::{Socket, ZmqSocket};

    fn pipe(ctx: &zmq::Context, endpoint: &str) -> (zmq::Socket, Arc<ZmqSocket>) {
        let sender = ctx.socket(zmq::PAIR).unwrap();
        sender.bind(endpoint).unwrap();

        let receiver = ZmqSocket::new(ctx.socket(zmq::PAIR).unwrap());
        receiver.connect(endpoint).unwrap();

        (sender, Arc::new(receiver))
    }

    #[test]
    fn commands_round_trip() {
        for command in [Command::Continue, Command::Stop, Command::Close] {
            assert_eq!(Command::parse(command.as_bytes()), Some(command));
        }
        assert_eq!(Command::parse(b"bogus"), None);
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn notifies_once_per_resume() {
        let ctx = zmq::Context::new();
        let (sender, socket) = pipe(&ctx, "inproc://poller-notifies-once");
        let poller = ZmqPoller::new(&ctx).unwrap();

        let mut notifications = poller.poll(Arc::clone(&socket)).unwrap();

        sender.send(&b"one"[..], 0).unwrap();
        sender.send(&b"two"[..], 0).unwrap();

        // First message: one notification, then silence until re-armed
        assert!(notifications.recv().await.unwrap().is_ok());
        socket.recv_multipart(0).unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(100), notifications.recv()).await;
        assert!(quiet.is_err());

        // Second message after resume
        poller.resume().unwrap();
        assert!(notifications.recv().await.unwrap().is_ok());
        socket.recv_multipart(0).unwrap();

        // Close ends the stream and fires done
        let done = poller.close().unwrap();
        assert!(notifications.recv().await.is_none());
        done.await.unwrap();
        socket.close().unwrap();
    }

    #[test_log::test(tokio::test(flavor = "multi_thread"))]
    async fn stop_silences_notifications() {
        let ctx = zmq::Context::new();
        let (sender, socket) = pipe(&ctx, "inproc://poller-stop-silences");
        let poller = ZmqPoller::new(&ctx).unwrap();

        let mut notifications = poller.poll(Arc::clone(&socket)).unwrap();
        poller.stop().unwrap();
        poller.stop().unwrap();

        sender.send(&b"ignored"[..], 0).unwrap();
        let quiet = tokio::time::timeout(Duration::from_millis(100), notifications.recv()).await;
        assert!(quiet.is_err());

        poller.close().unwrap().await.unwrap();
        assert!(notifications.recv().await.is_none());
        socket.close().unwrap();
    }

    #[tokio::test]
    async fn close_without_poll_completes_immediately() {
        let ctx = zmq::Context::new();
        let poller = ZmqPoller::new(&ctx).unwrap();

        poller.close().unwrap().await.unwrap();

        assert!(matches!(poller.close(), Err(zmq::Error::ETERM)));
        assert_eq!(poller.resume(), Err(zmq::Error::ETERM));
    }

    fn actor(ctx: &zmq::Context) -> (Actor, mpsc::Receiver<super::PollResult>) {
        let (notify, notifications) = mpsc::channel(1);
        let actor = Actor {
            socket: Arc::new(ZmqSocket::new(ctx.socket(zmq::PAIR).unwrap())),
            wake: ctx.socket(zmq::PAIR).unwrap(),
            notify,
            state: ActorState::Polling,
        };
        (actor, notifications)
    }

    #[test_log::test]
    fn interrupted_poll_is_retried() {
        let ctx = zmq::Context::new();
        let (mut actor, mut notifications) = actor(&ctx);

        assert!(matches!(actor.handle_poll(Err(zmq::Error::EINTR)), Step::Again));

        assert_eq!(actor.state, ActorState::Polling);
        assert!(notifications.try_recv().is_err());
    }

    #[test_log::test]
    fn other_poll_errors_end_polling() {
        let ctx = zmq::Context::new();
        let (mut actor, mut notifications) = actor(&ctx);

        assert!(matches!(actor.handle_poll(Err(zmq::Error::ETERM)), Step::Again));

        assert_eq!(actor.state, ActorState::Stopped);
        assert_eq!(notifications.try_recv().unwrap(), Err(zmq::Error::ETERM));
    }

    #[test]
    fn readable_arms_until_resumed() {
        let ctx = zmq::Context::new();
        let (mut actor, mut notifications) = actor(&ctx);

        actor.handle_poll(Ok(Readiness::Readable));
        assert_eq!(actor.state, ActorState::Armed);
        assert_eq!(notifications.try_recv().unwrap(), Ok(()));

        actor.handle_command(Command::Continue);
        assert_eq!(actor.state, ActorState::Polling);
    }
}
