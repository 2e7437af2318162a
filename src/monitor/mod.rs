//! Socket monitor
//! - Wire a private pair socket to a zmq socket's monitor feed
//! - Pump decoded events to the consumer on a background thread
//! - Tear down poller, then socket, without racing the pump

use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Builder;

use crate::{
    error::MonitorError,
    event::Events,
    poller::{Poller, ZmqPoller},
    socket::{Socket, ZmqSocket},
    stream::EventStream,
};

pub use close::CloseHandle;

mod close;
mod pump;

/// Oldest libzmq speaking the two-frame monitor protocol.
pub const MIN_VERSION: (i32, i32) = (3, 3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Created,
    Started,
    Stopped,
    Closing(CloseStage),
    Closed,
}

/// Which resource the close sequence is currently waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStage {
    Poller,
    Socket,
}

/// Observes lifecycle events of a zmq socket.
///
/// Owns one private pair socket and one poller for its entire life. Dropping
/// a monitor that was never closed starts the close sequence in the background.
pub struct Monitor<S: Socket = ZmqSocket, P: Poller<S> = ZmqPoller> {
    socket: Arc<S>,
    poller: Arc<P>,
    state: Arc<Mutex<State>>,
}

impl Monitor {
    /// Start monitoring `socket` for `events`, using `endpoint` (an `inproc://`
    /// address) to carry the events to the monitor.
    pub fn new(ctx: &zmq::Context, socket: &zmq::Socket, endpoint: &str, events: Events) -> Result<Self, MonitorError> {
        check_version(zmq::version())?;

        let pair = ZmqSocket::new(ctx.socket(zmq::PAIR).map_err(setup("create the monitor socket"))?);

        let poller = rollback(&pair, wire(ctx, socket, &pair, endpoint, events))?;

        info!("Monitoring {:?} through {}", events, endpoint);
        Ok(Self::from_parts(pair, poller))
    }
}

fn wire(ctx: &zmq::Context, socket: &zmq::Socket, pair: &ZmqSocket, endpoint: &str, events: Events) -> Result<ZmqPoller, MonitorError> {
    socket.monitor(endpoint, events.as_raw()).map_err(setup("register the monitor endpoint"))?;
    pair.connect(endpoint).map_err(setup("connect to the monitor endpoint"))?;
    ZmqPoller::new(ctx).map_err(setup("create the poller"))
}

/// Close the half-built monitor socket when setup failed.
fn rollback<S: Socket, T>(socket: &S, result: Result<T, MonitorError>) -> Result<T, MonitorError> {
    result.inspect_err(|err| {
        debug!("Monitor setup failed, closing monitor socket: {}", err);
        if let Err(close) = socket.close() {
            debug!("Ignoring monitor socket close error: {}", close);
        }
    })
}

fn setup(stage: &'static str) -> impl FnOnce(zmq::Error) -> MonitorError {
    move |source| MonitorError::Setup { stage, source }
}

/// Reject libzmq versions that only speak the single-frame monitor protocol.
pub fn check_version((major, minor, patch): (i32, i32, i32)) -> Result<(), MonitorError> {
    if (major, minor) >= MIN_VERSION {
        Ok(())
    } else {
        Err(MonitorError::UnsupportedVersion { major, minor, patch })
    }
}

impl<S: Socket, P: Poller<S>> Monitor<S, P> {
    /// Assemble a monitor from an already wired socket and its poller.
    pub fn from_parts(socket: S, poller: P) -> Self {
        Self {
            socket: Arc::new(socket),
            poller: Arc::new(poller),
            state: Arc::new(Mutex::new(State::Created)),
        }
    }

    pub fn state(&self) -> State {
        *self.lock()
    }

    /// Subscribe to the monitor socket and launch the event pump.
    ///
    /// Can only be called once; the returned stream ends when the monitor is closed.
    pub fn start(&self) -> Result<EventStream, MonitorError> {
        let mut state = self.lock();
        match *state {
            State::Created => {}
            State::Started | State::Stopped => return Err(MonitorError::AlreadyStarted),
            State::Closing(_) | State::Closed => return Err(MonitorError::AlreadyClosed),
        }

        let notifications = self.poller.poll(Arc::clone(&self.socket)).map_err(MonitorError::Poll)?;
        let runtime = Builder::new_current_thread().build().map_err(MonitorError::Runtime)?;
        let (sender, stream) = EventStream::channel();

        let socket = Arc::clone(&self.socket);
        let poller = Arc::clone(&self.poller);
        let shared = Arc::clone(&self.state);
        std::thread::Builder::new()
            .name("zmq-monitor-pump".into())
            .spawn(move || runtime.block_on(pump::run(socket, poller, shared, notifications, sender)))
            .map_err(MonitorError::Runtime)?;

        *state = State::Started;
        debug!("Monitor started");
        Ok(stream)
    }

    /// Stop event delivery. The socket stays open until [`Monitor::close`].
    pub fn stop(&self) -> Result<(), MonitorError> {
        let mut state = self.lock();
        match *state {
            State::Started => {
                self.poller.stop().map_err(MonitorError::Poll)?;
                *state = State::Stopped;
                debug!("Monitor stopped");
                Ok(())
            }
            State::Created | State::Stopped => Ok(()),
            State::Closing(_) | State::Closed => Err(MonitorError::AlreadyClosed),
        }
    }

    /// Begin closing the poller, then the socket. Returns immediately.
    ///
    /// Any running event stream ends once the poller is down. Closing twice
    /// fails with [`MonitorError::AlreadyClosed`]. When the poller cannot be
    /// closed the socket is still closed in the background and the error returned.
    pub fn close(&self) -> Result<CloseHandle, MonitorError> {
        let mut state = self.lock();
        if let State::Closing(_) | State::Closed = *state {
            return Err(MonitorError::AlreadyClosed);
        }

        let socket = Arc::clone(&self.socket);
        let shared = Arc::clone(&self.state);
        match self.poller.close() {
            Ok(poller_done) => {
                *state = State::Closing(CloseStage::Poller);
                drop(state);
                debug!("Closing monitor");
                Ok(close::spawn(socket, shared, Some(poller_done)))
            }
            Err(err) => {
                warn!("Could not close poller, closing monitor socket anyway: {}", err);
                *state = State::Closing(CloseStage::Socket);
                drop(state);
                let _ = close::spawn(socket, shared, None);
                Err(MonitorError::Close(err))
            }
        }
    }

    /// [`Monitor::close`], then block until teardown has completed.
    ///
    /// Must not be called from within an async runtime; await the handle from `close` there instead.
    pub fn close_wait(&self) -> Result<(), MonitorError> {
        self.close()?.wait();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("Lock should not be poisoned")
    }
}

impl<S: Socket, P: Poller<S>> Drop for Monitor<S, P> {
    fn drop(&mut self) {
        if let State::Created | State::Started | State::Stopped = self.state() {
            debug!("Monitor dropped while open, closing in background");
            let _ = self.close();
        }
    }
}
