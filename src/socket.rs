use std::sync::{Mutex, MutexGuard};

/// The monitor's side of the event feed: something multipart messages can be
/// received from and that can be closed exactly once.
pub trait Socket: Send + Sync + 'static {
    fn recv_multipart(&self, flags: i32) -> Result<Vec<Vec<u8>>, zmq::Error>;

    fn close(&self) -> Result<(), zmq::Error>;
}

/// A zmq socket that may be used from the pump, the poller and the close
/// sequence in turn.
///
/// Closing drops the underlying socket; later calls fail with `ENOTSOCK`.
pub struct ZmqSocket {
    inner: Mutex<Option<zmq::Socket>>,
}

impl ZmqSocket {
    pub fn new(socket: zmq::Socket) -> Self {
        Self { inner: Mutex::new(Some(socket)) }
    }

    pub fn connect(&self, endpoint: &str) -> Result<(), zmq::Error> {
        self.lock().as_ref().ok_or(zmq::Error::ENOTSOCK)?.connect(endpoint)
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<zmq::Socket>> {
        self.inner.lock().expect("Lock should not be poisoned")
    }
}

impl Socket for ZmqSocket {
    fn recv_multipart(&self, flags: i32) -> Result<Vec<Vec<u8>>, zmq::Error> {
        self.lock().as_ref().ok_or(zmq::Error::ENOTSOCK)?.recv_multipart(flags)
    }

    fn close(&self) -> Result<(), zmq::Error> {
        self.lock().take().map(drop).ok_or(zmq::Error::ENOTSOCK)
    }
}
