use thiserror::Error;

/// A malformed monitor payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// The single-frame format emitted by libzmq older than 3.3.0.
    #[error("deprecated single-frame socket monitor protocol detected")]
    DeprecatedProtocol,

    #[error("unexpected monitor payload with {frames} frames")]
    UnexpectedPayload { frames: usize },

    #[error("monitor event header is {len} bytes, expected at least 6")]
    TruncatedHeader { len: usize },
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("libzmq >= 3.3.0 is required, but {major}.{minor}.{patch} was detected")]
    UnsupportedVersion { major: i32, minor: i32, patch: i32 },

    #[error("monitor setup failed while trying to {stage}: {source}")]
    Setup {
        stage: &'static str,
        #[source]
        source: zmq::Error,
    },

    #[error("poller failed: {0}")]
    Poll(#[source] zmq::Error),

    #[error("receiving monitor event failed: {0}")]
    Receive(#[source] zmq::Error),

    #[error("re-arming poller failed: {0}")]
    Rearm(#[source] zmq::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("could not launch event pump: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("closing poller failed: {0}")]
    Close(#[source] zmq::Error),

    #[error("monitor already started")]
    AlreadyStarted,

    #[error("monitor already closed")]
    AlreadyClosed,
}
