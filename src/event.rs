use bitflags::bitflags;
use serde::Serialize;

bitflags! {
    /// libzmq socket monitor event codes, usable both as an interest mask and
    /// to classify a received event.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
    pub struct Events: u16 {
        const CONNECTED = 0x0001;
        const CONNECT_DELAYED = 0x0002;
        const CONNECT_RETRIED = 0x0004;
        const LISTENING = 0x0008;
        const BIND_FAILED = 0x0010;
        const ACCEPTED = 0x0020;
        const ACCEPT_FAILED = 0x0040;
        const CLOSED = 0x0080;
        const CLOSE_FAILED = 0x0100;
        const DISCONNECTED = 0x0200;
        const MONITOR_STOPPED = 0x0400;
        const HANDSHAKE_FAILED_NO_DETAIL = 0x0800;
        const HANDSHAKE_SUCCEEDED = 0x1000;
        const HANDSHAKE_FAILED_PROTOCOL = 0x2000;
        const HANDSHAKE_FAILED_AUTH = 0x4000;
        const ALL = 0xFFFF;
    }
}

impl Events {
    /// The mask in the form libzmq's `zmq_socket_monitor` expects.
    pub fn as_raw(self) -> i32 {
        i32::from(self.bits())
    }
}

/// A lifecycle event reported by a monitored socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocketEvent {
    /// Raw event code, one bit of [`Events`].
    pub event: u16,
    /// Auxiliary datum: a file descriptor, errno or interval depending on the event.
    pub value: i32,
    /// Endpoint the event pertains to.
    pub address: String,
}

impl SocketEvent {
    pub fn kind(&self) -> Events {
        Events::from_bits_retain(self.event)
    }

    pub fn is(&self, events: Events) -> bool {
        self.kind().intersects(events)
    }
}
