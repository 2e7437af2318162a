mod codec;
mod error;
mod event;
mod monitor;
mod poller;
mod socket;
mod stream;

pub use codec::parse_event;
pub use error::{MonitorError, ProtocolError};
pub use event::{Events, SocketEvent};
pub use monitor::{check_version, CloseHandle, CloseStage, Monitor, State};
pub use poller::{Notifications, PollResult, Poller, ZmqPoller};
pub use socket::{Socket, ZmqSocket};
pub use stream::{EventResult, EventStream, EVENT_STREAM_CAPACITY};
