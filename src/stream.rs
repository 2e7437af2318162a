use std::{pin::Pin, task::{Context, Poll}};

use futures_util::Stream;
use tokio::sync::mpsc;

use crate::{error::MonitorError, event::SocketEvent};

/// Either a decoded event or an in-band failure reported by the event pump.
pub type EventResult = Result<SocketEvent, MonitorError>;

/// Number of events the pump may buffer before it blocks on the consumer.
pub const EVENT_STREAM_CAPACITY: usize = 1;

/// The receiving end of a monitor's event pump.
///
/// Ends (yields `None`) once the pump has stopped producing, which happens
/// after the monitor is closed or after a fatal poller failure.
/// Dropping the stream makes the pump exit at its next delivery.
pub struct EventStream {
    receiver: mpsc::Receiver<EventResult>,
}

impl EventStream {
    pub(crate) fn channel() -> (mpsc::Sender<EventResult>, Self) {
        let (sender, receiver) = mpsc::channel(EVENT_STREAM_CAPACITY);

        (sender, Self { receiver })
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<EventResult> {
        self.receiver.recv().await
    }

    /// Blocking variant of [`EventStream::recv`], panics when called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<EventResult> {
        self.receiver.blocking_recv()
    }
}

impl Stream for EventStream {
    type Item = EventResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::EventStream;
    use crate::{error::MonitorError, event::SocketEvent};

    #[tokio::test]
    async fn stream_works() {
        let (sender, mut stream) = EventStream::channel();

        tokio::spawn(async move {
            for value in 0..3 {
                let event = SocketEvent { event: 1, value, address: "inproc://a".into() };
                sender.send(Ok(event)).await.unwrap();
            }
            sender.send(Err(MonitorError::AlreadyClosed)).await.unwrap();
        });

        // Three events, in order
        for expected in 0..3 {
            let event = stream.next().await.unwrap().unwrap();
            assert_eq!(event.value, expected);
        }

        // Then the error, then the end
        assert!(matches!(stream.recv().await, Some(Err(MonitorError::AlreadyClosed))));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn capacity_is_one() {
        let (sender, mut stream) = EventStream::channel();
        let event = SocketEvent { event: 1, value: 0, address: String::new() };

        sender.try_send(Ok(event.clone())).unwrap();
        assert!(sender.try_send(Ok(event)).is_err());

        assert!(stream.blocking_recv().unwrap().is_ok());
    }
}
