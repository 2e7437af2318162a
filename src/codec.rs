//! Decoding of libzmq's two-frame socket monitor messages.
//!
//! Frame 1 carries a 6-byte header, the event code (`u16`) followed by the
//! value (`i32`), both in host byte order. Frame 2 is the endpoint address.

use crate::{error::ProtocolError, event::SocketEvent};

const CODE_LEN: usize = 2;
const VALUE_LEN: usize = 4;
const HEADER_LEN: usize = CODE_LEN + VALUE_LEN;

/// Decode one received monitor message into a [`SocketEvent`].
pub fn parse_event(frames: &[Vec<u8>]) -> Result<SocketEvent, ProtocolError> {
    match frames {
        [header, address] => {
            let (event, value) = parse_header(header)?;

            Ok(SocketEvent {
                event,
                value,
                address: String::from_utf8_lossy(address).into_owned(),
            })
        }
        [_] => Err(ProtocolError::DeprecatedProtocol),
        _ => Err(ProtocolError::UnexpectedPayload { frames: frames.len() }),
    }
}

fn parse_header(header: &[u8]) -> Result<(u16, i32), ProtocolError> {
    let truncated = || ProtocolError::TruncatedHeader { len: header.len() };

    let code: [u8; CODE_LEN] = header
        .get(..CODE_LEN)
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(truncated)?;
    let value: [u8; VALUE_LEN] = header
        .get(CODE_LEN..HEADER_LEN)
        .and_then(|raw| raw.try_into().ok())
        .ok_or_else(truncated)?;

    Ok((u16::from_ne_bytes(code), i32::from_ne_bytes(value)))
}

/// Encode an event the way libzmq puts it on the wire. Test helper for the
/// monitor's fault-injection tests.
#[cfg(test)]
pub(crate) fn encode_event(event: u16, value: i32, address: &str) -> Vec<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN);
    header.extend_from_slice(&event.to_ne_bytes());
    header.extend_from_slice(&value.to_ne_bytes());

    vec![header, address.as_bytes().to_vec()]
}
