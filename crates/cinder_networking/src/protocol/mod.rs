//! # Wire Protocol
//!
//! Length-prefixed binary messages over a reliable, ordered byte stream.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌────────────┬─────────┬──────────────────────────────┐
//! │ len (u16)  │ tag (1) │ body (len - 1 bytes)         │
//! └────────────┴─────────┴──────────────────────────────┘
//! ```
//!
//! All integers and floats are big-endian.
//!
//! | Tag | Client → Server | Server → Client |
//! |-----|-----------------|-----------------|
//! | 0 | `{kind:u8}` control | `{id,x,y,hp}` welcome |
//! | 1 | `{intent:u8, seq:u16}` | `{id,x,y,hp}` peer update |
//! | 2 | | `{id,x,y,hp}` peer joined |
//! | 3 | | `{id}` peer left |
//! | 4 | | `{id,x,y,lastSeq:u16}` own echo |
//! | 5 | ping | |
//! | 6 | | pong |
//! | 7 | | `{id,hp,damageSeq:u16}` own health |
//! | 8 | | `{id,hp,damageSeq:u16}` peer health |

mod framing;
mod messages;
mod serialization;

pub use framing::{encode_frame, FrameDecoder, Frames, LENGTH_PREFIX, MAX_PAYLOAD};
pub use messages::{ClientMessage, MessageTag, ServerMessage, CONTROL_DISCONNECT};
pub use serialization::{WireReader, WireWriter};

/// Frames a message body.
///
/// Bodies are at most 29 bytes, so the oversize branch is unreachable for
/// every message defined here. It still yields an empty frame rather than a
/// truncated length prefix.
fn prefixed(payload: &[u8]) -> Vec<u8> {
    match encode_frame(payload) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!(error = %e, "message body does not fit in a frame");
            Vec::new()
        }
    }
}

impl ClientMessage {
    /// Encodes the message as a complete frame.
    #[must_use]
    pub fn to_frame(&self) -> Vec<u8> {
        prefixed(&self.encode())
    }
}

impl ServerMessage {
    /// Encodes the message as a complete frame.
    #[must_use]
    pub fn to_frame(&self) -> Vec<u8> {
        prefixed(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_core::{EntityId, Intent, Position};

    #[test]
    fn test_frames_through_decoder() {
        let mut stream = ClientMessage::Intent { intent: Intent::UP, seq: 1 }.to_frame();
        stream.extend(ClientMessage::Ping.to_frame());
        stream.extend(ClientMessage::Control { kind: CONTROL_DISCONNECT }.to_frame());

        let mut decoder = FrameDecoder::new();
        decoder.push(&stream[..3]);
        assert!(decoder.next_frame().is_none());
        decoder.push(&stream[3..]);

        let decoded: Vec<ClientMessage> = decoder
            .frames()
            .map(|payload| ClientMessage::decode(&payload).unwrap())
            .collect();
        assert_eq!(
            decoded,
            vec![
                ClientMessage::Intent { intent: Intent::UP, seq: 1 },
                ClientMessage::Ping,
                ClientMessage::Control { kind: 0 },
            ]
        );
    }

    #[test]
    fn test_server_frame_prefix() {
        let welcome = ServerMessage::Welcome {
            id: EntityId::new(1),
            position: Position::new(0.0, 0.0),
            health: 100.0,
        };
        let frame = welcome.to_frame();
        assert_eq!(&frame[..2], &[0, 29]);
        assert_eq!(frame.len(), 31);
        assert_eq!(frame, encode_frame(&welcome.encode()).unwrap());
    }
}
