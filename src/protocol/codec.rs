//! Protocol codec - typed commands and events over fixed-width frames.
//!
//! Outbound traffic is a [`Command`], inbound traffic an [`Event`]. Decoding
//! an inbound frame never fails: anything the client cannot use becomes
//! [`Event::ProtocolError`], which the session logs and drops.
//!
//! # Example
//!
//! ```
//! use raig_client::protocol::{Command, Event, ProtocolCodec};
//! use raig_client::Cell;
//!
//! let codec = ProtocolCodec::default();
//!
//! let bytes = codec.encode(&Command::SetBlocked { cell: Cell::new(3, 0, 3) }).unwrap();
//! assert_eq!(&bytes[..], b"05_003_000_0030000");
//!
//! let event = codec.decode(b"02_001_005_0050000");
//! assert_eq!(event, Event::Node { seq: 1, x: 5, z: 5 });
//! ```

use bytes::Bytes;

use super::wire_format::{FrameCode, FrameLayout};
use crate::error::{RaigError, Result};
use crate::path::Cell;
use crate::world::AiService;

/// Client-to-server command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Create (or re-create) the world.
    InitWorld {
        /// World width in cells.
        width: u32,
        /// World height in cells.
        height: u32,
        /// Algorithm selector.
        service: AiService,
    },
    /// Clear a blocked cell.
    SetOpen {
        /// Cell to open.
        cell: Cell,
    },
    /// Mark a cell impassable.
    SetBlocked {
        /// Cell to block.
        cell: Cell,
    },
    /// Ask for a path. Only the x and z coordinates travel on the wire.
    RequestPath {
        /// Start cell.
        start: Cell,
        /// Goal cell.
        goal: Cell,
    },
}

impl Command {
    /// Frame code this command is sent with.
    pub fn code(&self) -> FrameCode {
        match self {
            Self::InitWorld { .. } => FrameCode::World,
            Self::SetOpen { .. } => FrameCode::CellOpen,
            Self::SetBlocked { .. } => FrameCode::CellBlocked,
            Self::RequestPath { .. } => FrameCode::PathRequest,
        }
    }

    fn fields(&self) -> Vec<u32> {
        match *self {
            Self::InitWorld {
                width,
                height,
                service,
            } => vec![width, height, service.as_u32()],
            Self::SetOpen { cell } | Self::SetBlocked { cell } => vec![cell.x, cell.y, cell.z],
            Self::RequestPath { start, goal } => vec![start.x, start.z, goal.x, goal.z],
        }
    }
}

/// Server-to-client event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// One intermediate path cell, goal-to-start order.
    Node {
        /// Sequence id.
        seq: u32,
        /// X coordinate.
        x: u32,
        /// Z coordinate.
        z: u32,
    },
    /// Final path cell; completes the request.
    End {
        /// Sequence id.
        seq: u32,
        /// X coordinate.
        x: u32,
        /// Z coordinate.
        z: u32,
    },
    /// Keepalive.
    Empty,
    /// A frame the client could not use.
    ProtocolError(String),
}

impl Event {
    /// Frame code this event travels with, `None` for protocol errors.
    pub fn code(&self) -> Option<FrameCode> {
        match self {
            Self::Node { .. } => Some(FrameCode::Node),
            Self::End { .. } => Some(FrameCode::End),
            Self::Empty => Some(FrameCode::Empty),
            Self::ProtocolError(_) => None,
        }
    }
}

/// Encoder/decoder bound to one [`FrameLayout`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProtocolCodec {
    layout: FrameLayout,
}

impl ProtocolCodec {
    /// Create a codec for the given layout.
    pub fn new(layout: FrameLayout) -> Self {
        Self { layout }
    }

    /// The layout frames are encoded with.
    #[inline]
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Bytes per frame.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.layout.frame_size()
    }

    /// Encode a command into one frame.
    ///
    /// # Errors
    ///
    /// Returns [`RaigError::FieldOverflow`] if a coordinate or dimension does
    /// not fit the layout's field width.
    pub fn encode(&self, command: &Command) -> Result<Bytes> {
        self.encode_raw(command.code(), &command.fields())
    }

    /// Decode an inbound frame. Never fails.
    pub fn decode(&self, frame: &[u8]) -> Event {
        match self.try_decode(frame) {
            Ok(event) => event,
            Err(e) => Event::ProtocolError(e.to_string()),
        }
    }

    /// Encode an event, as a server would.
    ///
    /// # Errors
    ///
    /// Returns an error for [`Event::ProtocolError`] (it has no wire form) or
    /// for fields wider than the layout allows.
    pub fn encode_event(&self, event: &Event) -> Result<Bytes> {
        match *event {
            Event::Node { seq, x, z } => self.encode_raw(FrameCode::Node, &[seq, x, z]),
            Event::End { seq, x, z } => self.encode_raw(FrameCode::End, &[seq, x, z]),
            Event::Empty => self.encode_raw(FrameCode::Empty, &[]),
            Event::ProtocolError(_) => Err(RaigError::Protocol(
                "Protocol errors have no wire form".to_string(),
            )),
        }
    }

    /// Decode an outbound frame, as a server would.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the frame is malformed or is not a command.
    pub fn decode_command(&self, frame: &[u8]) -> Result<Command> {
        let (code, f) = self.layout.parse_frame(frame)?;
        match code {
            FrameCode::World => {
                let service = AiService::from_u32(f[2])
                    .ok_or_else(|| RaigError::Protocol(format!("Unknown AI service {}", f[2])))?;
                Ok(Command::InitWorld {
                    width: f[0],
                    height: f[1],
                    service,
                })
            }
            FrameCode::CellOpen => Ok(Command::SetOpen {
                cell: Cell::new(f[0], f[1], f[2]),
            }),
            FrameCode::CellBlocked => Ok(Command::SetBlocked {
                cell: Cell::new(f[0], f[1], f[2]),
            }),
            FrameCode::PathRequest => Ok(Command::RequestPath {
                start: Cell::new(f[0], 0, f[1]),
                goal: Cell::new(f[2], 0, f[3]),
            }),
            other => Err(RaigError::Protocol(format!(
                "{} is not a client command",
                other.name()
            ))),
        }
    }

    fn try_decode(&self, frame: &[u8]) -> Result<Event> {
        let (code, f) = self.layout.parse_frame(frame)?;
        match code {
            FrameCode::Node => Ok(Event::Node {
                seq: f[0],
                x: f[1],
                z: f[2],
            }),
            FrameCode::End => Ok(Event::End {
                seq: f[0],
                x: f[1],
                z: f[2],
            }),
            FrameCode::Empty => Ok(Event::Empty),
            other => Err(RaigError::Protocol(format!(
                "Unexpected {} frame from server",
                other.name()
            ))),
        }
    }

    fn encode_raw(&self, code: FrameCode, fields: &[u32]) -> Result<Bytes> {
        let mut buf = Vec::with_capacity(self.layout.frame_size());
        self.layout.write_frame(code, fields, &mut buf)?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> ProtocolCodec {
        ProtocolCodec::default()
    }

    #[test]
    fn test_encode_world() {
        let bytes = codec()
            .encode(&Command::InitWorld {
                width: 20,
                height: 15,
                service: AiService::AStar,
            })
            .unwrap();
        assert_eq!(&bytes[..], b"00_020_015_0000000");
    }

    #[test]
    fn test_encode_path_request_drops_y() {
        let bytes = codec()
            .encode(&Command::RequestPath {
                start: Cell::new(1, 7, 2),
                goal: Cell::new(3, 7, 4),
            })
            .unwrap();
        assert_eq!(&bytes[..], b"01_001_002_003_004");
    }

    #[test]
    fn test_encode_overflow_is_error() {
        let result = codec().encode(&Command::SetBlocked {
            cell: Cell::new(1000, 0, 0),
        });
        assert!(matches!(result, Err(RaigError::FieldOverflow { .. })));
    }

    #[test]
    fn test_command_roundtrip() {
        let codec = codec();
        let commands = [
            Command::InitWorld {
                width: 64,
                height: 48,
                service: AiService::Bfs,
            },
            Command::SetOpen {
                cell: Cell::new(1, 2, 3),
            },
            Command::SetBlocked {
                cell: Cell::new(999, 0, 999),
            },
            Command::RequestPath {
                start: Cell::new(0, 0, 0),
                goal: Cell::new(5, 0, 5),
            },
        ];

        for command in commands {
            let bytes = codec.encode(&command).unwrap();
            assert_eq!(bytes.len(), codec.frame_size());
            assert_eq!(codec.decode_command(&bytes).unwrap(), command);
        }
    }

    #[test]
    fn test_event_roundtrip() {
        let codec = codec();
        let events = [
            Event::Node { seq: 1, x: 5, z: 5 },
            Event::End { seq: 2, x: 0, z: 0 },
            Event::Empty,
        ];

        for event in events {
            let bytes = codec.encode_event(&event).unwrap();
            assert_eq!(codec.decode(&bytes), event);
        }
    }

    #[test]
    fn test_decode_never_fails() {
        let codec = codec();
        assert!(matches!(codec.decode(b""), Event::ProtocolError(_)));
        assert!(matches!(
            codec.decode(b"99_000_000_0000000"),
            Event::ProtocolError(_)
        ));
        assert!(matches!(
            codec.decode(b"02_001_0050000000_"),
            Event::ProtocolError(_)
        ));
    }

    #[test]
    fn test_decode_outbound_code_is_protocol_error() {
        let codec = codec();
        let world = codec
            .encode(&Command::InitWorld {
                width: 1,
                height: 1,
                service: AiService::AStar,
            })
            .unwrap();

        match codec.decode(&world) {
            Event::ProtocolError(reason) => assert!(reason.contains("WORLD")),
            other => panic!("expected protocol error, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_command_rejects_events_and_bad_service() {
        let codec = codec();
        assert!(codec.decode_command(b"02_001_005_0050000").is_err());
        assert!(codec.decode_command(b"00_010_010_0090000").is_err());
    }

    #[test]
    fn test_encode_protocol_error_event_fails() {
        assert!(codec()
            .encode_event(&Event::ProtocolError("x".to_string()))
            .is_err());
    }

    #[test]
    fn test_narrow_layout() {
        let codec = ProtocolCodec::new(FrameLayout::new(2).unwrap());
        let bytes = codec.encode_event(&Event::Node { seq: 9, x: 1, z: 2 }).unwrap();
        assert_eq!(&bytes[..], b"02_09_01_02000");
        assert!(codec
            .encode_event(&Event::Node { seq: 100, x: 1, z: 2 })
            .is_err());
    }
}
