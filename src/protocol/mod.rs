//! Protocol module - wire format, framing, and the command/event codec.
//!
//! This module implements the fixed-width ASCII protocol spoken with the
//! pathfinding server:
//! - Frame layout and field parsing
//! - Frame buffer for reassembling arbitrarily chunked reads
//! - Typed commands (outbound) and events (inbound)

mod codec;
mod frame;
mod frame_buffer;
mod wire_format;

pub use codec::{Command, Event, ProtocolCodec};
pub use frame::Frame;
pub use frame_buffer::{FrameBuffer, DEFAULT_BUFFER_CAPACITY, DEFAULT_RESYNC_THRESHOLD};
pub use wire_format::{
    FrameCode, FrameLayout, CODE_WIDTH, DEFAULT_FIELD_WIDTH, DELIMITER, FILL, MAX_FIELDS,
    MAX_FIELD_WIDTH,
};
