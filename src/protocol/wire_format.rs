//! Wire format encoding and decoding.
//!
//! Every frame is a fixed-width ASCII record:
//! ```text
//! ┌──────┬───┬─────────┬───┬─────────┬─────┬──────────────┐
//! │ Code │ _ │ Field 1 │ _ │ Field 2 │ ... │ Fill ('0'…)  │
//! │ 2 dig│   │ W digits│   │ W digits│     │ to width     │
//! └──────┴───┴─────────┴───┴─────────┴─────┴──────────────┘
//! ```
//!
//! `W` is the layout's field width. The frame width is sized for the widest
//! frame (`PATH_REQUEST`, four fields), so every frame has the same length and
//! the reassembler can slice the stream without looking at its content.

use crate::error::{RaigError, Result};

/// Number of digits in the frame code.
pub const CODE_WIDTH: usize = 2;

/// Separator written before every field.
pub const DELIMITER: u8 = b'_';

/// Byte used to pad a frame up to the fixed width.
pub const FILL: u8 = b'0';

/// Largest field count of any frame kind.
pub const MAX_FIELDS: usize = 4;

/// Default digits per field (coordinates `0..=999`).
pub const DEFAULT_FIELD_WIDTH: usize = 3;

/// Widest field that still fits a `u32`.
pub const MAX_FIELD_WIDTH: usize = 9;

/// Frame kinds, numbered as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameCode {
    /// Initialize (or re-send) world parameters. Client to server.
    World = 0,
    /// Request a path. Client to server.
    PathRequest = 1,
    /// One intermediate path cell. Server to client.
    Node = 2,
    /// Final path cell, completes the request. Server to client.
    End = 3,
    /// Keepalive / cleared-buffer marker. Either direction.
    Empty = 4,
    /// Mark a cell impassable. Client to server.
    CellBlocked = 5,
    /// Clear an impassable mark. Client to server.
    CellOpen = 6,
}

impl FrameCode {
    /// Look up a code by its wire number.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::World),
            1 => Some(Self::PathRequest),
            2 => Some(Self::Node),
            3 => Some(Self::End),
            4 => Some(Self::Empty),
            5 => Some(Self::CellBlocked),
            6 => Some(Self::CellOpen),
            _ => None,
        }
    }

    /// Number of fields a frame with this code carries.
    #[inline]
    pub fn field_count(self) -> usize {
        match self {
            Self::Empty => 0,
            Self::World | Self::Node | Self::End | Self::CellBlocked | Self::CellOpen => 3,
            Self::PathRequest => 4,
        }
    }

    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::World => "WORLD",
            Self::PathRequest => "PATH_REQUEST",
            Self::Node => "NODE",
            Self::End => "END",
            Self::Empty => "EMPTY",
            Self::CellBlocked => "CELL_BLOCKED",
            Self::CellOpen => "CELL_OPEN",
        }
    }
}

/// Geometry shared by the codec and the reassembler.
///
/// Both sides of a connection must use the same field width, otherwise frame
/// boundaries drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    field_width: usize,
}

impl FrameLayout {
    /// Create a layout with the given digits per field.
    ///
    /// # Errors
    ///
    /// Returns an error if `field_width` is outside `1..=9`.
    pub fn new(field_width: usize) -> Result<Self> {
        if field_width == 0 || field_width > MAX_FIELD_WIDTH {
            return Err(RaigError::Protocol(format!(
                "Field width {} outside 1..={}",
                field_width, MAX_FIELD_WIDTH
            )));
        }
        Ok(Self { field_width })
    }

    /// Digits per field.
    #[inline]
    pub fn field_width(&self) -> usize {
        self.field_width
    }

    /// Total bytes per frame.
    ///
    /// # Example
    ///
    /// ```
    /// use raig_client::protocol::FrameLayout;
    ///
    /// assert_eq!(FrameLayout::default().frame_size(), 18);
    /// assert_eq!(FrameLayout::new(2).unwrap().frame_size(), 14);
    /// ```
    #[inline]
    pub fn frame_size(&self) -> usize {
        CODE_WIDTH + MAX_FIELDS * (1 + self.field_width)
    }

    /// Largest value a field can carry.
    #[inline]
    pub fn max_value(&self) -> u32 {
        // field_width <= 9, so this cannot overflow
        10u32.pow(self.field_width as u32) - 1
    }

    /// Write a complete frame into `buf`.
    ///
    /// `buf` is cleared first and holds exactly `frame_size()` bytes afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RaigError::FieldOverflow`] if a field is wider than the layout
    /// allows, or a protocol error if the field count does not match the code.
    pub fn write_frame(&self, code: FrameCode, fields: &[u32], buf: &mut Vec<u8>) -> Result<()> {
        if fields.len() != code.field_count() {
            return Err(RaigError::Protocol(format!(
                "{} takes {} fields, got {}",
                code.name(),
                code.field_count(),
                fields.len()
            )));
        }

        buf.clear();
        buf.reserve(self.frame_size());
        write_digits(buf, code as u32, CODE_WIDTH);

        for &value in fields {
            if value > self.max_value() {
                return Err(RaigError::FieldOverflow {
                    value,
                    width: self.field_width,
                });
            }
            buf.push(DELIMITER);
            write_digits(buf, value, self.field_width);
        }

        buf.resize(self.frame_size(), FILL);
        Ok(())
    }

    /// Parse one frame into its code and fields.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a wrong length, an unknown code, a field
    /// count that does not match the code, or non-digit content.
    pub fn parse_frame(&self, frame: &[u8]) -> Result<(FrameCode, Vec<u32>)> {
        if frame.len() != self.frame_size() {
            return Err(RaigError::Protocol(format!(
                "Frame is {} bytes, expected {}",
                frame.len(),
                self.frame_size()
            )));
        }

        let raw_code = parse_digits(&frame[..CODE_WIDTH])
            .ok_or_else(|| RaigError::Protocol("Frame code is not numeric".to_string()))?;
        let code = u8::try_from(raw_code)
            .ok()
            .and_then(FrameCode::from_u8)
            .ok_or_else(|| RaigError::Protocol(format!("Unknown frame code {}", raw_code)))?;

        let mut fields = Vec::with_capacity(code.field_count());
        let mut pos = CODE_WIDTH;

        for index in 0..code.field_count() {
            if frame[pos] != DELIMITER {
                return Err(RaigError::Protocol(format!(
                    "{} expects {} fields, found {}",
                    code.name(),
                    code.field_count(),
                    index
                )));
            }
            let digits = &frame[pos + 1..pos + 1 + self.field_width];
            let value = parse_digits(digits).ok_or_else(|| {
                RaigError::Protocol(format!("{} field {} is not numeric", code.name(), index))
            })?;
            fields.push(value);
            pos += 1 + self.field_width;
        }

        if frame[pos..].iter().any(|&b| b != FILL) {
            return Err(RaigError::Protocol(format!(
                "{} carries more than {} fields",
                code.name(),
                code.field_count()
            )));
        }

        Ok((code, fields))
    }

    /// Check the frame's shape without interpreting it.
    ///
    /// A frame is well formed when it has the layout's width, a two-digit
    /// code, zero to four `_`-prefixed digit fields, and fill after them.
    /// Unknown codes and field counts that do not match the code still
    /// count as well formed: those frames sit on a frame boundary and only
    /// their meaning is wrong.
    pub fn is_well_formed(&self, frame: &[u8]) -> bool {
        if frame.len() != self.frame_size() || parse_digits(&frame[..CODE_WIDTH]).is_none() {
            return false;
        }

        let mut pos = CODE_WIDTH;
        for _ in 0..MAX_FIELDS {
            if frame[pos] != DELIMITER {
                break;
            }
            if parse_digits(&frame[pos + 1..pos + 1 + self.field_width]).is_none() {
                return false;
            }
            pos += 1 + self.field_width;
        }

        frame[pos..].iter().all(|&b| b == FILL)
    }
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            field_width: DEFAULT_FIELD_WIDTH,
        }
    }
}

/// Append `value` as exactly `width` zero-padded ASCII digits.
fn write_digits(buf: &mut Vec<u8>, value: u32, width: usize) {
    let start = buf.len();
    buf.resize(start + width, b'0');
    let mut rest = value;
    for slot in buf[start..].iter_mut().rev() {
        *slot = b'0' + (rest % 10) as u8;
        rest /= 10;
    }
}

/// Parse a run of ASCII digits. `None` if any byte is not a digit.
fn parse_digits(digits: &[u8]) -> Option<u32> {
    digits.iter().try_fold(0u32, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
        } else {
            None
        }
    })
}
