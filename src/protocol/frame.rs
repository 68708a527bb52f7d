//! Frame struct - one fixed-width wire record.
//!
//! Uses `bytes::Bytes` so frames sliced out of the reassembly buffer share
//! its allocation instead of copying.
//!
//! # Example
//!
//! ```
//! use raig_client::protocol::{Frame, FrameCode};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"02_001_005_0050000"));
//! assert_eq!(frame.code(), Some(FrameCode::Node));
//! assert_eq!(frame.len(), 18);
//! ```

use bytes::Bytes;

use super::wire_format::{FrameCode, CODE_WIDTH};

/// A complete protocol frame, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Bytes,
}

impl Frame {
    /// Wrap raw frame bytes.
    pub fn new(bytes: Bytes) -> Self {
        Self { bytes }
    }

    /// Create a frame from a slice (copies data).
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: Bytes::copy_from_slice(bytes),
        }
    }

    /// Raw bytes of the frame.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Clone of the underlying `Bytes` (cheap, zero-copy).
    #[inline]
    pub fn to_bytes(&self) -> Bytes {
        self.bytes.clone()
    }

    /// Frame length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check if the frame holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Peek at the frame code without validating the fields.
    pub fn code(&self) -> Option<FrameCode> {
        let digits = self.bytes.get(..CODE_WIDTH)?;
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        FrameCode::from_u8((digits[0] - b'0') * 10 + (digits[1] - b'0'))
    }

    /// Frame contents as text, for logs.
    pub fn as_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}
