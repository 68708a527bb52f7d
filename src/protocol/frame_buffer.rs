//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management. Frames have a
//! fixed width, so reassembly is a single rule: while the buffer holds at
//! least one frame width of bytes, split one frame off the front.
//!
//! The result does not depend on how the transport chunked the stream: a
//! frame split across reads, several frames in one read, or a read holding
//! only the tail of a frame all produce the same frame sequence.
//!
//! # Example
//!
//! ```
//! use raig_client::protocol::{FrameBuffer, FrameLayout};
//!
//! let mut buffer = FrameBuffer::new(FrameLayout::default());
//!
//! assert!(buffer.push(b"02_001_0").is_empty());
//! let frames = buffer.push(b"05_0050000");
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].as_bytes(), b"02_001_005_0050000");
//! ```

use bytes::{Buf, BytesMut};

use super::wire_format::FrameLayout;
use super::Frame;

/// Default initial capacity (enough for a few hundred default-width frames).
pub const DEFAULT_BUFFER_CAPACITY: usize = 4 * 1024;

/// Default number of consecutive misshapen frames that triggers a resync.
pub const DEFAULT_RESYNC_THRESHOLD: usize = 3;

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Carry-over bytes not yet forming a complete frame.
    buffer: BytesMut,
    layout: FrameLayout,
    /// Consecutive frames that failed [`FrameLayout::is_well_formed`].
    malformed_run: usize,
    /// Malformed run length that starts a resync. 0 disables resync.
    resync_threshold: usize,
    /// Scanning for the next well-formed frame.
    resyncing: bool,
    /// Bytes discarded by the current resync.
    skipped: usize,
}

impl FrameBuffer {
    /// Create a frame buffer for the given layout.
    pub fn new(layout: FrameLayout) -> Self {
        Self::with_capacity(layout, DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a frame buffer with a custom initial capacity.
    pub fn with_capacity(layout: FrameLayout, capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            layout,
            malformed_run: 0,
            resync_threshold: DEFAULT_RESYNC_THRESHOLD,
            resyncing: false,
            skipped: 0,
        }
    }

    /// Set how many consecutive misshapen frames trigger a resync.
    ///
    /// A threshold of 0 disables resync.
    pub fn with_resync_threshold(mut self, threshold: usize) -> Self {
        self.resync_threshold = threshold;
        self
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push. No frame is emitted before
    /// all of its bytes have arrived.
    ///
    /// Frames that are well formed are emitted even if their code means
    /// nothing to the client. Misshapen frames are emitted too (the decoder
    /// reports them) until `resync_threshold` of them arrive in a row. Then
    /// the stream is taken to be misaligned: the buffer drops one byte at a
    /// time until a well-formed frame starts at its front, and framing
    /// resumes from there. Every decision looks at a full frame window, so
    /// the output does not depend on how the input was chunked.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let frame_size = self.layout.frame_size();
        let mut frames = Vec::with_capacity(self.buffer.len() / frame_size);

        while self.buffer.len() >= frame_size {
            let well_formed = self.layout.is_well_formed(&self.buffer[..frame_size]);

            if self.resyncing {
                if !well_formed {
                    self.buffer.advance(1);
                    self.skipped += 1;
                    continue;
                }
                tracing::debug!(skipped = self.skipped, "Frame stream realigned");
                self.resyncing = false;
                self.skipped = 0;
            }

            if well_formed {
                self.malformed_run = 0;
            } else {
                self.malformed_run += 1;
                if self.resync_threshold > 0 && self.malformed_run >= self.resync_threshold {
                    tracing::warn!(
                        malformed = self.malformed_run,
                        "Frame stream misaligned, resynchronizing"
                    );
                    self.malformed_run = 0;
                    self.resyncing = true;
                    self.buffer.advance(1);
                    self.skipped = 1;
                    continue;
                }
            }

            let bytes = self.buffer.split_to(frame_size).freeze();
            frames.push(Frame::new(bytes));
        }

        frames
    }

    /// Width of every frame.
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.layout.frame_size()
    }

    /// Get the number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Check if the buffer is scanning for a frame boundary.
    #[inline]
    pub fn is_resyncing(&self) -> bool {
        self.resyncing
    }

    /// Discard the carry-over and any resync in progress.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.malformed_run = 0;
        self.resyncing = false;
        self.skipped = 0;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(FrameLayout::default())
    }
}
