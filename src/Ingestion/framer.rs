// Newline framing over a byte stream that arrives in arbitrary chunks

use crate::error::{IngestError, Result};

/// Byte that terminates every frame.
pub const DELIMITER: u8 = b'\n';

/// What the stream asked for after a chunk was fed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Keep reading.
    Continue,
    /// The sentinel frame arrived; nothing after it should be consumed.
    Sentinel,
}

/// Splits a byte stream into delimiter-terminated frames.
///
/// Bytes after the last delimiter of a chunk are kept and prefixed to the
/// next chunk, so a frame split across any number of reads comes out whole.
#[derive(Debug)]
pub struct Framer {
    partial: Vec<u8>,
    sentinel: Box<[u8]>,
    max_frame_len: usize,
}

impl Framer {
    pub fn new(sentinel: &[u8], max_frame_len: usize) -> Self {
        Self {
            partial: Vec::new(),
            sentinel: sentinel.into(),
            max_frame_len,
        }
    }

    /// Feed one chunk, calling `on_frame` for every completed frame in order.
    ///
    /// The sentinel frame is not passed to `on_frame`; on seeing it the rest
    /// of the chunk and any pending partial frame are discarded. Frames
    /// completed before an oversize frame was detected have already been
    /// passed to `on_frame` when `FrameTooLong` is returned.
    pub fn feed<F>(&mut self, chunk: &[u8], mut on_frame: F) -> Result<FeedOutcome>
    where
        F: FnMut(&[u8]),
    {
        let mut start = 0;
        while let Some(offset) = chunk[start..].iter().position(|&b| b == DELIMITER) {
            let end = start + offset;
            let piece = &chunk[start..end];
            start = end + 1;

            let len = self.partial.len() + piece.len();
            if len > self.max_frame_len {
                self.partial.clear();
                return Err(IngestError::FrameTooLong {
                    len,
                    limit: self.max_frame_len,
                });
            }

            if !self.partial.is_empty() {
                self.partial.extend_from_slice(piece);
            }
            let frame: &[u8] = if self.partial.is_empty() {
                piece
            } else {
                &self.partial
            };

            if frame == &*self.sentinel {
                self.partial.clear();
                return Ok(FeedOutcome::Sentinel);
            }
            on_frame(frame);
            self.partial.clear();
        }

        let rest = &chunk[start..];
        let len = self.partial.len() + rest.len();
        if len > self.max_frame_len {
            self.partial.clear();
            return Err(IngestError::FrameTooLong {
                len,
                limit: self.max_frame_len,
            });
        }
        self.partial.extend_from_slice(rest);
        Ok(FeedOutcome::Continue)
    }

    /// Bytes of the frame currently being assembled.
    pub fn pending(&self) -> &[u8] {
        &self.partial
    }

    /// Drop any partially assembled frame.
    pub fn reset(&mut self) {
        self.partial.clear();
    }
}
