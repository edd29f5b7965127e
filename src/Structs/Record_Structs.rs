// The record type handed from ingestion workers to the consumer

use std::time::{SystemTime, UNIX_EPOCH};

/// One ingested message.
///
/// Records live in pool slots and are reused, so the payload buffer keeps its
/// capacity from one message to the next. Aligned to a cache line so two
/// records touched by different threads never share one.
#[repr(C, align(64))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    /// Milliseconds since the Unix epoch, assigned when the frame completed.
    pub timestamp_ms: u64,
    /// Frame content without the trailing delimiter.
    pub payload: Vec<u8>,
}

impl Record {
    /// Overwrite every field, reusing the payload allocation.
    #[inline]
    pub fn fill(&mut self, timestamp_ms: u64, payload: &[u8]) {
        self.timestamp_ms = timestamp_ms;
        self.payload.clear();
        self.payload.extend_from_slice(payload);
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Wall-clock milliseconds since the Unix epoch.
#[inline]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
