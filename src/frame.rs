//! Captured still frames.
//!
//! A `Frame` is the encoded image exactly as the capture tool produced it
//! (normally JPEG) plus the wall-clock time it was captured. Frames are
//! transient: the monitor holds the current one for the duration of a tick and
//! keeps only a reduced comparison signal across ticks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Local};

/// One encoded still frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    captured_at: DateTime<Local>,
}

impl Frame {
    /// Wrap freshly captured bytes, stamping them with the current time.
    pub fn new(data: Vec<u8>) -> Self {
        Self::captured_at(data, Local::now())
    }

    pub fn captured_at(data: Vec<u8>, captured_at: DateTime<Local>) -> Self {
        Self { data, captured_at }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Encoded size in bytes. This is the signal the byte-size policy compares.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.captured_at
    }

    /// Standard base64 of the encoded bytes, as the vision API expects.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_matches_standard_alphabet() {
        let frame = Frame::new(b"\xff\xd8hello\xff\xd9".to_vec());
        assert_eq!(frame.to_base64(), "/9hoZWxsb//Z");
        assert_eq!(frame.byte_len(), 9);
        assert!(!frame.is_empty());
    }
}
