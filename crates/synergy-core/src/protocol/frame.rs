//! Length-prefixed framing.
//!
//! Every record on the wire is:
//!
//! ```text
//! [len:u32 big-endian][payload:len]
//! ```
//!
//! The framing layer knows nothing about tags or arguments; it only cuts the
//! byte stream into payloads.  [`FrameDecoder`] is the incremental, sans-IO
//! version used by benches and tests; [`crate::protocol::stream`] wraps the
//! same rules around tokio readers and writers.

use std::io;

use thiserror::Error;

/// Size of the big-endian length prefix.
pub const LEN_PREFIX: usize = 4;

/// Largest payload either peer accepts.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

/// Errors produced while framing or unframing records.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The length prefix announces more than [`MAX_FRAME_LEN`] bytes.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    TooLarge(usize),

    /// The stream ended part way through a frame.
    #[error("stream ended after {received} of {expected} frame bytes")]
    Truncated { expected: usize, received: usize },

    /// Underlying socket failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Prepends the length prefix to `payload`.
///
/// # Errors
///
/// [`FrameError::TooLarge`] if `payload` is longer than [`MAX_FRAME_LEN`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FrameError::TooLarge(payload.len()));
    }
    let mut buf = Vec::with_capacity(LEN_PREFIX + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Incremental frame splitter.
///
/// Bytes are appended with [`push`](Self::push) in whatever chunks they
/// arrive; [`next_frame`](Self::next_frame) hands back complete payloads in
/// order and keeps any partial tail for the next call.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Returns the next complete payload, or `Ok(None)` when more bytes are
    /// needed.
    ///
    /// # Errors
    ///
    /// [`FrameError::TooLarge`] as soon as an oversized prefix is seen.  The
    /// decoder is unusable afterwards; the connection should be dropped.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        if self.buf.len() < LEN_PREFIX {
            return Ok(None);
        }
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&self.buf[..LEN_PREFIX]);
        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        if self.buf.len() < LEN_PREFIX + len {
            return Ok(None);
        }
        let payload = self.buf[LEN_PREFIX..LEN_PREFIX + len].to_vec();
        self.buf.drain(..LEN_PREFIX + len);
        Ok(Some(payload))
    }

    /// Call at end of stream.  Leftover bytes mean the peer hung up mid-frame.
    ///
    /// # Errors
    ///
    /// [`FrameError::Truncated`] when a partial frame is buffered.
    pub fn finish(&self) -> Result<(), FrameError> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let expected = if self.buf.len() >= LEN_PREFIX {
            let mut prefix = [0u8; LEN_PREFIX];
            prefix.copy_from_slice(&self.buf[..LEN_PREFIX]);
            u32::from_be_bytes(prefix) as usize
        } else {
            LEN_PREFIX
        };
        Err(FrameError::Truncated {
            expected,
            received: self.buf.len().saturating_sub(LEN_PREFIX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_frame_prefixes_big_endian_length() {
        let frame = encode_frame(b"CALV").unwrap();
        assert_eq!(frame, b"\x00\x00\x00\x04CALV");
    }

    #[test]
    fn test_encode_frame_rejects_oversized_payload() {
        let payload = vec![0u8; MAX_FRAME_LEN + 1];
        assert!(matches!(
            encode_frame(&payload),
            Err(FrameError::TooLarge(n)) if n == MAX_FRAME_LEN + 1
        ));
    }

    #[test]
    fn test_decoder_waits_for_complete_frame() {
        // Arrange
        let mut decoder = FrameDecoder::new();
        let frame = encode_frame(b"COUT").unwrap();

        // Act – feed all but the last byte
        decoder.push(&frame[..frame.len() - 1]);
        let partial = decoder.next_frame().unwrap();
        decoder.push(&frame[frame.len() - 1..]);
        let full = decoder.next_frame().unwrap();

        // Assert
        assert!(partial.is_none());
        assert_eq!(full.as_deref(), Some(&b"COUT"[..]));
        assert_eq!(decoder.pending(), 0);
    }

    #[test]
    fn test_decoder_splits_two_concatenated_frames_in_order() {
        // Arrange
        let mut bytes = encode_frame(b"CALV").unwrap();
        bytes.extend(encode_frame(b"DMMV\x00\x01\x00\x02").unwrap());
        let mut decoder = FrameDecoder::new();
        decoder.push(&bytes);

        // Act
        let first = decoder.next_frame().unwrap();
        let second = decoder.next_frame().unwrap();
        let third = decoder.next_frame().unwrap();

        // Assert
        assert_eq!(first.as_deref(), Some(&b"CALV"[..]));
        assert_eq!(second.as_deref(), Some(&b"DMMV\x00\x01\x00\x02"[..]));
        assert!(third.is_none());
    }

    #[test]
    fn test_decoder_rejects_oversized_prefix_before_payload_arrives() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes());
        assert!(matches!(decoder.next_frame(), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn test_finish_reports_truncation() {
        // Arrange – prefix claims 20 bytes, only 12 arrive
        let mut decoder = FrameDecoder::new();
        decoder.push(&20u32.to_be_bytes());
        decoder.push(&[0u8; 12]);

        // Act
        let result = decoder.finish();

        // Assert
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 20,
                received: 12
            })
        ));
    }

    #[test]
    fn test_finish_on_clean_boundary_is_ok() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&encode_frame(b"CIAK").unwrap());
        decoder.next_frame().unwrap();
        assert!(decoder.finish().is_ok());
    }
}
