//! Framed reads and writes over tokio byte streams.
//!
//! [`FrameReader`] and [`FrameWriter`] take any `AsyncRead`/`AsyncWrite`, so
//! the same session code runs over a `TcpStream` half in production and over a
//! scripted `tokio_test::io::Mock` in tests.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::frame::{encode_frame, FrameError, LEN_PREFIX, MAX_FRAME_LEN};

/// Reads length-prefixed payloads from an async byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Reads the next payload.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly between two
    /// frames.
    ///
    /// # Errors
    ///
    /// - [`FrameError::Truncated`] when the stream ends inside a frame.
    /// - [`FrameError::TooLarge`] for a prefix above [`MAX_FRAME_LEN`].
    /// - [`FrameError::Io`] for socket failures.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let mut prefix = [0u8; LEN_PREFIX];
        let got = self.fill(&mut prefix).await?;
        if got == 0 {
            return Ok(None);
        }
        if got < LEN_PREFIX {
            return Err(FrameError::Truncated {
                expected: LEN_PREFIX,
                received: got,
            });
        }

        let len = u32::from_be_bytes(prefix) as usize;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }

        let mut payload = vec![0u8; len];
        let got = self.fill(&mut payload).await?;
        if got < len {
            return Err(FrameError::Truncated {
                expected: len,
                received: got,
            });
        }
        Ok(Some(payload))
    }

    /// Reads until `buf` is full or the stream ends; returns the byte count.
    async fn fill(&mut self, buf: &mut [u8]) -> Result<usize, FrameError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writes length-prefixed payloads to an async byte stream.
#[derive(Debug)]
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Writes one frame and flushes it to the socket.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let frame = encode_frame(payload)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Shuts down the write half.
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.shutdown().await?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_read_frame_across_split_reads() {
        // Arrange – the prefix and payload arrive in awkward chunks
        let mock = Builder::new()
            .read(b"\x00\x00")
            .read(b"\x00\x04CA")
            .read(b"LV")
            .build();
        let mut reader = FrameReader::new(mock);

        // Act
        let frame = reader.read_frame().await.unwrap();
        let eof = reader.read_frame().await.unwrap();

        // Assert
        assert_eq!(frame.as_deref(), Some(&b"CALV"[..]));
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_read_frame_reports_truncated_payload() {
        // Arrange – length prefix claims 20 bytes but only 12 arrive
        let mut bytes = 20u32.to_be_bytes().to_vec();
        bytes.extend_from_slice(b"DKDN\x00\x61\x00\x00\x00\x26\x00\x00");
        let mock = Builder::new().read(&bytes).build();
        let mut reader = FrameReader::new(mock);

        // Act
        let result = reader.read_frame().await;

        // Assert
        assert!(matches!(
            result,
            Err(FrameError::Truncated {
                expected: 20,
                received: 12
            })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_reports_truncated_prefix() {
        let mock = Builder::new().read(b"\x00\x00").build();
        let mut reader = FrameReader::new(mock);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::Truncated { expected: 4, received: 2 })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_rejects_oversized_prefix() {
        let mock = Builder::new().read(&u32::MAX.to_be_bytes()).build();
        let mut reader = FrameReader::new(mock);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_write_frame_emits_prefix_and_payload() {
        // Arrange
        let mock = Builder::new().write(b"\x00\x00\x00\x04QINF").build();
        let mut writer = FrameWriter::new(mock);

        // Act / Assert – the mock panics on unexpected bytes
        writer.write_frame(b"QINF").await.unwrap();
    }
}
