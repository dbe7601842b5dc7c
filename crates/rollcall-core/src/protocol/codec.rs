//! Newline-delimited framing over any async byte stream.

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::parser::encode_line;
use crate::error::{Error, Result};

/// Default upper bound for a single frame line.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8 * 1024;

/// Reads one frame line at a time, enforcing a size limit.
///
/// An oversized line is skipped up to its terminating newline and reported as
/// [`Error::FrameTooLarge`]; the reader stays usable for the next frame.
pub struct FrameReader<R> {
    inner: R,
    max_frame_bytes: usize,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R, max_frame_bytes: usize) -> Self {
        Self {
            inner,
            max_frame_bytes: max_frame_bytes.max(1),
            buf: Vec::new(),
        }
    }

    /// Read the next line without its terminator. `Ok(None)` means the peer hung up.
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        // Room for the frame plus a `\r\n` terminator.
        let limit = u64::try_from(self.max_frame_bytes)
            .unwrap_or(u64::MAX)
            .saturating_add(2);
        let n = (&mut self.inner)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;
        if n == 0 {
            return Ok(None);
        }

        let terminated = self.buf.last() == Some(&b'\n');
        if terminated {
            self.buf.pop();
            if self.buf.last() == Some(&b'\r') {
                self.buf.pop();
            }
        }
        if self.buf.len() > self.max_frame_bytes {
            if !terminated {
                self.discard_rest_of_line().await?;
            }
            return Err(Error::FrameTooLarge {
                limit: self.max_frame_bytes,
            });
        }

        String::from_utf8(std::mem::take(&mut self.buf))
            .map(Some)
            .map_err(|_| Error::MalformedFrame("frame is not valid UTF-8".into()))
    }

    async fn discard_rest_of_line(&mut self) -> Result<()> {
        let chunk = u64::try_from(self.max_frame_bytes).unwrap_or(u64::MAX);
        loop {
            self.buf.clear();
            let n = (&mut self.inner)
                .take(chunk)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if n == 0 || self.buf.last() == Some(&b'\n') {
                self.buf.clear();
                return Ok(());
            }
        }
    }

}

/// Write one frame as a JSON line and flush it.
pub async fn write_frame<W, T>(writer: &mut W, frame: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(frame)?;
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
