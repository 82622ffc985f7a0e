//! Fix reader over any async byte stream

use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace};

use crate::error::Result;
use crate::gnss::{GnssDecoder, GnssFix};

/// Reads chunks from a byte stream and feeds them to a GNSS decoder one byte
/// at a time
///
/// Bytes left over after a fix stay buffered for the next call, so chunk
/// boundaries never change what is decoded.
#[derive(Debug)]
pub struct GnssReader<R> {
    inner: R,
    decoder: GnssDecoder,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> GnssReader<R> {
    /// # Arguments
    ///
    /// * `inner` - Byte source (serial port, mock stream)
    /// * `decoder` - Decoder for the receiver's output protocol
    /// * `buffer_size` - Bytes requested per read, at least 1
    pub fn new(inner: R, decoder: GnssDecoder, buffer_size: usize) -> Self {
        Self {
            inner,
            decoder,
            buf: vec![0; buffer_size.max(1)],
            pos: 0,
            filled: 0,
            bytes_read: 0,
        }
    }

    /// Wait for the next complete fix
    ///
    /// Returns `Ok(None)` when the stream ends.
    ///
    /// # Errors
    ///
    /// Returns error if the underlying read fails
    pub async fn next_fix(&mut self) -> Result<Option<GnssFix>> {
        loop {
            while self.pos < self.filled {
                let byte = self.buf[self.pos];
                self.pos += 1;
                if let Some(fix) = self.decoder.feed(byte) {
                    debug!(
                        "{} fix: {} ({} sats)",
                        fix.protocol,
                        fix.fix_label(),
                        fix.satellites
                    );
                    return Ok(Some(fix));
                }
            }

            let n = self.inner.read(&mut self.buf).await?;
            if n == 0 {
                debug!("GNSS stream closed after {} bytes", self.bytes_read);
                return Ok(None);
            }
            trace!("Read {} bytes from GNSS receiver", n);
            self.bytes_read += n as u64;
            self.pos = 0;
            self.filled = n;
        }
    }

    /// Total bytes read so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn decoder(&self) -> &GnssDecoder {
        &self.decoder
    }
}
