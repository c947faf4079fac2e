//! Binary wire primitives.
//!
//! Two mirrored surfaces over the same encoding rules:
//!
//! - [`WireFormat`], async helpers used directly against the socket for the
//!   message framing layer (opcodes, handshake fields, frame headers);
//! - the `get_*`/`put_*` free functions over `&mut &[u8]` / `BytesMut`,
//!   used inside decompressed block payloads where everything is already in
//!   memory.
//!
//! All fixed-width integers are little-endian. Variable-length integers use
//! the 7-bits-per-byte encoding (low bits first, high bit of each byte means
//! "more follows", at most 10 bytes for 64 bits). Strings are varint
//! length-prefixed UTF-8.

use bytes::{Buf, BufMut, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Upper bound accepted for a length-prefixed string; anything larger is a
/// corrupt or hostile stream.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Async wire-format helpers.
pub struct WireFormat;

impl WireFormat {
    /// Read a varint-encoded u64.
    pub async fn read_varint<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<u64> {
        let mut result: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = reader.read_u8().await?;
            result |= ((byte & 0x7F) as u64) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 64 {
                return Err(Error::Protocol("varint overflow".to_string()));
            }
        }
        Ok(result)
    }

    /// Write a varint-encoded u64.
    pub async fn write_varint<W: AsyncWrite + Unpin>(
        writer: &mut W,
        mut value: u64,
    ) -> Result<()> {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            writer.write_u8(byte).await?;
            if value == 0 {
                return Ok(());
            }
        }
    }

    /// Read a varint length-prefixed UTF-8 string.
    pub async fn read_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<String> {
        let len = Self::read_varint(reader).await? as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::Protocol(format!(
                "string length too large: {len}"
            )));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        String::from_utf8(buf)
            .map_err(|e| Error::Protocol(format!("invalid UTF-8: {e}")))
    }

    /// Write a varint length-prefixed UTF-8 string.
    pub async fn write_string<W: AsyncWrite + Unpin>(
        writer: &mut W,
        value: &str,
    ) -> Result<()> {
        Self::write_varint(writer, value.len() as u64).await?;
        writer.write_all(value.as_bytes()).await?;
        Ok(())
    }

    /// Read and discard a length-prefixed string.
    pub async fn skip_string<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<()> {
        let len = Self::read_varint(reader).await? as usize;
        if len > MAX_STRING_LEN {
            return Err(Error::Protocol(format!(
                "string length too large: {len}"
            )));
        }
        let mut remaining = len;
        let mut scratch = [0u8; 8192];
        while remaining > 0 {
            let take = remaining.min(scratch.len());
            reader.read_exact(&mut scratch[..take]).await?;
            remaining -= take;
        }
        Ok(())
    }

    /// Read exactly `len` raw bytes.
    pub async fn read_bytes<R: AsyncRead + Unpin>(
        reader: &mut R,
        len: usize,
    ) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// Fixed-width little-endian values readable/writable on the async stream.
#[async_trait::async_trait]
pub trait FixedWire: Sized + Send {
    /// Read one value from the stream.
    async fn read_from<R: AsyncRead + Unpin + Send>(
        reader: &mut R,
    ) -> Result<Self>;
    /// Write this value to the stream.
    async fn write_to<W: AsyncWrite + Unpin + Send>(
        self,
        writer: &mut W,
    ) -> Result<()>;
}

macro_rules! impl_fixed_wire {
    ($type:ty, $read:ident, $write:ident) => {
        #[async_trait::async_trait]
        impl FixedWire for $type {
            async fn read_from<R: AsyncRead + Unpin + Send>(
                reader: &mut R,
            ) -> Result<Self> {
                Ok(reader.$read().await?)
            }

            async fn write_to<W: AsyncWrite + Unpin + Send>(
                self,
                writer: &mut W,
            ) -> Result<()> {
                Ok(writer.$write(self).await?)
            }
        }
    };
}

impl_fixed_wire!(u8, read_u8, write_u8);
impl_fixed_wire!(u16, read_u16_le, write_u16_le);
impl_fixed_wire!(u32, read_u32_le, write_u32_le);
impl_fixed_wire!(u64, read_u64_le, write_u64_le);
impl_fixed_wire!(i8, read_i8, write_i8);
impl_fixed_wire!(i16, read_i16_le, write_i16_le);
impl_fixed_wire!(i32, read_i32_le, write_i32_le);
impl_fixed_wire!(i64, read_i64_le, write_i64_le);
impl_fixed_wire!(u128, read_u128_le, write_u128_le);
impl_fixed_wire!(i128, read_i128_le, write_i128_le);
impl_fixed_wire!(f32, read_f32_le, write_f32_le);
impl_fixed_wire!(f64, read_f64_le, write_f64_le);

// --- synchronous helpers over in-memory payloads ---

/// Number of bytes `value` occupies under varint encoding.
pub fn varint_len(value: u64) -> usize {
    if value == 0 {
        return 1;
    }
    (64 - value.leading_zeros() as usize).div_ceil(7)
}

/// Build the error for a short in-memory read. Kept to a single prefix so
/// [`is_underflow`] can tell "the rest of this block is in the next
/// compression frame" apart from genuine corruption.
pub(crate) fn underflow(what: &str, need: usize, have: usize) -> Error {
    Error::Protocol(format!(
        "buffer underflow reading {what}: need {need} bytes, have {have}"
    ))
}

/// Whether an error is a short in-memory read produced by [`underflow`].
pub(crate) fn is_underflow(err: &Error) -> bool {
    matches!(err, Error::Protocol(msg) if msg.starts_with("buffer underflow"))
}

/// Read a varint from a byte slice, advancing it.
pub fn get_varint(buffer: &mut &[u8]) -> Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0;
    loop {
        if buffer.is_empty() {
            return Err(underflow("varint", 1, 0));
        }
        let byte = buffer[0];
        buffer.advance(1);
        result |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Protocol("varint overflow".to_string()));
        }
    }
}

/// Append a varint to a buffer.
pub fn put_varint(buffer: &mut BytesMut, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buffer.put_u8(byte);
        if value == 0 {
            return;
        }
    }
}

/// Read a length-prefixed string from a byte slice, advancing it.
pub fn get_string(buffer: &mut &[u8]) -> Result<String> {
    let len = get_varint(buffer)? as usize;
    if len > MAX_STRING_LEN {
        return Err(Error::Protocol(format!("string length too large: {len}")));
    }
    if buffer.len() < len {
        return Err(underflow("string", len, buffer.len()));
    }
    let s = std::str::from_utf8(&buffer[..len])
        .map_err(|e| Error::Protocol(format!("invalid UTF-8: {e}")))?
        .to_string();
    buffer.advance(len);
    Ok(s)
}

/// Append a length-prefixed string.
pub fn put_string(buffer: &mut BytesMut, value: &str) {
    put_varint(buffer, value.len() as u64);
    buffer.put_slice(value.as_bytes());
}

/// Check that `n` bytes are available before a fixed-width read.
pub fn ensure(buffer: &[u8], n: usize, what: &str) -> Result<()> {
    if buffer.len() < n {
        return Err(underflow(what, n, buffer.len()));
    }
    Ok(())
}

/// Advance a slice by `n` bytes, checking availability.
pub fn skip(buffer: &mut &[u8], n: usize, what: &str) -> Result<()> {
    ensure(buffer, n, what)?;
    buffer.advance(n);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn varint_round_trip() {
        for value in [0u64, 1, 127, 128, 255, 16384, u32::MAX as u64, u64::MAX]
        {
            let mut buf = Vec::new();
            WireFormat::write_varint(&mut buf, value).await.unwrap();
            assert_eq!(buf.len(), varint_len(value));

            let mut reader = &buf[..];
            assert_eq!(
                WireFormat::read_varint(&mut reader).await.unwrap(),
                value
            );

            // The sync decoder agrees with the async encoder.
            let mut slice = &buf[..];
            assert_eq!(get_varint(&mut slice).unwrap(), value);
        }
    }

    #[test]
    fn varint_len_bounds() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(u64::MAX), 10);
    }

    #[test]
    fn varint_overflow_rejected() {
        let eleven = [0xFFu8; 11];
        let mut slice = &eleven[..];
        assert!(get_varint(&mut slice).is_err());
    }

    #[tokio::test]
    async fn string_round_trip() {
        for s in ["", "hello", "мир", "🦀"] {
            let mut buf = Vec::new();
            WireFormat::write_string(&mut buf, s).await.unwrap();

            let mut reader = &buf[..];
            assert_eq!(WireFormat::read_string(&mut reader).await.unwrap(), s);

            let mut slice = &buf[..];
            assert_eq!(get_string(&mut slice).unwrap(), s);
        }
    }

    #[test]
    fn sync_string_round_trip() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "columnar");
        put_string(&mut buf, "");
        let mut slice = &buf[..];
        assert_eq!(get_string(&mut slice).unwrap(), "columnar");
        assert_eq!(get_string(&mut slice).unwrap(), "");
        assert!(slice.is_empty());
    }

    #[test]
    fn truncated_string_rejected() {
        let mut buf = BytesMut::new();
        put_varint(&mut buf, 10);
        buf.put_slice(b"abc");
        let mut slice = &buf[..];
        assert!(get_string(&mut slice).is_err());
    }

    #[tokio::test]
    async fn fixed_wire_little_endian() {
        let mut buf = Vec::new();
        0x12345678u32.write_to(&mut buf).await.unwrap();
        assert_eq!(buf, vec![0x78, 0x56, 0x34, 0x12]);

        let mut reader = &buf[..];
        assert_eq!(u32::read_from(&mut reader).await.unwrap(), 0x12345678);
    }
}
