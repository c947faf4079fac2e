//! Compression frame codec.
//!
//! Every compressed byte sequence on the wire is a sequence of frames:
//!
//! ```text
//! [checksum: 16 bytes] [method: 1] [compressed size incl. header: u32 LE]
//! [uncompressed size: u32 LE] [payload]
//! ```
//!
//! The CityHash-128 checksum covers the 9-byte header and the payload. Frame
//! boundaries are orthogonal to message boundaries: one logical block may
//! span several frames and decompressed bytes from consecutive frames are
//! simply concatenated. A checksum or size mismatch is fatal for the
//! session.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{checksum, protocol::CompressionMethod, Error, Result};

/// Frame header size: 1 method byte + two u32 size fields.
pub const HEADER_SIZE: usize = 9;

/// CityHash-128 checksum size.
pub const CHECKSUM_SIZE: usize = 16;

/// Hard cap on either size field (1 GiB); larger values mean corruption.
const MAX_FRAME_SIZE: usize = 0x4000_0000;

/// Default maximum number of payload bytes per frame (1 MiB), matching the
/// server's `max_compress_block_size` default.
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;

/// Wrap `data` into a single frame: header, checksum and (possibly)
/// compressed payload.
pub fn compress_frame(
    method: CompressionMethod,
    data: &[u8],
) -> Result<Bytes> {
    let body = match method {
        CompressionMethod::None => Bytes::copy_from_slice(data),
        CompressionMethod::Lz4 => {
            let bound = lz4::block::compress_bound(data.len())?;
            let mut out = vec![0u8; bound];
            let n =
                lz4::block::compress_to_buffer(data, None, false, &mut out)?;
            out.truncate(n);
            Bytes::from(out)
        }
        CompressionMethod::Zstd => {
            let out = zstd::bulk::compress(data, 3).map_err(|e| {
                Error::Compression(format!("zstd compression failed: {e}"))
            })?;
            Bytes::from(out)
        }
    };

    let mut framed = BytesMut::with_capacity(HEADER_SIZE + body.len());
    framed.put_u8(method.tag());
    framed.put_u32_le((HEADER_SIZE + body.len()) as u32);
    framed.put_u32_le(data.len() as u32);
    framed.put_slice(&body);

    let (first, second) = checksum::hash128(&framed);
    let mut out = BytesMut::with_capacity(CHECKSUM_SIZE + framed.len());
    out.put_u64_le(first);
    out.put_u64_le(second);
    out.put_slice(&framed);
    Ok(out.freeze())
}

/// Split `data` into frames of at most `block_size` payload bytes each and
/// return them concatenated. The degenerate empty payload still produces one
/// frame so the peer sees a well-formed stream.
pub fn compress_frames(
    method: CompressionMethod,
    data: &[u8],
    block_size: usize,
) -> Result<Bytes> {
    if data.len() <= block_size {
        return compress_frame(method, data);
    }
    let mut out = BytesMut::new();
    for chunk in data.chunks(block_size) {
        out.put_slice(&compress_frame(method, chunk)?);
    }
    Ok(out.freeze())
}

/// Decode one whole frame held in memory, verifying its checksum and size
/// fields, and return the decompressed payload.
pub fn decompress_frame(frame: &[u8]) -> Result<Bytes> {
    if frame.len() < CHECKSUM_SIZE + HEADER_SIZE {
        return Err(Error::Compression(format!(
            "frame too small: {} bytes",
            frame.len()
        )));
    }

    let mut reader = frame;
    let declared_first = reader.get_u64_le();
    let declared_second = reader.get_u64_le();
    let declared =
        ((declared_first as u128) << 64) | declared_second as u128;

    let body = &frame[CHECKSUM_SIZE..];
    let actual = checksum::hash128_u128(body);
    if actual != declared {
        return Err(Error::ChecksumMismatch {
            expected: declared,
            actual,
        });
    }

    let method = CompressionMethod::from_tag(body[0])?;
    let mut sizes = &body[1..];
    let compressed_size = sizes.get_u32_le() as usize;
    let uncompressed_size = sizes.get_u32_le() as usize;

    if compressed_size > MAX_FRAME_SIZE || uncompressed_size > MAX_FRAME_SIZE
    {
        return Err(Error::Compression(format!(
            "frame size out of range: compressed {compressed_size}, \
             uncompressed {uncompressed_size}"
        )));
    }
    if compressed_size != body.len() {
        return Err(Error::Compression(format!(
            "frame length mismatch: header says {compressed_size}, \
             got {} bytes",
            body.len()
        )));
    }

    let payload = &body[HEADER_SIZE..];
    let data = match method {
        CompressionMethod::None => {
            if payload.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "stored frame size mismatch: expected \
                     {uncompressed_size}, got {}",
                    payload.len()
                )));
            }
            Bytes::copy_from_slice(payload)
        }
        CompressionMethod::Lz4 => {
            let out = lz4::block::decompress(
                payload,
                Some(uncompressed_size as i32),
            )?;
            if out.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "lz4 size mismatch: expected {uncompressed_size}, \
                     got {}",
                    out.len()
                )));
            }
            Bytes::from(out)
        }
        CompressionMethod::Zstd => {
            let out = zstd::bulk::decompress(payload, uncompressed_size)
                .map_err(|e| {
                    Error::Compression(format!(
                        "zstd decompression failed: {e}"
                    ))
                })?;
            if out.len() != uncompressed_size {
                return Err(Error::Compression(format!(
                    "zstd size mismatch: expected {uncompressed_size}, \
                     got {}",
                    out.len()
                )));
            }
            Bytes::from(out)
        }
    };

    Ok(data)
}

/// Read one frame from an async stream and return its decompressed payload.
///
/// Socket reads never align with frame boundaries, so this reassembles the
/// frame from the header's declared length before handing it to
/// [`decompress_frame`].
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Bytes> {
    let mut head = [0u8; CHECKSUM_SIZE + HEADER_SIZE];
    reader.read_exact(&mut head).await?;

    let compressed_size = u32::from_le_bytes(
        head[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].try_into().unwrap(),
    ) as usize;
    if !(HEADER_SIZE..=MAX_FRAME_SIZE).contains(&compressed_size) {
        return Err(Error::Compression(format!(
            "frame size out of range: {compressed_size}"
        )));
    }

    let mut frame = vec![0u8; CHECKSUM_SIZE + compressed_size];
    frame[..head.len()].copy_from_slice(&head);
    reader.read_exact(&mut frame[head.len()..]).await?;
    decompress_frame(&frame)
}
