//! Encoding and decoding of data blocks.
//!
//! A block on the wire is: block info (revision-gated), column count, row
//! count, then per column its name, type string, a custom-serialisation
//! marker (revision-gated), and the column's prefix and body bytes.
//!
//! When compression is negotiated a block's bytes travel inside compression
//! frames, and the two boundaries are independent: a block may span frames
//! and a frame may hold bytes of more than one block. [`BlockReader`] keeps
//! the decompressed tail between calls and retries a block parse whenever
//! it runs short, pulling one more frame per round.
//!
//! Server packets that are documented as never compressed (Log,
//! ProfileEvents) go through [`read_raw_block`], an incremental reader that
//! understands the type families those blocks contain.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::block::{Block, BlockInfo};
use crate::buffer::WireBuffer;
use crate::column::{self, Column, ColumnString};
use crate::compression;
use crate::connection::Connection;
use crate::protocol::{
    CompressionMethod, MIN_REVISION_WITH_BLOCK_INFO,
    MIN_REVISION_WITH_CUSTOM_SERIALIZATION,
};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Upper bound on the staging buffer of an outgoing block (256 MiB).
const MAX_STAGED_BLOCK: usize = 256 * 1024 * 1024;

/// Decode one block from an in-memory payload, advancing the slice.
pub fn parse_block(buffer: &mut &[u8], revision: u64) -> Result<Block> {
    let mut block = Block::new();
    if revision >= MIN_REVISION_WITH_BLOCK_INFO {
        block.set_info(parse_block_info(buffer)?);
    }

    let columns = wire::get_varint(buffer)? as usize;
    let rows = wire::get_varint(buffer)? as usize;

    for _ in 0..columns {
        let name = wire::get_string(buffer)?;
        let type_name = wire::get_string(buffer)?;
        if revision >= MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            wire::ensure(buffer, 1, "custom serialization marker")?;
            let custom = buffer.get_u8();
            if custom != 0 {
                return Err(Error::Protocol(format!(
                    "custom serialization of column '{name}' is not \
                     supported"
                )));
            }
        }

        let node = TypeNode::parse(&type_name)?;
        let mut column = column::for_type(&node)?;
        if rows > 0 {
            column.load_prefix(buffer)?;
            column.load_body(buffer, rows)?;
        }
        block.add_column(name, column.into())?;
    }

    Ok(block)
}

fn parse_block_info(buffer: &mut &[u8]) -> Result<BlockInfo> {
    let mut info = BlockInfo::new();
    loop {
        match wire::get_varint(buffer)? {
            0 => return Ok(info),
            1 => {
                wire::ensure(buffer, 1, "block info overflows flag")?;
                info.is_overflows = buffer.get_u8() != 0;
            }
            2 => {
                wire::ensure(buffer, 4, "block info bucket")?;
                info.bucket_num = buffer.get_i32_le();
            }
            field => {
                return Err(Error::Protocol(format!(
                    "unknown block info field {field}"
                )))
            }
        }
    }
}

/// Encode one block into a standalone payload.
pub fn serialize_block(block: &Block, revision: u64) -> Result<BytesMut> {
    let mut out = BytesMut::new();
    if revision >= MIN_REVISION_WITH_BLOCK_INFO {
        wire::put_varint(&mut out, 1);
        out.extend_from_slice(&[block.info().is_overflows as u8]);
        wire::put_varint(&mut out, 2);
        out.extend_from_slice(&block.info().bucket_num.to_le_bytes());
        wire::put_varint(&mut out, 0);
    }

    wire::put_varint(&mut out, block.column_count() as u64);
    wire::put_varint(&mut out, block.row_count() as u64);

    for (name, node, column) in block.iter() {
        wire::put_string(&mut out, name);
        wire::put_string(&mut out, node.full_name());
        if revision >= MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            out.extend_from_slice(&[0]);
        }
        if block.row_count() > 0 {
            column.save_prefix(&mut out)?;
            column.save_body(&mut out)?;
        }
    }

    Ok(out)
}

/// Reader for server blocks travelling inside compression frames.
pub struct BlockReader {
    revision: u64,
    stash: BytesMut,
}

impl BlockReader {
    pub fn new(revision: u64) -> Self {
        Self { revision, stash: BytesMut::new() }
    }

    /// Read one block, pulling as many frames as the block spans. Leftover
    /// decompressed bytes stay stashed for the next block.
    pub async fn read_block<S>(
        &mut self,
        conn: &mut Connection<S>,
    ) -> Result<Block>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        loop {
            if !self.stash.is_empty() {
                let mut slice = &self.stash[..];
                match parse_block(&mut slice, self.revision) {
                    Ok(block) => {
                        let consumed = self.stash.len() - slice.len();
                        self.stash.advance(consumed);
                        return Ok(block);
                    }
                    Err(e) if wire::is_underflow(&e) => {}
                    Err(e) => return Err(e),
                }
            }
            let frame = conn.read_frame().await?;
            self.stash.extend_from_slice(&frame);
        }
    }
}

/// Writer for client blocks: stages the serialised payload, then frames it
/// (or sends it raw when compression is off).
pub struct BlockWriter {
    revision: u64,
    compression: Option<CompressionMethod>,
    block_size: usize,
    staging: WireBuffer,
}

impl BlockWriter {
    pub fn new(
        revision: u64,
        compression: Option<CompressionMethod>,
    ) -> Self {
        Self {
            revision,
            compression,
            block_size: compression::DEFAULT_BLOCK_SIZE,
            staging: WireBuffer::new(MAX_STAGED_BLOCK),
        }
    }

    /// Serialise `block` and write it to the connection. The caller has
    /// already written the Data opcode and table-name string.
    pub async fn write_block<S>(
        &mut self,
        conn: &mut Connection<S>,
        block: &Block,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        match serialize_block(block, self.revision) {
            Ok(payload) => self.staging.put_slice(&payload)?,
            Err(e) => {
                self.staging.discard();
                return Err(e);
            }
        }
        self.staging.flush();

        let staged = self.staging.readable().len();
        match self.compression {
            Some(method) => {
                let framed = compression::compress_frames(
                    method,
                    self.staging.readable(),
                    self.block_size,
                )?;
                conn.write_bytes(&framed).await?;
            }
            None => {
                conn.write_bytes(self.staging.readable()).await?;
            }
        }
        self.staging.confirm_read(staged);
        conn.flush().await?;
        Ok(())
    }
}

/// Incrementally read an uncompressed server block (Log, ProfileEvents).
/// Covers the fixed-width and String column families those blocks use.
pub async fn read_raw_block<S>(
    conn: &mut Connection<S>,
    revision: u64,
) -> Result<Block>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let mut block = Block::new();
    if revision >= MIN_REVISION_WITH_BLOCK_INFO {
        let mut info = BlockInfo::new();
        loop {
            match conn.read_varint().await? {
                0 => break,
                1 => info.is_overflows = conn.read_fixed::<u8>().await? != 0,
                2 => info.bucket_num = conn.read_fixed::<i32>().await?,
                field => {
                    return Err(Error::Protocol(format!(
                        "unknown block info field {field}"
                    )))
                }
            }
        }
        block.set_info(info);
    }

    let columns = conn.read_varint().await? as usize;
    let rows = conn.read_varint().await? as usize;

    for _ in 0..columns {
        let name = conn.read_string().await?;
        let type_name = conn.read_string().await?;
        if revision >= MIN_REVISION_WITH_CUSTOM_SERIALIZATION {
            let custom = conn.read_fixed::<u8>().await?;
            if custom != 0 {
                return Err(Error::Protocol(format!(
                    "custom serialization of column '{name}' is not \
                     supported"
                )));
            }
        }

        let node = TypeNode::parse(&type_name)?;
        let mut col = column::for_type(&node)?;
        if rows > 0 {
            if let Some(width) = column::fixed_width(&node) {
                let bytes = conn.read_bytes(rows * width).await?;
                let mut slice = &bytes[..];
                col.load_body(&mut slice, rows)?;
            } else if node.name() == "String" {
                let strings = col
                    .as_any_mut()
                    .downcast_mut::<ColumnString>()
                    .expect("String type maps to ColumnString");
                for _ in 0..rows {
                    let len = conn.read_varint().await? as usize;
                    let bytes = conn.read_bytes(len).await?;
                    strings.append(String::from_utf8(bytes).map_err(
                        |e| Error::Protocol(format!("invalid UTF-8: {e}")),
                    )?);
                }
            } else {
                return Err(Error::Protocol(format!(
                    "uncompressed column type {} is not supported",
                    node.full_name()
                )));
            }
        }
        block.add_column(name, col.into())?;
    }

    Ok(block)
}
