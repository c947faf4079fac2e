//! Block-level I/O over the framed transport.

mod block_io;

pub use block_io::{
    parse_block, read_raw_block, serialize_block, BlockReader, BlockWriter,
};
