//! # ClickHouse native protocol core
//!
//! The wire-protocol engine of a native (TCP, port 9000) ClickHouse client:
//! framed binary protocol with negotiated revisions, per-block LZ4/ZSTD
//! compression with CityHash-128 integrity checks, a typed column codec
//! registry over the full type lattice, and a session state machine for the
//! query/insert/cancel exchanges. Higher-level conveniences (command
//! objects, result mapping, connection strings) belong to wrapping crates;
//! this one speaks bytes.
//!
//! # Quick start
//!
//! ```no_run
//! use clickhouse_native_core::{Session, SessionOptions};
//!
//! # async fn example() -> clickhouse_native_core::Result<()> {
//! let options = SessionOptions::new("127.0.0.1", 9000)
//!     .database("default")
//!     .user("default");
//! let mut session = Session::connect(options).await?;
//!
//! session.ping().await?;
//!
//! let mut stream = session.execute("SELECT number FROM numbers(10)").await?;
//! while let Some(block) = stream.next_block().await? {
//!     println!("{} rows", block.row_count());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`session`]: connection lifecycle, queries, inserts, cancellation
//! - [`block`] and [`mod@column`]: columnar data and per-type codecs
//! - [`types`]: the type grammar parser and interned type tree
//! - [`compression`] and [`checksum`]: the LZ4 frame envelope
//! - [`wire`], [`buffer`], [`connection`]: binary primitives and the
//!   buffered transport
//! - [`message`] and [`protocol`]: packet encoders/decoders and revision
//!   gates
//! - [`literal`]: SQL literal rendering for query parameters
//! - [`blocking`]: a synchronous driver over the async session

#![warn(missing_docs)]

/// Data blocks: named, equally sized columns.
pub mod block;
/// Synchronous bridge over the async session.
pub mod blocking;
/// The three-cursor staging buffer.
pub mod buffer;
/// CityHash-128 (v1.0.2) in wire order.
pub mod checksum;
/// Column codecs and the type registry.
pub mod column;
/// Compression frame codec.
pub mod compression;
/// Buffered duplex transport with deadlines.
pub mod connection;
/// The closed error set.
pub mod error;
/// Block-level I/O.
pub mod io;
/// SQL literal rendering and parameter substitution.
pub mod literal;
/// Client/server message encoding.
pub mod message;
/// Protocol opcodes and revision constants.
pub mod protocol;
/// Session state machine and result streaming.
pub mod session;
/// The type grammar and type-info tree.
pub mod types;
/// Binary wire primitives.
pub mod wire;

pub use block::{Block, BlockInfo};
pub use blocking::BlockingSession;
pub use column::{Column, ColumnRef};
pub use connection::ConnectionOptions;
pub use error::{Error, Result};
pub use message::{Progress, ProfileInfo, ServerInfo};
pub use protocol::CompressionMethod;
pub use session::{ResultStream, Session, SessionOptions, SessionState};
pub use types::{DbType, TypeNode};
