//! Client and server protocol messages.
//!
//! Encoders for the client packets (Hello, Query, Cancel, Ping) and a typed
//! decoder for everything the server can send. Only the Query message is
//! heavily revision-dependent; every optional field is gated on the
//! constants in [`crate::protocol`].

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::block::Block;
use crate::connection::Connection;
use crate::io::{read_raw_block, BlockReader};
use crate::protocol::{
    ClientCode, QueryKind, ServerCode, Stage, CLIENT_TCP_PROTOCOL_REVISION,
    MIN_REVISION_WITH_CLIENT_INFO, MIN_REVISION_WITH_CLIENT_WRITE_INFO,
    MIN_REVISION_WITH_DISTRIBUTED_DEPTH,
    MIN_REVISION_WITH_INITIAL_QUERY_START_TIME,
    MIN_REVISION_WITH_INTERSERVER_SECRET, MIN_REVISION_WITH_OPENTELEMETRY,
    MIN_REVISION_WITH_PARALLEL_REPLICAS, MIN_REVISION_WITH_QUOTA_KEY,
    MIN_REVISION_WITH_SERVER_DISPLAY_NAME,
    MIN_REVISION_WITH_SERVER_TIMEZONE, MIN_REVISION_WITH_TEMPORARY_TABLES,
    MIN_REVISION_WITH_VERSION_PATCH,
};
use crate::{Error, Result};

/// Name this client introduces itself with.
pub const CLIENT_NAME: &str = "clickhouse-native-core";

/// Client major version advertised in Hello and Query messages.
pub const CLIENT_VERSION_MAJOR: u64 = 0;
/// Client minor version advertised in Hello and Query messages.
pub const CLIENT_VERSION_MINOR: u64 = 1;
/// Client build number advertised when the revision carries it.
pub const CLIENT_VERSION_PATCH: u64 = 0;

/// Server identity latched from the handshake.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server name string, e.g. `ClickHouse`.
    pub name: String,
    /// Server version triple.
    pub version: (u64, u64, u64),
    /// The server's own protocol revision.
    pub server_revision: u64,
    /// The negotiated revision, `min(client, server)`. Fixed for the life
    /// of the session.
    pub revision: u64,
    /// Server-side time zone, when the revision carries it.
    pub timezone: String,
    /// Server display name.
    pub display_name: String,
}

/// Query progress counters, accumulated over Progress packets.
#[derive(Debug, Clone, Copy, Default)]
pub struct Progress {
    /// Rows read so far.
    pub rows: u64,
    /// Bytes read so far.
    pub bytes: u64,
    /// Estimated total rows to read, when the server knows it.
    pub total_rows: u64,
    /// Rows written (INSERT side).
    pub written_rows: u64,
    /// Bytes written (INSERT side).
    pub written_bytes: u64,
}

impl Progress {
    /// Fold one Progress packet into the running totals.
    pub fn accumulate(&mut self, other: &Progress) {
        self.rows += other.rows;
        self.bytes += other.bytes;
        self.total_rows = self.total_rows.max(other.total_rows);
        self.written_rows += other.written_rows;
        self.written_bytes += other.written_bytes;
    }
}

/// Query profile counters from a ProfileInfo packet.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileInfo {
    /// Result rows produced.
    pub rows: u64,
    /// Result blocks produced.
    pub blocks: u64,
    /// Result bytes produced.
    pub bytes: u64,
    /// Whether a LIMIT clause was applied.
    pub applied_limit: bool,
    /// Row count before the LIMIT was applied.
    pub rows_before_limit: u64,
    /// Whether `rows_before_limit` was actually computed.
    pub calculated_rows_before_limit: bool,
}

/// One decoded server packet.
pub enum ServerMessage {
    /// Server handshake (only legal during connect).
    Hello(ServerInfo),
    /// A result data block.
    Data(Block),
    /// The totals block of a WITH TOTALS query.
    Totals(Block),
    /// The extremes block.
    Extremes(Block),
    /// A server exception, already shaped as [`Error::Server`].
    Exception(Error),
    /// A progress update.
    Progress(Progress),
    /// Answer to a Ping.
    Pong,
    /// End of the current exchange.
    EndOfStream,
    /// Query profiling counters.
    ProfileInfo(ProfileInfo),
    /// Table-columns metadata; content is not interpreted.
    TableColumns,
    /// A server log block, read and discarded.
    Log,
    /// A profile-events block, read and discarded.
    ProfileEvents,
    /// The server time zone changed.
    TimezoneUpdate(String),
}

/// Write the client Hello (handshake opener).
pub async fn write_hello<S>(
    conn: &mut Connection<S>,
    database: &str,
    user: &str,
    password: &str,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    debug!(database, user, "sending client hello");
    conn.write_varint(ClientCode::Hello as u64).await?;
    conn.write_string(CLIENT_NAME).await?;
    conn.write_varint(CLIENT_VERSION_MAJOR).await?;
    conn.write_varint(CLIENT_VERSION_MINOR).await?;
    conn.write_varint(CLIENT_TCP_PROTOCOL_REVISION).await?;
    conn.write_string(database).await?;
    conn.write_string(user).await?;
    conn.write_string(password).await?;
    conn.flush().await
}

/// Read the server Hello and compute the negotiated revision.
pub async fn read_hello<S>(conn: &mut Connection<S>) -> Result<ServerInfo>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let opcode = conn.read_varint().await?;
    match ServerCode::try_from(opcode)? {
        ServerCode::Hello => {}
        ServerCode::Exception => return Err(read_exception(conn).await?),
        other => {
            return Err(Error::Protocol(format!(
                "expected server Hello, got {other:?}"
            )))
        }
    }

    let name = conn.read_string().await?;
    let major = conn.read_varint().await?;
    let minor = conn.read_varint().await?;
    let server_revision = conn.read_varint().await?;
    let revision = server_revision.min(CLIENT_TCP_PROTOCOL_REVISION);

    let timezone = if server_revision >= MIN_REVISION_WITH_SERVER_TIMEZONE {
        conn.read_string().await?
    } else {
        String::new()
    };
    let display_name =
        if server_revision >= MIN_REVISION_WITH_SERVER_DISPLAY_NAME {
            conn.read_string().await?
        } else {
            String::new()
        };
    let patch = if server_revision >= MIN_REVISION_WITH_VERSION_PATCH {
        conn.read_varint().await?
    } else {
        0
    };

    debug!(
        server = %name,
        version = ?(major, minor, patch),
        server_revision,
        revision,
        "server hello received"
    );
    Ok(ServerInfo {
        name,
        version: (major, minor, patch),
        server_revision,
        revision,
        timezone,
        display_name,
    })
}

/// Parameters of one Query message.
pub struct QueryMessage<'a> {
    /// Query id; empty lets the server allocate one.
    pub query_id: &'a str,
    /// Only [`QueryKind::InitialQuery`] is implemented.
    pub kind: QueryKind,
    /// `(key, value)` settings, written in insertion order.
    pub settings: &'a [(String, String)],
    /// Whether result blocks travel in compression frames.
    pub compression_enabled: bool,
    /// The query text, after parameter substitution.
    pub text: &'a str,
}

/// Encode a Query message. Field order and gating follow the negotiated
/// revision; only `InitialQuery` is supported.
pub async fn write_query<S>(
    conn: &mut Connection<S>,
    revision: u64,
    message: &QueryMessage<'_>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    match message.kind {
        QueryKind::InitialQuery => {}
        other => {
            return Err(Error::NotSupported(format!(
                "query kind {other:?}"
            )))
        }
    }

    trace!(query = message.text, "sending query");
    conn.write_varint(ClientCode::Query as u64).await?;
    conn.write_string(message.query_id).await?;

    if revision >= MIN_REVISION_WITH_CLIENT_INFO {
        conn.write_fixed(QueryKind::InitialQuery as u8).await?;
        conn.write_string("").await?; // initial user: the server fills it
        conn.write_string("").await?; // initial query id
        conn.write_string("0.0.0.0:0").await?; // initial address
        if revision >= MIN_REVISION_WITH_INITIAL_QUERY_START_TIME {
            conn.write_fixed(0i64).await?; // start time: server side
        }
        conn.write_fixed(1u8).await?; // interface = TCP
        conn.write_string("").await?; // OS user
        conn.write_string(&hostname()).await?;
        conn.write_string(CLIENT_NAME).await?;
        conn.write_varint(CLIENT_VERSION_MAJOR).await?;
        conn.write_varint(CLIENT_VERSION_MINOR).await?;
        conn.write_varint(CLIENT_TCP_PROTOCOL_REVISION).await?;
        if revision >= MIN_REVISION_WITH_QUOTA_KEY {
            conn.write_string("").await?;
        }
        if revision >= MIN_REVISION_WITH_DISTRIBUTED_DEPTH {
            conn.write_varint(0).await?;
        }
        if revision >= MIN_REVISION_WITH_VERSION_PATCH {
            conn.write_varint(CLIENT_VERSION_PATCH).await?;
        }
        if revision >= MIN_REVISION_WITH_OPENTELEMETRY {
            conn.write_fixed(0u8).await?; // no trace context
        }
        if revision >= MIN_REVISION_WITH_PARALLEL_REPLICAS {
            conn.write_varint(0).await?; // collaborate_with_initiator
            conn.write_varint(0).await?; // count_participating_replicas
            conn.write_varint(0).await?; // number_of_current_replica
        }
    }

    // Settings as strings: key, importance flag, value; empty key ends.
    for (key, value) in message.settings {
        conn.write_string(key).await?;
        conn.write_varint(1).await?; // important
        conn.write_string(value).await?;
    }
    conn.write_string("").await?;

    if revision >= MIN_REVISION_WITH_INTERSERVER_SECRET {
        conn.write_string("").await?;
    }

    conn.write_varint(Stage::Complete as u64).await?;
    conn.write_fixed(message.compression_enabled as u8).await?;
    conn.write_string(message.text).await?;
    Ok(())
}

/// Write a Cancel for the in-flight query.
pub async fn write_cancel<S>(conn: &mut Connection<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    debug!("sending cancel");
    conn.write_varint(ClientCode::Cancel as u64).await?;
    conn.flush().await
}

/// Write a Ping.
pub async fn write_ping<S>(conn: &mut Connection<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send,
{
    conn.write_varint(ClientCode::Ping as u64).await?;
    conn.flush().await
}

/// Read and dispatch one server packet.
///
/// `Log` packets are read and discarded; the deliberately unimplemented
/// opcodes (TablesStatusResponse, PartUuids, ReadTaskRequest and the
/// MergeTree coordination pair) return `NotSupported`, which the session
/// treats as fatal because the stream can no longer be followed.
pub async fn read_message<S>(
    conn: &mut Connection<S>,
    reader: &mut BlockReader,
    revision: u64,
    compressed: bool,
) -> Result<ServerMessage>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let opcode = conn.read_varint().await?;
    let code = ServerCode::try_from(opcode)?;
    trace!(?code, "server packet");
    match code {
        ServerCode::Hello => Ok(ServerMessage::Hello(read_hello_body(conn).await?)),
        ServerCode::Data => {
            let block = read_data_body(conn, reader, revision, compressed)
                .await?;
            Ok(ServerMessage::Data(block))
        }
        ServerCode::Totals => {
            let block = read_data_body(conn, reader, revision, compressed)
                .await?;
            Ok(ServerMessage::Totals(block))
        }
        ServerCode::Extremes => {
            let block = read_data_body(conn, reader, revision, compressed)
                .await?;
            Ok(ServerMessage::Extremes(block))
        }
        ServerCode::Exception => {
            Ok(ServerMessage::Exception(read_exception(conn).await?))
        }
        ServerCode::Progress => {
            Ok(ServerMessage::Progress(read_progress(conn, revision).await?))
        }
        ServerCode::Pong => Ok(ServerMessage::Pong),
        ServerCode::EndOfStream => Ok(ServerMessage::EndOfStream),
        ServerCode::ProfileInfo => {
            Ok(ServerMessage::ProfileInfo(read_profile_info(conn).await?))
        }
        ServerCode::TableColumns => {
            let _external_table = conn.read_string().await?;
            let _metadata = conn.read_string().await?;
            Ok(ServerMessage::TableColumns)
        }
        ServerCode::Log => {
            // Always uncompressed, preceded by a table name.
            let _table = conn.read_string().await?;
            let block = read_raw_block(conn, revision).await?;
            debug!(rows = block.row_count(), "discarded server log block");
            Ok(ServerMessage::Log)
        }
        ServerCode::ProfileEvents => {
            let _table = conn.read_string().await?;
            let block = read_raw_block(conn, revision).await?;
            trace!(rows = block.row_count(), "discarded profile events");
            Ok(ServerMessage::ProfileEvents)
        }
        ServerCode::TimezoneUpdate => {
            Ok(ServerMessage::TimezoneUpdate(conn.read_string().await?))
        }
        ServerCode::TablesStatusResponse
        | ServerCode::PartUuids
        | ServerCode::ReadTaskRequest
        | ServerCode::MergeTreeAllRangesAnnouncement
        | ServerCode::MergeTreeReadTaskRequest => Err(Error::NotSupported(
            format!("server packet {code:?}"),
        )),
    }
}

async fn read_hello_body<S>(conn: &mut Connection<S>) -> Result<ServerInfo>
where
    S: AsyncRead + AsyncWrite + Send,
{
    // A Hello outside the handshake is a protocol violation, but decode it
    // so the error message can say what the server claimed to be.
    let info = ServerInfo {
        name: conn.read_string().await?,
        ..ServerInfo::default()
    };
    Err(Error::Protocol(format!(
        "unexpected Hello from '{}' mid-session",
        info.name
    )))
}

async fn read_data_body<S>(
    conn: &mut Connection<S>,
    reader: &mut BlockReader,
    revision: u64,
    compressed: bool,
) -> Result<Block>
where
    S: AsyncRead + AsyncWrite + Send,
{
    if revision >= MIN_REVISION_WITH_TEMPORARY_TABLES {
        let _external_table = conn.read_string().await?;
    }
    if compressed {
        reader.read_block(conn).await
    } else {
        read_raw_block(conn, revision).await
    }
}

/// Decode a server exception chain into [`Error::Server`].
pub async fn read_exception<S>(conn: &mut Connection<S>) -> Result<Error>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let mut entries = Vec::new();
    loop {
        let code = conn.read_fixed::<i32>().await?;
        let name = conn.read_string().await?;
        let message = conn.read_string().await?;
        let _stack_trace = conn.read_string().await?;
        let has_nested = conn.read_fixed::<u8>().await? != 0;
        entries.push((code, name, message));
        if !has_nested {
            break;
        }
    }

    // Fold the chain inside out so the outermost entry carries the rest.
    let mut error: Option<Error> = None;
    for (code, name, message) in entries.into_iter().rev() {
        error = Some(Error::Server {
            code,
            name,
            message,
            nested: error.map(Box::new),
        });
    }
    Ok(error.expect("at least one exception entry"))
}

async fn read_progress<S>(
    conn: &mut Connection<S>,
    revision: u64,
) -> Result<Progress>
where
    S: AsyncRead + AsyncWrite + Send,
{
    let rows = conn.read_varint().await?;
    let bytes = conn.read_varint().await?;
    let total_rows = conn.read_varint().await?;
    let (written_rows, written_bytes) =
        if revision >= MIN_REVISION_WITH_CLIENT_WRITE_INFO {
            (conn.read_varint().await?, conn.read_varint().await?)
        } else {
            (0, 0)
        };
    Ok(Progress { rows, bytes, total_rows, written_rows, written_bytes })
}

async fn read_profile_info<S>(
    conn: &mut Connection<S>,
) -> Result<ProfileInfo>
where
    S: AsyncRead + AsyncWrite + Send,
{
    Ok(ProfileInfo {
        rows: conn.read_varint().await?,
        blocks: conn.read_varint().await?,
        bytes: conn.read_varint().await?,
        applied_limit: conn.read_fixed::<u8>().await? != 0,
        rows_before_limit: conn.read_varint().await?,
        calculated_rows_before_limit: conn.read_fixed::<u8>().await? != 0,
    })
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
