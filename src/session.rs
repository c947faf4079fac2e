//! The session state machine.
//!
//! A session owns one connection and walks a fixed set of states:
//!
//! ```text
//! New → HandshakingOut → HandshakingIn → Ready
//! Ready → SendingQuery → (SendingData)* → ReceivingResult → Ready
//! any → Broken (protocol/framing/I-O failure)   any → Closed (dispose)
//! ```
//!
//! Concurrent use of one session is not a supported pattern and the `&mut`
//! receiver on every operation enforces it at compile time. Errors split in
//! two families: server exceptions and caller mistakes leave the session
//! `Ready`; anything that loses wire position (unexpected opcode, checksum
//! mismatch, timeout) latches `Broken` and every later call fails fast.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::debug;

use crate::block::Block;
use crate::connection::{Connection, ConnectionOptions};
use crate::io::{BlockReader, BlockWriter};
use crate::literal;
use crate::message::{
    self, Progress, ProfileInfo, QueryMessage, ServerInfo, ServerMessage,
};
use crate::protocol::{
    ClientCode, CompressionMethod, QueryKind, MIN_REVISION_WITH_ADDENDUM,
    MIN_REVISION_WITH_TEMPORARY_TABLES, MIN_SUPPORTED_SERVER_REVISION,
};
use crate::{Error, Result};

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, nothing sent yet.
    New,
    /// Client Hello written, not yet flushed to the peer.
    HandshakingOut,
    /// Waiting for the server Hello.
    HandshakingIn,
    /// Idle; a query may be submitted.
    Ready,
    /// A Query message is being written.
    SendingQuery,
    /// Bulk-insert blocks are being written.
    SendingData,
    /// Server messages for the in-flight query are being drained.
    ReceivingResult,
    /// A fatal error occurred; only `close` remains meaningful.
    Broken,
    /// Disposed by the caller.
    Closed,
}

/// Everything needed to open a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Server host name or address.
    pub host: String,
    /// Native-protocol port, 9000 by default.
    pub port: u16,
    /// Default database.
    pub database: String,
    /// User to authenticate as.
    pub user: String,
    /// Password, empty by default.
    pub password: String,
    /// Block compression; `None` sends blocks raw.
    pub compression: Option<CompressionMethod>,
    /// Transport-level options (deadlines, keepalive).
    pub connection: ConnectionOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9000,
            database: "default".to_string(),
            user: "default".to_string(),
            password: String::new(),
            compression: Some(CompressionMethod::Lz4),
            connection: ConnectionOptions::default(),
        }
    }
}

impl SessionOptions {
    /// Options for `host:port` with the defaults for everything else.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self { host: host.into(), port, ..Self::default() }
    }

    /// Set the default database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Set the user.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the password.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the block compression method.
    pub fn compression(
        mut self,
        compression: Option<CompressionMethod>,
    ) -> Self {
        self.compression = compression;
        self
    }

    /// Set the transport options.
    pub fn connection(mut self, connection: ConnectionOptions) -> Self {
        self.connection = connection;
        self
    }
}

/// A protocol session over one duplex stream.
pub struct Session<S> {
    conn: Connection<S>,
    state: SessionState,
    server: ServerInfo,
    compression: Option<CompressionMethod>,
    reader: BlockReader,
    writer: BlockWriter,
    user: String,
}

impl Session<TcpStream> {
    /// Connect over TCP and perform the handshake.
    pub async fn connect(options: SessionOptions) -> Result<Self> {
        let conn = Connection::connect(
            &options.host,
            options.port,
            &options.connection,
        )
        .await?;
        Self::handshake(conn, options).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    /// Open a session over an established stream (the TLS seam, and how
    /// tests drive a scripted server).
    pub async fn handshake_over(
        stream: S,
        options: SessionOptions,
    ) -> Result<Self> {
        let conn = Connection::new(stream, &options.connection);
        Self::handshake(conn, options).await
    }

    async fn handshake(
        conn: Connection<S>,
        options: SessionOptions,
    ) -> Result<Self> {
        let mut session = Self {
            conn,
            state: SessionState::New,
            server: ServerInfo::default(),
            compression: options.compression,
            reader: BlockReader::new(0),
            writer: BlockWriter::new(0, options.compression),
            user: options.user.clone(),
        };

        session.state = SessionState::HandshakingOut;
        message::write_hello(
            &mut session.conn,
            &options.database,
            &options.user,
            &options.password,
        )
        .await
        .map_err(|e| session.fail(e))?;

        session.state = SessionState::HandshakingIn;
        let server = message::read_hello(&mut session.conn)
            .await
            .map_err(|e| session.fail(e))?;

        if server.server_revision < MIN_SUPPORTED_SERVER_REVISION {
            return Err(session.fail(Error::Protocol(format!(
                "server revision {} is older than the oldest supported {}",
                server.server_revision, MIN_SUPPORTED_SERVER_REVISION
            ))));
        }

        if server.server_revision >= MIN_REVISION_WITH_ADDENDUM {
            // Quota-key addendum, empty.
            session
                .conn
                .write_string("")
                .await
                .map_err(|e| session.fail(e))?;
            session.conn.flush().await.map_err(|e| session.fail(e))?;
        }

        session.reader = BlockReader::new(server.revision);
        session.writer =
            BlockWriter::new(server.revision, options.compression);
        session.server = server;
        session.state = SessionState::Ready;
        debug!(
            revision = session.server.revision,
            timezone = %session.server.timezone,
            "session ready"
        );
        Ok(session)
    }

    /// Identity the server reported during the handshake.
    pub fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// The negotiated protocol revision.
    pub fn revision(&self) -> u64 {
        self.server.revision
    }

    /// The user this session authenticated as.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Submit a query and stream its results.
    pub async fn execute(
        &mut self,
        query: &str,
    ) -> Result<ResultStream<'_, S>> {
        self.execute_with(query, &[], &[]).await
    }

    /// Submit a query with `{name:Type}` parameters (already rendered as
    /// SQL literals) and per-query settings.
    pub async fn execute_with(
        &mut self,
        query: &str,
        params: &[(String, String)],
        settings: &[(String, String)],
    ) -> Result<ResultStream<'_, S>> {
        self.require_ready()?;
        // Substitution failures are the caller's; the session stays Ready.
        let text = literal::substitute(query, params)?;

        self.state = SessionState::SendingQuery;
        self.send_query(&text, settings)
            .await
            .map_err(|e| self.fail(e))?;
        self.state = SessionState::ReceivingResult;
        Ok(ResultStream::new(self))
    }

    /// Bulk-insert one block into `table`.
    pub async fn insert_block(
        &mut self,
        table: &str,
        block: Block,
    ) -> Result<()> {
        self.require_ready()?;

        let columns: Vec<String> = (0..block.column_count())
            .filter_map(|i| block.column_name(i))
            .map(|name| format!("`{}`", name.replace('`', "``")))
            .collect();
        if columns.is_empty() {
            return Err(Error::Internal(
                "insert block has no columns".to_string(),
            ));
        }
        let query = format!(
            "INSERT INTO {table} ({}) VALUES",
            columns.join(", ")
        );

        self.state = SessionState::SendingQuery;
        self.send_query(&query, &[]).await.map_err(|e| self.fail(e))?;

        // The server answers with the table's header block (possibly
        // preceded by metadata packets) before accepting data.
        loop {
            match self.read_message().await.map_err(|e| self.fail(e))? {
                ServerMessage::Data(_) => break,
                ServerMessage::Progress(_)
                | ServerMessage::Log
                | ServerMessage::ProfileEvents
                | ServerMessage::TableColumns => continue,
                ServerMessage::Exception(error) => {
                    self.state = SessionState::Ready;
                    return Err(error);
                }
                _ => {
                    return Err(self.fail(Error::Protocol(
                        "unexpected packet while waiting to send data"
                            .to_string(),
                    )))
                }
            }
        }

        self.state = SessionState::SendingData;
        self.write_data_block(&block)
            .await
            .map_err(|e| self.fail(e))?;
        // The empty block terminates the insert.
        self.write_data_block(&Block::new())
            .await
            .map_err(|e| self.fail(e))?;

        self.state = SessionState::ReceivingResult;
        loop {
            match self.read_message().await.map_err(|e| self.fail(e))? {
                ServerMessage::EndOfStream => {
                    self.state = SessionState::Ready;
                    return Ok(());
                }
                ServerMessage::Exception(error) => {
                    self.state = SessionState::Ready;
                    return Err(error);
                }
                ServerMessage::Data(_)
                | ServerMessage::Progress(_)
                | ServerMessage::ProfileInfo(_)
                | ServerMessage::Log
                | ServerMessage::ProfileEvents
                | ServerMessage::TableColumns => continue,
                _ => {
                    return Err(self.fail(Error::Protocol(
                        "unexpected packet after insert".to_string(),
                    )))
                }
            }
        }
    }

    /// Liveness check.
    pub async fn ping(&mut self) -> Result<()> {
        self.require_ready()?;
        message::write_ping(&mut self.conn)
            .await
            .map_err(|e| self.fail(e))?;
        loop {
            match self.read_message().await.map_err(|e| self.fail(e))? {
                ServerMessage::Pong => return Ok(()),
                // A lagging Progress or log block from a prior exchange is
                // tolerated; anything else is a protocol violation.
                ServerMessage::Progress(_) | ServerMessage::Log => continue,
                ServerMessage::Exception(error) => {
                    self.state = SessionState::Ready;
                    return Err(error);
                }
                _ => {
                    return Err(self.fail(Error::Protocol(
                        "unexpected packet instead of Pong".to_string(),
                    )))
                }
            }
        }
    }

    /// Dispose the session; the socket closes with it.
    pub fn close(mut self) {
        self.state = SessionState::Closed;
    }

    fn require_ready(&self) -> Result<()> {
        match self.state {
            SessionState::Ready => Ok(()),
            SessionState::Broken => Err(Error::Internal(
                "session is broken by an earlier protocol error".to_string(),
            )),
            other => Err(Error::Internal(format!(
                "operation requires a Ready session, state is {other:?}"
            ))),
        }
    }

    fn fail(&mut self, error: Error) -> Error {
        if error.is_fatal() || matches!(error, Error::NotSupported(_)) {
            self.state = SessionState::Broken;
        }
        error
    }

    async fn send_query(
        &mut self,
        text: &str,
        settings: &[(String, String)],
    ) -> Result<()> {
        let message = QueryMessage {
            query_id: "",
            kind: QueryKind::InitialQuery,
            settings,
            compression_enabled: self.compression.is_some(),
            text,
        };
        message::write_query(&mut self.conn, self.server.revision, &message)
            .await?;
        // A query is terminated by an empty data block.
        self.write_data_block(&Block::new()).await
    }

    async fn write_data_block(&mut self, block: &Block) -> Result<()> {
        self.conn.write_varint(ClientCode::Data as u64).await?;
        if self.server.revision >= MIN_REVISION_WITH_TEMPORARY_TABLES {
            self.conn.write_string("").await?;
        }
        self.writer.write_block(&mut self.conn, block).await
    }

    async fn read_message(&mut self) -> Result<ServerMessage> {
        message::read_message(
            &mut self.conn,
            &mut self.reader,
            self.server.revision,
            self.compression.is_some(),
        )
        .await
    }
}

/// Lazily streamed result of one query.
///
/// Drive it with [`next_block`](Self::next_block) until `None`; the session
/// is only usable again once the stream hit EndOfStream (or was cancelled
/// and drained).
pub struct ResultStream<'a, S> {
    session: &'a mut Session<S>,
    progress: Progress,
    profile: Option<ProfileInfo>,
    totals: Option<Block>,
    extremes: Option<Block>,
    done: bool,
}

impl<'a, S> ResultStream<'a, S>
where
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    fn new(session: &'a mut Session<S>) -> Self {
        Self {
            session,
            progress: Progress::default(),
            profile: None,
            totals: None,
            extremes: None,
            done: false,
        }
    }

    /// The next data block, or `None` after EndOfStream. Empty header
    /// blocks are folded away.
    pub async fn next_block(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }
        loop {
            let message = self
                .session
                .read_message()
                .await
                .map_err(|e| self.session.fail(e))?;
            match message {
                ServerMessage::Data(block) => {
                    if block.is_empty() {
                        continue;
                    }
                    return Ok(Some(block));
                }
                ServerMessage::Progress(progress) => {
                    self.progress.accumulate(&progress);
                }
                ServerMessage::ProfileInfo(profile) => {
                    self.profile = Some(profile);
                }
                ServerMessage::Totals(block) => self.totals = Some(block),
                ServerMessage::Extremes(block) => {
                    self.extremes = Some(block)
                }
                ServerMessage::Log
                | ServerMessage::ProfileEvents
                | ServerMessage::TableColumns => {}
                ServerMessage::TimezoneUpdate(tz) => {
                    self.session.server.timezone = tz;
                }
                ServerMessage::EndOfStream => {
                    self.done = true;
                    self.session.state = SessionState::Ready;
                    return Ok(None);
                }
                ServerMessage::Exception(error) => {
                    self.done = true;
                    self.session.state = SessionState::Ready;
                    return Err(error);
                }
                ServerMessage::Pong | ServerMessage::Hello(_) => {
                    return Err(self.session.fail(Error::Protocol(
                        "unexpected packet in result stream".to_string(),
                    )))
                }
            }
        }
    }

    /// Drain the stream and collect every data block.
    pub async fn collect(mut self) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        while let Some(block) = self.next_block().await? {
            blocks.push(block);
        }
        Ok(blocks)
    }

    /// Ask the server to cancel the query, then drain the remaining
    /// messages until EndOfStream. The session returns to `Ready`.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.done {
            return Ok(());
        }
        message::write_cancel(&mut self.session.conn)
            .await
            .map_err(|e| self.session.fail(e))?;
        while self.next_block().await?.is_some() {}
        Ok(())
    }

    /// Accumulated progress counters.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// ProfileInfo, once the server sent it.
    pub fn profile(&self) -> Option<&ProfileInfo> {
        self.profile.as_ref()
    }

    /// The totals block of a `WITH TOTALS` query.
    pub fn totals(&self) -> Option<&Block> {
        self.totals.as_ref()
    }

    /// The extremes block, when `extremes = 1`.
    pub fn extremes(&self) -> Option<&Block> {
        self.extremes.as_ref()
    }
}
