//! Session state-machine tests against a scripted in-process server.
//!
//! The server side of the duplex pipe speaks just enough of the protocol,
//! using the crate's own wire primitives, to exercise the handshake, the
//! ping/pong exchange, query result streaming with compressed blocks,
//! server exceptions, cancellation, and hard protocol violations.

use std::sync::Arc;

use tokio::io::DuplexStream;

use clickhouse_native_core::column::{
    Column, ColumnString, ColumnUInt64,
};
use clickhouse_native_core::connection::{Connection, ConnectionOptions};
use clickhouse_native_core::io::{BlockReader, BlockWriter};
use clickhouse_native_core::protocol::CLIENT_TCP_PROTOCOL_REVISION;
use clickhouse_native_core::types::TypeNode;
use clickhouse_native_core::{
    Block, CompressionMethod, Error, Session, SessionOptions, SessionState,
};

const SERVER_REVISION: u64 = 54460;
const NEGOTIATED: u64 = CLIENT_TCP_PROTOCOL_REVISION;

struct MockServer {
    conn: Connection<DuplexStream>,
    reader: BlockReader,
    writer: BlockWriter,
}

impl MockServer {
    fn new(stream: DuplexStream) -> Self {
        Self {
            conn: Connection::new(stream, &ConnectionOptions::default()),
            reader: BlockReader::new(NEGOTIATED),
            writer: BlockWriter::new(
                NEGOTIATED,
                Some(CompressionMethod::Lz4),
            ),
        }
    }

    /// Accept the client hello, answer with ours, consume the addendum.
    async fn handshake(&mut self) {
        assert_eq!(self.conn.read_varint().await.unwrap(), 0); // Hello
        let _client_name = self.conn.read_string().await.unwrap();
        let _major = self.conn.read_varint().await.unwrap();
        let _minor = self.conn.read_varint().await.unwrap();
        let client_revision = self.conn.read_varint().await.unwrap();
        assert_eq!(client_revision, CLIENT_TCP_PROTOCOL_REVISION);
        let _database = self.conn.read_string().await.unwrap();
        let _user = self.conn.read_string().await.unwrap();
        let _password = self.conn.read_string().await.unwrap();

        self.conn.write_varint(0).await.unwrap(); // Hello
        self.conn.write_string("ClickHouse").await.unwrap();
        self.conn.write_varint(23).await.unwrap();
        self.conn.write_varint(8).await.unwrap();
        self.conn.write_varint(SERVER_REVISION).await.unwrap();
        self.conn.write_string("UTC").await.unwrap();
        self.conn.write_string("mock").await.unwrap();
        self.conn.write_varint(7).await.unwrap();
        self.conn.flush().await.unwrap();

        // Quota-key addendum.
        assert_eq!(self.conn.read_string().await.unwrap(), "");
    }

    /// Parse a full client Query message and its terminating empty block;
    /// returns the query text.
    async fn read_query(&mut self) -> String {
        assert_eq!(self.conn.read_varint().await.unwrap(), 1); // Query
        let _query_id = self.conn.read_string().await.unwrap();

        assert_eq!(self.conn.read_fixed::<u8>().await.unwrap(), 1);
        let _initial_user = self.conn.read_string().await.unwrap();
        let _initial_query_id = self.conn.read_string().await.unwrap();
        let _initial_address = self.conn.read_string().await.unwrap();
        let _start_time = self.conn.read_fixed::<i64>().await.unwrap();
        assert_eq!(self.conn.read_fixed::<u8>().await.unwrap(), 1); // TCP
        let _os_user = self.conn.read_string().await.unwrap();
        let _hostname = self.conn.read_string().await.unwrap();
        let _client_name = self.conn.read_string().await.unwrap();
        let _major = self.conn.read_varint().await.unwrap();
        let _minor = self.conn.read_varint().await.unwrap();
        let _revision = self.conn.read_varint().await.unwrap();
        let _quota_key = self.conn.read_string().await.unwrap();
        let _depth = self.conn.read_varint().await.unwrap();
        let _patch = self.conn.read_varint().await.unwrap();
        assert_eq!(self.conn.read_fixed::<u8>().await.unwrap(), 0); // no otel
        for _ in 0..3 {
            assert_eq!(self.conn.read_varint().await.unwrap(), 0);
        }

        loop {
            let key = self.conn.read_string().await.unwrap();
            if key.is_empty() {
                break;
            }
            let _important = self.conn.read_varint().await.unwrap();
            let _value = self.conn.read_string().await.unwrap();
        }
        let _secret = self.conn.read_string().await.unwrap();
        assert_eq!(self.conn.read_varint().await.unwrap(), 2); // Complete
        let _compression = self.conn.read_fixed::<u8>().await.unwrap();
        let text = self.conn.read_string().await.unwrap();

        // Terminating empty data block.
        let block = self.read_data_packet().await;
        assert!(block.is_empty());
        text
    }

    async fn read_data_packet(&mut self) -> Block {
        assert_eq!(self.conn.read_varint().await.unwrap(), 2); // Data
        let _table = self.conn.read_string().await.unwrap();
        self.reader.read_block(&mut self.conn).await.unwrap()
    }

    async fn write_data_packet(&mut self, block: &Block) {
        self.conn.write_varint(1).await.unwrap(); // Data
        self.conn.write_string("").await.unwrap();
        self.writer.write_block(&mut self.conn, block).await.unwrap();
    }

    async fn write_progress(&mut self, rows: u64, bytes: u64) {
        self.conn.write_varint(3).await.unwrap(); // Progress
        self.conn.write_varint(rows).await.unwrap();
        self.conn.write_varint(bytes).await.unwrap();
        self.conn.write_varint(0).await.unwrap(); // total rows
        self.conn.write_varint(0).await.unwrap(); // written rows
        self.conn.write_varint(0).await.unwrap(); // written bytes
        self.conn.flush().await.unwrap();
    }

    async fn write_end_of_stream(&mut self) {
        self.conn.write_varint(5).await.unwrap();
        self.conn.flush().await.unwrap();
    }

    async fn write_exception(&mut self, code: i32, message: &str) {
        self.conn.write_varint(2).await.unwrap(); // Exception
        self.conn.write_fixed(code).await.unwrap();
        self.conn.write_string("DB::Exception").await.unwrap();
        self.conn.write_string(message).await.unwrap();
        self.conn.write_string("<stack>").await.unwrap();
        self.conn.write_fixed(0u8).await.unwrap();
        self.conn.flush().await.unwrap();
    }

    async fn serve_ping(&mut self) {
        assert_eq!(self.conn.read_varint().await.unwrap(), 4); // Ping
        self.conn.write_varint(4).await.unwrap(); // Pong
        self.conn.flush().await.unwrap();
    }
}

fn options() -> SessionOptions {
    SessionOptions::new("mock", 9000)
}

fn user_block(value: &str) -> Block {
    let mut block = Block::new();
    block
        .add_column(
            "currentUser()",
            Arc::new(ColumnString::from_values(
                TypeNode::parse("String").unwrap(),
                [value],
            )),
        )
        .unwrap();
    block
}

#[tokio::test]
async fn handshake_ping_dispose() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        server.serve_ping().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.revision(), NEGOTIATED);
    assert_eq!(session.server_info().name, "ClickHouse");
    assert_eq!(session.server_info().timezone, "UTC");
    assert_eq!(session.server_info().display_name, "mock");

    session.ping().await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    session.close();
    server.await.unwrap();
}

#[tokio::test]
async fn select_streams_blocks_and_progress() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let query = server.read_query().await;
        assert_eq!(query, "SELECT currentUser()");

        // Header block (no rows), then the data, then progress and EOS.
        server.write_data_packet(&Block::new()).await;
        server.write_data_packet(&user_block("default")).await;
        server.write_progress(1, 16).await;
        server.write_end_of_stream().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    let mut stream = session.execute("SELECT currentUser()").await.unwrap();

    let block = stream.next_block().await.unwrap().unwrap();
    assert_eq!(block.row_count(), 1);
    assert_eq!(block.column_name(0), Some("currentUser()"));
    let names = block.column(0).unwrap();
    assert_eq!(names.type_node().full_name(), "String");
    let names = names.as_any().downcast_ref::<ColumnString>().unwrap();
    assert_eq!(names.get(0), Some("default"));

    assert!(stream.next_block().await.unwrap().is_none());
    assert_eq!(stream.progress().rows, 1);
    assert_eq!(session.state(), SessionState::Ready);
    server.await.unwrap();
}

#[tokio::test]
async fn server_exception_leaves_session_usable() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let _query = server.read_query().await;
        server.write_exception(60, "Table test.missing does not exist").await;
        server.serve_ping().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    let mut stream =
        session.execute("SELECT * FROM test.missing").await.unwrap();
    match stream.next_block().await {
        Err(Error::Server { code, .. }) => assert_eq!(code, 60),
        other => panic!("expected server error, got {other:?}"),
    }
    drop(stream);

    // Caller-attributable failure: the session survives.
    assert_eq!(session.state(), SessionState::Ready);
    session.ping().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn protocol_violation_breaks_session() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let _query = server.read_query().await;
        // An opcode that does not exist.
        server.conn.write_varint(99).await.unwrap();
        server.conn.flush().await.unwrap();
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    let mut stream = session.execute("SELECT 1").await.unwrap();
    assert!(matches!(
        stream.next_block().await,
        Err(Error::Protocol(_))
    ));
    drop(stream);

    assert_eq!(session.state(), SessionState::Broken);
    assert!(matches!(
        session.execute("SELECT 1").await,
        Err(Error::Internal(_))
    ));
    server.await.unwrap();
}

#[tokio::test]
async fn insert_exchange() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let query = server.read_query().await;
        assert_eq!(query, "INSERT INTO t (`id`) VALUES");

        // Header block announcing the table structure.
        let mut header = Block::new();
        header
            .add_column(
                "id",
                Arc::new(ColumnUInt64::new(
                    TypeNode::parse("UInt64").unwrap(),
                )),
            )
            .unwrap();
        server.write_data_packet(&header).await;

        // The payload block, then the terminating empty block.
        let payload = server.read_data_packet().await;
        assert_eq!(payload.row_count(), 3);
        let terminator = server.read_data_packet().await;
        assert!(terminator.is_empty());

        server.write_end_of_stream().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();

    let mut block = Block::new();
    block
        .add_column(
            "id",
            Arc::new(ColumnUInt64::from_values(
                TypeNode::parse("UInt64").unwrap(),
                vec![1, 2, 3],
            )),
        )
        .unwrap();
    session.insert_block("t", block).await.unwrap();
    assert_eq!(session.state(), SessionState::Ready);
    server.await.unwrap();
}

#[tokio::test]
async fn cancel_drains_to_end_of_stream() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let _query = server.read_query().await;
        server.write_data_packet(&user_block("default")).await;

        // Wait for the Cancel, then finish the stream.
        assert_eq!(server.conn.read_varint().await.unwrap(), 3);
        server.write_end_of_stream().await;
        server.serve_ping().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    let mut stream = session.execute("SELECT sleep(10)").await.unwrap();
    let first = stream.next_block().await.unwrap();
    assert!(first.is_some());

    stream.cancel().await.unwrap();
    drop(stream);
    assert_eq!(session.state(), SessionState::Ready);
    session.ping().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn parameter_substitution_happens_before_send() {
    let (client_end, server_end) = tokio::io::duplex(1 << 16);
    let server = tokio::spawn(async move {
        let mut server = MockServer::new(server_end);
        server.handshake().await;
        let query = server.read_query().await;
        assert_eq!(query, "SELECT 42, 'x'");
        server.write_end_of_stream().await;
    });

    let mut session =
        Session::handshake_over(client_end, options()).await.unwrap();
    let params = vec![
        ("id".to_string(), "42".to_string()),
        ("name".to_string(), "'x'".to_string()),
    ];
    let stream = session
        .execute_with("SELECT {id:UInt64}, {name:String}", &params, &[])
        .await
        .unwrap();
    let blocks = stream.collect().await.unwrap();
    assert!(blocks.is_empty());
    server.await.unwrap();
}
