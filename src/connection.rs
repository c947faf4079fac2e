//! Buffered duplex transport.
//!
//! Wraps any async byte stream (normally a `TcpStream`) in buffered halves
//! and layers the wire primitives plus per-operation deadlines on top. The
//! deadline configured in [`ConnectionOptions`] is applied to every discrete
//! read and write; when it fires the operation fails with
//! [`Error::Timeout`] carrying the configured duration, and the session that
//! owns the connection treats that as fatal.

use std::future::Future;
use std::time::Duration;

use tokio::io::{
    AsyncWriteExt, BufReader, BufWriter, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;

use crate::compression;
use crate::wire::{FixedWire, WireFormat};
use crate::{Error, Result};

const READ_BUFFER_SIZE: usize = 128 * 1024;
const WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Transport-level options.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Deadline for establishing the TCP connection.
    pub connect_timeout: Duration,
    /// Deadline applied to each read operation. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Deadline applied to each write/flush operation.
    pub write_timeout: Option<Duration>,
    /// TCP keepalive probe interval, when set.
    pub tcp_keepalive: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: None,
            write_timeout: None,
            tcp_keepalive: Some(Duration::from_secs(60)),
        }
    }
}

/// A buffered duplex stream with wire-format primitives and deadlines.
///
/// Generic over the underlying stream so the handshake can run over
/// anything that implements the tokio I/O traits; production code uses
/// `Connection<TcpStream>`.
pub struct Connection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

async fn timed<T>(
    deadline: Option<Duration>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        None => fut.await,
        Some(d) => match tokio::time::timeout(d, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { deadline: d }),
        },
    }
}

impl Connection<TcpStream> {
    /// Connect to `host:port` and apply the socket options.
    pub async fn connect(
        host: &str,
        port: u16,
        options: &ConnectionOptions,
    ) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream =
            match tokio::time::timeout(
                options.connect_timeout,
                TcpStream::connect(&addr),
            )
            .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    return Err(Error::Connection(format!(
                        "failed to connect to {addr}: {e}"
                    )))
                }
                Err(_) => {
                    return Err(Error::Timeout {
                        deadline: options.connect_timeout,
                    })
                }
            };

        stream.set_nodelay(true).map_err(|e| {
            Error::Connection(format!("failed to set TCP_NODELAY: {e}"))
        })?;
        if let Some(interval) = options.tcp_keepalive {
            let keepalive =
                socket2::TcpKeepalive::new().with_time(interval);
            socket2::SockRef::from(&stream)
                .set_tcp_keepalive(&keepalive)
                .map_err(|e| {
                    Error::Connection(format!(
                        "failed to set TCP keepalive: {e}"
                    ))
                })?;
        }

        Ok(Self::new(stream, options))
    }
}

impl<S> Connection<S>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send,
{
    /// Wrap an established stream.
    pub fn new(stream: S, options: &ConnectionOptions) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::with_capacity(READ_BUFFER_SIZE, read_half),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half),
            read_timeout: options.read_timeout,
            write_timeout: options.write_timeout,
        }
    }

    /// Read a varint under the read deadline.
    pub async fn read_varint(&mut self) -> Result<u64> {
        timed(self.read_timeout, WireFormat::read_varint(&mut self.reader))
            .await
    }

    /// Write a varint under the write deadline.
    pub async fn write_varint(&mut self, value: u64) -> Result<()> {
        timed(
            self.write_timeout,
            WireFormat::write_varint(&mut self.writer, value),
        )
        .await
    }

    /// Read a length-prefixed string.
    pub async fn read_string(&mut self) -> Result<String> {
        timed(self.read_timeout, WireFormat::read_string(&mut self.reader))
            .await
    }

    /// Write a length-prefixed string.
    pub async fn write_string(&mut self, value: &str) -> Result<()> {
        timed(
            self.write_timeout,
            WireFormat::write_string(&mut self.writer, value),
        )
        .await
    }

    /// Read a fixed-width little-endian value.
    pub async fn read_fixed<T: FixedWire>(&mut self) -> Result<T> {
        timed(self.read_timeout, T::read_from(&mut self.reader)).await
    }

    /// Write a fixed-width little-endian value.
    pub async fn write_fixed<T: FixedWire>(&mut self, value: T) -> Result<()> {
        timed(self.write_timeout, value.write_to(&mut self.writer)).await
    }

    /// Read exactly `len` raw bytes.
    pub async fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        timed(
            self.read_timeout,
            WireFormat::read_bytes(&mut self.reader, len),
        )
        .await
    }

    /// Write raw bytes.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        timed(self.write_timeout, async {
            self.writer.write_all(bytes).await?;
            Ok(())
        })
        .await
    }

    /// Read one compression frame and return its decompressed payload.
    pub async fn read_frame(&mut self) -> Result<bytes::Bytes> {
        timed(self.read_timeout, compression::read_frame(&mut self.reader))
            .await
    }

    /// Flush buffered writes to the stream.
    pub async fn flush(&mut self) -> Result<()> {
        timed(self.write_timeout, async {
            self.writer.flush().await?;
            Ok(())
        })
        .await
    }
}
