//! Synchronous bridge over the async session.
//!
//! Every operation has one suspendable implementation; this wrapper drives
//! it to completion on a private current-thread runtime for callers that
//! are not inside an executor. Semantics and ordering are identical to the
//! async surface.

use tokio::runtime::{Builder, Runtime};

use crate::block::Block;
use crate::message::ServerInfo;
use crate::session::{Session, SessionOptions, SessionState};
use crate::Result;

/// A [`Session`] driven synchronously.
pub struct BlockingSession {
    runtime: Runtime,
    inner: Session<tokio::net::TcpStream>,
}

impl BlockingSession {
    /// Connect and handshake, blocking the calling thread.
    pub fn connect(options: SessionOptions) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let inner = runtime.block_on(Session::connect(options))?;
        Ok(Self { runtime, inner })
    }

    pub fn server_info(&self) -> &ServerInfo {
        self.inner.server_info()
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    pub fn ping(&mut self) -> Result<()> {
        self.runtime.block_on(self.inner.ping())
    }

    /// Execute a query and collect every result block.
    pub fn execute_collect(&mut self, query: &str) -> Result<Vec<Block>> {
        self.runtime
            .block_on(async { self.inner.execute(query).await?.collect().await })
    }

    /// Execute with rendered parameters and settings, collecting blocks.
    pub fn execute_with_collect(
        &mut self,
        query: &str,
        params: &[(String, String)],
        settings: &[(String, String)],
    ) -> Result<Vec<Block>> {
        self.runtime.block_on(async {
            self.inner
                .execute_with(query, params, settings)
                .await?
                .collect()
                .await
        })
    }

    pub fn insert_block(&mut self, table: &str, block: Block) -> Result<()> {
        self.runtime.block_on(self.inner.insert_block(table, block))
    }

    /// Dispose the session and its runtime.
    pub fn close(self) {
        self.inner.close();
    }
}
