//! `Nothing` column.
//!
//! The bottom type: it has no values, only a row count, and appears only as
//! the nested type of `Nullable` (a column of pure NULLs). The server
//! serialises one placeholder byte per row, which is consumed and ignored.

use std::sync::Arc;

use bytes::BytesMut;

use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::Result;

/// Placeholder column for `Nothing`.
pub struct ColumnNothing {
    node: Arc<TypeNode>,
    rows: usize,
}

impl ColumnNothing {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, rows: 0 }
    }
}

impl Column for ColumnNothing {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.rows
    }

    fn clear(&mut self) {
        self.rows = 0;
    }

    fn reserve(&mut self, _additional: usize) {}

    fn push_default(&mut self) {
        self.rows += 1;
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::skip(buffer, rows, "Nothing")?;
        self.rows += rows;
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.resize(buffer.len() + self.rows, 0);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnNothing::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
