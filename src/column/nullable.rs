//! `Nullable(T)` column.
//!
//! The wire form is a sub-column of NULL flags (one byte per row, 1 = NULL)
//! followed by the nested column's body. The nested column always holds a
//! value slot for NULL rows too; NULL appends fill it with the nested
//! type's default so the two stay row-aligned.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::{for_type, Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Nullable wrapper column.
pub struct ColumnNullable {
    node: Arc<TypeNode>,
    nulls: Vec<u8>,
    nested: Box<dyn Column>,
}

impl ColumnNullable {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let inner = node.nested()?;
        if inner.name() == "Nullable" || inner.name() == "LowCardinality" {
            return Err(Error::TypeNotSupported(format!(
                "{} cannot be nested inside Nullable",
                inner.name()
            )));
        }
        let nested = for_type(inner)?;
        Ok(Self { node, nulls: Vec::new(), nested })
    }

    /// Append a NULL row.
    pub fn append_null(&mut self) {
        self.nulls.push(1);
        self.nested.push_default();
    }

    /// Mark the next row non-NULL; the caller pushes the value into
    /// [`nested_mut`](Self::nested_mut).
    pub fn append_non_null(&mut self) {
        self.nulls.push(0);
    }

    /// Whether the row at `index` is NULL.
    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.get(index).copied().unwrap_or(0) != 0
    }

    /// The NULL mask, 1 byte per row.
    pub fn null_mask(&self) -> &[u8] {
        &self.nulls
    }

    /// The nested values column (NULL rows hold defaults).
    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }

    /// Mutable access to the nested column, for appending values.
    pub fn nested_mut(&mut self) -> &mut dyn Column {
        self.nested.as_mut()
    }

    pub(crate) fn load_nested_only(
        &mut self,
        buffer: &mut &[u8],
        rows: usize,
    ) -> Result<()> {
        self.nested.load_body(buffer, rows)?;
        self.nulls.resize(self.nulls.len() + rows, 0);
        Ok(())
    }

    pub(crate) fn save_nested_only(
        &self,
        buffer: &mut BytesMut,
    ) -> Result<()> {
        self.nested.save_body(buffer)
    }
}

impl Column for ColumnNullable {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.nulls.len()
    }

    fn clear(&mut self) {
        self.nulls.clear();
        self.nested.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.nulls.reserve(additional);
        self.nested.reserve(additional);
    }

    fn push_default(&mut self) {
        self.append_null();
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        self.nested.load_prefix(buffer)
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows, "null mask")?;
        self.nulls.extend_from_slice(&buffer[..rows]);
        use bytes::Buf;
        buffer.advance(rows);
        self.nested.load_body(buffer, rows)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.nulls);
        self.nested.save_body(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnNullable::new(self.node.clone())
                .expect("type validated at construction"),
        )
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
