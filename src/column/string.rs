//! `String` and `FixedString(N)` columns.
//!
//! `String` is varint-length-prefixed bytes per row. `FixedString(N)` packs
//! exactly `N` bytes per row: shorter values are NUL-padded, longer values
//! are rejected with an overflow error.

use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Variable-length string column.
pub struct ColumnString {
    node: Arc<TypeNode>,
    data: Vec<String>,
}

impl ColumnString {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn from_values<S: Into<String>>(
        node: Arc<TypeNode>,
        values: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            node,
            data: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn append(&mut self, value: impl Into<String>) {
        self.data.push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.data.get(index).map(String::as_str)
    }

    pub fn at(&self, index: usize) -> &str {
        &self.data[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(String::as_str)
    }
}

impl Column for ColumnString {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn push_default(&mut self) {
        self.data.push(String::new());
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(wire::get_string(buffer)?);
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            wire::put_string(buffer, value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnString::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Fixed-length binary string column.
pub struct ColumnFixedString {
    node: Arc<TypeNode>,
    width: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let width = node.fixed_string_len()?;
        Ok(Self { node, width, data: Vec::new() })
    }

    /// The fixed width `N` in bytes.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Append raw bytes, NUL-padding short input. Longer input overflows.
    pub fn append_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.width {
            return Err(Error::Overflow(format!(
                "value of {} bytes does not fit FixedString({})",
                bytes.len(),
                self.width
            )));
        }
        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() + (self.width - bytes.len()), 0);
        Ok(())
    }

    /// Append a UTF-8 value.
    pub fn append(&mut self, value: &str) -> Result<()> {
        self.append_bytes(value.as_bytes())
    }

    /// Raw bytes of the row at `index`, including any NUL padding.
    pub fn get_bytes(&self, index: usize) -> Option<&[u8]> {
        if index >= self.len() {
            return None;
        }
        Some(&self.data[index * self.width..(index + 1) * self.width])
    }

    /// The row at `index` as a string with trailing NUL padding removed.
    pub fn get(&self, index: usize) -> Option<&str> {
        let bytes = self.get_bytes(index)?;
        let end = bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |p| p + 1);
        std::str::from_utf8(&bytes[..end]).ok()
    }
}

impl Column for ColumnFixedString {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.data.len() / self.width
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional * self.width);
    }

    fn push_default(&mut self) {
        self.data.resize(self.data.len() + self.width, 0);
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        let bytes = rows * self.width;
        wire::ensure(buffer, bytes, "FixedString")?;
        self.data.extend_from_slice(&buffer[..bytes]);
        use bytes::Buf;
        buffer.advance(bytes);
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_slice(&self.data);
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(Self {
            node: self.node.clone(),
            width: self.width,
            data: Vec::new(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
