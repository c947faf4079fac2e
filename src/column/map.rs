//! `Map(K, V)` column.
//!
//! Serialised exactly like `Array(Tuple(K, V))`: cumulative u64 offsets,
//! then the flattened key column, then the flattened value column.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::{for_type, Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Map column: offsets plus flattened key and value columns.
pub struct ColumnMap {
    node: Arc<TypeNode>,
    offsets: Vec<u64>,
    keys: Box<dyn Column>,
    values: Box<dyn Column>,
}

impl ColumnMap {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let generics = node.generics();
        if generics.len() != 2 {
            return Err(Error::TypeNotFullySpecified(format!(
                "{} requires key and value types",
                node.full_name()
            )));
        }
        Ok(Self {
            node: node.clone(),
            offsets: Vec::new(),
            keys: for_type(&generics[0])?,
            values: for_type(&generics[1])?,
        })
    }

    /// Close the current row after `count` entries were pushed into the key
    /// and value columns.
    pub fn push_len(&mut self, count: usize) -> Result<()> {
        let last = self.offsets.last().copied().unwrap_or(0);
        let next = last + count as u64;
        if next != self.keys.len() as u64 || next != self.values.len() as u64
        {
            return Err(Error::Internal(format!(
                "map row of {count} entries closed at keys {} / values {}",
                self.keys.len(),
                self.values.len()
            )));
        }
        self.offsets.push(next);
        Ok(())
    }

    /// Entry index range `[start, end)` of row `index`.
    pub fn row_range(&self, index: usize) -> Option<(usize, usize)> {
        let end = *self.offsets.get(index)? as usize;
        let start = if index == 0 {
            0
        } else {
            self.offsets[index - 1] as usize
        };
        Some((start, end))
    }

    pub fn keys(&self) -> &dyn Column {
        self.keys.as_ref()
    }

    pub fn keys_mut(&mut self) -> &mut dyn Column {
        self.keys.as_mut()
    }

    pub fn values(&self) -> &dyn Column {
        self.values.as_ref()
    }

    pub fn values_mut(&mut self) -> &mut dyn Column {
        self.values.as_mut()
    }
}

impl Column for ColumnMap {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.keys.clear();
        self.values.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn push_default(&mut self) {
        let last = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(last);
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        self.keys.load_prefix(buffer)?;
        self.values.load_prefix(buffer)
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * 8, "map offsets")?;
        let base = self.keys.len() as u64;
        let mut last = base;
        for _ in 0..rows {
            let offset = base + buffer.get_u64_le();
            if offset < last {
                return Err(Error::Protocol(
                    "map offsets are not monotonic".to_string(),
                ));
            }
            last = offset;
            self.offsets.push(offset);
        }
        let total = (last - base) as usize;
        self.keys.load_body(buffer, total)?;
        self.values.load_body(buffer, total)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.keys.save_prefix(buffer)?;
        self.values.save_prefix(buffer)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.keys.save_body(buffer)?;
        self.values.save_body(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnMap::new(self.node.clone())
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
