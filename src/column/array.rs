//! `Array(T)` column.
//!
//! The wire form is `rows` cumulative u64 offsets (offset `i` is the total
//! element count through row `i`) followed by the flattened nested column
//! with `last_offset` values. Nested arrays recurse naturally.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::{for_type, Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Array column: offsets plus a flattened element column.
pub struct ColumnArray {
    node: Arc<TypeNode>,
    offsets: Vec<u64>,
    nested: Box<dyn Column>,
}

impl ColumnArray {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let nested = for_type(node.nested()?)?;
        Ok(Self { node, offsets: Vec::new(), nested })
    }

    /// Close the current row after `count` elements were pushed into
    /// [`nested_mut`](Self::nested_mut).
    pub fn push_len(&mut self, count: usize) -> Result<()> {
        let last = self.offsets.last().copied().unwrap_or(0);
        let next = last + count as u64;
        if next != self.nested.len() as u64 {
            return Err(Error::Internal(format!(
                "array row of {count} elements closed at nested length {}, \
                 expected {next}",
                self.nested.len()
            )));
        }
        self.offsets.push(next);
        Ok(())
    }

    /// Element index range `[start, end)` of row `index`.
    pub fn row_range(&self, index: usize) -> Option<(usize, usize)> {
        let end = *self.offsets.get(index)? as usize;
        let start = if index == 0 {
            0
        } else {
            self.offsets[index - 1] as usize
        };
        Some((start, end))
    }

    /// Element count of row `index`.
    pub fn row_len(&self, index: usize) -> Option<usize> {
        self.row_range(index).map(|(s, e)| e - s)
    }

    /// The flattened element column.
    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }

    /// Mutable access to the flattened element column.
    pub fn nested_mut(&mut self) -> &mut dyn Column {
        self.nested.as_mut()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}

impl Column for ColumnArray {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.nested.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn push_default(&mut self) {
        // An empty array.
        let last = self.offsets.last().copied().unwrap_or(0);
        self.offsets.push(last);
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        self.nested.load_prefix(buffer)
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * 8, "array offsets")?;
        let base = self.nested.len() as u64;
        self.offsets.reserve(rows);
        let mut last = base;
        for _ in 0..rows {
            let offset = base + buffer.get_u64_le();
            if offset < last {
                return Err(Error::Protocol(
                    "array offsets are not monotonic".to_string(),
                ));
            }
            last = offset;
            self.offsets.push(offset);
        }
        let total = (last - base) as usize;
        self.nested.load_body(buffer, total)
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        self.nested.save_prefix(buffer)
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &offset in &self.offsets {
            buffer.put_u64_le(offset);
        }
        self.nested.save_body(buffer)
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnArray::new(self.node.clone())
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::numeric::ColumnInt32;
    use crate::column::nullable::ColumnNullable;

    fn node(name: &str) -> Arc<TypeNode> {
        TypeNode::parse(name).unwrap()
    }

    fn push_ints(array: &mut ColumnArray, values: &[i32]) {
        let ints = array
            .nested_mut()
            .as_any_mut()
            .downcast_mut::<ColumnInt32>()
            .unwrap();
        for &v in values {
            ints.append(v);
        }
        array.push_len(values.len()).unwrap();
    }

    #[test]
    fn offsets_are_cumulative() {
        let mut col = ColumnArray::new(node("Array(Int32)")).unwrap();
        push_ints(&mut col, &[1, 2, 3]);
        push_ints(&mut col, &[]);
        push_ints(&mut col, &[4]);
        assert_eq!(col.offsets(), &[3, 3, 4]);
        assert_eq!(col.row_range(0), Some((0, 3)));
        assert_eq!(col.row_len(1), Some(0));
        assert_eq!(col.row_range(2), Some((3, 4)));
    }

    #[test]
    fn round_trip() {
        let mut col = ColumnArray::new(node("Array(Int32)")).unwrap();
        push_ints(&mut col, &[10, 20]);
        push_ints(&mut col, &[30]);

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored = ColumnArray::new(node("Array(Int32)")).unwrap();
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert!(slice.is_empty());
        assert_eq!(restored.offsets(), &[2, 3]);
        let ints = restored
            .nested()
            .as_any()
            .downcast_ref::<ColumnInt32>()
            .unwrap();
        assert_eq!(ints.values(), &[10, 20, 30]);
    }

    #[test]
    fn nested_nullable_round_trip() {
        // Array(Nullable(Int32)): [1, NULL], [].
        let mut col =
            ColumnArray::new(node("Array(Nullable(Int32))")).unwrap();
        {
            let nullable = col
                .nested_mut()
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .unwrap();
            nullable.append_non_null();
            nullable
                .nested_mut()
                .as_any_mut()
                .downcast_mut::<ColumnInt32>()
                .unwrap()
                .append(1);
            nullable.append_null();
        }
        col.push_len(2).unwrap();
        col.push_len(0).unwrap();

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored =
            ColumnArray::new(node("Array(Nullable(Int32))")).unwrap();
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert_eq!(restored.len(), 2);
        let nullable = restored
            .nested()
            .as_any()
            .downcast_ref::<ColumnNullable>()
            .unwrap();
        assert!(!nullable.is_null(0));
        assert!(nullable.is_null(1));
    }

    #[test]
    fn misaligned_row_close_is_internal_error() {
        let mut col = ColumnArray::new(node("Array(Int32)")).unwrap();
        col.nested_mut()
            .as_any_mut()
            .downcast_mut::<ColumnInt32>()
            .unwrap()
            .append(1);
        assert!(matches!(col.push_len(2), Err(Error::Internal(_))));
    }

    #[test]
    fn non_monotonic_offsets_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u64_le(3);
        buf.put_u64_le(1);
        let mut col = ColumnArray::new(node("Array(Int32)")).unwrap();
        let mut slice = &buf[..];
        assert!(col.load_body(&mut slice, 2).is_err());
    }
}
