//! `UUID` column.
//!
//! ClickHouse stores a UUID as two 64-bit halves, each written
//! little-endian: the high half (the first sixteen hex digits of the
//! canonical form) first, then the low half. This is not the RFC 4122 byte
//! order, so conversion goes through `u128` rather than the byte array.

use std::sync::Arc;

use ::uuid::Uuid;
use bytes::{Buf, BufMut, BytesMut};

use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::Result;

/// UUID column.
pub struct ColumnUuid {
    node: Arc<TypeNode>,
    data: Vec<Uuid>,
}

impl ColumnUuid {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn append(&mut self, value: Uuid) {
        self.data.push(value);
    }

    pub fn get(&self, index: usize) -> Option<Uuid> {
        self.data.get(index).copied()
    }

    pub fn at(&self, index: usize) -> Uuid {
        self.data[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uuid> {
        self.data.iter()
    }
}

impl Column for ColumnUuid {
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
        self.data.push(Uuid::nil());
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * 16, "UUID")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            let high = buffer.get_u64_le();
            let low = buffer.get_u64_le();
            let value = ((high as u128) << 64) | low as u128;
            self.data.push(Uuid::from_u128(value));
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            let bits = value.as_u128();
            buffer.put_u64_le((bits >> 64) as u64);
            buffer.put_u64_le(bits as u64);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnUuid::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
