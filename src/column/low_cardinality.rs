//! `LowCardinality(T)` column (dictionary encoding).
//!
//! Wire form:
//!
//! ```text
//! prefix:  key serialisation version (u64, always 1)
//! body:    flags | index width      (u64)
//!          dictionary size          (u64)
//!          dictionary column body   (for Nullable(T): only T's body)
//!          row count                (u64)
//!          indices                  (u8/u16/u32/u64 per row)
//! ```
//!
//! The index width is the low byte of the flags word; bit 9
//! (`HAS_ADDITIONAL_KEYS`) is set on every block this client writes, and
//! bit 8 (`NEED_GLOBAL_DICTIONARY`) is rejected. Writing picks the smallest
//! index width that can address the dictionary.
//!
//! For a `Nullable` dictionary, entry 0 is the NULL placeholder and the
//! NULL mask is not serialised; rows with index 0 are NULL.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::nullable::ColumnNullable;
use super::string::ColumnString;
use super::{for_type, skip_body, Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

const KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS: u64 = 1;
const INDEX_WIDTH_MASK: u64 = 0xFF;
const NEED_GLOBAL_DICTIONARY: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;

/// Dictionary-encoded column.
pub struct ColumnLowCardinality {
    node: Arc<TypeNode>,
    dictionary: Box<dyn Column>,
    indices: Vec<u64>,
    /// Dedup map for string dictionaries; rebuilt after loads.
    interned: HashMap<String, u64>,
    nullable: bool,
}

impl ColumnLowCardinality {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let inner = node.nested()?;
        let nullable = inner.name() == "Nullable";
        let mut dictionary = for_type(inner)?;
        if nullable {
            // Entry 0 is the NULL placeholder.
            dictionary.push_default();
        }
        Ok(Self {
            node,
            dictionary,
            indices: Vec::new(),
            interned: HashMap::new(),
            nullable,
        })
    }

    /// The dictionary of unique values.
    pub fn dictionary(&self) -> &dyn Column {
        self.dictionary.as_ref()
    }

    pub fn dictionary_len(&self) -> usize {
        self.dictionary.len()
    }

    /// The dictionary index of row `index`.
    pub fn index_at(&self, index: usize) -> Option<u64> {
        self.indices.get(index).copied()
    }

    /// Append a raw dictionary index. The caller maintains the dictionary.
    pub fn append_index(&mut self, index: u64) -> Result<()> {
        if index >= self.dictionary.len() as u64 {
            return Err(Error::Overflow(format!(
                "dictionary index {index} out of range (size {})",
                self.dictionary.len()
            )));
        }
        self.indices.push(index);
        Ok(())
    }

    /// Append a NULL row; only valid for a `Nullable` dictionary.
    pub fn append_null(&mut self) -> Result<()> {
        if !self.nullable {
            return Err(Error::TypeMismatch {
                expected: "LowCardinality(Nullable(..))".into(),
                actual: self.node.full_name().to_string(),
            });
        }
        self.indices.push(0);
        Ok(())
    }

    /// Append a string value with deduplication. The dictionary must be
    /// `String` or `Nullable(String)`.
    pub fn append_str(&mut self, value: &str) -> Result<()> {
        if let Some(&index) = self.interned.get(value) {
            self.indices.push(index);
            return Ok(());
        }
        let index = self.dictionary.len() as u64;
        self.push_dictionary_str(value)?;
        self.interned.insert(value.to_string(), index);
        self.indices.push(index);
        Ok(())
    }

    /// The string at row `index`: `None` past the end, `Some(None)` for
    /// NULL rows.
    pub fn get_str(&self, index: usize) -> Option<Option<&str>> {
        let dict_index = self.index_at(index)? as usize;
        if self.nullable {
            if dict_index == 0 {
                return Some(None);
            }
            let nullable = self
                .dictionary
                .as_any()
                .downcast_ref::<ColumnNullable>()?;
            let strings = nullable
                .nested()
                .as_any()
                .downcast_ref::<ColumnString>()?;
            return Some(strings.get(dict_index));
        }
        let strings =
            self.dictionary.as_any().downcast_ref::<ColumnString>()?;
        Some(strings.get(dict_index))
    }

    fn push_dictionary_str(&mut self, value: &str) -> Result<()> {
        if !self.has_string_dictionary() {
            return Err(Error::TypeMismatch {
                expected: "LowCardinality over String".into(),
                actual: self.node.full_name().to_string(),
            });
        }
        if self.nullable {
            let nullable = self
                .dictionary
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .expect("checked by has_string_dictionary");
            nullable.append_non_null();
            nullable
                .nested_mut()
                .as_any_mut()
                .downcast_mut::<ColumnString>()
                .expect("checked by has_string_dictionary")
                .append(value);
        } else {
            self.dictionary
                .as_any_mut()
                .downcast_mut::<ColumnString>()
                .expect("checked by has_string_dictionary")
                .append(value);
        }
        Ok(())
    }

    fn has_string_dictionary(&self) -> bool {
        if self.nullable {
            self.dictionary
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .is_some_and(|n| {
                    n.nested().as_any().downcast_ref::<ColumnString>().is_some()
                })
        } else {
            self.dictionary
                .as_any()
                .downcast_ref::<ColumnString>()
                .is_some()
        }
    }

    fn rebuild_interned(&mut self) {
        self.interned.clear();
        let strings = if self.nullable {
            self.dictionary
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .map(|n| n.nested())
                .and_then(|c| c.as_any().downcast_ref::<ColumnString>())
        } else {
            self.dictionary.as_any().downcast_ref::<ColumnString>()
        };
        if let Some(strings) = strings {
            let start = if self.nullable { 1 } else { 0 };
            for i in start..strings.len() {
                if let Some(s) = strings.get(i) {
                    self.interned.entry(s.to_string()).or_insert(i as u64);
                }
            }
        }
    }

    fn index_width(&self) -> (u64, usize) {
        match self.dictionary.len() as u64 {
            0..=0xFF => (0, 1),
            0x100..=0xFFFF => (1, 2),
            0x1_0000..=0xFFFF_FFFF => (2, 4),
            _ => (3, 8),
        }
    }
}

impl Column for ColumnLowCardinality {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.indices.len()
    }

    fn clear(&mut self) {
        self.indices.clear();
        self.interned.clear();
        self.dictionary.clear();
        if self.nullable {
            self.dictionary.push_default();
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.indices.reserve(additional);
    }

    fn push_default(&mut self) {
        if self.nullable {
            self.indices.push(0);
        } else {
            // Degenerate but well-formed: a one-entry default dictionary.
            if self.dictionary.is_empty() {
                self.dictionary.push_default();
            }
            self.indices.push(0);
        }
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        wire::ensure(buffer, 8, "LowCardinality key version")?;
        let version = buffer.get_u64_le();
        if version != KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS {
            return Err(Error::Protocol(format!(
                "unsupported LowCardinality key version {version}"
            )));
        }
        Ok(())
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, 16, "LowCardinality header")?;
        let flags = buffer.get_u64_le();
        if flags & NEED_GLOBAL_DICTIONARY != 0 {
            return Err(Error::Protocol(
                "global LowCardinality dictionaries are not supported"
                    .to_string(),
            ));
        }
        if flags & HAS_ADDITIONAL_KEYS == 0 {
            return Err(Error::Protocol(
                "LowCardinality block without additional keys".to_string(),
            ));
        }
        let width = match flags & INDEX_WIDTH_MASK {
            0 => 1usize,
            1 => 2,
            2 => 4,
            3 => 8,
            other => {
                return Err(Error::Protocol(format!(
                    "unknown LowCardinality index width {other}"
                )))
            }
        };

        let dict_len = buffer.get_u64_le() as usize;
        // A fresh dictionary replaces whatever the column held.
        self.dictionary.clear();
        if self.nullable {
            let nullable = self
                .dictionary
                .as_any_mut()
                .downcast_mut::<ColumnNullable>()
                .ok_or_else(|| {
                    Error::Internal(
                        "nullable LowCardinality without Nullable dictionary"
                            .to_string(),
                    )
                })?;
            // The NULL mask is not on the wire; entry 0 is NULL by
            // convention and everything is loaded as the nested body.
            nullable.load_nested_only(buffer, dict_len)?;
        } else {
            self.dictionary.load_body(buffer, dict_len)?;
        }

        wire::ensure(buffer, 8, "LowCardinality row count")?;
        let stored_rows = buffer.get_u64_le() as usize;
        if stored_rows != rows {
            return Err(Error::Protocol(format!(
                "LowCardinality row count mismatch: header says \
                 {stored_rows}, block says {rows}"
            )));
        }

        wire::ensure(buffer, rows * width, "LowCardinality indices")?;
        self.indices.clear();
        self.indices.reserve(rows);
        for _ in 0..rows {
            let index = match width {
                1 => buffer.get_u8() as u64,
                2 => buffer.get_u16_le() as u64,
                4 => buffer.get_u32_le() as u64,
                _ => buffer.get_u64_le(),
            };
            if index >= dict_len as u64 {
                return Err(Error::Protocol(format!(
                    "LowCardinality index {index} out of range ({dict_len})"
                )));
            }
            self.indices.push(index);
        }

        self.rebuild_interned();
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.put_u64_le(KEY_VERSION_SHARED_WITH_ADDITIONAL_KEYS);
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        let (width_tag, width) = self.index_width();
        buffer.put_u64_le(width_tag | HAS_ADDITIONAL_KEYS);
        buffer.put_u64_le(self.dictionary.len() as u64);

        if self.nullable {
            let nullable = self
                .dictionary
                .as_any()
                .downcast_ref::<ColumnNullable>()
                .ok_or_else(|| {
                    Error::Internal(
                        "nullable LowCardinality without Nullable dictionary"
                            .to_string(),
                    )
                })?;
            nullable.save_nested_only(buffer)?;
        } else {
            self.dictionary.save_body(buffer)?;
        }

        buffer.put_u64_le(self.indices.len() as u64);
        for &index in &self.indices {
            match width {
                1 => buffer.put_u8(index as u8),
                2 => buffer.put_u16_le(index as u16),
                4 => buffer.put_u32_le(index as u32),
                _ => buffer.put_u64_le(index),
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnLowCardinality::new(self.node.clone())
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

/// Skip a LowCardinality body without materialising the dictionary.
pub(super) fn skip_low_cardinality_body(
    node: &TypeNode,
    buffer: &mut &[u8],
    rows: usize,
) -> Result<()> {
    wire::ensure(buffer, 16, "LowCardinality header")?;
    let flags = buffer.get_u64_le();
    let width = match flags & INDEX_WIDTH_MASK {
        0 => 1usize,
        1 => 2,
        2 => 4,
        3 => 8,
        other => {
            return Err(Error::Protocol(format!(
                "unknown LowCardinality index width {other}"
            )))
        }
    };
    let dict_len = buffer.get_u64_le() as usize;

    // Nullable dictionaries serialise only the nested body.
    let inner = node.nested()?;
    let dict_type =
        if inner.name() == "Nullable" { inner.nested()? } else { inner };
    skip_body(dict_type, buffer, dict_len)?;

    wire::ensure(buffer, 8, "LowCardinality row count")?;
    buffer.advance(8);
    wire::skip(buffer, rows * width, "LowCardinality indices")
}
