//! Column codecs.
//!
//! One module per wire family, all implementing [`Column`]: a materialised,
//! strongly typed sequence of `row_count` values that knows how to load and
//! save itself against a block payload. The registry is
//! [`for_type`], which maps a parsed [`TypeNode`] to a fresh column; the
//! skipping reader is [`skip_body`], which consumes a column's bytes without
//! materialising values (used for columns the caller does not want).
//!
//! Wire layout conventions (little-endian throughout):
//!
//! | family | body |
//! |---|---|
//! | fixed-width | packed values, `rows * size` bytes |
//! | `String` | per row: varint length + bytes |
//! | `FixedString(N)` | `rows * N` bytes, NUL-padded |
//! | `Nullable(T)` | `rows` mask bytes (1 = NULL), then `T`'s body |
//! | `Array(T)` | `rows` cumulative u64 offsets, then the flattened body |
//! | `Map(K, V)` | offsets, then keys body, then values body |
//! | `Tuple(...)` | element bodies concatenated |
//! | `LowCardinality(T)` | see `low_cardinality` |
//! | `Nothing` | one placeholder byte per row |
//!
//! `LowCardinality` additionally writes a prefix (its key-serialisation
//! version) before any block body bytes; prefixes of nested types propagate
//! through wrappers, which is what `load_prefix`/`save_prefix` carry.

pub mod array;
pub mod date;
pub mod decimal;
pub mod enumeration;
pub mod ip;
pub mod low_cardinality;
pub mod map;
pub mod nothing;
pub mod nullable;
pub mod numeric;
pub mod string;
pub mod tuple;
pub mod uuid;

pub use array::ColumnArray;
pub use date::{ColumnDate, ColumnDate32, ColumnDateTime, ColumnDateTime64};
pub use decimal::{ColumnDecimal, ColumnDecimal256};
pub use enumeration::{ColumnEnum16, ColumnEnum8};
pub use ip::{ColumnIpv4, ColumnIpv6};
pub use low_cardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nothing::ColumnNothing;
pub use nullable::ColumnNullable;
pub use numeric::{
    ColumnFloat32, ColumnFloat64, ColumnInt128, ColumnInt16, ColumnInt256,
    ColumnInt32, ColumnInt64, ColumnInt8, ColumnUInt128, ColumnUInt16,
    ColumnUInt256, ColumnUInt32, ColumnUInt64, ColumnUInt8, ColumnVector,
    Int256, UInt256,
};
pub use string::{ColumnFixedString, ColumnString};
pub use tuple::ColumnTuple;
pub use uuid::ColumnUuid;

use std::sync::Arc;

use bytes::BytesMut;

use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Shared handle to a materialised column.
pub type ColumnRef = Arc<dyn Column>;

/// A materialised, wire-codable column.
pub trait Column: Send + Sync {
    /// The parsed type this column codes for.
    fn type_node(&self) -> &Arc<TypeNode>;

    /// Number of rows currently held.
    fn len(&self) -> usize;

    /// True when the column holds no rows.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all rows.
    fn clear(&mut self);

    /// Reserve room for `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Append this column's zero value (NULL slot filler for `Nullable`).
    fn push_default(&mut self);

    /// Read per-column prefix data written before any block body.
    fn load_prefix(&mut self, _buffer: &mut &[u8]) -> Result<()> {
        Ok(())
    }

    /// Read `rows` values from a block payload.
    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()>;

    /// Write per-column prefix data.
    fn save_prefix(&self, _buffer: &mut BytesMut) -> Result<()> {
        Ok(())
    }

    /// Write all values to a block payload.
    fn save_body(&self, buffer: &mut BytesMut) -> Result<()>;

    /// A fresh column of the same type with no rows.
    fn clone_empty(&self) -> ColumnRef;

    /// Downcast support.
    fn as_any(&self) -> &dyn std::any::Any;

    /// Mutable downcast support.
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// The codec registry: create an empty column for a parsed type.
pub fn for_type(node: &Arc<TypeNode>) -> Result<Box<dyn Column>> {
    Ok(match node.name() {
        "Int8" => Box::new(ColumnInt8::new(node.clone())),
        "Int16" => Box::new(ColumnInt16::new(node.clone())),
        "Int32" => Box::new(ColumnInt32::new(node.clone())),
        "Int64" => Box::new(ColumnInt64::new(node.clone())),
        "Int128" => Box::new(ColumnInt128::new(node.clone())),
        "Int256" => Box::new(ColumnInt256::new(node.clone())),
        "UInt8" | "Bool" => Box::new(ColumnUInt8::new(node.clone())),
        "UInt16" => Box::new(ColumnUInt16::new(node.clone())),
        "UInt32" => Box::new(ColumnUInt32::new(node.clone())),
        "UInt64" => Box::new(ColumnUInt64::new(node.clone())),
        "UInt128" => Box::new(ColumnUInt128::new(node.clone())),
        "UInt256" => Box::new(ColumnUInt256::new(node.clone())),
        "Float32" => Box::new(ColumnFloat32::new(node.clone())),
        "Float64" => Box::new(ColumnFloat64::new(node.clone())),
        "String" => Box::new(ColumnString::new(node.clone())),
        "FixedString" => Box::new(ColumnFixedString::new(node.clone())?),
        "Date" => Box::new(ColumnDate::new(node.clone())),
        "Date32" => Box::new(ColumnDate32::new(node.clone())),
        "DateTime" => Box::new(ColumnDateTime::new(node.clone())),
        "DateTime64" => Box::new(ColumnDateTime64::new(node.clone())?),
        "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" => {
            let (precision, _) = node.decimal_precision_scale()?;
            if precision > 38 {
                Box::new(ColumnDecimal256::new(node.clone())?)
            } else {
                Box::new(ColumnDecimal::new(node.clone())?)
            }
        }
        "Decimal256" => Box::new(ColumnDecimal256::new(node.clone())?),
        "Enum8" => Box::new(ColumnEnum8::new(node.clone())?),
        "Enum16" => Box::new(ColumnEnum16::new(node.clone())?),
        "UUID" => Box::new(ColumnUuid::new(node.clone())),
        "IPv4" => Box::new(ColumnIpv4::new(node.clone())),
        "IPv6" => Box::new(ColumnIpv6::new(node.clone())),
        "Nothing" => Box::new(ColumnNothing::new(node.clone())),
        "Nullable" => Box::new(ColumnNullable::new(node.clone())?),
        "Array" => Box::new(ColumnArray::new(node.clone())?),
        "Tuple" => Box::new(ColumnTuple::new(node.clone())?),
        "Map" => Box::new(ColumnMap::new(node.clone())?),
        "LowCardinality" => {
            Box::new(ColumnLowCardinality::new(node.clone())?)
        }
        other => {
            return Err(Error::TypeNotSupported(other.to_string()));
        }
    })
}

/// Wire width of one value, for types whose body is a packed array.
/// `None` for variable-width and compound types.
pub fn fixed_width(node: &TypeNode) -> Option<usize> {
    match node.name() {
        "Int8" | "UInt8" | "Bool" | "Enum8" | "Nothing" => Some(1),
        "Int16" | "UInt16" | "Date" | "Enum16" => Some(2),
        "Int32" | "UInt32" | "Float32" | "Date32" | "DateTime" | "IPv4" => {
            Some(4)
        }
        "Int64" | "UInt64" | "Float64" | "DateTime64" => Some(8),
        "Int128" | "UInt128" | "UUID" | "IPv6" => Some(16),
        "Int256" | "UInt256" | "Decimal256" => Some(32),
        "FixedString" => node.fixed_string_len().ok(),
        "Decimal" | "Decimal32" | "Decimal64" | "Decimal128" => {
            let (precision, _) = node.decimal_precision_scale().ok()?;
            Some(decimal::storage_width(precision))
        }
        _ => None,
    }
}

/// Consume a column's prefix bytes without materialising anything.
pub fn skip_prefix(node: &TypeNode, buffer: &mut &[u8]) -> Result<()> {
    match node.name() {
        "LowCardinality" => {
            wire::skip(buffer, 8, "LowCardinality key version")
        }
        "Nullable" | "Array" => skip_prefix(node.nested()?, buffer),
        "Map" => {
            for inner in node.generics() {
                skip_prefix(inner, buffer)?;
            }
            Ok(())
        }
        "Tuple" => {
            for (_, inner) in node.tuple_items() {
                skip_prefix(inner, buffer)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Consume `rows` values of a column body without materialising them.
pub fn skip_body(
    node: &TypeNode,
    buffer: &mut &[u8],
    rows: usize,
) -> Result<()> {
    if let Some(width) = fixed_width(node) {
        return wire::skip(buffer, rows * width, node.name());
    }
    match node.name() {
        "String" => {
            for _ in 0..rows {
                let len = wire::get_varint(buffer)? as usize;
                wire::skip(buffer, len, "String value")?;
            }
            Ok(())
        }
        "Nullable" => {
            wire::skip(buffer, rows, "null mask")?;
            skip_body(node.nested()?, buffer, rows)
        }
        "Array" => {
            let total = skip_offsets(buffer, rows)?;
            skip_body(node.nested()?, buffer, total)
        }
        "Map" => {
            let total = skip_offsets(buffer, rows)?;
            skip_body(&node.generics()[0], buffer, total)?;
            skip_body(&node.generics()[1], buffer, total)
        }
        "Tuple" => {
            for (_, inner) in node.tuple_items() {
                skip_body(inner, buffer, rows)?;
            }
            Ok(())
        }
        "LowCardinality" => {
            low_cardinality::skip_low_cardinality_body(node, buffer, rows)
        }
        other => Err(Error::TypeNotSupported(other.to_string())),
    }
}

fn skip_offsets(buffer: &mut &[u8], rows: usize) -> Result<usize> {
    use bytes::Buf;
    wire::ensure(buffer, rows * 8, "offsets")?;
    let mut last = 0u64;
    for _ in 0..rows {
        last = buffer.get_u64_le();
    }
    Ok(last as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Arc<TypeNode> {
        TypeNode::parse(s).unwrap()
    }

    #[test]
    fn registry_covers_the_catalogue() {
        for name in [
            "Int8",
            "UInt64",
            "Int256",
            "Float64",
            "Bool",
            "String",
            "FixedString(42)",
            "Date",
            "Date32",
            "DateTime",
            "DateTime64(3, 'UTC')",
            "Decimal(35, 10)",
            "Decimal32(5)",
            "Decimal256(10)",
            "Enum8('a' = 1)",
            "UUID",
            "IPv4",
            "IPv6",
            "Nullable(Nothing)",
            "LowCardinality(String)",
            "Array(Array(Nothing))",
            "Tuple(a UInt32, b String)",
            "Map(String, UInt64)",
        ] {
            let node = parse(name);
            let column = for_type(&node).unwrap();
            assert_eq!(column.len(), 0, "{name}");
            assert_eq!(column.type_node().full_name(), node.full_name());
            let empty = column.clone_empty();
            assert_eq!(empty.len(), 0);
        }
    }

    #[test]
    fn unknown_type_not_supported() {
        let node = parse("Widget");
        assert!(matches!(
            for_type(&node),
            Err(Error::TypeNotSupported(_))
        ));
    }

    #[test]
    fn skip_matches_load_consumption() {
        use bytes::BufMut;

        // Two Array(Nullable(Int32)) rows: [1, NULL], [3].
        let node = parse("Array(Nullable(Int32))");
        let mut payload = BytesMut::new();
        payload.put_u64_le(2);
        payload.put_u64_le(3);
        payload.put_slice(&[0, 1, 0]); // null mask
        payload.put_i32_le(1);
        payload.put_i32_le(0);
        payload.put_i32_le(3);
        payload.put_slice(b"trailing");

        let mut slice = &payload[..];
        skip_body(&node, &mut slice, 2).unwrap();
        assert_eq!(slice, b"trailing");

        let mut column = for_type(&node).unwrap();
        let mut slice = &payload[..];
        column.load_body(&mut slice, 2).unwrap();
        assert_eq!(slice, b"trailing");
        assert_eq!(column.len(), 2);
    }

    #[test]
    fn skipping_reader_handles_prefixed_columns() {
        use bytes::BytesMut;

        let node = parse("LowCardinality(String)");
        let mut column = for_type(&node).unwrap();
        {
            let lc = column
                .as_any_mut()
                .downcast_mut::<ColumnLowCardinality>()
                .unwrap();
            for value in ["a", "b", "a"] {
                lc.append_str(value).unwrap();
            }
        }

        let mut payload = BytesMut::new();
        column.save_prefix(&mut payload).unwrap();
        column.save_body(&mut payload).unwrap();
        payload.extend_from_slice(b"rest");

        let mut slice = &payload[..];
        skip_prefix(&node, &mut slice).unwrap();
        skip_body(&node, &mut slice, 3).unwrap();
        assert_eq!(slice, b"rest");
    }

    #[test]
    fn skip_fixed_width_fast_path() {
        let node = parse("Decimal(19, 6)");
        assert_eq!(fixed_width(&node), Some(8));

        let data = vec![0u8; 8 * 5 + 3];
        let mut slice = &data[..];
        skip_body(&node, &mut slice, 5).unwrap();
        assert_eq!(slice.len(), 3);
    }
}
