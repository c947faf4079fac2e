//! Numeric columns.
//!
//! All integer and float types share one generic column over a
//! [`FixedValue`] element: a plain little-endian value of a known width.
//! `Bool` rides on `u8` storage; `Date`/`DateTime` and the decimal family
//! have their own modules because they add range checks and conversions on
//! top of the same packed layout.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::Result;

/// A fixed-width little-endian wire value.
pub trait FixedValue:
    Sized + Copy + Default + Send + Sync + 'static
{
    /// Wire width in bytes.
    const WIDTH: usize;

    /// Decode one value; the caller has checked availability.
    fn get(buffer: &mut &[u8]) -> Self;
    /// Encode one value.
    fn put(&self, buffer: &mut BytesMut);
}

macro_rules! impl_fixed_value {
    ($type:ty, $width:expr, $get:ident, $put:ident) => {
        impl FixedValue for $type {
            const WIDTH: usize = $width;

            fn get(buffer: &mut &[u8]) -> Self {
                buffer.$get()
            }

            fn put(&self, buffer: &mut BytesMut) {
                buffer.$put(*self);
            }
        }
    };
}

impl_fixed_value!(u8, 1, get_u8, put_u8);
impl_fixed_value!(u16, 2, get_u16_le, put_u16_le);
impl_fixed_value!(u32, 4, get_u32_le, put_u32_le);
impl_fixed_value!(u64, 8, get_u64_le, put_u64_le);
impl_fixed_value!(u128, 16, get_u128_le, put_u128_le);
impl_fixed_value!(i8, 1, get_i8, put_i8);
impl_fixed_value!(i16, 2, get_i16_le, put_i16_le);
impl_fixed_value!(i32, 4, get_i32_le, put_i32_le);
impl_fixed_value!(i64, 8, get_i64_le, put_i64_le);
impl_fixed_value!(i128, 16, get_i128_le, put_i128_le);
impl_fixed_value!(f32, 4, get_f32_le, put_f32_le);
impl_fixed_value!(f64, 8, get_f64_le, put_f64_le);

/// A signed 256-bit integer as 32 little-endian bytes. Storage-only: the
/// driver moves these values, it does not do arithmetic on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Int256(pub [u8; 32]);

/// An unsigned 256-bit integer as 32 little-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UInt256(pub [u8; 32]);

impl From<i128> for Int256 {
    fn from(value: i128) -> Self {
        let mut bytes = if value < 0 { [0xFFu8; 32] } else { [0u8; 32] };
        bytes[..16].copy_from_slice(&value.to_le_bytes());
        Int256(bytes)
    }
}

impl From<u128> for UInt256 {
    fn from(value: u128) -> Self {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&value.to_le_bytes());
        UInt256(bytes)
    }
}

macro_rules! impl_fixed_value_256 {
    ($type:ident) => {
        impl FixedValue for $type {
            const WIDTH: usize = 32;

            fn get(buffer: &mut &[u8]) -> Self {
                let mut bytes = [0u8; 32];
                buffer.copy_to_slice(&mut bytes);
                $type(bytes)
            }

            fn put(&self, buffer: &mut BytesMut) {
                buffer.put_slice(&self.0);
            }
        }
    };
}

impl_fixed_value_256!(Int256);
impl_fixed_value_256!(UInt256);

/// Generic packed column over a fixed-width element.
pub struct ColumnVector<T: FixedValue> {
    node: Arc<TypeNode>,
    data: Vec<T>,
}

impl<T: FixedValue> ColumnVector<T> {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn from_values(
        node: Arc<TypeNode>,
        data: impl Into<Vec<T>>,
    ) -> Self {
        Self { node, data: data.into() }
    }

    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = T>) {
        self.data.extend(values);
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    /// Value at `index`; panics out of bounds.
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    pub fn values(&self) -> &[T] {
        &self.data
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }
}

impl<T: FixedValue> Column for ColumnVector<T> {
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
        self.data.push(T::default());
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * T::WIDTH, self.node.name())?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(T::get(buffer));
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        buffer.reserve(self.data.len() * T::WIDTH);
        for value in &self.data {
            value.put(buffer);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnVector::<T>::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `UInt8` column (also backs `Bool`).
pub type ColumnUInt8 = ColumnVector<u8>;
/// `UInt16` column.
pub type ColumnUInt16 = ColumnVector<u16>;
/// `UInt32` column.
pub type ColumnUInt32 = ColumnVector<u32>;
/// `UInt64` column.
pub type ColumnUInt64 = ColumnVector<u64>;
/// `UInt128` column.
pub type ColumnUInt128 = ColumnVector<u128>;
/// `UInt256` column.
pub type ColumnUInt256 = ColumnVector<UInt256>;

/// `Int8` column.
pub type ColumnInt8 = ColumnVector<i8>;
/// `Int16` column.
pub type ColumnInt16 = ColumnVector<i16>;
/// `Int32` column.
pub type ColumnInt32 = ColumnVector<i32>;
/// `Int64` column.
pub type ColumnInt64 = ColumnVector<i64>;
/// `Int128` column.
pub type ColumnInt128 = ColumnVector<i128>;
/// `Int256` column.
pub type ColumnInt256 = ColumnVector<Int256>;

/// `Float32` column.
pub type ColumnFloat32 = ColumnVector<f32>;
/// `Float64` column.
pub type ColumnFloat64 = ColumnVector<f64>;

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Arc<TypeNode> {
        TypeNode::parse(name).unwrap()
    }

    #[test]
    fn append_and_get() {
        let mut col = ColumnUInt32::new(node("UInt32"));
        col.append(42);
        col.append(100);
        assert_eq!(col.len(), 2);
        assert_eq!(col.get(0), Some(42));
        assert_eq!(col.get(2), None);
    }

    #[test]
    fn save_load_round_trip() {
        let mut col = ColumnInt32::new(node("Int32"));
        for v in [i32::MIN, -1, 0, 1, i32::MAX] {
            col.append(v);
        }

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 5 * 4);

        let mut restored = ColumnInt32::new(node("Int32"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 5).unwrap();
        assert!(slice.is_empty());
        assert_eq!(restored.values(), col.values());
    }

    #[test]
    fn little_endian_on_the_wire() {
        let mut col = ColumnUInt32::new(node("UInt32"));
        col.append(0x12345678);
        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0x78, 0x56, 0x34, 0x12]);
    }

    #[test]
    fn int256_round_trip() {
        let mut col = ColumnInt256::new(node("Int256"));
        col.append(Int256::from(-5i128));
        col.append(Int256::from(i128::MAX));

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 64);

        let mut restored = ColumnInt256::new(node("Int256"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert_eq!(restored.at(0), Int256::from(-5i128));
        assert_eq!(restored.at(1), Int256::from(i128::MAX));
    }

    #[test]
    fn sign_extension_into_256_bits() {
        let neg = Int256::from(-1i128);
        assert_eq!(neg.0, [0xFF; 32]);
        let pos = UInt256::from(1u128);
        assert_eq!(pos.0[0], 1);
        assert!(pos.0[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn underflow_is_an_error() {
        let mut col = ColumnUInt64::new(node("UInt64"));
        let data = [0u8; 7];
        let mut slice = &data[..];
        assert!(col.load_body(&mut slice, 1).is_err());
    }
}
