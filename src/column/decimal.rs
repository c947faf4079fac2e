//! Decimal columns.
//!
//! A decimal value is a scaled integer: `Decimal(P, S)` stores
//! `value * 10^S` in the narrowest integer that holds `P` digits. The wire
//! width follows precision: 4 bytes up to 9 digits, 8 up to 18, 16 up to
//! 38, 32 up to 76. The sized aliases (`Decimal32(S)` etc.) fix the
//! precision and spell only the scale.
//!
//! Values with up to 38 digits are held as `i128`; `Decimal256` keeps its
//! raw 32-byte representation and is storage-only.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::numeric::Int256;
use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

/// Wire width in bytes for a decimal of the given precision.
pub fn storage_width(precision: u32) -> usize {
    match precision {
        0..=9 => 4,
        10..=18 => 8,
        19..=38 => 16,
        _ => 32,
    }
}

/// Decimal column for precisions up to 38 digits (`i128` storage).
pub struct ColumnDecimal {
    node: Arc<TypeNode>,
    precision: u32,
    scale: u32,
    width: usize,
    data: Vec<i128>,
}

impl ColumnDecimal {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let (precision, scale) = node.decimal_precision_scale()?;
        if precision == 0 || precision > 76 {
            return Err(Error::TypeNotFullySpecified(format!(
                "invalid decimal precision {precision}"
            )));
        }
        if scale > precision {
            return Err(Error::TypeNotFullySpecified(format!(
                "decimal scale {scale} exceeds precision {precision}"
            )));
        }
        if precision > 38 {
            return Err(Error::TypeMismatch {
                expected: "precision <= 38".into(),
                actual: node.full_name().to_string(),
            });
        }
        Ok(Self {
            node,
            precision,
            scale,
            width: storage_width(precision),
            data: Vec::new(),
        })
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Append an already-scaled integer representation, checking it fits
    /// within `precision` digits.
    pub fn append_scaled(&mut self, scaled: i128) -> Result<()> {
        let limit = 10i128.pow(self.precision);
        if scaled <= -limit || scaled >= limit {
            return Err(Error::Overflow(format!(
                "scaled value {scaled} exceeds Decimal({}, {})",
                self.precision, self.scale
            )));
        }
        self.data.push(scaled);
        Ok(())
    }

    /// Append an integer value (scaled up by `10^scale`).
    pub fn append_int(&mut self, value: i64) -> Result<()> {
        let scaled = (value as i128)
            .checked_mul(10i128.pow(self.scale))
            .ok_or_else(|| {
                Error::Overflow(format!("{value} exceeds decimal range"))
            })?;
        self.append_scaled(scaled)
    }

    /// The scaled integer at `index`.
    pub fn get_scaled(&self, index: usize) -> Option<i128> {
        self.data.get(index).copied()
    }

    /// The value at `index` rendered as a decimal string.
    pub fn get_string(&self, index: usize) -> Option<String> {
        let scaled = self.get_scaled(index)?;
        Some(format_scaled(scaled, self.scale))
    }

    pub fn values(&self) -> &[i128] {
        &self.data
    }
}

pub(crate) fn format_scaled(scaled: i128, scale: u32) -> String {
    if scale == 0 {
        return scaled.to_string();
    }
    let divisor = 10i128.pow(scale);
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.unsigned_abs();
    let whole = magnitude / divisor.unsigned_abs();
    let frac = magnitude % divisor.unsigned_abs();
    format!("{sign}{whole}.{frac:0width$}", width = scale as usize)
}

impl Column for ColumnDecimal {
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
        self.data.push(0);
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * self.width, "Decimal")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            let value = match self.width {
                4 => buffer.get_i32_le() as i128,
                8 => buffer.get_i64_le() as i128,
                _ => buffer.get_i128_le(),
            };
            self.data.push(value);
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            match self.width {
                4 => buffer.put_i32_le(value as i32),
                8 => buffer.put_i64_le(value as i64),
                _ => buffer.put_i128_le(value),
            }
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(Self {
            node: self.node.clone(),
            precision: self.precision,
            scale: self.scale,
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

/// `Decimal256`: 32-byte scaled integers, moved opaquely.
pub struct ColumnDecimal256 {
    node: Arc<TypeNode>,
    scale: u32,
    data: Vec<Int256>,
}

impl ColumnDecimal256 {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let (_, scale) = node.decimal_precision_scale()?;
        Ok(Self { node, scale, data: Vec::new() })
    }

    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn append_raw(&mut self, value: Int256) {
        self.data.push(value);
    }

    pub fn get_raw(&self, index: usize) -> Option<Int256> {
        self.data.get(index).copied()
    }
}

impl Column for ColumnDecimal256 {
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
        self.data.push(Int256::default());
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * 32, "Decimal256")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            let mut bytes = [0u8; 32];
            buffer.copy_to_slice(&mut bytes);
            self.data.push(Int256(bytes));
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for value in &self.data {
            buffer.put_slice(&value.0);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(Self {
            node: self.node.clone(),
            scale: self.scale,
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
