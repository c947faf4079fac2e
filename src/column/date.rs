//! Date and time columns.
//!
//! | type | storage | range |
//! |---|---|---|
//! | `Date` | u16 days since 1970-01-01 | 1970-01-01 ..= 2149-06-06 |
//! | `Date32` | i32 days since 1970-01-01 | 1900-01-01 ..= 2299-12-31 |
//! | `DateTime` | u32 Unix seconds | 1970 ..= 2106 |
//! | `DateTime64(p)` | i64 ticks of 10^-p s | depends on precision |
//!
//! Appends are range-checked and overflow errors name the offending value;
//! values read off the wire are taken as-is. The optional time-zone argument
//! of `DateTime`/`DateTime64` affects server-side rendering only; the wire
//! carries UTC-based numbers, so the columns convert against UTC.

use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use super::numeric::ColumnUInt32;
use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap()
}

/// Last day representable by `Date` (day 65535).
pub const DATE_MAX: (i32, u32, u32) = (2149, 6, 6);

/// `Date32` range endpoints.
const DATE32_MIN_DAYS: i64 = -25_567; // 1900-01-01
const DATE32_MAX_DAYS: i64 = 120_529; // 2299-12-31

/// `Date`: u16 days since the Unix epoch.
pub struct ColumnDate {
    node: Arc<TypeNode>,
    data: Vec<u16>,
}

impl ColumnDate {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    /// Append a raw day number.
    pub fn append_days(&mut self, days: u16) {
        self.data.push(days);
    }

    /// Append a calendar date, rejecting values outside the `Date` range.
    pub fn append(&mut self, date: NaiveDate) -> Result<()> {
        let days = (date - epoch()).num_days();
        if !(0..=u16::MAX as i64).contains(&days) {
            return Err(Error::Overflow(format!(
                "{date} is outside the Date range 1970-01-01..=2149-06-06"
            )));
        }
        self.data.push(days as u16);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<NaiveDate> {
        let days = *self.data.get(index)?;
        epoch().checked_add_days(chrono::Days::new(days as u64))
    }

    /// The raw day numbers, reinterpreting the column as `UInt16` storage.
    pub fn days(&self) -> &[u16] {
        &self.data
    }
}

/// `Date32`: i32 days since the Unix epoch, extended range.
pub struct ColumnDate32 {
    node: Arc<TypeNode>,
    data: Vec<i32>,
}

impl ColumnDate32 {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn append_days(&mut self, days: i32) {
        self.data.push(days);
    }

    pub fn append(&mut self, date: NaiveDate) -> Result<()> {
        let days = (date - epoch()).num_days();
        if !(DATE32_MIN_DAYS..=DATE32_MAX_DAYS).contains(&days) {
            return Err(Error::Overflow(format!(
                "{date} is outside the Date32 range 1900-01-01..=2299-12-31"
            )));
        }
        self.data.push(days as i32);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<NaiveDate> {
        let days = *self.data.get(index)?;
        epoch().checked_add_signed(chrono::Duration::days(days as i64))
    }

    pub fn days(&self) -> &[i32] {
        &self.data
    }

    /// Reinterpret as a `DateTime` column at midnight UTC. Fails (returns
    /// `None`) when any day falls outside the `DateTime` epoch-seconds
    /// range.
    pub fn try_into_datetime(self) -> Option<ColumnDateTime> {
        const MAX_DAY: i32 = (u32::MAX / 86_400) as i32;
        let mut seconds = Vec::with_capacity(self.data.len());
        for &days in &self.data {
            if !(0..=MAX_DAY).contains(&days) {
                return None;
            }
            seconds.push(days as u32 * 86_400);
        }
        let node = TypeNode::parse("DateTime").ok()?;
        Some(ColumnDateTime { node, data: seconds })
    }
}

/// `DateTime`: u32 Unix seconds.
pub struct ColumnDateTime {
    node: Arc<TypeNode>,
    data: Vec<u32>,
}

impl ColumnDateTime {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    /// The column's rendering time zone, if the type spelled one.
    pub fn timezone(&self) -> Option<&str> {
        self.node.datetime_timezone()
    }

    pub fn append_seconds(&mut self, seconds: u32) {
        self.data.push(seconds);
    }

    pub fn append(&mut self, value: DateTime<Utc>) -> Result<()> {
        let seconds = value.timestamp();
        if !(0..=u32::MAX as i64).contains(&seconds) {
            return Err(Error::Overflow(format!(
                "{value} is outside the DateTime range"
            )));
        }
        self.data.push(seconds as u32);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<DateTime<Utc>> {
        let seconds = *self.data.get(index)?;
        Utc.timestamp_opt(seconds as i64, 0).single()
    }

    /// Raw epoch seconds, reinterpreting the column as `UInt32` storage.
    pub fn seconds(&self) -> &[u32] {
        &self.data
    }

    /// Consume into plain `UInt32` storage without copying.
    pub fn into_uint32(self) -> ColumnUInt32 {
        let node = TypeNode::simple("UInt32");
        ColumnUInt32::from_values(node, self.data)
    }
}

/// `DateTime64(precision[, tz])`: i64 ticks of `10^-precision` seconds.
pub struct ColumnDateTime64 {
    node: Arc<TypeNode>,
    precision: u32,
    data: Vec<i64>,
}

impl ColumnDateTime64 {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let (precision, _) = node.datetime64_params()?;
        Ok(Self { node, precision, data: Vec::new() })
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn append_ticks(&mut self, ticks: i64) {
        self.data.push(ticks);
    }

    pub fn append(&mut self, value: DateTime<Utc>) -> Result<()> {
        // Work in i128 so precision 18 cannot overflow mid-computation.
        let nanos = value.timestamp() as i128 * 1_000_000_000
            + value.timestamp_subsec_nanos() as i128;
        let ticks = if self.precision <= 9 {
            nanos / 10i128.pow(9 - self.precision)
        } else {
            nanos * 10i128.pow(self.precision - 9)
        };
        i64::try_from(ticks)
            .map_err(|_| {
                Error::Overflow(format!(
                    "{value} does not fit DateTime64({})",
                    self.precision
                ))
            })
            .map(|t| self.data.push(t))
    }

    pub fn get(&self, index: usize) -> Option<DateTime<Utc>> {
        let ticks = *self.data.get(index)? as i128;
        let nanos = if self.precision <= 9 {
            ticks * 10i128.pow(9 - self.precision)
        } else {
            ticks / 10i128.pow(self.precision - 9)
        };
        let seconds = nanos.div_euclid(1_000_000_000) as i64;
        let subsec = nanos.rem_euclid(1_000_000_000) as u32;
        Utc.timestamp_opt(seconds, subsec).single()
    }

    pub fn ticks(&self) -> &[i64] {
        &self.data
    }
}

impl Column for ColumnDate {
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
        wire::ensure(buffer, rows * 2, "Date")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_u16_le());
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            buffer.put_u16_le(value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnDate::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Column for ColumnDate32 {
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
        wire::ensure(buffer, rows * 4, "Date32")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_i32_le());
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            buffer.put_i32_le(value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnDate32::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Column for ColumnDateTime {
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
        wire::ensure(buffer, rows * 4, "DateTime")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_u32_le());
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            buffer.put_u32_le(value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnDateTime::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl Column for ColumnDateTime64 {
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
        wire::ensure(buffer, rows * 8, "DateTime64")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            self.data.push(buffer.get_i64_le());
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for &value in &self.data {
            buffer.put_i64_le(value);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(Self {
            node: self.node.clone(),
            precision: self.precision,
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

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Arc<TypeNode> {
        TypeNode::parse(name).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_boundaries() {
        let mut col = ColumnDate::new(node("Date"));
        col.append(date(1970, 1, 1)).unwrap();
        col.append(date(DATE_MAX.0, DATE_MAX.1, DATE_MAX.2)).unwrap();
        assert_eq!(col.days(), &[0, u16::MAX]);

        assert!(matches!(
            col.append(date(1969, 12, 31)),
            Err(Error::Overflow(_))
        ));
        assert!(matches!(
            col.append(date(2149, 6, 7)),
            Err(Error::Overflow(_))
        ));
    }

    #[test]
    fn date_round_trip() {
        let mut col = ColumnDate::new(node("Date"));
        col.append(date(2021, 7, 14)).unwrap();

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored = ColumnDate::new(node("Date"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 1).unwrap();
        assert_eq!(restored.get(0), Some(date(2021, 7, 14)));
    }

    #[test]
    fn date32_extended_range() {
        let mut col = ColumnDate32::new(node("Date32"));
        col.append(date(1900, 1, 1)).unwrap();
        col.append(date(2299, 12, 31)).unwrap();
        assert!(col.append(date(1899, 12, 31)).is_err());
        assert!(col.append(date(2300, 1, 1)).is_err());
        assert_eq!(col.get(0), Some(date(1900, 1, 1)));
    }

    #[test]
    fn date32_reinterprets_as_midnight_datetime() {
        let mut col = ColumnDate32::new(node("Date32"));
        col.append(date(2000, 1, 2)).unwrap();
        let dt = col.try_into_datetime().unwrap();
        let value = dt.get(0).unwrap();
        assert_eq!(value.date_naive(), date(2000, 1, 2));
        assert_eq!(value.timestamp() % 86_400, 0);

        // Pre-epoch days cannot be seen as u32 seconds.
        let mut negative = ColumnDate32::new(node("Date32"));
        negative.append(date(1950, 1, 1)).unwrap();
        assert!(negative.try_into_datetime().is_none());
    }

    #[test]
    fn datetime_round_trip() {
        let mut col = ColumnDateTime::new(node("DateTime('UTC')"));
        assert_eq!(col.timezone(), Some("UTC"));

        let value = Utc.with_ymd_and_hms(2021, 7, 14, 12, 34, 56).unwrap();
        col.append(value).unwrap();

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored = ColumnDateTime::new(node("DateTime"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 1).unwrap();
        assert_eq!(restored.get(0), Some(value));
    }

    #[test]
    fn datetime64_precision_scaling() {
        let mut col =
            ColumnDateTime64::new(node("DateTime64(3, 'UTC')")).unwrap();
        let value = Utc.with_ymd_and_hms(2021, 7, 14, 12, 34, 56).unwrap()
            + chrono::Duration::milliseconds(789);
        col.append(value).unwrap();
        assert_eq!(col.ticks()[0] % 1000, 789);
        assert_eq!(col.get(0), Some(value));
    }

    #[test]
    fn datetime64_high_precision_overflow() {
        let mut col = ColumnDateTime64::new(node("DateTime64(18)")).unwrap();
        // Attosecond precision only covers ~9.2 seconds around the epoch.
        let near = Utc.timestamp_opt(5, 0).unwrap();
        col.append(near).unwrap();
        let far = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(col.append(far), Err(Error::Overflow(_))));
    }
}
