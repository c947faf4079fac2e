//! `IPv4` and `IPv6` columns.
//!
//! `IPv4` is a `u32` whose value is the big-endian reading of the four
//! octets (so `1.2.3.4` is `0x01020304`), written little-endian on the wire
//! like every other integer. `IPv6` is the 16 address bytes in network
//! order, verbatim.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::numeric::ColumnUInt32;
use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::Result;

/// IPv4 address column.
pub struct ColumnIpv4 {
    node: Arc<TypeNode>,
    data: Vec<u32>,
}

impl ColumnIpv4 {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn append(&mut self, addr: Ipv4Addr) {
        self.data.push(u32::from(addr));
    }

    pub fn append_u32(&mut self, value: u32) {
        self.data.push(value);
    }

    pub fn get(&self, index: usize) -> Option<Ipv4Addr> {
        self.data.get(index).map(|&v| Ipv4Addr::from(v))
    }

    /// The raw `u32` values, reinterpreting the column as `UInt32` storage.
    pub fn raw(&self) -> &[u32] {
        &self.data
    }

    /// Consume into a plain `UInt32` column without copying.
    pub fn into_uint32(self) -> ColumnUInt32 {
        ColumnUInt32::from_values(TypeNode::simple("UInt32"), self.data)
    }
}

impl Column for ColumnIpv4 {
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
        wire::ensure(buffer, rows * 4, "IPv4")?;
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
        Arc::new(ColumnIpv4::new(self.node.clone()))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// IPv6 address column.
pub struct ColumnIpv6 {
    node: Arc<TypeNode>,
    data: Vec<[u8; 16]>,
}

impl ColumnIpv6 {
    pub fn new(node: Arc<TypeNode>) -> Self {
        Self { node, data: Vec::new() }
    }

    pub fn append(&mut self, addr: Ipv6Addr) {
        self.data.push(addr.octets());
    }

    pub fn append_octets(&mut self, octets: [u8; 16]) {
        self.data.push(octets);
    }

    pub fn get(&self, index: usize) -> Option<Ipv6Addr> {
        self.data.get(index).map(|octets| Ipv6Addr::from(*octets))
    }

    pub fn octets(&self, index: usize) -> Option<&[u8; 16]> {
        self.data.get(index)
    }
}

impl Column for ColumnIpv6 {
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
        self.data.push([0; 16]);
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        wire::ensure(buffer, rows * 16, "IPv6")?;
        self.data.reserve(rows);
        for _ in 0..rows {
            let mut octets = [0u8; 16];
            buffer.copy_to_slice(&mut octets);
            self.data.push(octets);
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for octets in &self.data {
            buffer.put_slice(octets);
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(ColumnIpv6::new(self.node.clone()))
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

    #[test]
    fn ipv4_value_encoding() {
        let mut col = ColumnIpv4::new(node("IPv4"));
        col.append(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(col.raw(), &[0x01020304]);

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        // Little-endian integer: low octet of the value first.
        assert_eq!(&buf[..], &[0x04, 0x03, 0x02, 0x01]);
    }

    #[test]
    fn ipv4_round_trip() {
        let mut col = ColumnIpv4::new(node("IPv4"));
        col.append(Ipv4Addr::new(127, 0, 0, 1));
        col.append(Ipv4Addr::new(255, 255, 255, 255));

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored = ColumnIpv4::new(node("IPv4"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert_eq!(restored.get(0), Some(Ipv4Addr::new(127, 0, 0, 1)));
        assert_eq!(
            restored.get(1),
            Some(Ipv4Addr::new(255, 255, 255, 255))
        );
    }

    #[test]
    fn ipv4_reinterprets_as_uint32() {
        let mut col = ColumnIpv4::new(node("IPv4"));
        col.append(Ipv4Addr::new(10, 0, 0, 1));
        let ints = col.into_uint32();
        assert_eq!(ints.values(), &[0x0A000001]);
    }

    #[test]
    fn ipv6_round_trip() {
        let addr: Ipv6Addr = "2001:db8::8a2e:370:7334".parse().unwrap();
        let mut col = ColumnIpv6::new(node("IPv6"));
        col.append(addr);
        col.append(Ipv6Addr::LOCALHOST);

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 32);
        // Network byte order, verbatim.
        assert_eq!(&buf[..16], &addr.octets());

        let mut restored = ColumnIpv6::new(node("IPv6"));
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert_eq!(restored.get(0), Some(addr));
        assert_eq!(restored.get(1), Some(Ipv6Addr::LOCALHOST));
    }
}
