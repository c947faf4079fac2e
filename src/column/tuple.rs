//! `Tuple(T1, ...)` column, with or without element names.
//!
//! The wire form is simply the element columns' bodies concatenated in
//! declaration order; every element column holds exactly the tuple column's
//! row count.

use std::sync::Arc;

use bytes::BytesMut;

use super::{for_type, Column, ColumnRef};
use crate::types::TypeNode;
use crate::{Error, Result};

/// Tuple column: one sub-column per element.
pub struct ColumnTuple {
    node: Arc<TypeNode>,
    names: Vec<Option<String>>,
    columns: Vec<Box<dyn Column>>,
}

impl ColumnTuple {
    pub fn new(node: Arc<TypeNode>) -> Result<Self> {
        let items = node.tuple_items();
        if items.is_empty() {
            return Err(Error::TypeNotFullySpecified(format!(
                "{} has no elements",
                node.full_name()
            )));
        }
        let mut names = Vec::with_capacity(items.len());
        let mut columns = Vec::with_capacity(items.len());
        for (name, inner) in items {
            names.push(name.map(str::to_string));
            columns.push(for_type(inner)?);
        }
        Ok(Self { node, names, columns })
    }

    /// Number of elements in the tuple.
    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    /// Element column at `index`.
    pub fn element(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(Box::as_ref)
    }

    /// Mutable element column at `index`.
    pub fn element_mut(&mut self, index: usize) -> Option<&mut dyn Column> {
        match self.columns.get_mut(index) {
            Some(column) => Some(column.as_mut()),
            None => None,
        }
    }

    /// Element column by declared name.
    pub fn element_by_name(&self, name: &str) -> Option<&dyn Column> {
        let index = self
            .names
            .iter()
            .position(|n| n.as_deref() == Some(name))?;
        self.element(index)
    }

    /// Declared element names, `None` for positional tuples.
    pub fn names(&self) -> &[Option<String>] {
        &self.names
    }
}

impl Column for ColumnTuple {
    fn type_node(&self) -> &Arc<TypeNode> {
        &self.node
    }

    fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.len())
    }

    fn clear(&mut self) {
        for column in &mut self.columns {
            column.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        for column in &mut self.columns {
            column.reserve(additional);
        }
    }

    fn push_default(&mut self) {
        for column in &mut self.columns {
            column.push_default();
        }
    }

    fn load_prefix(&mut self, buffer: &mut &[u8]) -> Result<()> {
        for column in &mut self.columns {
            column.load_prefix(buffer)?;
        }
        Ok(())
    }

    fn load_body(&mut self, buffer: &mut &[u8], rows: usize) -> Result<()> {
        for column in &mut self.columns {
            column.load_body(buffer, rows)?;
        }
        Ok(())
    }

    fn save_prefix(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_prefix(buffer)?;
        }
        Ok(())
    }

    fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
        for column in &self.columns {
            column.save_body(buffer)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnRef {
        Arc::new(
            ColumnTuple::new(self.node.clone())
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
    use crate::column::numeric::ColumnUInt32;
    use crate::column::string::ColumnString;

    fn node(name: &str) -> Arc<TypeNode> {
        TypeNode::parse(name).unwrap()
    }

    #[test]
    fn named_elements_addressable() {
        let mut col =
            ColumnTuple::new(node("Tuple(a UInt32, b String)")).unwrap();
        assert_eq!(col.arity(), 2);
        col.element_mut(0)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<ColumnUInt32>()
            .unwrap()
            .append(7);
        col.element_mut(1)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<ColumnString>()
            .unwrap()
            .append("seven");

        assert_eq!(col.len(), 1);
        assert!(col.element_by_name("a").is_some());
        assert!(col.element_by_name("missing").is_none());
    }

    #[test]
    fn bodies_concatenate_in_order() {
        let mut col =
            ColumnTuple::new(node("Tuple(UInt32, String)")).unwrap();
        col.element_mut(0)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<ColumnUInt32>()
            .unwrap()
            .append(0xAABBCCDD);
        col.element_mut(1)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<ColumnString>()
            .unwrap()
            .append("x");

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        // u32 first, then the length-prefixed string.
        assert_eq!(&buf[..4], &[0xDD, 0xCC, 0xBB, 0xAA]);
        assert_eq!(&buf[4..], &[1, b'x']);
    }

    #[test]
    fn round_trip_nested_named() {
        let spelling = "Tuple(id UInt32, tags Tuple(x String, y String))";
        let mut col = ColumnTuple::new(node(spelling)).unwrap();
        col.element_mut(0)
            .unwrap()
            .as_any_mut()
            .downcast_mut::<ColumnUInt32>()
            .unwrap()
            .append(1);
        {
            let inner = col
                .element_mut(1)
                .unwrap()
                .as_any_mut()
                .downcast_mut::<ColumnTuple>()
                .unwrap();
            inner
                .element_mut(0)
                .unwrap()
                .as_any_mut()
                .downcast_mut::<ColumnString>()
                .unwrap()
                .append("left");
            inner
                .element_mut(1)
                .unwrap()
                .as_any_mut()
                .downcast_mut::<ColumnString>()
                .unwrap()
                .append("right");
        }

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();

        let mut restored = ColumnTuple::new(node(spelling)).unwrap();
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 1).unwrap();
        assert!(slice.is_empty());
        let inner = restored
            .element_by_name("tags")
            .unwrap()
            .as_any()
            .downcast_ref::<ColumnTuple>()
            .unwrap();
        let y = inner
            .element_by_name("y")
            .unwrap()
            .as_any()
            .downcast_ref::<ColumnString>()
            .unwrap();
        assert_eq!(y.get(0), Some("right"));
    }
}
