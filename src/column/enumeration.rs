//! `Enum8` and `Enum16` columns.
//!
//! An enum column stores raw integers on the wire (`i8`/`i16`) and carries
//! the bidirectional name/value map from its type arguments. Appending a
//! name or value that the map does not contain is an error; the map may not
//! be empty.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use super::numeric::{ColumnInt16, ColumnInt8};
use super::{Column, ColumnRef};
use crate::types::TypeNode;
use crate::wire;
use crate::{Error, Result};

macro_rules! enum_column {
    ($name:ident, $repr:ty, $get:ident, $put:ident, $wire_name:expr,
     $plain:ident, $plain_name:expr) => {
        #[doc = concat!("Enum column over ", $wire_name, " storage.")]
        pub struct $name {
            node: Arc<TypeNode>,
            by_value: HashMap<$repr, String>,
            by_name: HashMap<String, $repr>,
            data: Vec<$repr>,
        }

        impl $name {
            pub fn new(node: Arc<TypeNode>) -> Result<Self> {
                let mut by_value = HashMap::new();
                let mut by_name = HashMap::new();
                for (name, value) in node.enum_items()? {
                    let value =
                        <$repr>::try_from(value).map_err(|_| {
                            Error::Overflow(format!(
                                "enum value {value} does not fit {}",
                                $wire_name
                            ))
                        })?;
                    by_value.insert(value, name.to_string());
                    by_name.insert(name.to_string(), value);
                }
                Ok(Self { node, by_value, by_name, data: Vec::new() })
            }

            /// Append by member name.
            pub fn append_name(&mut self, name: &str) -> Result<()> {
                let value =
                    *self.by_name.get(name).ok_or_else(|| {
                        Error::Overflow(format!(
                            "'{name}' is not a member of {}",
                            self.node.full_name()
                        ))
                    })?;
                self.data.push(value);
                Ok(())
            }

            /// Append by member value.
            pub fn append_value(&mut self, value: $repr) -> Result<()> {
                if !self.by_value.contains_key(&value) {
                    return Err(Error::Overflow(format!(
                        "{value} is not a member of {}",
                        self.node.full_name()
                    )));
                }
                self.data.push(value);
                Ok(())
            }

            /// The raw value at `index`.
            pub fn get_value(&self, index: usize) -> Option<$repr> {
                self.data.get(index).copied()
            }

            /// The member name at `index`.
            pub fn get_name(&self, index: usize) -> Option<&str> {
                let value = self.get_value(index)?;
                self.by_value.get(&value).map(String::as_str)
            }

            /// Look a member's value up by name.
            pub fn value_of(&self, name: &str) -> Option<$repr> {
                self.by_name.get(name).copied()
            }

            /// Look a member's name up by value.
            pub fn name_of(&self, value: $repr) -> Option<&str> {
                self.by_value.get(&value).map(String::as_str)
            }

            /// Reinterpret as a plain integer column, consuming self.
            pub fn into_values(self) -> $plain {
                $plain::from_values(
                    TypeNode::simple($plain_name),
                    self.data,
                )
            }
        }

        impl Column for $name {
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
                // NULL slots under Nullable carry an arbitrary placeholder;
                // 0 is what the server writes.
                self.data.push(0);
            }

            fn load_body(
                &mut self,
                buffer: &mut &[u8],
                rows: usize,
            ) -> Result<()> {
                wire::ensure(
                    buffer,
                    rows * std::mem::size_of::<$repr>(),
                    $wire_name,
                )?;
                self.data.reserve(rows);
                for _ in 0..rows {
                    self.data.push(buffer.$get());
                }
                Ok(())
            }

            fn save_body(&self, buffer: &mut BytesMut) -> Result<()> {
                for &value in &self.data {
                    buffer.$put(value);
                }
                Ok(())
            }

            fn clone_empty(&self) -> ColumnRef {
                Arc::new(Self {
                    node: self.node.clone(),
                    by_value: self.by_value.clone(),
                    by_name: self.by_name.clone(),
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
    };
}

enum_column!(ColumnEnum8, i8, get_i8, put_i8, "Enum8", ColumnInt8, "Int8");
enum_column!(
    ColumnEnum16,
    i16,
    get_i16_le,
    put_i16_le,
    "Enum16",
    ColumnInt16,
    "Int16"
);

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Arc<TypeNode> {
        TypeNode::parse(name).unwrap()
    }

    #[test]
    fn bidirectional_map() {
        let col = ColumnEnum8::new(node("Enum8('red' = 1, 'green' = -2)"))
            .unwrap();
        assert_eq!(col.value_of("red"), Some(1));
        assert_eq!(col.value_of("green"), Some(-2));
        assert_eq!(col.name_of(-2), Some("green"));
        assert_eq!(col.name_of(3), None);
    }

    #[test]
    fn negative_values_and_escaped_keys() {
        let col = ColumnEnum8::new(node(
            r"Enum8('\'a\'' = -5, ' \tescaped \'value\' ({[ ' = -9, '\r\n\t\\d\\' = 18)",
        ))
        .unwrap();
        assert_eq!(col.value_of("'a'"), Some(-5));
        assert_eq!(col.value_of(" \tescaped 'value' ({[ "), Some(-9));
        assert_eq!(col.value_of("\r\n\t\\d\\"), Some(18));
    }

    #[test]
    fn append_and_round_trip() {
        let spelling = "Enum16('a' = 300, 'b' = -300)";
        let mut col = ColumnEnum16::new(node(spelling)).unwrap();
        col.append_name("a").unwrap();
        col.append_value(-300).unwrap();
        assert!(matches!(col.append_value(5), Err(Error::Overflow(_))));
        assert!(matches!(col.append_name("zzz"), Err(Error::Overflow(_))));

        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(buf.len(), 4);

        let mut restored = ColumnEnum16::new(node(spelling)).unwrap();
        let mut slice = &buf[..];
        restored.load_body(&mut slice, 2).unwrap();
        assert_eq!(restored.get_name(0), Some("a"));
        assert_eq!(restored.get_name(1), Some("b"));
        assert_eq!(restored.get_value(1), Some(-300));
    }

    #[test]
    fn value_outside_repr_rejected() {
        assert!(ColumnEnum8::new(node("Enum8('big' = 300)")).is_err());
    }

    #[test]
    fn empty_enum_not_fully_specified() {
        // `Enum8` with no member list cannot exist on the wire; the parser
        // refuses `Enum8()` and the plain name has no items.
        let bare = TypeNode::simple("Enum8");
        assert!(matches!(
            ColumnEnum8::new(bare),
            Err(Error::TypeNotFullySpecified(_))
        ));
    }

    #[test]
    fn reinterpret_as_integers() {
        let mut col =
            ColumnEnum8::new(node("Enum8('x' = 7, 'y' = 9)")).unwrap();
        col.append_name("y").unwrap();
        col.append_name("x").unwrap();
        let ints = col.into_values();
        assert_eq!(ints.values(), &[9, 7]);
    }
}
