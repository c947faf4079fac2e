//! The ClickHouse type lattice.
//!
//! Every column carries a [`TypeNode`]: the canonical base name plus two
//! argument axes. *Generic arguments* are nested types (`Array(T)` has one,
//! `Map(K, V)` has two); *type arguments* are the scalar parameters spelled
//! in the parentheses (`Decimal(35, 10)` has two numbers, `DateTime64(3,
//! 'UTC')` a number and a string, `Tuple(a UInt32)` a named element). A type
//! may populate one axis, both, or neither.
//!
//! Nodes are interned process-wide by their textual spelling: parsing the
//! same type name twice yields the same `Arc`, entries are immutable, and
//! they are safely shared across sessions.

mod parser;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use crate::{Error, Result};

/// A scalar or nested argument of a parametric type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeArg {
    /// An integer parameter, e.g. a precision or fixed-string length.
    Number(i64),
    /// A string parameter, e.g. a time-zone name.
    Str(String),
    /// A nested type (wrapper and container types).
    Type(Arc<TypeNode>),
    /// A named nested type (named tuple elements).
    Named {
        /// Logical element name, unquoted and unescaped.
        name: String,
        /// Element type.
        node: Arc<TypeNode>,
    },
    /// An `'name' = value` enum member.
    EnumItem {
        /// Member name, unquoted and unescaped.
        name: String,
        /// Member value.
        value: i64,
    },
}

/// A node of the type tree.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeNode {
    name: String,
    generics: Vec<Arc<TypeNode>>,
    args: Vec<TypeArg>,
    full_name: String,
}

/// Closed-set tag describing the storage family of a type, independent of
/// its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // the variants are the ClickHouse type names
pub enum DbType {
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    UInt256,
    Float32,
    Float64,
    Bool,
    String,
    FixedString,
    Date,
    Date32,
    DateTime,
    DateTime64,
    Decimal,
    Enum8,
    Enum16,
    Uuid,
    IpV4,
    IpV6,
    Nothing,
    Nullable,
    LowCardinality,
    Array,
    Tuple,
    Map,
}

impl TypeNode {
    /// Parse a textual type expression through the process-wide intern
    /// registry.
    pub fn parse(type_name: &str) -> Result<Arc<TypeNode>> {
        static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<TypeNode>>>> =
            OnceLock::new();
        let registry = REGISTRY.get_or_init(|| Mutex::new(HashMap::new()));

        if let Some(node) =
            registry.lock().unwrap().get(type_name).cloned()
        {
            return Ok(node);
        }

        let node = Arc::new(parser::Parser::new(type_name).parse()?);
        let mut guard = registry.lock().unwrap();
        // Intern under both the input spelling and the canonical rendering
        // so `Decimal(35,10)` and `Decimal(35, 10)` share one node.
        let node = guard
            .entry(node.full_name.clone())
            .or_insert_with(|| node.clone())
            .clone();
        guard.entry(type_name.to_string()).or_insert_with(|| node.clone());
        Ok(node)
    }

    pub(crate) fn assembled(
        name: String,
        generics: Vec<Arc<TypeNode>>,
        args: Vec<TypeArg>,
    ) -> Self {
        let full_name = render(&name, &args);
        Self { name, generics, args, full_name }
    }

    /// Build a non-parametric node, e.g. `Int32`.
    pub fn simple(name: &str) -> Arc<TypeNode> {
        Arc::new(Self::assembled(name.to_string(), Vec::new(), Vec::new()))
    }

    /// Build a wrapper node such as `Nullable(T)` or `Array(T)`.
    pub fn wrap(name: &str, inner: Arc<TypeNode>) -> Arc<TypeNode> {
        Arc::new(Self::assembled(
            name.to_string(),
            vec![inner.clone()],
            vec![TypeArg::Type(inner)],
        ))
    }

    /// The canonical base name (`Array`, `Int32`, `Decimal32`, ...).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The canonically rendered complex name. Parsing this string and
    /// re-rendering it reproduces it byte for byte.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Nested types (the generic-argument axis).
    pub fn generics(&self) -> &[Arc<TypeNode>] {
        &self.generics
    }

    /// Scalar/structured parameters (the type-argument axis).
    pub fn args(&self) -> &[TypeArg] {
        &self.args
    }

    /// The single nested type of a wrapper (`Nullable`, `Array`,
    /// `LowCardinality`).
    pub fn nested(&self) -> Result<&Arc<TypeNode>> {
        self.generics.first().ok_or_else(|| {
            Error::TypeNotFullySpecified(format!(
                "{} requires a nested type",
                self.name
            ))
        })
    }

    /// The closed-set storage tag for this node.
    pub fn db_type(&self) -> Result<DbType> {
        Ok(match self.name.as_str() {
            "Int8" => DbType::Int8,
            "Int16" => DbType::Int16,
            "Int32" => DbType::Int32,
            "Int64" => DbType::Int64,
            "Int128" => DbType::Int128,
            "Int256" => DbType::Int256,
            "UInt8" => DbType::UInt8,
            "UInt16" => DbType::UInt16,
            "UInt32" => DbType::UInt32,
            "UInt64" => DbType::UInt64,
            "UInt128" => DbType::UInt128,
            "UInt256" => DbType::UInt256,
            "Float32" => DbType::Float32,
            "Float64" => DbType::Float64,
            "Bool" => DbType::Bool,
            "String" => DbType::String,
            "FixedString" => DbType::FixedString,
            "Date" => DbType::Date,
            "Date32" => DbType::Date32,
            "DateTime" => DbType::DateTime,
            "DateTime64" => DbType::DateTime64,
            "Decimal" | "Decimal32" | "Decimal64" | "Decimal128"
            | "Decimal256" => DbType::Decimal,
            "Enum8" => DbType::Enum8,
            "Enum16" => DbType::Enum16,
            "UUID" => DbType::Uuid,
            "IPv4" => DbType::IpV4,
            "IPv6" => DbType::IpV6,
            "Nothing" => DbType::Nothing,
            "Nullable" => DbType::Nullable,
            "LowCardinality" => DbType::LowCardinality,
            "Array" => DbType::Array,
            "Tuple" => DbType::Tuple,
            "Map" => DbType::Map,
            other => {
                return Err(Error::TypeNotSupported(other.to_string()))
            }
        })
    }

    /// Length of a `FixedString(N)` node.
    pub fn fixed_string_len(&self) -> Result<usize> {
        match self.args.first() {
            Some(TypeArg::Number(n)) if *n > 0 => Ok(*n as usize),
            _ => Err(Error::TypeNotFullySpecified(format!(
                "{} requires a positive length",
                self.full_name
            ))),
        }
    }

    /// `(precision, scale)` of any decimal node. The sized variants carry an
    /// implied precision and spell only the scale.
    pub fn decimal_precision_scale(&self) -> Result<(u32, u32)> {
        let number = |arg: &TypeArg| -> Result<u32> {
            match arg {
                TypeArg::Number(n) if *n >= 0 => Ok(*n as u32),
                _ => Err(Error::TypeNotFullySpecified(format!(
                    "invalid decimal parameter in {}",
                    self.full_name
                ))),
            }
        };
        match self.name.as_str() {
            "Decimal" => match self.args.as_slice() {
                [p, s] => Ok((number(p)?, number(s)?)),
                _ => Err(Error::TypeNotFullySpecified(format!(
                    "{} requires precision and scale",
                    self.full_name
                ))),
            },
            "Decimal32" | "Decimal64" | "Decimal128" | "Decimal256" => {
                let precision = match self.name.as_str() {
                    "Decimal32" => 9,
                    "Decimal64" => 18,
                    "Decimal128" => 38,
                    _ => 76,
                };
                match self.args.as_slice() {
                    [s] => Ok((precision, number(s)?)),
                    _ => Err(Error::TypeNotFullySpecified(format!(
                        "{} requires a scale",
                        self.full_name
                    ))),
                }
            }
            _ => Err(Error::TypeMismatch {
                expected: "Decimal".into(),
                actual: self.full_name.clone(),
            }),
        }
    }

    /// Sub-second precision and optional time zone of a `DateTime64` node.
    pub fn datetime64_params(&self) -> Result<(u32, Option<&str>)> {
        let precision = match self.args.first() {
            Some(TypeArg::Number(p)) if (0..=18).contains(p) => *p as u32,
            _ => {
                return Err(Error::TypeNotFullySpecified(format!(
                    "{} requires a precision in 0..=18",
                    self.full_name
                )))
            }
        };
        let tz = match self.args.get(1) {
            Some(TypeArg::Str(tz)) => Some(tz.as_str()),
            None => None,
            _ => {
                return Err(Error::TypeNotFullySpecified(format!(
                    "invalid time zone argument in {}",
                    self.full_name
                )))
            }
        };
        Ok((precision, tz))
    }

    /// Optional time zone of a `DateTime` node.
    pub fn datetime_timezone(&self) -> Option<&str> {
        match self.args.first() {
            Some(TypeArg::Str(tz)) => Some(tz.as_str()),
            _ => None,
        }
    }

    /// Enum members as `(name, value)` pairs.
    pub fn enum_items(&self) -> Result<Vec<(&str, i64)>> {
        let items: Vec<(&str, i64)> = self
            .args
            .iter()
            .filter_map(|arg| match arg {
                TypeArg::EnumItem { name, value } => {
                    Some((name.as_str(), *value))
                }
                _ => None,
            })
            .collect();
        if items.is_empty() {
            return Err(Error::TypeNotFullySpecified(format!(
                "{} has no members",
                self.full_name
            )));
        }
        Ok(items)
    }

    /// Tuple elements as `(optional name, type)` pairs.
    pub fn tuple_items(&self) -> Vec<(Option<&str>, &Arc<TypeNode>)> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                TypeArg::Type(node) => Some((None, node)),
                TypeArg::Named { name, node } => {
                    Some((Some(name.as_str()), node))
                }
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for TypeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name)
    }
}

fn render(name: &str, args: &[TypeArg]) -> String {
    if args.is_empty() {
        return name.to_string();
    }
    let rendered: Vec<String> = args.iter().map(render_arg).collect();
    format!("{}({})", name, rendered.join(", "))
}

fn render_arg(arg: &TypeArg) -> String {
    match arg {
        TypeArg::Number(n) => n.to_string(),
        TypeArg::Str(s) => quote_single(s),
        TypeArg::Type(node) => node.full_name.clone(),
        TypeArg::Named { name, node } => {
            if is_bare_ident(name) {
                format!("{} {}", name, node.full_name)
            } else {
                format!("{} {}", quote_backtick(name), node.full_name)
            }
        }
        TypeArg::EnumItem { name, value } => {
            format!("{} = {}", quote_single(name), value)
        }
    }
}

fn is_bare_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn quote_single(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            '\u{8}' => out.push_str("\\b"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

fn quote_backtick(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('`');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            other => out.push(other),
        }
    }
    out.push('`');
    out
}
