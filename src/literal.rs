//! SQL literal rendering and textual parameter substitution.
//!
//! Commands carry parameters as `{name:Type}` placeholders; before the
//! query text goes on the wire each placeholder is replaced by the
//! parameter's value rendered as a ClickHouse SQL literal. Strings are
//! single-quoted with `\` escapes; dates and times render in the canonical
//! server formats; `NULL` stands for absent optionals.

use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::{Error, Result};

/// A value renderable as a ClickHouse SQL literal.
pub trait Literal {
    /// Render as literal text, exactly as it may appear in a query.
    fn to_sql(&self) -> String;
}

/// Quote and escape a string as a single-quoted SQL literal.
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\0' => out.push_str("\\0"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

macro_rules! literal_via_display {
    ($($type:ty),*) => {
        $(impl Literal for $type {
            fn to_sql(&self) -> String {
                self.to_string()
            }
        })*
    };
}

literal_via_display!(i8, i16, i32, i64, i128, u8, u16, u32, u64, u128);

impl Literal for f32 {
    fn to_sql(&self) -> String {
        if self.is_finite() {
            self.to_string()
        } else {
            format!("'{self}'")
        }
    }
}

impl Literal for f64 {
    fn to_sql(&self) -> String {
        if self.is_finite() {
            self.to_string()
        } else {
            format!("'{self}'")
        }
    }
}

impl Literal for bool {
    fn to_sql(&self) -> String {
        if *self { "true".to_string() } else { "false".to_string() }
    }
}

impl Literal for &str {
    fn to_sql(&self) -> String {
        quote_str(self)
    }
}

impl Literal for String {
    fn to_sql(&self) -> String {
        quote_str(self)
    }
}

impl Literal for Uuid {
    fn to_sql(&self) -> String {
        format!("'{self}'")
    }
}

impl Literal for NaiveDate {
    fn to_sql(&self) -> String {
        format!("'{}'", self.format("%Y-%m-%d"))
    }
}

impl Literal for DateTime<Utc> {
    fn to_sql(&self) -> String {
        format!("'{}'", self.format("%Y-%m-%d %H:%M:%S"))
    }
}

impl Literal for Ipv4Addr {
    fn to_sql(&self) -> String {
        format!("'{self}'")
    }
}

impl Literal for Ipv6Addr {
    fn to_sql(&self) -> String {
        format!("'{self}'")
    }
}

impl<T: Literal> Literal for Option<T> {
    fn to_sql(&self) -> String {
        match self {
            Some(value) => value.to_sql(),
            None => "NULL".to_string(),
        }
    }
}

impl<T: Literal> Literal for Vec<T> {
    fn to_sql(&self) -> String {
        let items: Vec<String> = self.iter().map(Literal::to_sql).collect();
        format!("[{}]", items.join(", "))
    }
}

/// Replace every `{name:Type}` placeholder in `query` with the rendered
/// literal from `params`. Unknown placeholders are an error; parameters
/// that match no placeholder are ignored.
pub fn substitute(
    query: &str,
    params: &[(String, String)],
) -> Result<String> {
    let mut out = String::with_capacity(query.len());
    let mut rest = query;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let close = tail.find('}').ok_or_else(|| {
            Error::MalformedTypeName(format!(
                "unterminated parameter placeholder in query: {query}"
            ))
        })?;
        let inside = &tail[..close];
        let name = inside.split(':').next().unwrap_or(inside).trim();
        let value = params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| {
                Error::NotSupported(format!(
                    "no value bound for query parameter '{name}'"
                ))
            })?;
        out.push_str(value);
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
