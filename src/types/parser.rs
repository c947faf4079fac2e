//! Tokenizer and recursive-descent parser for the textual type grammar.
//!
//! ```text
//! type      := ident ( '(' args ')' )?
//! args      := arg (',' arg)*
//! arg       := type | quoted_string | integer | named_arg | enum_item
//! named_arg := (ident | backticked | quoted_string) type
//! enum_item := quoted_string '=' integer
//! ```
//!
//! Whitespace between tokens is ignored. Single-quoted strings decode the
//! escapes `\t \n \r \0 \b \' \\`; any other escaped character keeps its
//! backslash, which is what lets enum keys like `'\s'` survive as literal
//! backslash-plus-letter. Back-ticked names (tuple element names) decode
//! `` \` `` and `\\` the same way.

use crate::{Error, Result};

use super::{TypeArg, TypeNode};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(i64),
    Quoted(String),
    Backticked(String),
    LPar,
    RPar,
    Comma,
    Eq,
    Eos,
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, bytes: input.as_bytes(), pos: 0 }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::MalformedTypeName(format!(
            "{} at byte {} in '{}'",
            message.into(),
            self.pos,
            self.input
        ))
    }

    fn next(&mut self) -> Result<Token> {
        while self.pos < self.bytes.len()
            && matches!(self.bytes[self.pos], b' ' | b'\t' | b'\n' | b'\r')
        {
            self.pos += 1;
        }
        if self.pos >= self.bytes.len() {
            return Ok(Token::Eos);
        }

        let c = self.bytes[self.pos];
        match c {
            b'(' => {
                self.pos += 1;
                Ok(Token::LPar)
            }
            b')' => {
                self.pos += 1;
                Ok(Token::RPar)
            }
            b',' => {
                self.pos += 1;
                Ok(Token::Comma)
            }
            b'=' => {
                self.pos += 1;
                Ok(Token::Eq)
            }
            b'\'' => self.quoted(b'\'').map(Token::Quoted),
            b'`' => self.quoted(b'`').map(Token::Backticked),
            b'-' | b'0'..=b'9' => self.number(),
            c if c.is_ascii_alphabetic() || c == b'_' => Ok(self.ident()),
            other => Err(self.error(format!(
                "unexpected character '{}'",
                other as char
            ))),
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            if !(c.is_ascii_alphanumeric() || c == b'_') {
                break;
            }
            self.pos += 1;
        }
        Token::Ident(self.input[start..self.pos].to_string())
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        if self.bytes[self.pos] == b'-' {
            self.pos += 1;
        }
        while self.pos < self.bytes.len()
            && self.bytes[self.pos].is_ascii_digit()
        {
            self.pos += 1;
        }
        let text = &self.input[start..self.pos];
        text.parse::<i64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("integer '{text}' out of range")))
    }

    /// Decode a quoted run delimited by `delim`, processing escapes.
    fn quoted(&mut self, delim: u8) -> Result<String> {
        self.pos += 1; // opening delimiter
        let mut out = String::new();
        while self.pos < self.bytes.len() {
            let c = self.bytes[self.pos];
            if c == delim {
                self.pos += 1;
                return Ok(out);
            }
            if c == b'\\' {
                self.pos += 1;
                if self.pos >= self.bytes.len() {
                    break;
                }
                let escaped = self.bytes[self.pos];
                match escaped {
                    b't' => out.push('\t'),
                    b'n' => out.push('\n'),
                    b'r' => out.push('\r'),
                    b'0' => out.push('\0'),
                    b'b' => out.push('\u{8}'),
                    b'\\' => out.push('\\'),
                    c if c == delim => out.push(c as char),
                    other => {
                        // Liberal passthrough: keep the backslash and the
                        // whole (possibly multi-byte) character after it.
                        out.push('\\');
                        let len = utf8_len(other);
                        out.push_str(
                            &self.input[self.pos..self.pos + len],
                        );
                        self.pos += len;
                        continue;
                    }
                }
                self.pos += 1;
                continue;
            }
            // Multi-byte UTF-8 passes through untouched.
            let ch_len = utf8_len(c);
            out.push_str(&self.input[self.pos..self.pos + ch_len]);
            self.pos += ch_len;
        }
        Err(self.error("unterminated quoted string"))
    }
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

pub(super) struct Parser<'a> {
    lexer: Lexer<'a>,
    lookahead: Option<Token>,
}

impl<'a> Parser<'a> {
    pub(super) fn new(input: &'a str) -> Self {
        Self { lexer: Lexer::new(input), lookahead: None }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        self.lexer.error(message)
    }

    fn peek(&mut self) -> Result<&Token> {
        if self.lookahead.is_none() {
            self.lookahead = Some(self.lexer.next()?);
        }
        Ok(self.lookahead.as_ref().unwrap())
    }

    fn bump(&mut self) -> Result<Token> {
        match self.lookahead.take() {
            Some(token) => Ok(token),
            None => self.lexer.next(),
        }
    }

    /// Parse a complete type expression; trailing tokens are an error.
    pub(super) fn parse(&mut self) -> Result<TypeNode> {
        let node = self.parse_type()?;
        match self.bump()? {
            Token::Eos => Ok(node),
            other => {
                Err(self.error(format!("trailing input: {other:?}")))
            }
        }
    }

    fn parse_type(&mut self) -> Result<TypeNode> {
        let name = match self.bump()? {
            Token::Ident(name) => name,
            other => {
                return Err(
                    self.error(format!("expected type name, got {other:?}"))
                )
            }
        };

        let mut args = Vec::new();
        if matches!(self.peek()?, Token::LPar) {
            self.bump()?;
            loop {
                args.push(self.parse_arg()?);
                match self.bump()? {
                    Token::Comma => continue,
                    Token::RPar => break,
                    Token::Eos => {
                        return Err(self.error("unbalanced parentheses"))
                    }
                    other => {
                        return Err(self.error(format!(
                            "expected ',' or ')', got {other:?}"
                        )))
                    }
                }
            }
        }

        self.assemble(name, args)
    }

    fn parse_arg(&mut self) -> Result<TypeArg> {
        match self.bump()? {
            Token::Number(value) => Ok(TypeArg::Number(value)),
            Token::Backticked(name) => {
                let node = self.parse_type()?;
                Ok(TypeArg::Named { name, node: node.into() })
            }
            Token::Quoted(text) => match self.peek()? {
                Token::Eq => {
                    self.bump()?;
                    match self.bump()? {
                        Token::Number(value) => {
                            Ok(TypeArg::EnumItem { name: text, value })
                        }
                        other => Err(self.error(format!(
                            "expected integer after '=', got {other:?}"
                        ))),
                    }
                }
                Token::Ident(_) => {
                    let node = self.parse_type()?;
                    Ok(TypeArg::Named { name: text, node: node.into() })
                }
                _ => Ok(TypeArg::Str(text)),
            },
            Token::Ident(first) => {
                // `a UInt32` is a named tuple element; `UInt32` alone (or
                // `Array(...)`) is a type.
                if matches!(self.peek()?, Token::Ident(_)) {
                    let node = self.parse_type()?;
                    Ok(TypeArg::Named { name: first, node: node.into() })
                } else if matches!(self.peek()?, Token::LPar) {
                    let node = self.parse_parens_onto(first)?;
                    Ok(TypeArg::Type(node.into()))
                } else {
                    let node = self.assemble(first, Vec::new())?;
                    Ok(TypeArg::Type(node.into()))
                }
            }
            other => {
                Err(self.error(format!("expected argument, got {other:?}")))
            }
        }
    }

    /// Continue parsing `name(...)` after `name` has been consumed.
    fn parse_parens_onto(&mut self, name: String) -> Result<TypeNode> {
        self.bump()?; // consume '('
        let mut args = Vec::new();
        loop {
            args.push(self.parse_arg()?);
            match self.bump()? {
                Token::Comma => continue,
                Token::RPar => break,
                Token::Eos => return Err(self.error("unbalanced parentheses")),
                other => {
                    return Err(self.error(format!(
                        "expected ',' or ')', got {other:?}"
                    )))
                }
            }
        }
        self.assemble(name, args)
    }

    /// Validate argument kinds against the head name and build the node,
    /// filling the generic-argument axis for composite types.
    fn assemble(
        &self,
        name: String,
        args: Vec<TypeArg>,
    ) -> Result<TypeNode> {
        match name.as_str() {
            "Array" | "Nullable" | "LowCardinality" => {
                if args.len() != 1 {
                    return Err(self.error(format!(
                        "{name} takes exactly one type argument"
                    )));
                }
                let TypeArg::Type(inner) = &args[0] else {
                    return Err(self.error(format!(
                        "{name} argument must be a type"
                    )));
                };
                let generics = vec![inner.clone()];
                Ok(TypeNode::assembled(name, generics, args))
            }
            "Map" => {
                if args.len() != 2
                    || !args
                        .iter()
                        .all(|a| matches!(a, TypeArg::Type(_)))
                {
                    return Err(self
                        .error("Map takes exactly two type arguments"));
                }
                let generics = args
                    .iter()
                    .map(|a| match a {
                        TypeArg::Type(t) => t.clone(),
                        _ => unreachable!(),
                    })
                    .collect();
                Ok(TypeNode::assembled(name, generics, args))
            }
            "Tuple" => {
                if args.is_empty() {
                    return Err(
                        self.error("Tuple requires at least one element")
                    );
                }
                let mut generics = Vec::with_capacity(args.len());
                for arg in &args {
                    match arg {
                        TypeArg::Type(t) => generics.push(t.clone()),
                        TypeArg::Named { node, .. } => {
                            generics.push(node.clone())
                        }
                        other => {
                            return Err(self.error(format!(
                                "invalid Tuple element: {other:?}"
                            )))
                        }
                    }
                }
                Ok(TypeNode::assembled(name, generics, args))
            }
            "Enum8" | "Enum16" => {
                if !args
                    .iter()
                    .all(|a| matches!(a, TypeArg::EnumItem { .. }))
                {
                    return Err(self.error(format!(
                        "{name} members must be 'name' = value pairs"
                    )));
                }
                Ok(TypeNode::assembled(name, Vec::new(), args))
            }
            "SimpleAggregateFunction" => {
                // Unwraps to the stored type, which comes last.
                match args.last() {
                    Some(TypeArg::Type(node)) => Ok((**node).clone()),
                    _ => Err(self.error(
                        "SimpleAggregateFunction requires a type argument",
                    )),
                }
            }
            _ => {
                // Terminal types: only scalar arguments are legal.
                for arg in &args {
                    match arg {
                        TypeArg::Number(_) | TypeArg::Str(_) => {}
                        // `Decimal(P, S)` style numbers may lex as types if
                        // someone writes an identifier; everything else is a
                        // grammar violation at this head.
                        other => {
                            return Err(self.error(format!(
                                "{name} does not accept argument {other:?}"
                            )))
                        }
                    }
                }
                Ok(TypeNode::assembled(name, Vec::new(), args))
            }
        }
    }
}
