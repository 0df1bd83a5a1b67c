//! Text-to-value JSON parser (spec §4.4): a hand-written, depth-limited recursive-descent
//! scanner over a byte slice.
//!
//! Grounded on the teacher pack's direct byte-slice scanning style (`json::ptr::Pointer`'s
//! `from_str` walks bytes rather than using an iterator-of-chars combinator chain); a
//! hand-written parser is used here rather than deserializing through `serde_json::Value`
//! because the produced tree needs the no-escape flag and original-number-text
//! optimisations baked in as it's built, which `serde_json::Value` cannot carry.

use crate::error::{Error, Result};
use crate::keytable::Table as KeyTable;
use crate::value::number::Number;
use crate::value::object::Object;
use crate::value::Value;

/// Parses `text` into a `Value`, interning any object member names through `keys`.
///
/// `max_depth` bounds container nesting; exceeding it reports a depth overflow distinct from
/// a general parse error, per spec §4.4. Returns the parsed value and the maximum nesting
/// depth actually observed.
pub fn parse(text: &str, keys: &KeyTable, max_depth: usize) -> Result<(Value, usize)> {
    let mut p = Parser { bytes: text.as_bytes(), pos: 0, keys, max_depth, max_seen_depth: 0 };
    p.skip_ws();
    let value = p.parse_value(0)?;
    p.skip_ws();
    if p.pos != p.bytes.len() {
        return Err(Error::JsonParseError);
    }
    Ok((value, p.max_seen_depth))
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    keys: &'a KeyTable,
    max_depth: usize,
    max_seen_depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, b: u8) -> Result<()> {
        if self.bump() == Some(b) {
            Ok(())
        } else {
            Err(Error::JsonParseError)
        }
    }

    fn expect_literal(&mut self, lit: &str) -> Result<()> {
        if self.bytes[self.pos..].starts_with(lit.as_bytes()) {
            self.pos += lit.len();
            Ok(())
        } else {
            Err(Error::JsonParseError)
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value> {
        if depth > self.max_depth {
            return Err(Error::ParserRecursionLimitExceeded);
        }
        self.max_seen_depth = self.max_seen_depth.max(depth);
        self.skip_ws();
        match self.peek().ok_or(Error::JsonParseError)? {
            b'n' => {
                self.expect_literal("null")?;
                Ok(Value::Null)
            }
            b't' => {
                self.expect_literal("true")?;
                Ok(Value::Bool(true))
            }
            b'f' => {
                self.expect_literal("false")?;
                Ok(Value::Bool(false))
            }
            b'"' => self.parse_string().map(|(text, noescape)| Value::String { text, noescape }),
            b'[' => self.parse_array(depth),
            b'{' => self.parse_object(depth),
            b'-' | b'0'..=b'9' => self.parse_number(),
            _ => Err(Error::JsonParseError),
        }
    }

    fn parse_number(&mut self) -> Result<Value> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).map_err(|_| Error::JsonParseError)?;
        let n = Number::parse(text).ok_or(Error::JsonParseError)?;
        Ok(Value::Number(n))
    }

    /// Parses a JSON string literal, returning its decoded text and whether the source bytes
    /// (before decoding) contained nothing requiring escaping, which lets the fast serializer
    /// later emit the decoded text verbatim.
    fn parse_string(&mut self) -> Result<(Box<str>, bool)> {
        self.expect(b'"')?;
        let mut out = String::new();
        let mut noescape = true;
        loop {
            let b = self.bump().ok_or(Error::JsonParseError)?;
            match b {
                b'"' => break,
                b'\\' => {
                    noescape = false;
                    let esc = self.bump().ok_or(Error::JsonParseError)?;
                    match esc {
                        b'"' => out.push('"'),
                        b'\\' => out.push('\\'),
                        b'/' => out.push('/'),
                        b'b' => out.push('\u{8}'),
                        b'f' => out.push('\u{c}'),
                        b'n' => out.push('\n'),
                        b'r' => out.push('\r'),
                        b't' => out.push('\t'),
                        b'u' => {
                            let cp = self.parse_hex4()?;
                            out.push(char::from_u32(cp as u32).unwrap_or('\u{FFFD}'));
                        }
                        _ => return Err(Error::JsonParseError),
                    }
                }
                _ if b < 0x20 => return Err(Error::JsonParseError),
                _ if b < 0x80 => out.push(b as char),
                _ => {
                    noescape = false;
                    // Multi-byte UTF-8: back up and decode the full sequence.
                    self.pos -= 1;
                    let rest = std::str::from_utf8(&self.bytes[self.pos..]).map_err(|_| Error::JsonParseError)?;
                    let ch = rest.chars().next().ok_or(Error::JsonParseError)?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok((out.into_boxed_str(), noescape))
    }

    fn parse_hex4(&mut self) -> Result<u16> {
        let mut v: u16 = 0;
        for _ in 0..4 {
            let b = self.bump().ok_or(Error::JsonParseError)?;
            let digit = match b {
                b'0'..=b'9' => b - b'0',
                b'a'..=b'f' => b - b'a' + 10,
                b'A'..=b'F' => b - b'A' + 10,
                _ => return Err(Error::JsonParseError),
            };
            v = v * 16 + digit as u16;
        }
        Ok(v)
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value> {
        self.expect(b'[')?;
        let mut items = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Array(items));
        }
        loop {
            items.push(self.parse_value(depth + 1)?);
            self.skip_ws();
            match self.bump() {
                Some(b',') => {
                    self.skip_ws();
                    continue;
                }
                Some(b']') => break,
                _ => return Err(Error::JsonParseError),
            }
        }
        Ok(Value::Array(items))
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value> {
        self.expect(b'{')?;
        let mut obj = Object::new();
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(obj));
        }
        loop {
            self.skip_ws();
            let (name, _) = self.parse_string()?;
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            // Last-wins on duplicate member names (spec §4.3): `Object::insert` already
            // overwrites in place when the name is already present.
            obj.insert(self.keys, &name, value);
            self.skip_ws();
            match self.bump() {
                Some(b',') => continue,
                Some(b'}') => break,
                _ => return Err(Error::JsonParseError),
            }
        }
        Ok(Value::Object(obj))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_nested_structure() {
        let keys = KeyTable::default();
        let (v, depth) = parse(r#"{"a":{"b":[1,2,3]}}"#, &keys, 200).unwrap();
        assert_eq!(depth, 2);
        let inner = v.as_object().unwrap().get("a").unwrap().as_object().unwrap().get("b").unwrap();
        assert_eq!(inner.as_array().unwrap().len(), 3);
    }

    #[test]
    fn preserves_double_text_and_noescape_strings() {
        let keys = KeyTable::default();
        let (v, _) = parse(r#""hello""#, &keys, 200).unwrap();
        match v {
            Value::String { text, noescape } => {
                assert_eq!(&*text, "hello");
                assert!(noescape);
            }
            _ => unreachable!(),
        }

        let (v, _) = parse("22.990", &keys, 200).unwrap();
        assert_eq!(v.as_number().unwrap().to_string(), "22.990");
    }

    #[test]
    fn duplicate_member_names_last_wins() {
        let keys = KeyTable::default();
        let (v, _) = parse(r#"{"a":1,"a":2}"#, &keys, 200).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert_eq!(obj.get("a"), Some(&Value::from(2i64)));
    }

    #[test]
    fn depth_overflow_is_a_distinct_error() {
        let keys = KeyTable::default();
        let nested = "[".repeat(5) + &"]".repeat(5);
        let err = parse(&nested, &keys, 2).unwrap_err();
        assert_eq!(err, Error::ParserRecursionLimitExceeded);
    }

    #[test]
    fn trailing_garbage_is_a_parse_error() {
        let keys = KeyTable::default();
        assert!(parse("1 2", &keys, 200).is_err());
    }
}
