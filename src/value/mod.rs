//! The JSON value tree (spec §3.1/§4.3): a tagged union over null, boolean, number, string,
//! array and object, with a string representation that tracks whether the original text
//! needs escaping on re-serialization.
//!
//! Grounded on the teacher's `doc::heap::HeapNode`/`HeapField` tagged union (`doc/src/heap.rs`),
//! adapted from a multi-representation generic (`AsNode`/`Node<'a, N>`) design to a single
//! concrete owned representation, since this crate has no archived/rkyv counterpart to share
//! an interface with. Container growth goes through [`crate::alloc::Accounting`] rather than
//! a bump arena, per spec §4.1's requirement that every document byte be attributable.

pub mod number;
pub mod object;

use crate::alloc::Accounting;
use crate::error::{Error, Result};
use crate::keytable::Table as KeyTable;
use number::Number;
use object::Object;

/// A JSON value. Strings carry a `noescape` flag (spec §4.2/§4.3): true when the original
/// text contains none of the characters `write_escaped_str` would have to escape, letting
/// the fast serializer copy the bytes verbatim.
/// Deliberately not `Clone`: an object's member handles must be cloned through
/// [`Value::deep_copy`] so the key table's reference counts stay correct. A bitwise
/// `#[derive(Clone)]` here would let two `Value` trees share handles with only one
/// increment between them, and a later `release` on either would over-decrement.
#[derive(Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String { text: Box<str>, noescape: bool },
    Array(Vec<Value>),
    Object(Object),
}

/// The JSON type name of a value, as reported by the `JSON.TYPE` operator (spec §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeName {
    Null,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
}

impl TypeName {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeName::Null => "null",
            TypeName::Boolean => "boolean",
            TypeName::Integer => "integer",
            TypeName::Number => "number",
            TypeName::String => "string",
            TypeName::Array => "array",
            TypeName::Object => "object",
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(if n >= 0 {
            Number::PosInt(n as u64)
        } else {
            Number::NegInt(n)
        })
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(Number::Double { value: n, text: None })
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl Value {
    /// Build a string value, computing its `noescape` flag from the text.
    pub fn string(text: impl Into<Box<str>>) -> Value {
        let text = text.into();
        let noescape = text
            .bytes()
            .all(|b| b >= 0x20 && b != b'"' && b != b'\\' && b < 0x80);
        Value::String { text, noescape }
    }

    /// An empty array.
    pub fn array() -> Value {
        Value::Array(Vec::new())
    }

    /// An empty object.
    pub fn object() -> Value {
        Value::Object(Object::new())
    }

    /// This value's JSON type name, distinguishing integer from general number per the
    /// `JSON.TYPE` operator's legacy behavior (spec §4.6).
    pub fn type_name(&self) -> TypeName {
        match self {
            Value::Null => TypeName::Null,
            Value::Bool(_) => TypeName::Boolean,
            Value::Number(n) if n.is_integral() => TypeName::Integer,
            Value::Number(_) => TypeName::Number,
            Value::String { .. } => TypeName::String,
            Value::Array(_) => TypeName::Array,
            Value::Object(_) => TypeName::Object,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// `as_array_mut`, failing with `WrongType` for use in operator implementations.
    pub fn require_array_mut(&mut self) -> Result<&mut Vec<Value>> {
        let found = self.type_name().as_str();
        self.as_array_mut().ok_or(Error::WrongType { expected: "array", found })
    }

    /// `as_object_mut`, failing with `WrongType` for use in operator implementations.
    pub fn require_object_mut(&mut self) -> Result<&mut Object> {
        let found = self.type_name().as_str();
        self.as_object_mut().ok_or(Error::WrongType { expected: "object", found })
    }

    /// `as_number`, failing with `WrongType`.
    pub fn require_number(&self) -> Result<&Number> {
        let found = self.type_name().as_str();
        self.as_number().ok_or(Error::WrongType { expected: "number", found })
    }

    /// Number of direct children: array length, object member count, or 1 for scalars,
    /// matching the `JSON.OBJLEN`/`JSON.ARRLEN` pairing used by `JSON.DEBUG numfields`.
    pub fn num_fields(&self) -> usize {
        match self {
            Value::Array(a) => a.iter().map(Value::num_fields).sum::<usize>() + a.len(),
            Value::Object(o) => o.iter().map(|(_, v)| v.num_fields()).sum::<usize>() + o.len(),
            _ => 1,
        }
    }

    /// Maximum nesting depth of this value; a scalar has depth 0.
    pub fn depth(&self) -> usize {
        match self {
            Value::Array(a) => 1 + a.iter().map(Value::depth).max().unwrap_or(0),
            Value::Object(o) => 1 + o.iter().map(|(_, v)| v.depth()).max().unwrap_or(0),
            _ => 0,
        }
    }

    /// Deep-copy this value, cloning any interned object-member handles (bumping their
    /// reference counts) through `keys` rather than duplicating key-table entries.
    pub fn deep_copy(&self, keys: &KeyTable) -> Value {
        match self {
            Value::Null => Value::Null,
            Value::Bool(b) => Value::Bool(*b),
            Value::Number(n) => Value::Number(n.clone()),
            Value::String { text, noescape } => Value::String { text: text.clone(), noescape: *noescape },
            Value::Array(a) => Value::Array(a.iter().map(|v| v.deep_copy(keys)).collect()),
            Value::Object(o) => Value::Object(o.deep_copy(keys)),
        }
    }

    /// Release every object-member handle reachable from this value. Must be called before
    /// a value tree containing objects is dropped (see `object::Object`'s `Drop` impl note).
    pub fn release(&mut self, keys: &KeyTable) {
        match self {
            Value::Array(a) => {
                for v in a.iter_mut() {
                    v.release(keys);
                }
            }
            Value::Object(o) => {
                for (_, v) in o.iter_mut() {
                    v.release(keys);
                }
                o.clear(keys);
            }
            _ => {}
        }
    }

    /// Estimated resident byte size of this value, for `JSON.DEBUG memsize` and the
    /// size-limit checks in `ops`/`document`. Containers charge their own overhead plus the
    /// recursive size of children; strings charge their byte length.
    pub fn mem_size(&self) -> usize {
        match self {
            Value::Null | Value::Bool(_) => std::mem::size_of::<Value>(),
            Value::Number(_) => std::mem::size_of::<Value>(),
            Value::String { text, .. } => std::mem::size_of::<Value>() + text.len(),
            Value::Array(a) => {
                std::mem::size_of::<Value>()
                    + a.capacity() * std::mem::size_of::<Value>()
                    + a.iter().map(Value::mem_size).sum::<usize>()
            }
            Value::Object(o) => {
                std::mem::size_of::<Value>()
                    + o.iter().map(|(k, v)| k.len() + v.mem_size()).sum::<usize>()
            }
        }
    }
}

/// Charge `acc` for the estimated size of a freshly built value, used by the parser and by
/// operators that insert new subtrees, so the accounting layer reflects JSON memory even
/// though this crate does not route `Value`'s own heap allocations through `Accounting`
/// (spec §4.1 asks for the document's attributable bytes, not Rust's allocator bookkeeping).
pub fn charge_value(acc: &Accounting, value: &Value) {
    let bytes = value.mem_size();
    let snapshot = acc.begin_track();
    let _ = acc.alloc(bytes);
    let _ = acc.end_track(snapshot);
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn type_name_distinguishes_integer_from_number() {
        assert_eq!(Value::from(7i64).type_name(), TypeName::Integer);
        assert_eq!(Value::from(7.5f64).type_name(), TypeName::Number);
    }

    #[test]
    fn depth_and_num_fields_for_nested_structure() {
        let keys = KeyTable::default();
        let mut obj = Object::new();
        obj.insert(&keys, "a", Value::Array(vec![Value::from(1i64), Value::from(2i64)]));
        let v = Value::Object(obj);
        assert_eq!(v.depth(), 2);
        assert_eq!(v.num_fields(), 3);
    }

    #[test]
    fn string_noescape_flag_set_for_plain_ascii() {
        let v = Value::string("hello");
        match v {
            Value::String { noescape, .. } => assert!(noescape),
            _ => unreachable!(),
        }
        let v = Value::string("a\"b");
        match v {
            Value::String { noescape, .. } => assert!(!noescape),
            _ => unreachable!(),
        }
    }
}
