//! Value-to-text serialization (spec §4.4): a fast mode with no formatting overhead, and a
//! pretty mode with caller-supplied indent/space/newline strings.
//!
//! Grounded on the teacher's `doc::ser::SerPolicy` (policy-driven serialization reused across
//! multiple node representations); here there is only one representation (`value::Value`), so
//! the policy collapses to a mode enum, but the fast-path idea — skip escaping/formatting work
//! when the source already proved it's unnecessary — carries over directly.

use std::fmt::Write as _;

use crate::value::object::Object;
use crate::value::Value;

/// Pretty-printing layout, mirroring spec §4.4's `{indent, space, newline}` triple.
#[derive(Debug, Clone, Default)]
pub struct PrettyStyle {
    pub indent: String,
    pub space: String,
    pub newline: String,
}

/// Serialization mode.
#[derive(Debug, Clone)]
pub enum Mode {
    /// No formatting; no-escape strings and original-text doubles are emitted verbatim.
    Fast,
    /// Caller-controlled indentation, starting at `initial_level`.
    Pretty { style: PrettyStyle, initial_level: usize },
}

/// Serializes `value` under `mode`, returning the text and the maximum nesting depth seen.
pub fn serialize(value: &Value, mode: &Mode) -> (String, usize) {
    let mut out = String::new();
    let initial_level = match mode {
        Mode::Fast => 0,
        Mode::Pretty { initial_level, .. } => *initial_level,
    };
    let mut max_depth = 0;
    write_value(&mut out, value, mode, initial_level, &mut max_depth);
    (out, max_depth)
}

fn write_value(out: &mut String, value: &Value, mode: &Mode, level: usize, max_depth: &mut usize) {
    *max_depth = (*max_depth).max(level);
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String { text, noescape } => write_string(out, text, *noescape),
        Value::Array(items) => write_array(out, items, mode, level, max_depth),
        Value::Object(obj) => write_object(out, obj, mode, level, max_depth),
    }
}

fn write_string(out: &mut String, text: &str, noescape: bool) {
    out.push('"');
    if noescape {
        out.push_str(text);
    } else {
        write_escaped_str(out, text);
    }
    out.push('"');
}

/// Escapes `text` per JSON string rules; used whenever the `noescape` fast path doesn't apply.
fn write_escaped_str(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
}

fn indent_for(mode: &Mode, level: usize, out: &mut String) {
    if let Mode::Pretty { style, .. } = mode {
        out.push_str(&style.newline);
        for _ in 0..level {
            out.push_str(&style.indent);
        }
    }
}

fn write_array(out: &mut String, items: &[Value], mode: &Mode, level: usize, max_depth: &mut usize) {
    out.push('[');
    if items.is_empty() {
        out.push(']');
        return;
    }
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        indent_for(mode, level + 1, out);
        write_value(out, item, mode, level + 1, max_depth);
    }
    indent_for(mode, level, out);
    out.push(']');
}

fn write_object(out: &mut String, obj: &Object, mode: &Mode, level: usize, max_depth: &mut usize) {
    out.push('{');
    if obj.is_empty() {
        out.push('}');
        return;
    }
    for (i, (name, value)) in obj.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        indent_for(mode, level + 1, out);
        // Object member names are always re-escaped: the key table does not retain enough
        // context to know whether a name was originally quoted with escapes, so names take
        // the same escaping path as a `noescape: false` string.
        write_string(out, name, name.bytes().all(|b| b >= 0x20 && b != b'"' && b != b'\\' && b < 0x80));
        out.push(':');
        if let Mode::Pretty { style, .. } = mode {
            out.push_str(&style.space);
        }
        write_value(out, value, mode, level + 1, max_depth);
    }
    indent_for(mode, level, out);
    out.push('}');
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keytable::Table as KeyTable;

    #[test]
    fn fast_mode_emits_noescape_strings_verbatim() {
        let v = Value::string("hello");
        let (text, _) = serialize(&v, &Mode::Fast);
        assert_eq!(text, "\"hello\"");
    }

    #[test]
    fn fast_mode_preserves_original_double_text() {
        let v = Value::Number(crate::value::number::Number::parse("22.990").unwrap());
        let (text, _) = serialize(&v, &Mode::Fast);
        assert_eq!(text, "22.990");
    }

    #[test]
    fn pretty_mode_applies_style() {
        let keys = KeyTable::default();
        let mut obj = Object::new();
        obj.insert(&keys, "a", Value::from(1i64));
        let v = Value::Object(obj);
        let style = PrettyStyle { indent: "  ".into(), space: " ".into(), newline: "\n".into() };
        let (text, _) = serialize(&v, &Mode::Pretty { style, initial_level: 0 });
        assert_eq!(text, "{\n  \"a\": 1\n}");
    }

    #[test]
    fn escapes_control_and_quote_characters() {
        let v = Value::string("a\"b\nc");
        let (text, _) = serialize(&v, &Mode::Fast);
        assert_eq!(text, "\"a\\\"b\\nc\"");
    }
}
