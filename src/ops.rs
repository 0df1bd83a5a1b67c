//! Mutation and read operators (spec §4.6): `set/del/incr/mult/toggle/strappend/arr*/clear`
//! plus the read-only introspection operators (`type/resp/memsize/numfields/depth`). Every
//! operator dispatches through [`crate::path`]'s selector and shapes its result according to
//! the path's dialect: legacy yields a single value (or an error), extended yields a
//! per-target array where a mismatched target becomes `None` (the command layer maps this to
//! the wire sentinel appropriate to that operator: `SIZE_MAX`, `INT64_MAX`, `-1`, or `NaN`).
//!
//! Grounded on the teacher's pattern of small, independently testable operator functions over
//! a shared document type (`doc::Document`'s method surface), generalized here to route every
//! mutation through the selector's two-phase commit protocol instead of a single fixed path.

use crate::document::Document;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::parser;
use crate::path::{self, ast, Mode};
use crate::value::number::Number;
use crate::value::{TypeName, Value};

/// One operator result value, independent of any particular wire encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum OpValue {
    Integer(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Null,
}

/// An operator's shaped output: a single legacy-dialect value, or one slot per
/// extended-dialect target (`None` marking a target the operator could not apply to).
#[derive(Debug, Clone, PartialEq)]
pub enum OpResult {
    One(OpValue),
    Many(Vec<Option<OpValue>>),
}

fn parse_path(engine: &Engine, text: &str) -> Result<ast::Path> {
    path::parse(
        text,
        engine.config.max_query_string_size(),
        engine.config.max_parser_recursion_depth(),
        engine.config.max_recursive_descent_tokens(),
    )
}

fn shape(dialect: ast::Dialect, values: Vec<Option<OpValue>>) -> Result<OpResult> {
    if dialect == ast::Dialect::Legacy {
        match values.into_iter().next() {
            Some(Some(v)) => Ok(OpResult::One(v)),
            Some(None) | None => Err(Error::PathNonExistent),
        }
    } else {
        Ok(OpResult::Many(values))
    }
}

/// What `set` actually did, so the command layer can shape the `SET` reply (`OK` vs. null
/// for a failed `NX`/`XX`) without re-deriving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Written,
    NxSkipped,
    XxSkipped,
    NoSuchPath,
}

/// `JSON.SET key path json [NX|XX]` (spec §4.6, §6.2). Assumes `doc` already exists; creating
/// a brand-new root document for an absent key is the command layer's responsibility (spec
/// §6.2's "root-only for new keys").
pub fn set(engine: &Engine, doc: &mut Document, path_text: &str, json_text: &str, nx: bool, xx: bool) -> Result<SetOutcome> {
    let path = parse_path(engine, path_text)?;
    let mode = match (nx, xx) {
        (true, true) => return Err(Error::NxXxMisuse),
        (true, false) => Mode::Insert,
        (false, true) => Mode::Update,
        (false, false) => Mode::InsertOrUpdate,
    };

    let (result_set, insert_set) = path::prepare_set(doc.root(), &path, mode)?;
    let outcome = match mode {
        Mode::Insert if !result_set.is_empty() => SetOutcome::NxSkipped,
        Mode::Update if result_set.is_empty() => SetOutcome::XxSkipped,
        _ if result_set.is_empty() && insert_set.is_empty() => SetOutcome::NoSuchPath,
        _ => SetOutcome::Written,
    };
    if outcome != SetOutcome::Written {
        return Ok(outcome);
    }

    let snapshot = engine.alloc.begin_track();
    let (new_value, _depth) = parser::parse(json_text, &engine.keys, engine.config.max_parser_recursion_depth())?;
    let _ = engine.alloc.alloc(new_value.mem_size());
    let _ = engine.alloc.end_track(snapshot);

    let mut projected_depth = doc.root().depth();
    for target in result_set.iter().chain(insert_set.iter()) {
        projected_depth = projected_depth.max(target.depth() + new_value.depth());
    }
    if projected_depth > engine.config.max_path_limit() {
        return Err(Error::DocumentPathLimitExceeded);
    }

    path::commit(doc.root_mut(), &engine.keys, &result_set, &insert_set, &new_value)?;
    doc.refresh_size();
    if engine.config.max_document_size() != 0 && doc.size() > engine.config.max_document_size() {
        return Err(Error::DocumentSizeLimitExceeded);
    }
    engine.stats.insert_histogram.observe(new_value.mem_size() as u64);
    Ok(SetOutcome::Written)
}

/// `JSON.DEL key [path]` (spec §4.6, §6.2). Returns the number of values removed.
pub fn del(engine: &Engine, doc: &mut Document, path_text: &str) -> Result<usize> {
    let path = parse_path(engine, path_text)?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Delete)?;
    let n = path::delete(doc.root_mut(), &engine.keys, result_set);
    if n > 0 {
        doc.refresh_size();
        engine.stats.delete_histogram.observe(n as u64);
    }
    Ok(n)
}

fn numeric_targets(doc: &Document, path: &ast::Path) -> Result<Vec<path::PointerPath>> {
    let (result_set, _) = path::prepare_set(doc.root(), path, Mode::Read)?;
    Ok(result_set)
}

fn apply_numeric_op(
    engine: &Engine,
    doc: &mut Document,
    path_text: &str,
    operand: &Number,
    op: fn(&Number, &Number) -> Option<Number>,
    overflow: Error,
) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let Some(current) = target.resolve(doc.root()) else { out.push(None); continue };
        let Some(n) = current.as_number() else { out.push(None); continue };
        match op(n, operand) {
            Some(result) => out.push(Some(result)),
            None => {
                if path.dialect == ast::Dialect::Legacy {
                    return Err(overflow);
                }
                out.push(None);
            }
        }
    }
    for (target, new_n) in targets.iter().zip(out.iter()) {
        if let Some(n) = new_n {
            if let Some(slot) = target.resolve_mut(doc.root_mut()) {
                *slot = Value::Number(n.clone());
            }
        }
    }
    doc.refresh_size();
    let values = out
        .into_iter()
        .map(|n| n.map(|n| n.as_i64().map(OpValue::Integer).unwrap_or_else(|| OpValue::Double(n.as_f64()))))
        .collect();
    shape(path.dialect, values)
}

/// `JSON.NUMINCRBY key path n` (spec §4.6, §6.2).
pub fn numincrby(engine: &Engine, doc: &mut Document, path_text: &str, delta: &Number) -> Result<OpResult> {
    apply_numeric_op(engine, doc, path_text, delta, Number::checked_add, Error::AdditionOverflow)
}

/// `JSON.NUMMULTBY key path n` (spec §4.6, §6.2).
pub fn nummultby(engine: &Engine, doc: &mut Document, path_text: &str, factor: &Number) -> Result<OpResult> {
    apply_numeric_op(engine, doc, path_text, factor, Number::checked_mul, Error::MultiplicationOverflow)
}

/// `JSON.TOGGLE key [path]` (spec §4.6, §6.2): flips booleans in place; non-boolean targets
/// become `None` in extended output (wrong-type sentinel at the command layer).
pub fn toggle(engine: &Engine, doc: &mut Document, path_text: &str) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let flipped = target.resolve(doc.root()).and_then(Value::as_bool).map(|b| !b);
        out.push(flipped);
    }
    for (target, flipped) in targets.iter().zip(out.iter()) {
        if let Some(b) = flipped {
            if let Some(slot) = target.resolve_mut(doc.root_mut()) {
                *slot = Value::Bool(*b);
            }
        }
    }
    let values = out.into_iter().map(|b| b.map(OpValue::Bool)).collect();
    shape(path.dialect, values)
}

/// `JSON.STRAPPEND key path str` (spec §4.6): concatenates into a fresh heap string.
pub fn strappend(engine: &Engine, doc: &mut Document, path_text: &str, suffix: &str) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut lengths = Vec::with_capacity(targets.len());
    for target in &targets {
        let current = target.resolve(doc.root()).and_then(Value::as_str).map(|s| s.to_string());
        lengths.push(current.map(|s| s + suffix));
    }
    for (target, new_text) in targets.iter().zip(lengths.iter()) {
        if let Some(text) = new_text {
            if let Some(slot) = target.resolve_mut(doc.root_mut()) {
                *slot = Value::string(text.clone());
            }
        }
    }
    doc.refresh_size();
    let values = lengths.into_iter().map(|t| t.map(|t| OpValue::Integer(t.len() as i64))).collect();
    shape(path.dialect, values)
}

fn read_only_scalar<F>(engine: &Engine, doc: &Document, path_text: &str, f: F) -> Result<OpResult>
where
    F: Fn(&Value) -> Option<OpValue>,
{
    let path = parse_path(engine, path_text)?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Read)?;
    let values = result_set.iter().map(|p| p.resolve(doc.root()).and_then(&f)).collect();
    shape(path.dialect, values)
}

/// `JSON.STRLEN key [path]`.
pub fn strlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| v.as_str().map(|s| OpValue::Integer(s.len() as i64)))
}

/// `JSON.OBJLEN key [path]`.
pub fn objlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| v.as_object().map(|o| OpValue::Integer(o.len() as i64)))
}

/// `JSON.OBJKEYS key [path]`: member names of the (single) target object, in insertion order.
pub fn objkeys(engine: &Engine, doc: &Document, path_text: &str) -> Result<Vec<String>> {
    let path = parse_path(engine, path_text)?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Read)?;
    let target = result_set.first().ok_or(Error::PathNonExistent)?;
    let value = target.resolve(doc.root()).ok_or(Error::PathNonExistent)?;
    let found = value.type_name().as_str();
    let obj = value.as_object().ok_or(Error::WrongType { expected: "object", found })?;
    Ok(obj.iter().map(|(k, _)| k.to_string()).collect())
}

/// `JSON.ARRLEN key [path]`.
pub fn arrlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| v.as_array().map(|a| OpValue::Integer(a.len() as i64)))
}

/// `JSON.ARRAPPEND key path value+` (spec §4.6): appends a copy of each parsed value to every
/// target array, returning the new length per target.
pub fn arrappend(engine: &Engine, doc: &mut Document, path_text: &str, values_text: &[&str]) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut parsed = Vec::with_capacity(values_text.len());
    for text in values_text {
        let (v, _) = parser::parse(text, &engine.keys, engine.config.max_parser_recursion_depth())?;
        parsed.push(v);
    }

    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let is_array = target.resolve(doc.root()).map(|v| matches!(v, Value::Array(_))).unwrap_or(false);
        if !is_array {
            out.push(None);
            continue;
        }
        let slot = target.resolve_mut(doc.root_mut()).expect("resolved above");
        let arr = slot.require_array_mut()?;
        for v in &parsed {
            arr.push(v.deep_copy(&engine.keys));
        }
        out.push(Some(OpValue::Integer(arr.len() as i64)));
    }
    doc.refresh_size();
    shape(path.dialect, out)
}

/// `JSON.ARRPOP key [path [index]]` (spec §4.6): removes and returns the element at `index`
/// (defaulting to the last, negative indices counting from the end) from each target array.
pub fn arrpop(engine: &Engine, doc: &mut Document, path_text: &str, index: i64) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let Some(Value::Array(_)) = target.resolve(doc.root()) else { out.push(None); continue };
        let slot = target.resolve_mut(doc.root_mut()).expect("resolved above");
        let arr = slot.require_array_mut()?;
        if arr.is_empty() {
            out.push(None);
            continue;
        }
        let resolved = if index < 0 { arr.len() as i64 + index } else { index };
        if resolved < 0 || resolved as usize >= arr.len() {
            out.push(None);
            continue;
        }
        let mut removed = arr.remove(resolved as usize);
        let text = crate::serializer::serialize(&removed, &crate::serializer::Mode::Fast).0;
        removed.release(&engine.keys);
        out.push(Some(OpValue::Str(text)));
    }
    doc.refresh_size();
    shape(path.dialect, out)
}

/// `JSON.ARRINSERT key path index value+` (spec §4.6): inserts copies of each parsed value
/// before `index` (which may be negative) in every target array.
pub fn arrinsert(engine: &Engine, doc: &mut Document, path_text: &str, index: i64, values_text: &[&str]) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut parsed = Vec::with_capacity(values_text.len());
    for text in values_text {
        let (v, _) = parser::parse(text, &engine.keys, engine.config.max_parser_recursion_depth())?;
        parsed.push(v);
    }

    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let Some(Value::Array(_)) = target.resolve(doc.root()) else { out.push(None); continue };
        let slot = target.resolve_mut(doc.root_mut()).expect("resolved above");
        let arr = slot.require_array_mut()?;
        let resolved = if index < 0 { arr.len() as i64 + index } else { index };
        if resolved < 0 || resolved as usize > arr.len() {
            return Err(Error::IndexOutOfBounds);
        }
        let mut at = resolved as usize;
        for v in &parsed {
            arr.insert(at, v.deep_copy(&engine.keys));
            at += 1;
        }
        out.push(Some(OpValue::Integer(arr.len() as i64)));
    }
    doc.refresh_size();
    shape(path.dialect, out)
}

/// `JSON.ARRTRIM key path start stop` (spec §4.6): clamps bounds into range; an inverted
/// range (`start > stop`) empties the array rather than erroring.
pub fn arrtrim(engine: &Engine, doc: &mut Document, path_text: &str, start: i64, stop: i64) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let targets = numeric_targets(doc, &path)?;
    let mut out = Vec::with_capacity(targets.len());
    for target in &targets {
        let Some(Value::Array(_)) = target.resolve(doc.root()) else { out.push(None); continue };
        let slot = target.resolve_mut(doc.root_mut()).expect("resolved above");
        let arr = slot.require_array_mut()?;
        let len = arr.len() as i64;
        let clamp = |v: i64| -> i64 {
            let v = if v < 0 { (len + v).max(0) } else { v };
            v.min(len)
        };
        let (s, e) = (clamp(start), clamp(stop));
        if s >= e || arr.is_empty() {
            for mut v in arr.drain(..) {
                v.release(&engine.keys);
            }
        } else {
            for mut v in arr.drain(..s as usize) {
                v.release(&engine.keys);
            }
            let new_len = (e - s) as usize;
            for mut v in arr.drain(new_len..) {
                v.release(&engine.keys);
            }
        }
        out.push(Some(OpValue::Integer(arr.len() as i64)));
    }
    doc.refresh_size();
    shape(path.dialect, out)
}

/// `JSON.ARRINDEX key path value [start [stop]]` (spec §4.6, §9): `stop == 0` is treated as
/// "include last element" (synonymous with `stop == -1`), preserved verbatim from the source
/// per spec §9's open question on this exact ambiguity.
pub fn arrindex(engine: &Engine, doc: &Document, path_text: &str, needle_text: &str, start: i64, stop: i64) -> Result<OpResult> {
    let path = parse_path(engine, path_text)?;
    let (needle, _) = parser::parse(needle_text, &engine.keys, engine.config.max_parser_recursion_depth())?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Read)?;
    let mut out = Vec::with_capacity(result_set.len());
    for target in &result_set {
        let Some(Value::Array(arr)) = target.resolve(doc.root()) else { out.push(None); continue };
        let len = arr.len() as i64;
        let stop = if stop == 0 { -1 } else { stop };
        let normalize = |v: i64| -> i64 { if v < 0 { (len + v).max(0) } else { v.min(len) } };
        let s = normalize(start) as usize;
        let e = if stop < 0 { (len + stop + 1).max(0) as usize } else { normalize(stop) as usize };
        let hi = e.clamp(s, arr.len());
        let found = arr[s..hi].iter().position(|v| *v == needle);
        out.push(Some(OpValue::Integer(found.map(|i| (i + s) as i64).unwrap_or(-1))));
    }
    shape(path.dialect, out)
}

/// `JSON.CLEAR key [path]` (spec §4.6): resets scalars to type-appropriate zero and empties
/// containers; returns the count of values actually changed.
pub fn clear(engine: &Engine, doc: &mut Document, path_text: &str) -> Result<usize> {
    let path = parse_path(engine, path_text)?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Read)?;
    let mut changed = 0;
    for target in &result_set {
        let Some(slot) = target.resolve_mut(doc.root_mut()) else { continue };
        let did_change = match slot {
            Value::Number(n) if !matches!(n, Number::PosInt(0)) => {
                *slot = Value::from(0i64);
                true
            }
            Value::Bool(b) if *b => {
                *slot = Value::Bool(false);
                true
            }
            Value::String { text, .. } if !text.is_empty() => {
                *slot = Value::string("");
                true
            }
            Value::Array(a) if !a.is_empty() => {
                for mut v in a.drain(..) {
                    v.release(&engine.keys);
                }
                true
            }
            Value::Object(o) if !o.is_empty() => {
                o.clear(&engine.keys);
                true
            }
            _ => false,
        };
        if did_change {
            changed += 1;
        }
    }
    if changed > 0 {
        doc.refresh_size();
    }
    Ok(changed)
}

/// `JSON.TYPE key [path]`.
pub fn type_of(engine: &Engine, doc: &Document, path_text: &str) -> Result<Vec<Option<TypeName>>> {
    let path = parse_path(engine, path_text)?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, Mode::Read)?;
    Ok(result_set.iter().map(|p| p.resolve(doc.root()).map(Value::type_name)).collect())
}

/// `JSON.DEBUG MEMSIZE key [path]`.
pub fn memsize(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| Some(OpValue::Integer(v.mem_size() as i64)))
}

/// `JSON.DEBUG FIELDS key [path]`.
pub fn numfields(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| Some(OpValue::Integer(v.num_fields() as i64)))
}

/// `JSON.DEBUG DEPTH key [path]`.
pub fn depth(engine: &Engine, doc: &Document, path_text: &str) -> Result<OpResult> {
    read_only_scalar(engine, doc, path_text, |v| Some(OpValue::Integer(v.depth() as i64)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn engine() -> Engine {
        Engine::new(Config::default())
    }

    #[test]
    fn set_then_get_roundtrips() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"a":{"b":[1,2,3]}}"#, "k").unwrap();
        let outcome = set(&e, &mut doc, "$.a.b[1]", "7", false, false).unwrap();
        assert_eq!(outcome, SetOutcome::Written);
        assert_eq!(doc.root().as_object().unwrap().get("a").unwrap().as_object().unwrap().get("b").unwrap().as_array().unwrap()[1], Value::from(7i64));
    }

    #[test]
    fn nx_skips_existing_path() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"x":1,"y":2}"#, "k").unwrap();
        assert_eq!(set(&e, &mut doc, ".z", "3", true, false).unwrap(), SetOutcome::Written);
        assert_eq!(set(&e, &mut doc, ".z", "4", true, false).unwrap(), SetOutcome::NxSkipped);
        assert_eq!(doc.root().as_object().unwrap().get("z"), Some(&Value::from(3i64)));
    }

    #[test]
    fn xx_skips_missing_path() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"x":1,"y":2}"#, "k").unwrap();
        assert_eq!(set(&e, &mut doc, ".w", "5", false, true).unwrap(), SetOutcome::XxSkipped);
        assert!(doc.root().as_object().unwrap().get("w").is_none());
    }

    #[test]
    fn numincrby_updates_in_place() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"a":{"b":[1,2,3]}}"#, "k").unwrap();
        let result = numincrby(&e, &mut doc, ".a.b[1]", &Number::PosInt(5)).unwrap();
        assert_eq!(result, OpResult::One(OpValue::Integer(7)));
    }

    #[test]
    fn arrtrim_inverted_range_empties() {
        let e = engine();
        let mut doc = e.parse_document("[1,2,3,4,5]", "k").unwrap();
        let r = arrtrim(&e, &mut doc, "$", 3, 1).unwrap();
        assert_eq!(r, OpResult::Many(vec![Some(OpValue::Integer(0))]));
    }

    #[test]
    fn arrtrim_clamps_out_of_range() {
        let e = engine();
        let mut doc = e.parse_document("[1,2,3,4,5]", "k").unwrap();
        let r = arrtrim(&e, &mut doc, "$", -10, 100).unwrap();
        assert_eq!(r, OpResult::Many(vec![Some(OpValue::Integer(5))]));
    }

    #[test]
    fn del_removes_deepest_first() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"a":[1,2,3]}"#, "k").unwrap();
        let n = del(&e, &mut doc, ".a").unwrap();
        assert_eq!(n, 1);
        assert!(doc.root().as_object().unwrap().get("a").is_none());
    }
}
