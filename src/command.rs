//! Typed command surface (spec §6.2): one function per dotted command name, each taking
//! already-parsed arguments and shaping an [`Engine`]/[`Document`] operation into a
//! [`Reply`] the host's wire-protocol adapter can emit. Argument tokenization, ACL/key-spec
//! registration, and replication/AOF propagation all stay on the host side of [`crate::host`];
//! [`dispatch`] is a minimal textual router over these functions for a host that just wants
//! to hand off an already-split command line, not a substitute for the host's own dispatch
//! table.
//!
//! Grounded on the teacher's convention of keeping each top-level command a thin function
//! that calls into the crate's real logic and shapes its own reply, rather than a handler
//! object hierarchy.

use crate::document::Document;
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::ops::{self, OpResult, OpValue, SetOutcome};
use crate::path::{self, Dialect};
use crate::serializer::{self, Mode as SerMode, PrettyStyle};
use crate::value::number::Number;
use crate::value::{TypeName, Value};

/// A shaped reply, independent of any particular wire encoding (spec §6.1's "reply
/// primitives": simple string, bulk string, integer, array, null).
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Integer(i64),
    Double(f64),
    Bulk(String),
    Null,
    Array(Vec<Reply>),
}

/// The wire sentinel an operator's extended-mode output uses for a target it could not
/// apply to (spec §4.6: "wrong-type sentinel... per API"). `SIZE_MAX`/`INT64_MAX` have no
/// RESP integer representation, so both collapse to `i64::MAX` here; only the "which
/// sentinel" choice varies per operator, as in the source.
#[derive(Debug, Clone, Copy)]
enum Sentinel {
    SizeMax,
    Int64Max,
    NegOne,
    Nan,
}

impl Sentinel {
    fn reply(self) -> Reply {
        match self {
            Sentinel::SizeMax | Sentinel::Int64Max => Reply::Integer(i64::MAX),
            Sentinel::NegOne => Reply::Integer(-1),
            Sentinel::Nan => Reply::Double(f64::NAN),
        }
    }
}

fn op_value_reply(v: OpValue) -> Reply {
    match v {
        OpValue::Integer(n) => Reply::Integer(n),
        OpValue::Double(d) => Reply::Double(d),
        OpValue::Bool(b) => Reply::Integer(b as i64),
        OpValue::Str(s) => Reply::Bulk(s),
        OpValue::Null => Reply::Null,
    }
}

fn shape_reply(result: OpResult, sentinel: Sentinel) -> Reply {
    match result {
        OpResult::One(v) => op_value_reply(v),
        OpResult::Many(values) => Reply::Array(
            values
                .into_iter()
                .map(|v| v.map(op_value_reply).unwrap_or_else(|| sentinel.reply()))
                .collect(),
        ),
    }
}

fn parse_mode(newline: Option<&str>, space: Option<&str>, indent: Option<&str>) -> SerMode {
    if newline.is_none() && space.is_none() && indent.is_none() {
        return SerMode::Fast;
    }
    SerMode::Pretty {
        style: PrettyStyle {
            indent: indent.unwrap_or("").to_string(),
            space: space.unwrap_or("").to_string(),
            newline: newline.unwrap_or("").to_string(),
        },
        initial_level: 0,
    }
}

fn is_root_path(engine: &Engine, path_text: &str) -> Result<bool> {
    let path = path::parse(
        path_text,
        engine.config.max_query_string_size(),
        engine.config.max_parser_recursion_depth(),
        engine.config.max_recursive_descent_tokens(),
    )?;
    Ok(path.segments.is_empty())
}

fn fetch_path_value(engine: &Engine, doc: &Document, path_text: &str) -> Result<Value> {
    let path = path::parse(
        path_text,
        engine.config.max_query_string_size(),
        engine.config.max_parser_recursion_depth(),
        engine.config.max_recursive_descent_tokens(),
    )?;
    let (result_set, _) = path::prepare_set(doc.root(), &path, path::Mode::Read)?;
    if path.dialect == Dialect::Legacy {
        let target = result_set.first().ok_or(Error::PathNonExistent)?;
        let v = target.resolve(doc.root()).ok_or(Error::PathNonExistent)?;
        Ok(v.deep_copy(&engine.keys))
    } else {
        let mut arr = Value::array();
        for target in &result_set {
            if let Some(v) = target.resolve(doc.root()) {
                arr.require_array_mut()?.push(v.deep_copy(&engine.keys));
            }
        }
        Ok(arr)
    }
}

/// `JSON.SET key path json [NX|XX]` (spec §6.2). `slot` stands in for the host's key-space
/// entry: `None` when the key does not yet exist, in which case only a root path (`.`/`$`)
/// creates a fresh document — any other path has nothing to apply against.
pub fn set(
    engine: &Engine,
    slot: &mut Option<Document>,
    key_name: &str,
    path_text: &str,
    json_text: &str,
    nx: bool,
    xx: bool,
) -> Result<Reply> {
    if nx && xx {
        return Err(Error::NxXxMisuse);
    }
    match slot {
        None => {
            if !is_root_path(engine, path_text)? {
                return Err(Error::PathNonExistent);
            }
            if xx {
                return Ok(Reply::Null);
            }
            *slot = Some(engine.parse_document(json_text, key_name)?);
            Ok(Reply::Ok)
        }
        Some(doc) => match ops::set(engine, doc, path_text, json_text, nx, xx)? {
            SetOutcome::Written => Ok(Reply::Ok),
            SetOutcome::NxSkipped | SetOutcome::XxSkipped | SetOutcome::NoSuchPath => Ok(Reply::Null),
        },
    }
}

/// `JSON.GET key [NEWLINE s] [SPACE s] [INDENT s] [NOESCAPE] path*` (spec §6.2). `NOESCAPE`
/// is accepted by the host's argument parser and has no effect here (spec's "accepted and
/// ignored"). Zero paths means the whole document; one path returns its value directly;
/// more than one returns an object keyed by the path strings given.
pub fn get(
    engine: &Engine,
    doc: &Document,
    paths: &[&str],
    newline: Option<&str>,
    space: Option<&str>,
    indent: Option<&str>,
) -> Result<Reply> {
    let mode = parse_mode(newline, space, indent);
    let mut out = if paths.is_empty() {
        doc.root().deep_copy(&engine.keys)
    } else if paths.len() == 1 {
        fetch_path_value(engine, doc, paths[0])?
    } else {
        let mut obj = Value::object();
        for p in paths {
            let v = fetch_path_value(engine, doc, p)?;
            obj.require_object_mut()?.insert(&engine.keys, p, v);
        }
        obj
    };
    let (text, _) = serializer::serialize(&out, &mode);
    out.release(&engine.keys);
    Ok(Reply::Bulk(text))
}

/// `JSON.MGET key+ path` (spec §6.2): per-key fetch of a shared path; a key with no document
/// (or whose document doesn't have the path) replies null at that position rather than
/// failing the whole command.
pub fn mget<'a>(engine: &Engine, docs: impl Iterator<Item = Option<&'a Document>>, path_text: &str) -> Result<Reply> {
    let mut slots = Vec::new();
    for doc in docs {
        let reply = match doc {
            None => Reply::Null,
            Some(doc) => match fetch_path_value(engine, doc, path_text) {
                Ok(mut v) => {
                    let (text, _) = serializer::serialize(&v, &SerMode::Fast);
                    v.release(&engine.keys);
                    Reply::Bulk(text)
                }
                Err(e) if e.is_syntax() => return Err(e),
                Err(_) => Reply::Null,
            },
        };
        slots.push(reply);
    }
    Ok(Reply::Array(slots))
}

/// `JSON.DEL key [path]` / `JSON.FORGET key [path]` (spec §6.2). A root path (or `None`
/// slot contents) deletes the whole key; `slot` is taken so the host can drop it.
pub fn del(engine: &Engine, slot: &mut Option<Document>, key_name: &str, path_text: &str) -> Result<Reply> {
    let Some(doc) = slot else { return Ok(Reply::Integer(0)) };
    if is_root_path(engine, path_text)? {
        let mut removed = slot.take().unwrap();
        engine.destroy_document(&mut removed, key_name);
        return Ok(Reply::Integer(1));
    }
    let n = ops::del(engine, doc, path_text)?;
    Ok(Reply::Integer(n as i64))
}

pub fn numincrby(engine: &Engine, doc: &mut Document, path_text: &str, delta: &Number) -> Result<Reply> {
    Ok(shape_reply(ops::numincrby(engine, doc, path_text, delta)?, Sentinel::Nan))
}

pub fn nummultby(engine: &Engine, doc: &mut Document, path_text: &str, factor: &Number) -> Result<Reply> {
    Ok(shape_reply(ops::nummultby(engine, doc, path_text, factor)?, Sentinel::Nan))
}

pub fn toggle(engine: &Engine, doc: &mut Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::toggle(engine, doc, path_text)?, Sentinel::Int64Max))
}

pub fn strappend(engine: &Engine, doc: &mut Document, path_text: &str, suffix: &str) -> Result<Reply> {
    Ok(shape_reply(ops::strappend(engine, doc, path_text, suffix)?, Sentinel::SizeMax))
}

pub fn strlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::strlen(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn objlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::objlen(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn objkeys(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    let keys = ops::objkeys(engine, doc, path_text)?;
    Ok(Reply::Array(keys.into_iter().map(Reply::Bulk).collect()))
}

pub fn arrlen(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::arrlen(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn arrappend(engine: &Engine, doc: &mut Document, path_text: &str, values: &[&str]) -> Result<Reply> {
    Ok(shape_reply(ops::arrappend(engine, doc, path_text, values)?, Sentinel::SizeMax))
}

pub fn arrpop(engine: &Engine, doc: &mut Document, path_text: &str, index: i64) -> Result<Reply> {
    Ok(shape_reply(ops::arrpop(engine, doc, path_text, index)?, Sentinel::NegOne))
}

pub fn arrinsert(engine: &Engine, doc: &mut Document, path_text: &str, index: i64, values: &[&str]) -> Result<Reply> {
    Ok(shape_reply(ops::arrinsert(engine, doc, path_text, index, values)?, Sentinel::SizeMax))
}

pub fn arrtrim(engine: &Engine, doc: &mut Document, path_text: &str, start: i64, stop: i64) -> Result<Reply> {
    Ok(shape_reply(ops::arrtrim(engine, doc, path_text, start, stop)?, Sentinel::SizeMax))
}

pub fn arrindex(engine: &Engine, doc: &Document, path_text: &str, needle: &str, start: i64, stop: i64) -> Result<Reply> {
    Ok(shape_reply(ops::arrindex(engine, doc, path_text, needle, start, stop)?, Sentinel::NegOne))
}

pub fn clear(engine: &Engine, doc: &mut Document, path_text: &str) -> Result<Reply> {
    let n = ops::clear(engine, doc, path_text)?;
    Ok(Reply::Integer(n as i64))
}

fn type_name_reply(t: TypeName) -> Reply {
    Reply::Bulk(t.as_str().to_string())
}

pub fn type_of(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    let types = ops::type_of(engine, doc, path_text)?;
    Ok(Reply::Array(types.into_iter().map(|t| t.map(type_name_reply).unwrap_or(Reply::Null)).collect()))
}

/// `JSON.RESP key [path]` (spec §6.2): echoes the document structurally (object → array
/// headed by a marker, scalars as themselves) rather than as a JSON string. Modeled here as
/// a plain value tree; the host's RESP adapter decides the actual wire framing.
pub fn resp(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    let mut v = fetch_path_value(engine, doc, path_text)?;
    let reply = resp_reply(&v);
    v.release(&engine.keys);
    Ok(reply)
}

fn resp_reply(v: &Value) -> Reply {
    match v {
        Value::Null => Reply::Null,
        Value::Bool(b) => Reply::Bulk(b.to_string()),
        Value::Number(n) => n.as_i64().map(Reply::Integer).unwrap_or_else(|| Reply::Double(n.as_f64())),
        Value::String { text, .. } => Reply::Bulk(text.to_string()),
        Value::Array(items) => {
            let mut out = vec![Reply::Bulk("[".to_string())];
            out.extend(items.iter().map(resp_reply));
            Reply::Array(out)
        }
        Value::Object(obj) => {
            let mut out = vec![Reply::Bulk("{".to_string())];
            for (name, value) in obj.iter() {
                out.push(Reply::Bulk(name.to_string()));
                out.push(resp_reply(value));
            }
            Reply::Array(out)
        }
    }
}

pub fn debug_memory(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::memsize(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn debug_fields(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::numfields(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn debug_depth(engine: &Engine, doc: &Document, path_text: &str) -> Result<Reply> {
    Ok(shape_reply(ops::depth(engine, doc, path_text)?, Sentinel::SizeMax))
}

pub fn debug_help() -> Reply {
    Reply::Array(
        [
            "MEMORY <key> [path] -- report the estimated size of the value at path",
            "FIELDS <key> [path] -- report the number of fields in the value at path",
            "DEPTH <key> [path] -- report the nesting depth of the value at path",
            "MAX-DEPTH-KEY -- report the key holding the deepest document ever seen",
            "MAX-SIZE-KEY -- report the key holding the largest document ever seen",
            "KEYTABLE-CHECK -- validate key-table internal invariants",
            "KEYTABLE-CORRUPT -- (diagnostic only) corrupt a key-table entry",
            "KEYTABLE-DISTRIBUTION -- report per-shard run-length distribution",
        ]
        .into_iter()
        .map(|s| Reply::Bulk(s.to_string()))
        .collect(),
    )
}

pub fn debug_max_depth_key(engine: &Engine) -> Reply {
    let k = engine.stats.max_depth_key();
    Reply::Array(vec![k.key.map(Reply::Bulk).unwrap_or(Reply::Null), Reply::Integer(k.value as i64)])
}

pub fn debug_max_size_key(engine: &Engine) -> Reply {
    let k = engine.stats.max_size_key();
    Reply::Array(vec![k.key.map(Reply::Bulk).unwrap_or(Reply::Null), Reply::Integer(k.value as i64)])
}

/// `JSON.DEBUG KEYTABLE-DISTRIBUTION` (spec §6.2): a diagnostic-only scan, best-effort under
/// concurrent mutation per spec §5's suspension-point note.
pub fn debug_keytable_distribution(engine: &Engine) -> Reply {
    let stats = engine.keys.stats();
    Reply::Array(vec![
        Reply::Integer(stats.num_shards as i64),
        Reply::Integer(stats.total_entries as i64),
        Reply::Integer(stats.total_handles as i64),
        Reply::Integer(stats.stuck_entries as i64),
    ])
}

/// A minimal textual command router for a host that hands off an already-tokenized command
/// line. Real argument parsing (quoting, option flags beyond what's modeled here) stays on
/// the host side; this exists only to exercise the typed calls above end-to-end.
pub fn dispatch(engine: &Engine, slot: &mut Option<Document>, key_name: &str, args: &[&str]) -> Result<Reply> {
    let Some((&cmd, rest)) = args.split_first() else {
        return Err(Error::WrongArity);
    };
    tracing::debug!(key = key_name, command = cmd, "command dispatch");
    match cmd.to_ascii_uppercase().as_str() {
        "SET" => {
            let [path, json, flag @ ..] = rest else { return Err(Error::WrongArity) };
            let nx = flag.first().map(|s| s.eq_ignore_ascii_case("NX")).unwrap_or(false);
            let xx = flag.first().map(|s| s.eq_ignore_ascii_case("XX")).unwrap_or(false);
            set(engine, slot, key_name, path, json, nx, xx)
        }
        "GET" => {
            let path = rest.first().copied().unwrap_or("$");
            let Some(doc) = slot else { return Ok(Reply::Null) };
            get(engine, doc, &[path], None, None, None)
        }
        "DEL" | "FORGET" => {
            let path = rest.first().copied().unwrap_or("$");
            del(engine, slot, key_name, path)
        }
        "TYPE" => {
            let path = rest.first().copied().unwrap_or("$");
            let Some(doc) = slot else { return Ok(Reply::Null) };
            type_of(engine, doc, path)
        }
        _ => Err(Error::UnknownSubcommand(cmd.to_string())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::Config;

    fn engine() -> Engine {
        Engine::new(Config::default())
    }

    #[test]
    fn set_creates_new_document_at_root_only() {
        let e = engine();
        let mut slot: Option<Document> = None;
        let reply = set(&e, &mut slot, "k", ".", r#"{"a":1}"#, false, false).unwrap();
        assert_eq!(reply, Reply::Ok);
        assert!(slot.is_some());

        let mut slot2: Option<Document> = None;
        let err = set(&e, &mut slot2, "k2", ".a", "1", false, false).unwrap_err();
        assert!(matches!(err, Error::PathNonExistent));
    }

    #[test]
    fn get_single_path_returns_bulk_value() {
        let e = engine();
        let doc = e.parse_document(r#"{"a":{"b":7}}"#, "k").unwrap();
        let reply = get(&e, &doc, &[".a.b"], None, None, None).unwrap();
        assert_eq!(reply, Reply::Bulk("7".to_string()));
    }

    #[test]
    fn del_whole_key_clears_slot() {
        let e = engine();
        let mut slot = Some(e.parse_document(r#"{"a":1}"#, "k").unwrap());
        let reply = del(&e, &mut slot, "k", "$").unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert!(slot.is_none());
    }

    #[test]
    fn dispatch_routes_set_and_get() {
        let e = engine();
        let mut slot: Option<Document> = None;
        dispatch(&e, &mut slot, "k", &["SET", ".", "{\"x\":1}"]).unwrap();
        let reply = dispatch(&e, &mut slot, "k", &["GET", ".x"]).unwrap();
        assert_eq!(reply, Reply::Bulk("1".to_string()));
    }

    #[test]
    fn extended_dialect_missing_target_uses_sentinel() {
        let e = engine();
        let mut doc = e.parse_document(r#"{"a":"x","b":1}"#, "k").unwrap();
        let reply = numincrby(&e, &mut doc, "$.*", &Number::PosInt(1)).unwrap();
        match reply {
            Reply::Array(items) => {
                assert!(items.iter().any(|r| matches!(r, Reply::Double(d) if d.is_nan())));
            }
            other => panic!("expected array, got {other:?}"),
        }
    }
}
