//! End-to-end scenarios (spec §8: S1-S6) and the ten universal invariants, exercised
//! through the public `command`/`ops` surfaces against a fresh `Engine` per test.

use docjson::command::{self, Reply};
use docjson::config::Config;
use docjson::engine::Engine;
use docjson::error::Error;
use docjson::ops::{self, OpResult, OpValue, SetOutcome};
use docjson::value::number::Number;
use docjson::value::Value;
use docjson::Document;

fn engine() -> Engine {
    Engine::new(Config::default())
}

// S1. Load {"a":{"b":[1,2,3]}}. INCRBY .a.b[1] 5 -> 7; GET $ -> [{"a":{"b":[1,7,3]}}]
#[test]
fn s1_numincrby_then_get_whole_document() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":{"b":[1,2,3]}}"#, "k").unwrap();

    let result = ops::numincrby(&e, &mut doc, ".a.b[1]", &Number::PosInt(5)).unwrap();
    assert_eq!(result, OpResult::One(OpValue::Integer(7)));

    let reply = command::get(&e, &doc, &["$"], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk(r#"[{"a":{"b":[1,7,3]}}]"#.to_string()));
}

// S2. Filter expressions with && and ||.
#[test]
fn s2_filter_conjunction_and_disjunction() {
    let e = engine();
    let doc = e
        .parse_document(
            r#"{"store":{"books":[{"price":8.95},{"price":12.99},{"price":9},{"price":22.99,"isbn":"x"}]}}"#,
            "k",
        )
        .unwrap();

    let reply = command::get(&e, &doc, &["$.store.books[?(@.price<10 && @.isbn)]"], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk("[]".to_string()));

    let reply = command::get(&e, &doc, &["$.store.books[?(@.price<10 || @.isbn)].price"], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk("[8.95,9,22.99]".to_string()));
}

// S3. NX/XX semantics on an existing document.
#[test]
fn s3_nx_xx_semantics() {
    let e = engine();
    let mut slot: Option<Document> = None;
    command::set(&e, &mut slot, "k", ".", r#"{"x":1,"y":2}"#, false, false).unwrap();

    let reply = command::set(&e, &mut slot, "k", ".z", "3", true, false).unwrap();
    assert_eq!(reply, Reply::Ok);

    let reply = command::set(&e, &mut slot, "k", ".z", "4", true, false).unwrap();
    assert_eq!(reply, Reply::Null);
    let doc = slot.as_ref().unwrap();
    assert_eq!(doc.root().as_object().unwrap().get("z"), Some(&Value::from(3i64)));

    let reply = command::set(&e, &mut slot, "k", ".w", "5", false, true).unwrap();
    assert_eq!(reply, Reply::Null);
    let doc = slot.as_ref().unwrap();
    assert!(doc.root().as_object().unwrap().get("w").is_none());
}

// S4. ARRTRIM clamping and inverted-range emptying.
#[test]
fn s4_arrtrim_clamp_and_invert() {
    let e = engine();
    let mut slot: Option<Document> = None;
    command::set(&e, &mut slot, "k", ".", "[1,2,3,4,5]", false, false).unwrap();
    let mut doc = slot.unwrap();

    let r = ops::arrtrim(&e, &mut doc, "$", -10, 100).unwrap();
    assert_eq!(r, OpResult::Many(vec![Some(OpValue::Integer(5))]));

    let r = ops::arrtrim(&e, &mut doc, "$", 3, 1).unwrap();
    assert_eq!(r, OpResult::Many(vec![Some(OpValue::Integer(0))]));
}

// S5. Recursive descent read/write, deduplicated by first occurrence.
#[test]
fn s5_recursive_descent_read_and_write() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":{"a":{"a":1}}}"#, "k").unwrap();

    let reply = command::get(&e, &doc, &["$..a"], None, None, None).unwrap();
    assert_eq!(
        reply,
        Reply::Bulk(r#"[{"a":{"a":1}},{"a":1},1]"#.to_string())
    );

    ops::set(&e, &mut doc, "$..a", "9", false, false).unwrap();
    let reply = command::get(&e, &doc, &["$"], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk(r#"[{"a":9}]"#.to_string()));
}

// S6. Version-3 round-trip is value-equal, and legacy version-0 loads structurally equal
// (doubles re-encoded as text, byte-exact equivalence not guaranteed).
#[test]
fn s6_persistence_roundtrip_and_legacy_load() {
    use docjson::persist;
    use std::cell::RefCell;

    #[derive(Default)]
    struct MemIo {
        buf: RefCell<Vec<u8>>,
        pos: RefCell<usize>,
    }
    impl MemIo {
        fn write_bytes(&self, bytes: &[u8]) {
            self.buf.borrow_mut().extend_from_slice(bytes);
        }
        fn read_bytes(&self, n: usize) -> docjson::error::Result<Vec<u8>> {
            let mut pos = self.pos.borrow_mut();
            let buf = self.buf.borrow();
            if *pos + n > buf.len() {
                return Err(Error::InvalidRdbFormat);
            }
            let out = buf[*pos..*pos + n].to_vec();
            *pos += n;
            Ok(out)
        }
    }
    impl docjson::host::SnapshotIo for MemIo {
        fn save_unsigned(&mut self, v: u64) -> docjson::error::Result<()> {
            self.write_bytes(&v.to_le_bytes());
            Ok(())
        }
        fn save_signed(&mut self, v: i64) -> docjson::error::Result<()> {
            self.write_bytes(&v.to_le_bytes());
            Ok(())
        }
        fn save_double(&mut self, v: f64) -> docjson::error::Result<()> {
            self.write_bytes(&v.to_le_bytes());
            Ok(())
        }
        fn save_string(&mut self, bytes: &[u8]) -> docjson::error::Result<()> {
            self.save_unsigned(bytes.len() as u64)?;
            self.write_bytes(bytes);
            Ok(())
        }
        fn load_unsigned(&mut self) -> docjson::error::Result<u64> {
            Ok(u64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
        }
        fn load_signed(&mut self) -> docjson::error::Result<i64> {
            Ok(i64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
        }
        fn load_double(&mut self) -> docjson::error::Result<f64> {
            Ok(f64::from_le_bytes(self.read_bytes(8)?.try_into().unwrap()))
        }
        fn load_string(&mut self) -> docjson::error::Result<Vec<u8>> {
            let len = self.load_unsigned()? as usize;
            self.read_bytes(len)
        }
        fn emit_aof(&mut self, _command: &str, _args: &[&[u8]]) -> docjson::error::Result<()> {
            Ok(())
        }
        fn update_digest(&mut self, _bytes: &[u8]) {}
    }

    let e = engine();
    let doc = e.parse_document(r#"{"a":1,"b":[1,2,3]}"#, "k").unwrap();
    let mut io = MemIo::default();
    persist::save(&doc, &mut io).unwrap();

    let mut mutated = e.parse_document(r#"{"a":1,"b":[1,2,3]}"#, "k2").unwrap();
    ops::set(&e, &mut mutated, ".a", "99", false, false).unwrap();

    let loaded = persist::load(
        &mut io,
        &e.keys,
        e.config.max_path_limit(),
        e.config.max_parser_recursion_depth(),
        true,
    )
    .unwrap();
    assert_eq!(loaded.root(), doc.root());

    // legacy version-0 save/load round trip through the command-visible serialized form.
    let mut legacy_io = MemIo::default();
    legacy_io.save_unsigned(0).unwrap();
    legacy_io.save_unsigned(0x08).unwrap(); // TAG_INTEGER
    legacy_io.save_signed(7).unwrap();
    let legacy_doc = persist::load(&mut legacy_io, &e.keys, 128, 200, true).unwrap();
    assert_eq!(legacy_doc.root(), &Value::from(7i64));
}

// Invariant 1: set-then-serialize-then-parse-then-read round-trips the written value.
#[test]
fn invariant_set_serialize_parse_read_roundtrips() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":{"b":[1,2,3]}}"#, "k").unwrap();
    ops::set(&e, &mut doc, ".a.b[1]", r#"{"nested":true}"#, false, false).unwrap();

    let reply = command::get(&e, &doc, &["$"], None, None, None).unwrap();
    let Reply::Bulk(text) = reply else { panic!("expected bulk reply") };

    let reparsed = e.parse_document(&text, "k2").unwrap();
    let reply2 = command::get(&e, &reparsed, &[".a.b[1]"], None, None, None).unwrap();
    assert_eq!(reply2, Reply::Bulk(r#"{"nested":true}"#.to_string()));
}

// Invariant 2: GET "$" wraps the document in a single-element array; GET "." is verbatim.
#[test]
fn invariant_root_path_wrapping() {
    let e = engine();
    let doc = e.parse_document(r#"{"a":1}"#, "k").unwrap();

    let reply = command::get(&e, &doc, &["$"], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk(r#"[{"a":1}]"#.to_string()));

    let reply = command::get(&e, &doc, &["."], None, None, None).unwrap();
    assert_eq!(reply, Reply::Bulk(r#"{"a":1}"#.to_string()));
}

// Invariant 3: after a successful delete, the path no longer resolves and the document
// shrinks by at least the removed subtree's byte cost.
#[test]
fn invariant_delete_shrinks_document_and_clears_path() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":{"b":[1,2,3]},"c":1}"#, "k").unwrap();
    let size_before = doc.size();

    let n = ops::del(&e, &mut doc, ".a").unwrap();
    assert_eq!(n, 1);
    assert!(size_before > doc.size());

    let err = command::get(&e, &doc, &[".a"], None, None, None).unwrap_err();
    assert!(matches!(err, Error::PathNonExistent));
}

// Invariant 4: deleting a prefix path removes all paths that extend it from later results.
#[test]
fn invariant_deleting_prefix_removes_descendants() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":{"b":{"c":1}}}"#, "k").unwrap();

    ops::del(&e, &mut doc, ".a").unwrap();
    let err = command::get(&e, &doc, &[".a.b.c"], None, None, None).unwrap_err();
    assert!(matches!(err, Error::PathNonExistent));
}

// Invariant 5: key-table handle count equals total object-member occurrences across
// currently-live documents.
#[test]
fn invariant_handle_count_matches_member_occurrences() {
    let e = engine();
    let doc1 = e.parse_document(r#"{"a":1,"b":2}"#, "k1").unwrap();
    let doc2 = e.parse_document(r#"{"c":{"d":3}}"#, "k2").unwrap();

    assert_eq!(e.keys.stats().total_handles, 4);

    let mut doc1 = doc1;
    let mut doc2 = doc2;
    e.destroy_document(&mut doc1, "k1");
    e.destroy_document(&mut doc2, "k2");
}

// Invariant 6: a fast-mode parse-then-serialize round trip on fast-mode-serialized input is
// byte-for-byte identical.
#[test]
fn invariant_fast_mode_roundtrip_is_byte_exact() {
    let e = engine();
    let doc = e.parse_document(r#"{"a":[1,2,3],"b":"x","c":null,"d":true}"#, "k").unwrap();
    let (first, _) = docjson::serializer::serialize(doc.root(), &docjson::serializer::Mode::Fast);

    let reparsed = e.parse_document(&first, "k2").unwrap();
    let (second, _) = docjson::serializer::serialize(reparsed.root(), &docjson::serializer::Mode::Fast);
    assert_eq!(first, second);
}

// Invariant 7: numincrby followed by numincrby of the negation returns to the original value.
#[test]
fn invariant_numincrby_then_negation_returns_to_original() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"n":10}"#, "k").unwrap();

    ops::numincrby(&e, &mut doc, ".n", &Number::PosInt(5)).unwrap();
    ops::numincrby(&e, &mut doc, ".n", &Number::NegInt(-5)).unwrap();

    assert_eq!(doc.root().as_object().unwrap().get("n"), Some(&Value::from(10i64)));
}

// Invariant 8: arrappend followed by arrpop at the same index restores the prior byte form.
#[test]
fn invariant_arrappend_then_arrpop_restores_array() {
    let e = engine();
    let mut doc = e.parse_document("[1,2,3]", "k").unwrap();
    let (before, _) = docjson::serializer::serialize(doc.root(), &docjson::serializer::Mode::Fast);

    ops::arrappend(&e, &mut doc, "$", &["4"]).unwrap();
    ops::arrpop(&e, &mut doc, "$", -1).unwrap();

    let (after, _) = docjson::serializer::serialize(doc.root(), &docjson::serializer::Mode::Fast);
    assert_eq!(before, after);
}

// Invariant 9: object member order survives insertions/deletions that don't touch a given
// key, both below and above the vector-to-hash-table promotion threshold.
#[test]
fn invariant_object_order_preserved_across_promotion() {
    let e = engine();
    let mut doc = e.parse_document("{}", "k").unwrap();
    for i in 0..100 {
        ops::set(&e, &mut doc, &format!(".k{i}"), &i.to_string(), false, false).unwrap();
    }
    ops::del(&e, &mut doc, ".k50").unwrap();

    let obj = doc.root().as_object().unwrap();
    let names: Vec<&str> = obj.iter().map(|(name, _)| name).collect();
    let expected: Vec<String> = (0..100).filter(|&i| i != 50).map(|i| format!("k{i}")).collect();
    assert_eq!(names, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
}

// Invariant 10: toggling trap mode off then on with no live allocations leaves the global
// byte counter at zero.
#[test]
fn invariant_trap_mode_toggle_leaves_counter_at_zero() {
    let mut acc = docjson::alloc::Accounting::new();
    assert_eq!(acc.global_bytes(), 0);
    acc.set_trap_mode(true).unwrap();
    acc.set_trap_mode(false).unwrap();
    acc.set_trap_mode(true).unwrap();
    assert_eq!(acc.global_bytes(), 0);
}

#[test]
fn extended_dialect_nonsyntax_error_terminates_only_that_branch() {
    let e = engine();
    let doc = e.parse_document(r#"{"a":"x","b":1}"#, "k").unwrap();
    let result = ops::strlen(&e, &doc, "$.*").unwrap();
    match result {
        OpResult::Many(values) => {
            assert_eq!(values, vec![Some(OpValue::Integer(1)), None]);
        }
        other => panic!("expected Many, got {other:?}"),
    }
}

#[test]
fn legacy_dialect_path_non_existent_is_a_hard_error() {
    let e = engine();
    let doc = e.parse_document(r#"{"a":1}"#, "k").unwrap();
    let err = ops::strlen(&e, &doc, ".missing").unwrap_err();
    assert!(matches!(err, Error::PathNonExistent));
}

#[test]
fn set_outcome_no_such_path_when_neither_result_nor_insert() {
    let e = engine();
    let mut doc = e.parse_document(r#"{"a":1}"#, "k").unwrap();
    let outcome = ops::set(&e, &mut doc, ".b.c", "1", false, false).unwrap();
    assert_eq!(outcome, SetOutcome::NoSuchPath);
}
