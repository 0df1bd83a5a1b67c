//! Selector evaluator (spec §4.5): walks a parsed [`Path`] against a document, producing a
//! result set of pointer paths and, for insert-capable modes, a set of not-yet-existing
//! insert paths. Implements the two-phase `prepare_set`/`commit` write protocol.
//!
//! New subsystem grounded on the teacher's `json::ptr`/`doc::ptr` pointer implementations for
//! the pointer-path representation itself (a typed sequence of property/index components,
//! joined into a `/`-delimited string on demand, mirroring `json::ptr::Pointer`/`Token`), with
//! a hand-written evaluator on top since no JSONPath engine exists in the pack to ground the
//! branching/forking logic on.

use std::cmp::Ordering;

use crate::error::{Error, PathSyntaxError, Result};
use crate::keytable::Table as KeyTable;
use crate::path::ast::{Path, Segment, UnionItem};
use crate::value::Value;

/// One step of a pointer path: either an object member name or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PtrComponent {
    Property(String),
    Index(usize),
}

/// A `/`-delimited JSON-Pointer-style path from the document root to a node (spec §3.4).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PointerPath(pub Vec<PtrComponent>);

impl PointerPath {
    pub fn root() -> Self {
        PointerPath(Vec::new())
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    fn child_property(&self, name: &str) -> PointerPath {
        let mut v = self.0.clone();
        v.push(PtrComponent::Property(name.to_string()));
        PointerPath(v)
    }

    fn child_index(&self, i: usize) -> PointerPath {
        let mut v = self.0.clone();
        v.push(PtrComponent::Index(i));
        PointerPath(v)
    }

    pub fn resolve<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        let mut node = root;
        for c in &self.0 {
            node = match (c, node) {
                (PtrComponent::Property(n), Value::Object(o)) => o.get(n)?,
                (PtrComponent::Index(i), Value::Array(a)) => a.get(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    pub fn resolve_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        let mut node = root;
        for c in &self.0 {
            node = match (c, node) {
                (PtrComponent::Property(n), Value::Object(o)) => o.get_mut(n)?,
                (PtrComponent::Index(i), Value::Array(a)) => a.get_mut(*i)?,
                _ => return None,
            };
        }
        Some(node)
    }

    /// Splits off the final component, used by `commit` to locate an insert path's parent.
    fn split_last(&self) -> Option<(PointerPath, &PtrComponent)> {
        let (last, rest) = self.0.split_last()?;
        Some((PointerPath(rest.to_vec()), last))
    }

    /// Render as a JSON-Pointer string (RFC 6901 `~0`/`~1` escaping of property names).
    pub fn to_pointer_string(&self) -> String {
        let mut out = String::new();
        for c in &self.0 {
            out.push('/');
            match c {
                PtrComponent::Property(n) => {
                    for ch in n.chars() {
                        match ch {
                            '~' => out.push_str("~0"),
                            '/' => out.push_str("~1"),
                            _ => out.push(ch),
                        }
                    }
                }
                PtrComponent::Index(i) => out.push_str(&i.to_string()),
            }
        }
        out
    }
}

/// Selector evaluation mode (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Insert,
    Update,
    InsertOrUpdate,
    Delete,
}

impl Mode {
    fn allows_insert(&self) -> bool {
        matches!(self, Mode::Insert | Mode::InsertOrUpdate)
    }

    fn is_write(&self) -> bool {
        matches!(self, Mode::Insert | Mode::Update | Mode::InsertOrUpdate)
    }
}

struct Candidate {
    path: PointerPath,
    in_descent: bool,
}

/// Evaluate `path` against `root` in `mode`, returning `(result_set, insert_set)`.
pub fn prepare_set(root: &Value, path: &Path, mode: Mode) -> Result<(Vec<PointerPath>, Vec<PointerPath>)> {
    let mut frontier = vec![Candidate { path: PointerPath::root(), in_descent: false }];
    let mut insert_set = Vec::new();
    let used_descent = path.segments.iter().any(|s| matches!(s, Segment::RecursiveDescent));
    let num_segments = path.segments.len();

    let mut i = 0;
    while i < num_segments {
        let segment = &path.segments[i];
        if let Segment::RecursiveDescent = segment {
            let mut expanded = Vec::new();
            for c in frontier {
                let mut depth_budget = 4096usize;
                expand_descendants(root, &c.path, &mut expanded, &mut depth_budget)?;
            }
            frontier = expanded;
            i += 1;
            continue;
        }
        let is_last = i == num_segments - 1;
        let mut next = Vec::new();
        for c in frontier {
            step(root, &c, segment, is_last, mode, &mut next, &mut insert_set)?;
        }
        frontier = next;
        i += 1;
    }

    let mut result_set: Vec<PointerPath> = frontier.into_iter().map(|c| c.path).collect();
    if used_descent {
        dedup_preserve_order(&mut result_set);
    }
    let _ = mode.is_write();
    Ok((result_set, insert_set))
}

fn dedup_preserve_order(paths: &mut Vec<PointerPath>) {
    let mut seen = std::collections::HashSet::new();
    paths.retain(|p| seen.insert(p.to_pointer_string()));
}

fn expand_descendants(
    root: &Value,
    start: &PointerPath,
    out: &mut Vec<Candidate>,
    budget: &mut usize,
) -> Result<()> {
    if *budget == 0 {
        return Err(Error::ParserRecursionLimitExceeded);
    }
    *budget -= 1;
    out.push(Candidate { path: start.clone(), in_descent: true });
    let Some(node) = start.resolve(root) else { return Ok(()) };
    match node {
        Value::Array(items) => {
            for i in 0..items.len() {
                expand_descendants(root, &start.child_index(i), out, budget)?;
            }
        }
        Value::Object(obj) => {
            for (name, _) in obj.iter() {
                expand_descendants(root, &start.child_property(name), out, budget)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn step(
    root: &Value,
    candidate: &Candidate,
    segment: &Segment,
    is_last: bool,
    mode: Mode,
    next: &mut Vec<Candidate>,
    insert_set: &mut Vec<PointerPath>,
) -> Result<()> {
    let Some(current) = candidate.path.resolve(root) else { return Ok(()) };
    match segment {
        Segment::Member(name) => match current {
            Value::Object(o) => {
                if o.get(name).is_some() {
                    next.push(Candidate {
                        path: candidate.path.child_property(name),
                        in_descent: candidate.in_descent,
                    });
                } else if is_last && mode.allows_insert() && !candidate.in_descent {
                    insert_set.push(candidate.path.child_property(name));
                }
            }
            _ => {}
        },
        Segment::Wildcard => match current {
            Value::Object(o) => {
                for (name, _) in o.iter() {
                    next.push(Candidate {
                        path: candidate.path.child_property(name),
                        in_descent: candidate.in_descent,
                    });
                }
            }
            Value::Array(a) => {
                for i in 0..a.len() {
                    next.push(Candidate { path: candidate.path.child_index(i), in_descent: candidate.in_descent });
                }
            }
            _ => {}
        },
        Segment::Index(idx) => {
            if let Value::Array(a) = current {
                match normalize_index(*idx, a.len()) {
                    Some(i) => next.push(Candidate { path: candidate.path.child_index(i), in_descent: candidate.in_descent }),
                    None => {
                        if is_last && mode.is_write() {
                            return Err(Error::IndexOutOfBounds);
                        }
                    }
                }
            }
        }
        Segment::Slice { start, stop, step: stepv } => {
            if let Value::Array(a) = current {
                for i in slice_indices(a.len(), *start, *stop, *stepv) {
                    next.push(Candidate { path: candidate.path.child_index(i), in_descent: candidate.in_descent });
                }
            }
        }
        Segment::Union(items) => match current {
            Value::Array(a) => {
                for item in items {
                    if let UnionItem::Index(idx) = item {
                        if let Some(i) = normalize_index(*idx, a.len()) {
                            next.push(Candidate { path: candidate.path.child_index(i), in_descent: candidate.in_descent });
                        }
                    }
                }
            }
            Value::Object(o) => {
                for item in items {
                    if let UnionItem::Name(name) = item {
                        if o.get(name).is_some() {
                            next.push(Candidate {
                                path: candidate.path.child_property(name),
                                in_descent: candidate.in_descent,
                            });
                        } else if is_last && mode.allows_insert() && !candidate.in_descent {
                            insert_set.push(candidate.path.child_property(name));
                        }
                    }
                }
            }
            _ => {}
        },
        Segment::Filter(expr) => match current {
            Value::Array(a) => {
                for (i, item) in a.iter().enumerate() {
                    if expr.evaluate(item, root)? {
                        next.push(Candidate { path: candidate.path.child_index(i), in_descent: candidate.in_descent });
                    }
                }
            }
            other => {
                if expr.evaluate(other, root)? {
                    next.push(Candidate { path: candidate.path.clone(), in_descent: candidate.in_descent });
                }
            }
        },
        Segment::RecursiveDescent => unreachable!("handled in prepare_set"),
    }
    Ok(())
}

fn normalize_index(idx: i64, len: usize) -> Option<usize> {
    let resolved = if idx < 0 { len as i64 + idx } else { idx };
    if resolved < 0 || resolved as usize >= len {
        None
    } else {
        Some(resolved as usize)
    }
}

/// Python-like slice index enumeration (spec §4.5 grammar note "python-like").
fn slice_indices(len: usize, start: Option<i64>, stop: Option<i64>, step: Option<i64>) -> Vec<usize> {
    let step = step.unwrap_or(1);
    let len_i = len as i64;
    let clamp = |v: i64| -> i64 { v.max(0).min(len_i) };
    let normalize = |v: i64| -> i64 { if v < 0 { (len_i + v).max(0) } else { v } };

    let mut out = Vec::new();
    if step > 0 {
        let start = clamp(start.map(normalize).unwrap_or(0));
        let stop = clamp(stop.map(normalize).unwrap_or(len_i));
        let mut i = start;
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else if step < 0 {
        let start = clamp(start.map(normalize).unwrap_or(len_i - 1).max(-1).min(len_i - 1));
        let stop = stop.map(normalize).map(|v| v.max(-1)).unwrap_or(-1);
        let mut i = start;
        while i > stop {
            if i >= 0 && (i as usize) < len {
                out.push(i as usize);
            }
            i += step;
        }
    }
    out
}

/// Commits a write: swaps `new_value` (deep-copied per target) into each result-set path, and
/// inserts it at each insert-set path. Per spec §4.5, called only after all NX/XX and budget
/// checks on the staged sets have passed.
pub fn commit(
    root: &mut Value,
    keys: &KeyTable,
    result_set: &[PointerPath],
    insert_set: &[PointerPath],
    new_value: &Value,
) -> Result<()> {
    // Overlapping recursive-descent targets (e.g. `$..a` matching `/a`, `/a/a`, `/a/a/a`)
    // arrive shallowest-first; committing `/a` first would collapse the deeper targets out
    // from under their own `resolve_mut`. Deepest-first, as `delete` already does, keeps
    // every target resolvable until it is itself overwritten.
    let mut result_set: Vec<&PointerPath> = result_set.iter().collect();
    result_set.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| compare_same_depth(a, b)));
    for p in result_set {
        let slot = p.resolve_mut(root).ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))?;
        let mut replacement = new_value.deep_copy(keys);
        std::mem::swap(slot, &mut replacement);
        replacement.release(keys);
    }
    for p in insert_set {
        let (parent_path, last) = p.split_last().ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))?;
        let parent = parent_path.resolve_mut(root).ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))?;
        match (parent, last) {
            (Value::Object(o), PtrComponent::Property(name)) => {
                o.insert(keys, name, new_value.deep_copy(keys));
            }
            _ => return Err(Error::PathSyntax(PathSyntaxError::InvalidPath)),
        }
    }
    Ok(())
}

/// Deletes every path in `result_set`, sorted deepest/highest-index first so sibling array
/// indices remain valid while iterating (spec §4.5's single-phase delete).
pub fn delete(root: &mut Value, keys: &KeyTable, mut result_set: Vec<PointerPath>) -> usize {
    result_set.sort_by(|a, b| b.depth().cmp(&a.depth()).then_with(|| compare_same_depth(a, b)));
    let mut count = 0;
    for p in &result_set {
        let Some((parent_path, last)) = p.split_last() else { continue };
        let Some(parent) = parent_path.resolve_mut(root) else { continue };
        let removed = match (parent, last) {
            (Value::Object(o), PtrComponent::Property(name)) => o.remove(keys, name),
            (Value::Array(a), PtrComponent::Index(i)) if *i < a.len() => Some(a.remove(*i)),
            _ => None,
        };
        if let Some(mut v) = removed {
            v.release(keys);
            count += 1;
        }
    }
    count
}

fn compare_same_depth(a: &PointerPath, b: &PointerPath) -> Ordering {
    for (ca, cb) in a.0.iter().zip(b.0.iter()) {
        let ord = match (ca, cb) {
            (PtrComponent::Index(x), PtrComponent::Index(y)) => y.cmp(x),
            (PtrComponent::Property(x), PtrComponent::Property(y)) => y.cmp(x),
            _ => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parser;
    use crate::path::ast;

    fn doc(text: &str, keys: &KeyTable) -> Value {
        parser::parse(text, keys, 200).unwrap().0
    }

    #[test]
    fn member_and_index_read() {
        let keys = KeyTable::default();
        let root = doc(r#"{"a":{"b":[1,2,3]}}"#, &keys);
        let path = ast::parse(".a.b[1]", 1024, 200, 20).unwrap();
        let (rs, _) = prepare_set(&root, &path, Mode::Read).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs[0].resolve(&root), Some(&Value::from(2i64)));
    }

    #[test]
    fn insert_path_recorded_for_missing_last_member() {
        let keys = KeyTable::default();
        let root = doc(r#"{"a":1}"#, &keys);
        let path = ast::parse(".z", 1024, 200, 20).unwrap();
        let (rs, ins) = prepare_set(&root, &path, Mode::InsertOrUpdate).unwrap();
        assert!(rs.is_empty());
        assert_eq!(ins.len(), 1);
    }

    #[test]
    fn recursive_descent_collects_all_matches_preorder() {
        let keys = KeyTable::default();
        let root = doc(r#"{"a":{"a":{"a":1}}}"#, &keys);
        let path = ast::parse("$..a", 1024, 200, 20).unwrap();
        let (rs, _) = prepare_set(&root, &path, Mode::Read).unwrap();
        assert_eq!(rs.len(), 3);
    }

    #[test]
    fn filter_selects_matching_array_elements() {
        let keys = KeyTable::default();
        let root = doc(
            r#"{"store":{"books":[{"price":8.95},{"price":12.99},{"price":9},{"price":22.99,"isbn":"x"}]}}"#,
            &keys,
        );
        let path = ast::parse("$.store.books[?(@.price<10 || @.isbn)].price", 1024, 200, 20).unwrap();
        let (rs, _) = prepare_set(&root, &path, Mode::Read).unwrap();
        let values: Vec<_> = rs.iter().map(|p| p.resolve(&root).unwrap()).collect();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn slice_trim_clamps_out_of_range_bounds() {
        let keys = KeyTable::default();
        let root = doc("[1,2,3,4,5]", &keys);
        let indices = slice_indices(5, Some(-10), Some(100), None);
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        let _ = root;
    }

    #[test]
    fn delete_removes_deepest_and_highest_index_first() {
        let keys = KeyTable::default();
        let mut root = doc(r#"{"a":[1,2,3]}"#, &keys);
        let path = ast::parse(".a", 1024, 200, 20).unwrap();
        let (rs, _) = prepare_set(&root, &path, Mode::Delete).unwrap();
        let n = delete(&mut root, &keys, rs);
        assert_eq!(n, 1);
        assert!(root.as_object().unwrap().get("a").is_none());
    }
}
