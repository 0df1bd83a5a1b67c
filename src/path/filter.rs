//! Filter-expression AST and evaluation (spec §4.5's `Filter`/`Expr`/`Term`/`Factor` grammar).
//!
//! New subsystem — there is no filter-expression engine anywhere in the reference pack to
//! ground this on structurally, so it follows the crate's general idiom instead: a typed AST,
//! `Result`-returning evaluation, and an explicit split between syntax errors (abort the
//! whole selector run) and non-syntax ones (the expression simply doesn't match).

use crate::error::{Error, PathSyntaxError, Result};
use crate::path::ast::Path;
use crate::path::eval;
use crate::value::number::Number;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One step of a `@`-relative member reference.
#[derive(Debug, Clone, PartialEq)]
pub enum RefStep {
    Name(String),
    Index(i64),
}

/// A `@`-relative member reference; empty means "the current node itself".
pub type MemberRef = Vec<RefStep>;

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

#[derive(Debug, Clone)]
pub enum Operand {
    Current(MemberRef),
    Literal(FilterValue),
    SubSelector(Box<Path>),
}

#[derive(Debug, Clone)]
pub enum FilterExpr {
    Or(Box<FilterExpr>, Box<FilterExpr>),
    And(Box<FilterExpr>, Box<FilterExpr>),
    Compare { lhs: Operand, op: CmpOp, rhs: Operand },
    Exists(MemberRef),
}

/// Resolve a `@`-relative member reference against `current`.
fn resolve_ref<'a>(current: &'a Value, steps: &MemberRef) -> Option<&'a Value> {
    let mut node = current;
    for step in steps {
        node = match (step, node) {
            (RefStep::Name(n), Value::Object(o)) => o.get(n)?,
            (RefStep::Index(i), Value::Array(a)) => {
                let idx = if *i < 0 { a.len() as i64 + i } else { *i };
                if idx < 0 {
                    return None;
                }
                a.get(idx as usize)?
            }
            _ => return None,
        };
    }
    Some(node)
}

fn as_filter_value(v: &Value) -> Option<FilterValue> {
    match v {
        Value::Null => Some(FilterValue::Null),
        Value::Bool(b) => Some(FilterValue::Bool(*b)),
        Value::Number(n) => Some(FilterValue::Number(n.clone())),
        Value::String { text, .. } => Some(FilterValue::String(text.to_string())),
        _ => None,
    }
}

fn resolve_operand(op: &Operand, current: &Value, root: &Value) -> Result<Option<FilterValue>> {
    match op {
        Operand::Literal(v) => Ok(Some(v.clone())),
        Operand::Current(steps) => Ok(resolve_ref(current, steps).and_then(as_filter_value)),
        Operand::SubSelector(path) => {
            let (result_set, _) = eval::prepare_set(root, path, eval::Mode::Read)?;
            if result_set.len() != 1 {
                return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
            }
            let value = result_set[0].resolve(root).ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))?;
            as_filter_value(value).map(Some).ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))
        }
    }
}

fn compare(a: &FilterValue, op: &CmpOp, b: &FilterValue) -> bool {
    use CmpOp::*;
    match (a, b) {
        (FilterValue::Null, FilterValue::Null) => matches!(op, Eq) || matches!(op, Le) || matches!(op, Ge),
        (FilterValue::Bool(x), FilterValue::Bool(y)) => match op {
            Eq => x == y,
            Ne => x != y,
            _ => false,
        },
        (FilterValue::String(x), FilterValue::String(y)) => match op {
            Eq => x == y,
            Ne => x != y,
            Lt => x < y,
            Le => x <= y,
            Gt => x > y,
            Ge => x >= y,
        },
        (FilterValue::Number(x), FilterValue::Number(y)) => {
            let ord = x.compare(y);
            match op {
                Eq => ord.is_eq(),
                Ne => !ord.is_eq(),
                Lt => ord.is_lt(),
                Le => ord.is_le(),
                Gt => ord.is_gt(),
                Ge => ord.is_ge(),
            }
        }
        _ => matches!(op, Ne),
    }
}

impl FilterExpr {
    /// Evaluate this filter against `current` (the `@`-rooted candidate), with `root` available
    /// for `$`-rooted sub-selector comparands.
    pub fn evaluate(&self, current: &Value, root: &Value) -> Result<bool> {
        match self {
            FilterExpr::Or(a, b) => Ok(a.evaluate(current, root)? || b.evaluate(current, root)?),
            FilterExpr::And(a, b) => Ok(a.evaluate(current, root)? && b.evaluate(current, root)?),
            FilterExpr::Exists(steps) => Ok(resolve_ref(current, steps).is_some()),
            FilterExpr::Compare { lhs, op, rhs } => {
                let a = resolve_operand(lhs, current, root)?;
                let b = resolve_operand(rhs, current, root)?;
                match (a, b) {
                    (Some(a), Some(b)) => Ok(compare(&a, op, &b)),
                    _ => Ok(false),
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::keytable::Table as KeyTable;
    use crate::value::object::Object;

    fn obj(pairs: Vec<(&str, Value)>) -> Value {
        let keys = KeyTable::default();
        let mut o = Object::new();
        for (k, v) in pairs {
            o.insert(&keys, k, v);
        }
        Value::Object(o)
    }

    #[test]
    fn existence_test() {
        let v = obj(vec![("isbn", Value::string("x"))]);
        let expr = FilterExpr::Exists(vec![RefStep::Name("isbn".into())]);
        assert!(expr.evaluate(&v, &Value::Null).unwrap());

        let v = obj(vec![("price", Value::from(1i64))]);
        assert!(!expr.evaluate(&v, &Value::Null).unwrap());
    }

    #[test]
    fn numeric_comparison() {
        let v = obj(vec![("price", Value::from(8i64))]);
        let expr = FilterExpr::Compare {
            lhs: Operand::Current(vec![RefStep::Name("price".into())]),
            op: CmpOp::Lt,
            rhs: Operand::Literal(FilterValue::Number(Number::PosInt(10))),
        };
        assert!(expr.evaluate(&v, &Value::Null).unwrap());
    }
}
