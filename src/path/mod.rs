//! The path/query engine (spec §4.5): lexer → AST parser → filter evaluator → selector
//! evaluator, wired together and re-exported as the module's public surface for `ops`/
//! `command` to consume without reaching into submodules directly.

pub mod ast;
pub mod eval;
pub mod filter;
mod lexer;

pub use ast::{Dialect, Path, Segment, UnionItem};
pub use eval::{commit, delete, prepare_set, Mode, PointerPath, PtrComponent};
pub use filter::{CmpOp, FilterExpr, FilterValue, MemberRef, Operand, RefStep};

use crate::error::Result;

/// Parse `text` into a [`Path`] under the given resource limits (spec §6.4).
pub fn parse(
    text: &str,
    max_query_string_size: usize,
    max_parser_recursion_depth: usize,
    max_recursive_descent_tokens: usize,
) -> Result<Path> {
    ast::parse(text, max_query_string_size, max_parser_recursion_depth, max_recursive_descent_tokens)
}
