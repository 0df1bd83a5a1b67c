//! Path grammar AST and recursive-descent parser (spec §4.5).
//!
//! New subsystem: there is no JSONPath-style engine elsewhere in the reference pack, so this
//! follows the crate's general idiom — a typed token stream (`path::lexer`) consumed by a
//! hand-written recursive-descent parser producing a typed AST, mirroring the shape of
//! `json::ptr::Pointer`'s typed `Token`/`Pointer` pair but one level richer.

use crate::error::{Error, PathSyntaxError, Result};
use crate::path::filter::{CmpOp, FilterExpr, FilterValue, MemberRef, Operand, RefStep};
use crate::path::lexer::{self, Lexer, Token};
use crate::value::number::Number;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Starts with `.` (or is `.` alone): resolves to at most one value.
    Legacy,
    /// Starts with `$`: resolves to an ordered set of values.
    Extended,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnionItem {
    Index(i64),
    Name(String),
}

#[derive(Debug, Clone)]
pub enum Segment {
    Member(String),
    Wildcard,
    Index(i64),
    Slice { start: Option<i64>, stop: Option<i64>, step: Option<i64> },
    Union(Vec<UnionItem>),
    RecursiveDescent,
    Filter(FilterExpr),
}

#[derive(Debug, Clone)]
pub struct Path {
    pub dialect: Dialect,
    pub segments: Vec<Segment>,
}

/// Parses `text` as a path, enforcing the resource limits of spec §4.5.
pub fn parse(
    text: &str,
    max_query_string_size: usize,
    max_parser_recursion_depth: usize,
    max_recursive_descent_tokens: usize,
) -> Result<Path> {
    lexer::check_length(text, max_query_string_size)?;
    let tokens = Lexer::new(text).tokenize()?;
    let mut p = Parser {
        tokens: &tokens,
        pos: 0,
        recursion: 0,
        max_recursion: max_parser_recursion_depth,
        recursive_descent_tokens: 0,
        max_recursive_descent_tokens,
    };
    let path = p.parse_path()?;
    if p.peek() != &Token::End {
        return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
    }
    Ok(path)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    recursion: usize,
    max_recursion: usize,
    recursive_descent_tokens: usize,
    max_recursive_descent_tokens: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn bump(&mut self) -> Token {
        let t = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn enter(&mut self) -> Result<()> {
        self.recursion += 1;
        if self.recursion > self.max_recursion {
            return Err(Error::ParserRecursionLimitExceeded);
        }
        Ok(())
    }

    fn exit(&mut self) {
        self.recursion -= 1;
    }

    fn parse_path(&mut self) -> Result<Path> {
        self.enter()?;
        let dialect = match self.bump() {
            Token::Dollar => Dialect::Extended,
            Token::Dot => Dialect::Legacy,
            _ => return Err(Error::PathSyntax(PathSyntaxError::InvalidPath)),
        };
        let segments = self.parse_rel()?;
        self.exit();
        Ok(Path { dialect, segments })
    }

    /// Parses `Rel`, continuing until a token is seen that doesn't start a continuation.
    fn parse_rel(&mut self) -> Result<Vec<Segment>> {
        let mut segments = Vec::new();
        loop {
            match self.peek().clone() {
                Token::DotDot => {
                    self.bump();
                    self.recursive_descent_tokens += 1;
                    if self.recursive_descent_tokens > self.max_recursive_descent_tokens {
                        return Err(Error::RecursiveDescentLimitExceeded);
                    }
                    segments.push(Segment::RecursiveDescent);
                    segments.push(self.parse_qualified()?);
                }
                Token::Dot => {
                    self.bump();
                    segments.push(self.parse_qualified()?);
                }
                Token::LBracket => {
                    self.bump();
                    segments.push(self.parse_bracket()?);
                    if self.bump() != Token::RBracket {
                        return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
                    }
                }
                Token::Ident(_) | Token::Star => {
                    segments.push(self.parse_qualified()?);
                }
                _ => break,
            }
        }
        Ok(segments)
    }

    fn parse_qualified(&mut self) -> Result<Segment> {
        match self.bump() {
            Token::Star => Ok(Segment::Wildcard),
            Token::Ident(name) => Ok(Segment::Member(name)),
            Token::QuotedString(name) => Ok(Segment::Member(name)),
            _ => Err(Error::PathSyntax(PathSyntaxError::InvalidIdentifier)),
        }
    }

    fn parse_bracket(&mut self) -> Result<Segment> {
        match self.peek().clone() {
            Token::Star => {
                self.bump();
                Ok(Segment::Wildcard)
            }
            Token::QuestionParen => {
                self.bump();
                self.enter()?;
                let expr = self.parse_filter_or()?;
                self.exit();
                if self.bump() != Token::RParen {
                    return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
                }
                Ok(Segment::Filter(expr))
            }
            Token::QuotedString(name) => {
                self.bump();
                let mut items = vec![UnionItem::Name(name)];
                while *self.peek() == Token::Comma {
                    self.bump();
                    match self.bump() {
                        Token::QuotedString(n) => items.push(UnionItem::Name(n)),
                        _ => return Err(Error::PathSyntax(PathSyntaxError::InvalidMember)),
                    }
                }
                Ok(Segment::Union(items))
            }
            Token::Number(_) | Token::Colon => self.parse_index_slice_or_union(),
            _ => Err(Error::PathSyntax(PathSyntaxError::InvalidWildcard)),
        }
    }

    fn try_parse_signed_int(&mut self) -> Result<Option<i64>> {
        match self.peek().clone() {
            Token::Number(text) => {
                self.bump();
                text.parse::<i64>().map(Some).map_err(|_| Error::PathSyntax(PathSyntaxError::InvalidNumber))
            }
            _ => Ok(None),
        }
    }

    fn parse_index_slice_or_union(&mut self) -> Result<Segment> {
        let first = self.try_parse_signed_int()?;
        if *self.peek() == Token::Colon {
            self.bump();
            let stop = self.try_parse_signed_int()?;
            let mut step = None;
            if *self.peek() == Token::Colon {
                self.bump();
                step = self.try_parse_signed_int()?;
                if step == Some(0) {
                    return Err(Error::PathSyntax(PathSyntaxError::ZeroStep));
                }
            }
            return Ok(Segment::Slice { start: first, stop, step });
        }
        let first = first.ok_or(Error::PathSyntax(PathSyntaxError::IndexNotNumber))?;
        if *self.peek() == Token::Comma {
            let mut items = vec![UnionItem::Index(first)];
            while *self.peek() == Token::Comma {
                self.bump();
                let n = self
                    .try_parse_signed_int()?
                    .ok_or(Error::PathSyntax(PathSyntaxError::IndexNotNumber))?;
                items.push(UnionItem::Index(n));
            }
            return Ok(Segment::Union(items));
        }
        Ok(Segment::Index(first))
    }

    // --- filter expression grammar (Expr/Term/Factor) ---

    fn parse_filter_or(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_filter_and()?;
        while *self.peek() == Token::OrOr {
            self.bump();
            let rhs = self.parse_filter_and()?;
            lhs = FilterExpr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_filter_and(&mut self) -> Result<FilterExpr> {
        let mut lhs = self.parse_filter_factor()?;
        while *self.peek() == Token::AndAnd {
            self.bump();
            let rhs = self.parse_filter_factor()?;
            lhs = FilterExpr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_filter_factor(&mut self) -> Result<FilterExpr> {
        match self.peek().clone() {
            Token::LParen => {
                self.bump();
                self.enter()?;
                let e = self.parse_filter_or()?;
                self.exit();
                if self.bump() != Token::RParen {
                    return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
                }
                Ok(e)
            }
            Token::At => {
                self.bump();
                let steps = self.parse_member_ref()?;
                if let Some(op) = self.try_parse_cmp_op() {
                    let rhs = self.parse_value_operand()?;
                    Ok(FilterExpr::Compare { lhs: Operand::Current(steps), op, rhs })
                } else {
                    Ok(FilterExpr::Exists(steps))
                }
            }
            _ => {
                let lhs = self.parse_value_operand()?;
                let op = self
                    .try_parse_cmp_op()
                    .ok_or(Error::PathSyntax(PathSyntaxError::InvalidPath))?;
                if self.bump() != Token::At {
                    return Err(Error::PathSyntax(PathSyntaxError::InvalidPath));
                }
                let steps = self.parse_member_ref()?;
                Ok(FilterExpr::Compare { lhs, op, rhs: Operand::Current(steps) })
            }
        }
    }

    fn parse_member_ref(&mut self) -> Result<MemberRef> {
        let mut steps = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Dot => {
                    self.bump();
                    match self.bump() {
                        Token::Ident(name) => steps.push(RefStep::Name(name)),
                        _ => return Err(Error::PathSyntax(PathSyntaxError::InvalidMember)),
                    }
                }
                Token::LBracket => {
                    self.bump();
                    match self.bump() {
                        Token::QuotedString(name) => steps.push(RefStep::Name(name)),
                        Token::Number(text) => {
                            let n = text
                                .parse::<i64>()
                                .map_err(|_| Error::PathSyntax(PathSyntaxError::InvalidMember))?;
                            steps.push(RefStep::Index(n));
                        }
                        _ => return Err(Error::PathSyntax(PathSyntaxError::InvalidMember)),
                    }
                    if self.bump() != Token::RBracket {
                        return Err(Error::PathSyntax(PathSyntaxError::InvalidMember));
                    }
                }
                _ => break,
            }
        }
        Ok(steps)
    }

    fn try_parse_cmp_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            Token::Eq => CmpOp::Eq,
            Token::Ne => CmpOp::Ne,
            Token::Lt => CmpOp::Lt,
            Token::Le => CmpOp::Le,
            Token::Gt => CmpOp::Gt,
            Token::Ge => CmpOp::Ge,
            _ => return None,
        };
        self.bump();
        Some(op)
    }

    fn parse_value_operand(&mut self) -> Result<Operand> {
        match self.peek().clone() {
            Token::Null => {
                self.bump();
                Ok(Operand::Literal(FilterValue::Null))
            }
            Token::True => {
                self.bump();
                Ok(Operand::Literal(FilterValue::Bool(true)))
            }
            Token::False => {
                self.bump();
                Ok(Operand::Literal(FilterValue::Bool(false)))
            }
            Token::Number(text) => {
                self.bump();
                let n = Number::parse(&text).ok_or(Error::PathSyntax(PathSyntaxError::InvalidNumber))?;
                Ok(Operand::Literal(FilterValue::Number(n)))
            }
            Token::QuotedString(s) => {
                self.bump();
                Ok(Operand::Literal(FilterValue::String(s)))
            }
            Token::Dollar => {
                self.enter()?;
                let path = self.parse_path()?;
                self.exit();
                Ok(Operand::SubSelector(Box::new(path)))
            }
            _ => Err(Error::PathSyntax(PathSyntaxError::InvalidPath)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn p(text: &str) -> Path {
        parse(text, 128 * 1024, 200, 20).unwrap()
    }

    #[test]
    fn parses_legacy_dot_path() {
        let path = p(".a.b[1]");
        assert_eq!(path.dialect, Dialect::Legacy);
        assert_eq!(path.segments.len(), 3);
    }

    #[test]
    fn parses_extended_root() {
        let path = p("$");
        assert_eq!(path.dialect, Dialect::Extended);
        assert!(path.segments.is_empty());
    }

    #[test]
    fn parses_recursive_descent() {
        let path = p("$..a");
        assert!(matches!(path.segments[0], Segment::RecursiveDescent));
        assert!(matches!(path.segments[1], Segment::Member(ref n) if n == "a"));
    }

    #[test]
    fn parses_filter_with_and_or() {
        let path = p("$.store.books[?(@.price<10 && @.isbn)]");
        let has_filter = path.segments.iter().any(|s| matches!(s, Segment::Filter(_)));
        assert!(has_filter);
    }

    #[test]
    fn zero_slice_step_is_a_syntax_error() {
        let err = parse("$[0:5:0]", 128 * 1024, 200, 20).unwrap_err();
        assert_eq!(err, Error::PathSyntax(PathSyntaxError::ZeroStep));
    }

    #[test]
    fn recursive_descent_token_limit_enforced() {
        let path = "$".to_string() + &"..a".repeat(25);
        let err = parse(&path, 128 * 1024, 200, 20).unwrap_err();
        assert_eq!(err, Error::RecursiveDescentLimitExceeded);
    }
}
