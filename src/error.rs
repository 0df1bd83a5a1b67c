//! Flat error enumeration covering every operation in the engine (spec §7).
//!
//! Leaf operations return an [`Error`]; the selector distinguishes syntax errors
//! (which terminate every evaluation branch) from non-syntax errors (which
//! terminate only the current branch, letting sibling branches in extended-dialect
//! evaluation still succeed).

use std::fmt;

/// One flat error enumeration for the whole engine.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Wrong number of arguments supplied to a command.
    #[error("wrong number of arguments")]
    WrongArity,

    /// The document text could not be parsed as JSON.
    #[error("could not parse JSON")]
    JsonParseError,

    /// NX and XX were both supplied, or NX/XX was used in a way the command forbids.
    #[error("NX and XX are mutually exclusive")]
    NxXxMisuse,

    /// A path string failed to parse. Subkinds preserve the distinctions of spec §7.
    #[error("path syntax error: {0}")]
    PathSyntax(#[from] PathSyntaxError),

    /// A path resolved to no value in a context where legacy-dialect requires exactly one.
    #[error("path does not exist")]
    PathNonExistent,

    /// The document key referenced by a command does not exist in the host key space.
    #[error("key does not exist")]
    KeyNonExistent,

    /// An operation was applied to a value of the wrong JSON type.
    #[error("wrong type: expected {expected}, found {found}")]
    WrongType {
        /// Type name the operator required.
        expected: &'static str,
        /// Type name actually found at the path.
        found: &'static str,
    },

    /// Integer or double addition overflowed.
    #[error("addition overflow")]
    AdditionOverflow,

    /// Integer or double multiplication overflowed.
    #[error("multiplication overflow")]
    MultiplicationOverflow,

    /// An operator required a non-empty container and found one empty.
    #[error("container is empty")]
    EmptyContainer,

    /// An array index was outside the bounds of the array.
    #[error("index out of array boundaries")]
    IndexOutOfBounds,

    /// `DEBUG` (or another multi-subcommand command) received an unrecognised subcommand.
    #[error("unknown subcommand '{0}'")]
    UnknownSubcommand(String),

    /// The key table's shard mutex could not be initialised.
    #[error("pthread initialization failed")]
    PthreadInit,

    /// A persisted snapshot used an RDB node code this engine does not understand.
    #[error("invalid RDB format")]
    InvalidRdbFormat,

    /// A write would have produced a document exceeding `max-document-size`.
    #[error("document size limit exceeded")]
    DocumentSizeLimitExceeded,

    /// A write (or a load) would nest structures deeper than `max-path-limit`.
    #[error("document path depth limit exceeded")]
    DocumentPathLimitExceeded,

    /// The path grammar's evaluator recursed deeper than `max-parser-recursion-depth`.
    #[error("parser recursion depth limit exceeded")]
    ParserRecursionLimitExceeded,

    /// A path contained more `..`/`..*` tokens than `max-recursive-descent-tokens`.
    #[error("recursive descent token limit exceeded")]
    RecursiveDescentLimitExceeded,

    /// A path string was longer than `max-query-string-size`.
    #[error("query string size limit exceeded")]
    QueryStringSizeLimitExceeded,

    /// A configuration value was rejected (out of range, or changed while disallowed).
    #[error("invalid configuration value for '{0}'")]
    InvalidConfigValue(&'static str),
}

/// Subkinds of path-grammar syntax error, preserved verbatim per spec §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSyntaxError {
    /// The path as a whole is malformed.
    InvalidPath,
    /// An object member reference inside a filter is malformed.
    InvalidMember,
    /// A numeric literal could not be parsed.
    InvalidNumber,
    /// An identifier (unquoted member name) was malformed.
    InvalidIdentifier,
    /// A `.` sequence was malformed (e.g. `...`).
    InvalidDotSequence,
    /// A filter or bracket expression was empty where content was required.
    EmptyExpression,
    /// An array index was not a number.
    IndexNotNumber,
    /// A slice step of zero was given.
    ZeroStep,
    /// A wildcard was used in a position the grammar disallows.
    InvalidWildcard,
    /// A `$`-rooted sub-selector appeared somewhere other than the document root.
    DollarOnNonRoot,
}

impl fmt::Display for PathSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PathSyntaxError::InvalidPath => "invalid path",
            PathSyntaxError::InvalidMember => "invalid member reference",
            PathSyntaxError::InvalidNumber => "invalid number",
            PathSyntaxError::InvalidIdentifier => "invalid identifier",
            PathSyntaxError::InvalidDotSequence => "invalid dot sequence",
            PathSyntaxError::EmptyExpression => "empty expression",
            PathSyntaxError::IndexNotNumber => "array index is not a number",
            PathSyntaxError::ZeroStep => "slice step cannot be zero",
            PathSyntaxError::InvalidWildcard => "invalid wildcard usage",
            PathSyntaxError::DollarOnNonRoot => "'$' is only valid at the start of a path",
        };
        f.write_str(msg)
    }
}

impl Error {
    /// True if this error must terminate every evaluation branch of a selector run
    /// (a malformed path), as opposed to only the current branch (e.g. a type
    /// mismatch encountered while walking one particular branch).
    pub fn is_syntax(&self) -> bool {
        matches!(self, Error::PathSyntax(_))
    }

    /// The short user-visible tag this error is reported under, per spec §7.
    pub fn tag(&self) -> &'static str {
        match self {
            Error::WrongArity => "ERROR",
            Error::JsonParseError => "ERROR",
            Error::NxXxMisuse => "SYNTAXERR",
            Error::PathSyntax(_) => "SYNTAXERR",
            Error::PathNonExistent => "NONEXISTENT",
            Error::KeyNonExistent => "NONEXISTENT",
            Error::WrongType { .. } => "WRONGTYPE",
            Error::AdditionOverflow | Error::MultiplicationOverflow => "OVERFLOW",
            Error::EmptyContainer => "EMPTYVAL",
            Error::IndexOutOfBounds => "OUTOFBOUNDARIES",
            Error::UnknownSubcommand(_) => "ERROR",
            Error::PthreadInit => "PTHREADERR",
            Error::InvalidRdbFormat => "ERROR",
            Error::DocumentSizeLimitExceeded
            | Error::DocumentPathLimitExceeded
            | Error::ParserRecursionLimitExceeded
            | Error::RecursiveDescentLimitExceeded
            | Error::QueryStringSizeLimitExceeded => "LIMIT",
            Error::InvalidConfigValue(_) => "ERROR",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn syntax_errors_are_flagged() {
        let e = Error::PathSyntax(PathSyntaxError::ZeroStep);
        assert!(e.is_syntax());
        assert_eq!(e.tag(), "SYNTAXERR");
    }

    #[test]
    fn non_syntax_errors_are_not_flagged() {
        assert!(!Error::IndexOutOfBounds.is_syntax());
        assert_eq!(Error::IndexOutOfBounds.tag(), "OUTOFBOUNDARIES");
        assert_eq!(Error::EmptyContainer.tag(), "EMPTYVAL");
        assert_eq!(
            Error::WrongType {
                expected: "object",
                found: "array"
            }
            .tag(),
            "WRONGTYPE"
        );
    }
}
