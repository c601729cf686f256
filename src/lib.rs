//! minischeme - a tree-walking interpreter for a small Scheme dialect
//!
//! Source text goes through three stages:
//!
//! 1. the reader turns text into [`syntax::Syntax`] trees,
//! 2. the analyzer turns a syntax tree into an immutable [`expr::Expr`],
//!    resolving special forms and specializing primitive calls by arity,
//! 3. the evaluator walks the expression against an
//!    [`environment::Environment`] and produces a [`value::Value`].
//!
//! ```scheme
//! (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
//! (fact 20)          ; 2432902008176640000
//! (/ 1 3)            ; 1/3
//! (cons 1 '(2 . 3))  ; (1 2 . 3)
//! ```
//!
//! ## Numbers
//!
//! Only exact numbers exist: 64-bit integers and normalized rationals.
//! Arithmetic never wraps; leaving the `i64` range is reported as
//! [`Error::Overflow`].
//!
//! ## Modules
//!
//! - `reader`: S-expression reading from text (feature `reader`)
//! - `analyzer`: syntax to expression translation
//! - `evaluator`: expression evaluation and procedure application
//! - `primitives`: the builtin procedure and reserved word tables
//! - `environment`: arena of binding frames

use std::fmt;

/// Maximum nesting depth accepted by the reader
pub const MAX_READ_DEPTH: usize = 512;

/// Default number of nested procedure calls before a computation is
/// abandoned with [`Error::DepthLimit`]. Native stack growth is handled
/// separately, so this only bounds runaway recursion.
pub const DEFAULT_MAX_EVAL_DEPTH: usize = 50_000;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Clone)]
pub enum ReadErrorKind {
    /// Invalid or unexpected syntax (bad tokens, stray closing parenthesis)
    InvalidSyntax,
    /// Input ended before the datum was complete (unterminated string, unclosed parens)
    Incomplete,
    /// Datum nesting exceeded [`MAX_READ_DEPTH`]
    TooDeeplyNested,
    /// Extra input found after a complete datum
    TrailingContent,
    /// Literal outside what the implementation can represent
    ImplementationLimit,
}

/// A structured error describing a reader failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ReadError {
    pub kind: ReadErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token, if identifiable
    pub found: Option<String>,
}

impl ReadError {
    pub fn new(
        kind: ReadErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ReadError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    pub fn from_message(kind: ReadErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ReadError with a context snippet taken from `input` around
    /// the byte offset `error_offset`
    pub fn with_context(
        kind: ReadErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        let error_char = input
            .get(..error_offset)
            .map_or_else(|| input.chars().count(), |before| before.chars().count());
        let total_chars = input.chars().count();

        let context_start = error_char.saturating_sub(20);
        let snippet: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();
        let snippet_chars = total_chars.saturating_sub(context_start).min(MAX_CONTEXT);

        let mut context = String::new();
        if context_start > 0 {
            context.push_str("[...]");
        }
        context.push_str(&snippet);
        if context_start + snippet_chars < total_chars {
            context.push_str("[...]");
        }
        let context = context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(context), found)
    }
}

/// Error type shared by reading, analysis and evaluation.
///
/// Every variant is recoverable: the failing top-level form is abandoned
/// and the global environment stays usable.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ReadError(ReadError),
    /// Malformed special form, stray `.` or illegal dot placement in a quoted list
    SyntaxError(String),
    /// A symbol that cannot name a variable (numeric-looking, bad characters)
    InvalidVariable(String),
    UnboundVariable(String),
    ArityError {
        expected: String,
        got: usize,
        expression: Option<String>,
    },
    /// Application of something that is not a procedure
    NotAProcedure(String),
    TypeError(String),
    DivisionByZero,
    Overflow(String),
    /// Evaluation nested deeper than the configured limit
    DepthLimit(usize),
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            expected: expected.to_string(),
            got,
            expression: None,
        }
    }

    /// Create an ArityError naming the offending expression
    pub fn arity_error_with_expr(
        expected: impl fmt::Display,
        got: usize,
        expression: impl Into<String>,
    ) -> Self {
        Error::ArityError {
            expected: expected.to_string(),
            got,
            expression: Some(expression.into()),
        }
    }

    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Error::SyntaxError(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Error::TypeError(message.into())
    }

    /// True when reading stopped only because the input ended early.
    /// A line-oriented front end can ask for more input in that case.
    pub fn is_incomplete(&self) -> bool {
        matches!(
            self,
            Error::ReadError(ReadError {
                kind: ReadErrorKind::Incomplete,
                ..
            })
        )
    }
}

impl From<ReadError> for Error {
    fn from(e: ReadError) -> Self {
        Error::ReadError(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ReadError(e) => {
                write!(f, "ReadError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::SyntaxError(msg) => write!(f, "SyntaxError: {msg}"),
            Error::InvalidVariable(name) => write!(f, "Invalid variable name: {name}"),
            Error::UnboundVariable(name) => write!(f, "Unbound variable: {name}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: procedure expected {expected} arguments but got {got}"
                ),
            },
            Error::NotAProcedure(what) => write!(f, "Not a procedure: {what}"),
            Error::TypeError(msg) => write!(f, "Type error: {msg}"),
            Error::DivisionByZero => write!(f, "Division by zero"),
            Error::Overflow(op) => write!(f, "Arithmetic overflow in {op}"),
            Error::DepthLimit(limit) => {
                write!(f, "Evaluation exceeded maximum depth of {limit}")
            }
        }
    }
}

impl std::error::Error for Error {}

pub mod analyzer;
pub mod environment;
pub mod evaluator;
pub mod expr;
pub mod number;
pub mod primitives;
mod stack;
pub mod syntax;
pub mod value;

#[cfg(feature = "reader")]
pub mod reader;

pub use analyzer::analyze;
pub use environment::{EvalConfig, Environment};
pub use evaluator::evaluate;
pub use value::Value;
