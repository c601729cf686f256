//! Surface syntax produced by the reader.
//!
//! Syntax trees are plain data: nothing is resolved or validated beyond
//! the shape of literals. Numbers are already normalized, so `4/2` reads
//! as the integer `2`.

use std::fmt;

use crate::number::{Number, Rational};

#[derive(Debug, Clone, PartialEq)]
pub enum Syntax {
    Integer(i64),
    Rational(Rational),
    String(String),
    Symbol(String),
    Boolean(bool),
    /// A standalone `.` marking the improper tail of a list
    Dot,
    List(Vec<Syntax>),
}

impl Syntax {
    pub fn symbol(name: impl Into<String>) -> Self {
        Syntax::Symbol(name.into())
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Syntax::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

impl From<Number> for Syntax {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Syntax::Integer(i),
            Number::Rational(r) => Syntax::Rational(r),
        }
    }
}

/// Write `s` as a readable string literal, escaping what the reader unescapes.
pub(crate) fn write_string_literal(f: &mut fmt::Formatter, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for ch in s.chars() {
        match ch {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Syntax::Integer(n) => write!(f, "{n}"),
            Syntax::Rational(r) => write!(f, "{r}"),
            Syntax::String(s) => write_string_literal(f, s),
            Syntax::Symbol(s) => write!(f, "{s}"),
            Syntax::Boolean(true) => write!(f, "#t"),
            Syntax::Boolean(false) => write!(f, "#f"),
            Syntax::Dot => write!(f, "."),
            Syntax::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
