//! Analyzed expression tree.
//!
//! An `Expr` is built once by the analyzer and never modified, so the same
//! tree can be evaluated any number of times in different frames.

use std::rc::Rc;

use crate::number::Rational;
use crate::primitives::Primitive;
use crate::syntax::Syntax;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Integer(i64),
    Rational(Rational),
    String(Rc<str>),
    Boolean(bool),
    /// `(void)`
    Void,
    /// `(exit)`
    Exit,
    Variable(String),
    /// Direct primitive call with one operand
    Unary {
        op: &'static Primitive,
        operand: Box<Expr>,
    },
    /// Direct primitive call with two operands
    Binary {
        op: &'static Primitive,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Direct primitive call with any other operand count
    Variadic {
        op: &'static Primitive,
        operands: Vec<Expr>,
    },
    /// Quoted datum, converted to a value on each evaluation
    Quote(Syntax),
    If {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternative: Option<Box<Expr>>,
    },
    Cond(Vec<CondClause>),
    Begin(Vec<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Lambda(Rc<Lambda>),
    Define {
        name: String,
        value: Box<Expr>,
    },
    Let {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
    Letrec {
        bindings: Vec<(String, Expr)>,
        body: Box<Expr>,
    },
    Set {
        name: String,
        value: Box<Expr>,
    },
    Apply {
        operator: Box<Expr>,
        operands: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum CondClause {
    /// `(test body...)`; an empty body yields the test value
    Test { test: Expr, body: Vec<Expr> },
    /// `(else body...)`, only valid as the last clause
    Else(Vec<Expr>),
}

#[derive(Debug, PartialEq)]
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Expr,
}
