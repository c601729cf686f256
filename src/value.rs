//! Runtime values.
//!
//! Values are cheap to clone: compound data (pairs, strings, symbols,
//! procedures) is reference counted, and pairs use interior mutability so
//! `set-car!`/`set-cdr!` are visible through every reference. `Value` is
//! neither `Send` nor `Sync`; an interpreter instance belongs to one thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ptr;
use std::rc::Rc;

use crate::environment::FrameId;
use crate::expr::Lambda;
use crate::number::{Number, Rational};
use crate::primitives::Primitive;

#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Rational(Rational),
    Boolean(bool),
    Symbol(Rc<str>),
    String(Rc<str>),
    Null,
    /// Result of forms evaluated for effect (`define`, `display`, `(void)`)
    Void,
    Pair(Rc<Pair>),
    Procedure(Procedure),
    /// Produced by `(exit)`; the REPL stops when a top-level form yields it
    Terminate,
}

/// A mutable cons cell
pub struct Pair {
    car: RefCell<Value>,
    cdr: RefCell<Value>,
}

impl Pair {
    pub fn car(&self) -> Value {
        self.car.borrow().clone()
    }

    pub fn cdr(&self) -> Value {
        self.cdr.borrow().clone()
    }

    pub fn set_car(&self, value: Value) {
        *self.car.borrow_mut() = value;
    }

    pub fn set_cdr(&self, value: Value) {
        *self.cdr.borrow_mut() = value;
    }
}

/// A first-class procedure: a user closure or a builtin given value-hood.
#[derive(Clone)]
pub enum Procedure {
    Closure(Rc<Closure>),
    Primitive(&'static Primitive),
}

/// A lambda together with the frame it was created in.
pub struct Closure {
    pub lambda: Rc<Lambda>,
    pub env: FrameId,
}

impl Procedure {
    /// Identity comparison, the notion `eq?` uses for procedures
    pub fn same(&self, other: &Procedure) -> bool {
        match (self, other) {
            (Procedure::Closure(a), Procedure::Closure(b)) => Rc::ptr_eq(a, b),
            (Procedure::Primitive(a), Procedure::Primitive(b)) => ptr::eq(*a, *b),
            _ => false,
        }
    }
}

impl Value {
    pub fn cons(car: Value, cdr: Value) -> Value {
        Value::Pair(Rc::new(Pair {
            car: RefCell::new(car),
            cdr: RefCell::new(cdr),
        }))
    }

    /// Build a proper list
    pub fn list(items: impl IntoIterator<Item = Value>) -> Value {
        Value::list_with_tail(items, Value::Null)
    }

    /// Build a chain of pairs ending in `tail`, e.g. `(1 2 . 3)`
    pub fn list_with_tail(items: impl IntoIterator<Item = Value>, tail: Value) -> Value {
        let items: Vec<Value> = items.into_iter().collect();
        items
            .into_iter()
            .rev()
            .fold(tail, |acc, item| Value::cons(item, acc))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Rc::from(name))
    }

    pub fn string(s: &str) -> Value {
        Value::String(Rc::from(s))
    }

    /// Only `#f` is false
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn is_terminate(&self) -> bool {
        matches!(self, Value::Terminate)
    }

    /// True for `()` and for any pair chain ending in `()`. A chain that
    /// loops back on itself is not a list.
    pub fn is_list(&self) -> bool {
        // Floyd: `fast` moves two links for each link of `slow`
        let mut slow = self.clone();
        let mut fast = self.clone();
        loop {
            for _ in 0..2 {
                fast = match fast {
                    Value::Null => return true,
                    Value::Pair(pair) => pair.cdr(),
                    _ => return false,
                };
            }
            if let Value::Pair(pair) = slow {
                slow = pair.cdr();
            }
            if let (Value::Pair(a), Value::Pair(b)) = (&slow, &fast)
                && Rc::ptr_eq(a, b)
            {
                return false;
            }
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Integer(n) => Some(Number::Integer(*n)),
            Value::Rational(r) => Some(Number::Rational(*r)),
            _ => None,
        }
    }

    /// Collect the elements of a proper list
    pub fn list_items(&self) -> Option<Vec<Value>> {
        if !self.is_list() {
            return None;
        }
        let mut items = Vec::new();
        let mut current = self.clone();
        loop {
            match current {
                Value::Null => return Some(items),
                Value::Pair(pair) => {
                    items.push(pair.car());
                    current = pair.cdr();
                }
                _ => return None,
            }
        }
    }

    /// Short tag name used in type error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) | Value::Rational(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::Symbol(_) => "symbol",
            Value::String(_) => "string",
            Value::Null => "empty list",
            Value::Void => "void",
            Value::Pair(_) => "pair",
            Value::Procedure(_) => "procedure",
            Value::Terminate => "terminate",
        }
    }

    /// Identity in the sense of `eq?`: numbers, booleans and symbols compare
    /// by value, `()` and void are singletons, everything else by reference.
    pub fn is_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Rational(a), Value::Rational(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::String(a), Value::String(b)) => Rc::ptr_eq(a, b),
            (Value::Pair(a), Value::Pair(b)) => Rc::ptr_eq(a, b),
            (Value::Procedure(a), Value::Procedure(b)) => a.same(b),
            (Value::Null, Value::Null)
            | (Value::Void, Value::Void)
            | (Value::Terminate, Value::Terminate) => true,
            _ => false,
        }
    }
}

/// Structural equality, used by tests and by `Expr` comparisons.
/// Procedures compare by identity. Cyclic structures terminate: a pair
/// comparison already in progress is assumed to hold.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        structurally_equal(self, other, &mut HashSet::new())
    }
}

fn structurally_equal(
    a: &Value,
    b: &Value,
    seen: &mut HashSet<(*const Pair, *const Pair)>,
) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Pair(x), Value::Pair(y)) => {
            if Rc::ptr_eq(x, y) || !seen.insert((Rc::as_ptr(x), Rc::as_ptr(y))) {
                return true;
            }
            structurally_equal(&x.car(), &y.car(), seen)
                && structurally_equal(&x.cdr(), &y.cdr(), seen)
        }
        _ => a.is_eq(b),
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        match n {
            Number::Integer(i) => Value::Integer(i),
            Number::Rational(r) => Value::Rational(r),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<Procedure> for Value {
    fn from(p: Procedure) -> Self {
        Value::Procedure(p)
    }
}

macro_rules! impl_from_integer {
    ($($int_type:ty),*) => {
        $(
            impl From<$int_type> for Value {
                fn from(n: $int_type) -> Self {
                    Value::Integer(n.into())
                }
            }
        )*
    };
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::list(items.into_iter().map(Into::into))
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(items: [T; N]) -> Self {
        Value::list(items.into_iter().map(Into::into))
    }
}

/// Convenience constructor for building values in tests
pub fn val<T: Into<Value>>(value: T) -> Value {
    value.into()
}

/// Convenience constructor for symbols
pub fn sym(name: &str) -> Value {
    Value::symbol(name)
}

/// The empty list
pub fn nil() -> Value {
    Value::Null
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{n}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::String(s) => crate::syntax::write_string_literal(f, s),
            Value::Null => write!(f, "()"),
            Value::Void => write!(f, "#<void>"),
            Value::Pair(pair) => write_pair(f, pair, &mut HashSet::new()),
            Value::Procedure(Procedure::Closure(_)) => write!(f, "#<procedure>"),
            Value::Procedure(Procedure::Primitive(p)) => write!(f, "#<procedure:{}>", p.name),
            Value::Terminate => write!(f, "#<terminate>"),
        }
    }
}

/// Render a pair chain. `open` holds the pairs currently being printed; a
/// pair reached again through a `set-car!`/`set-cdr!` cycle prints as `...`.
fn write_pair(
    f: &mut fmt::Formatter,
    pair: &Rc<Pair>,
    open: &mut HashSet<*const Pair>,
) -> fmt::Result {
    let mut entered = vec![Rc::as_ptr(pair)];
    open.insert(Rc::as_ptr(pair));

    write!(f, "(")?;
    write_element(f, &pair.car(), open)?;
    let mut rest = pair.cdr();
    loop {
        match rest {
            Value::Null => break,
            Value::Pair(next) => {
                if !open.insert(Rc::as_ptr(&next)) {
                    write!(f, " . ...")?;
                    break;
                }
                entered.push(Rc::as_ptr(&next));
                write!(f, " ")?;
                write_element(f, &next.car(), open)?;
                rest = next.cdr();
            }
            tail => {
                write!(f, " . ")?;
                write_element(f, &tail, open)?;
                break;
            }
        }
    }

    for ptr in entered {
        open.remove(&ptr);
    }
    write!(f, ")")
}

fn write_element(
    f: &mut fmt::Formatter,
    value: &Value,
    open: &mut HashSet<*const Pair>,
) -> fmt::Result {
    match value {
        Value::Pair(pair) if open.contains(&Rc::as_ptr(pair)) => write!(f, "..."),
        Value::Pair(pair) => write_pair(f, pair, open),
        other => write!(f, "{other}"),
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "Integer({n})"),
            Value::Rational(r) => write!(f, "Rational({r})"),
            Value::Boolean(b) => write!(f, "Boolean({b})"),
            Value::Symbol(s) => write!(f, "Symbol({s})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Pair(_) => write!(f, "List({self})"),
            Value::Null => write!(f, "Null"),
            Value::Void => write!(f, "Void"),
            Value::Procedure(_) => write!(f, "Procedure({self})"),
            Value::Terminate => write!(f, "Terminate"),
        }
    }
}
