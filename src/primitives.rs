//! Builtin procedures and reserved words.
//!
//! Both tables are immutable statics built once on first use. The analyzer
//! consults them to turn direct calls like `(+ a b)` into specialized
//! nodes and to dispatch special forms; the evaluator consults the
//! primitive table when a name has no binding, so `car` evaluates to a
//! first-class procedure that can be passed around like any closure.
//!
//! ## Adding a primitive
//!
//! 1. Write a function with the signature `fn(&[Value]) -> Result<Value, Error>`.
//!    It may assume the argument count already satisfies its [`Arity`].
//! 2. Add a [`Primitive`] entry to `PRIMITIVES`.
//! 3. If a call with no operands has a constant result, set `empty_call`
//!    so the analyzer folds it.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::Error;
use crate::expr::Expr;
use crate::number::Number;
use crate::value::{Procedure, Value};

/// Accepted argument counts for a procedure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Exactly n arguments
    Exact(usize),
    /// At least n arguments
    AtLeast(usize),
    /// Between min and max arguments (inclusive)
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
            Arity::Range(min, max) => (min..=max).contains(&count),
        }
    }

    pub fn validate(self, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
            Arity::Range(min, max) => write!(f, "{min} to {max}"),
        }
    }
}

/// A builtin procedure
pub struct Primitive {
    pub name: &'static str,
    pub arity: Arity,
    pub func: fn(&[Value]) -> Result<Value, Error>,
    /// Constant expression a call without operands folds to
    pub empty_call: Option<fn() -> Expr>,
}

impl Primitive {
    /// Check the argument count, then run the builtin
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        self.arity.validate(args.len())?;
        (self.func)(args)
    }
}

impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Primitive({})", self.name)
    }
}

/// Keywords introducing special forms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedWord {
    Begin,
    Quote,
    If,
    Cond,
    And,
    Or,
    Lambda,
    Define,
    Let,
    Letrec,
    Set,
}

//
// Argument helpers
//

fn number_arg(name: &str, value: &Value) -> Result<Number, Error> {
    value.as_number().ok_or_else(|| {
        Error::type_error(format!(
            "{name} expects numbers, got {} {value}",
            value.type_name()
        ))
    })
}

fn pair_arg<'a>(name: &str, value: &'a Value) -> Result<&'a crate::value::Pair, Error> {
    match value {
        Value::Pair(pair) => Ok(pair),
        other => Err(Error::type_error(format!(
            "{name} expects a pair, got {} {other}",
            other.type_name()
        ))),
    }
}

fn fold_numbers(
    name: &str,
    first: Number,
    rest: &[Value],
    op: fn(Number, Number) -> Result<Number, Error>,
) -> Result<Value, Error> {
    let mut acc = first;
    for arg in rest {
        acc = op(acc, number_arg(name, arg)?)?;
    }
    Ok(acc.into())
}

//
// Arithmetic
//

fn builtin_add(args: &[Value]) -> Result<Value, Error> {
    fold_numbers("+", Number::Integer(0), args, Number::add)
}

fn builtin_sub(args: &[Value]) -> Result<Value, Error> {
    let first = number_arg("-", &args[0])?;
    if args.len() == 1 {
        return Ok(first.negate()?.into());
    }
    fold_numbers("-", first, &args[1..], Number::sub)
}

fn builtin_mul(args: &[Value]) -> Result<Value, Error> {
    fold_numbers("*", Number::Integer(1), args, Number::mul)
}

fn builtin_div(args: &[Value]) -> Result<Value, Error> {
    let first = number_arg("/", &args[0])?;
    if args.len() == 1 {
        return Ok(Number::Integer(1).div(first)?.into());
    }
    fold_numbers("/", first, &args[1..], Number::div)
}

fn builtin_modulo(args: &[Value]) -> Result<Value, Error> {
    let a = number_arg("modulo", &args[0])?;
    let b = number_arg("modulo", &args[1])?;
    Ok(a.modulo(b)?.into())
}

fn builtin_expt(args: &[Value]) -> Result<Value, Error> {
    let base = number_arg("expt", &args[0])?;
    let exp = number_arg("expt", &args[1])?;
    Ok(base.expt(exp)?.into())
}

// Chained comparison: every adjacent pair must satisfy the relation.
// All arguments are type checked even after the result is known.
macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $op_str:expr) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            let numbers = args
                .iter()
                .map(|arg| number_arg($op_str, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Boolean(
                numbers.windows(2).all(|pair| pair[0] $op pair[1]),
            ))
        }
    };
}

numeric_comparison!(builtin_lt, <, "<");
numeric_comparison!(builtin_le, <=, "<=");
numeric_comparison!(builtin_num_eq, ==, "=");
numeric_comparison!(builtin_ge, >=, ">=");
numeric_comparison!(builtin_gt, >, ">");

//
// Pairs and lists
//

fn builtin_cons(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::cons(args[0].clone(), args[1].clone()))
}

fn builtin_car(args: &[Value]) -> Result<Value, Error> {
    Ok(pair_arg("car", &args[0])?.car())
}

fn builtin_cdr(args: &[Value]) -> Result<Value, Error> {
    Ok(pair_arg("cdr", &args[0])?.cdr())
}

fn builtin_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::list(args.iter().cloned()))
}

fn builtin_set_car(args: &[Value]) -> Result<Value, Error> {
    pair_arg("set-car!", &args[0])?.set_car(args[1].clone());
    Ok(Value::Void)
}

fn builtin_set_cdr(args: &[Value]) -> Result<Value, Error> {
    pair_arg("set-cdr!", &args[0])?.set_cdr(args[1].clone());
    Ok(Value::Void)
}

//
// Predicates
//

fn builtin_is_list(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(args[0].is_list()))
}

fn builtin_is_eq(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(args[0].is_eq(&args[1])))
}

macro_rules! type_predicate {
    ($name:ident, $pattern:pat) => {
        fn $name(args: &[Value]) -> Result<Value, Error> {
            Ok(Value::Boolean(matches!(args[0], $pattern)))
        }
    };
}

type_predicate!(builtin_is_boolean, Value::Boolean(_));
type_predicate!(builtin_is_number, Value::Integer(_) | Value::Rational(_));
type_predicate!(builtin_is_null, Value::Null);
type_predicate!(builtin_is_pair, Value::Pair(_));
type_predicate!(builtin_is_procedure, Value::Procedure(_));
type_predicate!(builtin_is_symbol, Value::Symbol(_));
type_predicate!(builtin_is_string, Value::String(_));

fn builtin_not(args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Boolean(!args[0].is_truthy()))
}

//
// Effects
//

fn builtin_display(args: &[Value]) -> Result<Value, Error> {
    match &args[0] {
        Value::String(s) => print!("{s}"),
        other => print!("{other}"),
    }
    Ok(Value::Void)
}

fn builtin_void(_args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Void)
}

fn builtin_exit(_args: &[Value]) -> Result<Value, Error> {
    Ok(Value::Terminate)
}

/// Global registry of all primitives
static PRIMITIVES: LazyLock<Vec<Primitive>> = LazyLock::new(|| {
    fn prim(
        name: &'static str,
        arity: Arity,
        func: fn(&[Value]) -> Result<Value, Error>,
    ) -> Primitive {
        Primitive {
            name,
            arity,
            func,
            empty_call: None,
        }
    }

    vec![
        // Arithmetic
        Primitive {
            empty_call: Some(|| Expr::Integer(0)),
            ..prim("+", Arity::AtLeast(0), builtin_add)
        },
        prim("-", Arity::AtLeast(1), builtin_sub),
        Primitive {
            empty_call: Some(|| Expr::Integer(1)),
            ..prim("*", Arity::AtLeast(0), builtin_mul)
        },
        prim("/", Arity::AtLeast(1), builtin_div),
        prim("modulo", Arity::Exact(2), builtin_modulo),
        prim("expt", Arity::Exact(2), builtin_expt),
        // Comparison
        prim("<", Arity::AtLeast(1), builtin_lt),
        prim("<=", Arity::AtLeast(1), builtin_le),
        prim("=", Arity::AtLeast(1), builtin_num_eq),
        prim(">=", Arity::AtLeast(1), builtin_ge),
        prim(">", Arity::AtLeast(1), builtin_gt),
        // Pairs and lists
        prim("cons", Arity::Exact(2), builtin_cons),
        prim("car", Arity::Exact(1), builtin_car),
        prim("cdr", Arity::Exact(1), builtin_cdr),
        prim("list", Arity::AtLeast(0), builtin_list),
        prim("set-car!", Arity::Exact(2), builtin_set_car),
        prim("set-cdr!", Arity::Exact(2), builtin_set_cdr),
        // Predicates
        prim("list?", Arity::Exact(1), builtin_is_list),
        prim("eq?", Arity::Exact(2), builtin_is_eq),
        prim("boolean?", Arity::Exact(1), builtin_is_boolean),
        prim("number?", Arity::Exact(1), builtin_is_number),
        prim("null?", Arity::Exact(1), builtin_is_null),
        prim("pair?", Arity::Exact(1), builtin_is_pair),
        prim("procedure?", Arity::Exact(1), builtin_is_procedure),
        prim("symbol?", Arity::Exact(1), builtin_is_symbol),
        prim("string?", Arity::Exact(1), builtin_is_string),
        prim("not", Arity::Exact(1), builtin_not),
        // Effects
        prim("display", Arity::Exact(1), builtin_display),
        Primitive {
            empty_call: Some(|| Expr::Void),
            ..prim("void", Arity::Exact(0), builtin_void)
        },
        Primitive {
            empty_call: Some(|| Expr::Exit),
            ..prim("exit", Arity::Exact(0), builtin_exit)
        },
    ]
});

static PRIMITIVE_NAMES: LazyLock<HashMap<&'static str, &'static Primitive>> =
    LazyLock::new(|| {
        let prims: &'static [Primitive] = PRIMITIVES.as_slice();
        prims.iter().map(|p| (p.name, p)).collect()
    });

static RESERVED_WORDS: LazyLock<HashMap<&'static str, ReservedWord>> = LazyLock::new(|| {
    HashMap::from([
        ("begin", ReservedWord::Begin),
        ("quote", ReservedWord::Quote),
        ("if", ReservedWord::If),
        ("cond", ReservedWord::Cond),
        ("and", ReservedWord::And),
        ("or", ReservedWord::Or),
        ("lambda", ReservedWord::Lambda),
        ("define", ReservedWord::Define),
        ("let", ReservedWord::Let),
        ("letrec", ReservedWord::Letrec),
        ("set!", ReservedWord::Set),
    ])
});

/// All primitives in registry order
pub fn primitives() -> &'static [Primitive] {
    PRIMITIVES.as_slice()
}

/// Find a primitive by name
pub fn find_primitive(name: &str) -> Option<&'static Primitive> {
    PRIMITIVE_NAMES.get(name).copied()
}

/// Find a reserved word by name
pub fn find_reserved(name: &str) -> Option<ReservedWord> {
    RESERVED_WORDS.get(name).copied()
}

/// Give a primitive value-hood, e.g. when `car` is passed as an argument
pub fn primitive_value(name: &str) -> Option<Value> {
    find_primitive(name).map(|p| Value::Procedure(Procedure::Primitive(p)))
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::value::{nil, sym, val};

    fn success<T: Into<Value>>(value: T) -> Option<Value> {
        Some(val(value))
    }

    fn rational(n: i128, d: i128) -> Value {
        Number::ratio(n, d, "test").unwrap().into()
    }

    /// Invoke a primitive the way the evaluator applies one
    fn call_builtin(name: &str, args: &[Value]) -> Result<Value, Error> {
        find_primitive(name)
            .unwrap_or_else(|| panic!("primitive not found: {name}"))
            .call(args)
    }

    macro_rules! test {
        ($name:expr, $args:expr, $expected:expr) => {
            ($name, call_builtin($name, $args), $expected)
        };
    }

    #[test]
    fn test_registry() {
        let car = find_primitive("car").unwrap();
        assert_eq!(car.arity, Arity::Exact(1));
        assert!(std::ptr::eq(car, find_primitive("car").unwrap()));

        assert!(find_primitive("unknown").is_none());
        assert!(find_primitive("if").is_none());
        assert_eq!(find_reserved("if"), Some(ReservedWord::If));
        assert_eq!(find_reserved("set!"), Some(ReservedWord::Set));
        assert_eq!(find_reserved("car"), None);

        // Names are unique and no primitive is also a reserved word
        for p in primitives() {
            assert!(std::ptr::eq(find_primitive(p.name).unwrap(), p));
            assert!(find_reserved(p.name).is_none(), "{} is reserved", p.name);
        }

        assert_eq!(
            primitive_value("cons").unwrap().to_string(),
            "#<procedure:cons>"
        );
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_builtin_function_implementations() {
        type TestCase = (&'static str, Result<Value, Error>, Option<Value>);

        let pair = Value::cons(val(1), val(2));
        let many_ones: Vec<Value> = (0..100).map(|_| val(1)).collect();

        let test_cases: Vec<TestCase> = vec![
            // =================================================================
            // ARITHMETIC
            // =================================================================
            test!("+", &[], success(0)),
            test!("+", &[val(5)], success(5)),
            test!("+", &[val(1), val(2), val(3)], success(6)),
            test!("+", &many_ones, success(100)),
            test!("+", &[rational(1, 2), rational(1, 2)], success(1)),
            test!("+", &[val(1), rational(1, 3)], Some(rational(4, 3))),
            test!("+", &[val("not a number")], None),
            test!("+", &[val(1), val(true)], None),
            test!("+", &[val(i64::MAX), val(1)], None),
            test!("-", &[val(5)], success(-5)),
            test!("-", &[rational(1, 2)], Some(rational(-1, 2))),
            test!("-", &[val(10), val(3), val(2)], success(5)),
            test!("-", &[], None),
            test!("-", &[val(5), val(false)], None),
            test!("*", &[], success(1)),
            test!("*", &[val(2), val(3), val(4)], success(24)),
            test!("*", &[rational(2, 3), val(3)], success(2)),
            test!("*", &[val(2), nil()], None),
            test!("/", &[val(6), val(3)], success(2)),
            test!("/", &[val(1), val(3)], Some(rational(1, 3))),
            test!("/", &[val(2)], Some(rational(1, 2))),
            test!("/", &[rational(1, 2)], success(2)),
            test!("/", &[val(60), val(2), val(3)], success(10)),
            test!("/", &[val(1), val(0)], None),
            test!("/", &[val(0)], None),
            test!("/", &[], None),
            test!("modulo", &[val(-7), val(2)], success(1)),
            test!("modulo", &[val(7), val(-2)], success(-1)),
            test!("modulo", &[val(7), val(0)], None),
            test!("modulo", &[val(7)], None),
            test!("expt", &[val(2), val(10)], success(1024)),
            test!("expt", &[val(2), val(64)], None),
            test!("expt", &[val(2), val(-1)], None),
            // =================================================================
            // COMPARISON
            // =================================================================
            test!("<", &[val(1), val(2), val(3)], success(true)),
            test!("<", &[val(1), val(3), val(2)], success(false)),
            test!("<", &[val(1)], success(true)),
            test!("<", &[rational(1, 3), rational(1, 2)], success(true)),
            test!("<=", &[val(3), val(3), val(4)], success(true)),
            test!("=", &[val(2), rational(4, 2), val(2)], success(true)),
            test!("=", &[val(2), val(3)], success(false)),
            test!(">=", &[val(3), val(4)], success(false)),
            test!(">", &[val(9), val(6), val(2)], success(true)),
            test!(">", &[val(9), val(6), val(7)], success(false)),
            test!("<", &[val(2), val(1), val("x")], None),
            test!("<", &[], None),
            // =================================================================
            // PAIRS AND LISTS
            // =================================================================
            test!("cons", &[val(1), val(2)], Some(Value::cons(val(1), val(2)))),
            test!("cons", &[val(1), nil()], success([1])),
            test!("car", &[pair.clone()], success(1)),
            test!("cdr", &[pair.clone()], success(2)),
            test!("car", &[nil()], None),
            test!("cdr", &[val(5)], None),
            test!("list", &[], Some(nil())),
            test!("list", &[val(1), val(2)], success([1, 2])),
            test!("set-car!", &[pair.clone(), val(10)], Some(Value::Void)),
            test!("set-cdr!", &[nil(), val(10)], None),
            // =================================================================
            // PREDICATES
            // =================================================================
            test!("list?", &[nil()], success(true)),
            test!("list?", &[val([1, 2])], success(true)),
            test!("list?", &[pair.clone()], success(false)),
            test!("list?", &[val(1)], success(false)),
            test!("eq?", &[val(3), val(3)], success(true)),
            test!("eq?", &[sym("a"), sym("a")], success(true)),
            test!("eq?", &[pair.clone(), pair.clone()], success(true)),
            test!("eq?", &[val([1]), val([1])], success(false)),
            test!("eq?", &[nil(), nil()], success(true)),
            test!("eq?", &[val(1), val(true)], success(false)),
            test!("boolean?", &[val(false)], success(true)),
            test!("boolean?", &[nil()], success(false)),
            test!("number?", &[val(1)], success(true)),
            test!("number?", &[rational(1, 2)], success(true)),
            test!("number?", &[val("1")], success(false)),
            test!("null?", &[nil()], success(true)),
            test!("null?", &[val([1])], success(false)),
            test!("pair?", &[pair.clone()], success(true)),
            test!("pair?", &[nil()], success(false)),
            test!(
                "procedure?",
                &[primitive_value("car").unwrap()],
                success(true)
            ),
            test!("procedure?", &[sym("car")], success(false)),
            test!("symbol?", &[sym("x")], success(true)),
            test!("symbol?", &[val("x")], success(false)),
            test!("string?", &[val("x")], success(true)),
            test!("not", &[val(false)], success(true)),
            test!("not", &[val(0)], success(false)),
            test!("not", &[nil()], success(false)),
            test!("not", &[], None),
            // =================================================================
            // EFFECTS
            // =================================================================
            test!("void", &[], Some(Value::Void)),
            test!("void", &[val(1)], None),
            test!("exit", &[], Some(Value::Terminate)),
        ];

        for (test_expr, result, expected) in test_cases {
            match (result, expected) {
                (Ok(actual), Some(expected_val)) => {
                    assert_eq!(actual, expected_val, "Failed for test case: {test_expr}");
                }
                (Err(_), None) => {}
                (actual, expected) => panic!(
                    "Unexpected result for test case: {test_expr}\nGot: {actual:?}, Expected: {expected:?}"
                ),
            }
        }

        // set-car! above mutated the shared pair
        assert_eq!(pair.to_string(), "(10 . 2)");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            call_builtin("/", &[val(1), val(0)]).unwrap_err(),
            Error::DivisionByZero
        );
        assert!(matches!(
            call_builtin("*", &[val(i64::MAX), val(2)]).unwrap_err(),
            Error::Overflow(_)
        ));
        assert!(matches!(
            call_builtin("car", &[val(1)]).unwrap_err(),
            Error::TypeError(_)
        ));
        match call_builtin("cons", &[val(1)]).unwrap_err() {
            Error::ArityError { expected, got, .. } => {
                assert_eq!(expected, "2");
                assert_eq!(got, 1);
            }
            other => panic!("Expected ArityError, got {other:?}"),
        }
    }

    #[test]
    fn test_arity_validation() {
        use Arity::*;

        Exact(2).validate(2).unwrap();
        Exact(2).validate(1).unwrap_err();
        Exact(2).validate(3).unwrap_err();

        AtLeast(1).validate(1).unwrap();
        AtLeast(1).validate(2).unwrap();
        AtLeast(1).validate(0).unwrap_err();

        Range(1, 3).validate(1).unwrap();
        Range(1, 3).validate(3).unwrap();
        Range(1, 3).validate(0).unwrap_err();
        Range(1, 3).validate(4).unwrap_err();

        match AtLeast(2).validate(1).unwrap_err() {
            Error::ArityError { expected, got, .. } => {
                assert_eq!(expected, "at least 2");
                assert_eq!(got, 1);
            }
            _ => panic!("Expected ArityError"),
        }
    }
}
