//! Syntax to expression analysis.
//!
//! The analyzer checks the shape of every special form and picks the most
//! specific node for direct primitive calls. It resolves the head of each
//! list in this order:
//!
//! 1. a name bound by the program (global binding, or a parameter or local
//!    definition of an enclosing form) is applied as an ordinary procedure,
//!    so user code can shadow builtins;
//! 2. a primitive name becomes a unary, binary or variadic primitive node,
//!    with the operand count checked here;
//! 3. a reserved word dispatches to its special form;
//! 4. anything else is a generic application, resolved at run time.
//!
//! Variable names are validated when they are referenced or bound.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::instrument;

use crate::Error;
use crate::environment::Environment;
use crate::expr::{CondClause, Expr, Lambda};
use crate::primitives::{Primitive, ReservedWord, find_primitive, find_reserved};
use crate::stack::ensure_sufficient_stack;
use crate::syntax::Syntax;

/// Translate a syntax tree into an expression.
///
/// `env` is only consulted to decide whether a head symbol names a user
/// binding; analysis never modifies it.
#[instrument(level = "trace", skip_all, fields(syntax = %syntax))]
pub fn analyze(syntax: &Syntax, env: &Environment) -> Result<Expr, Error> {
    let mut analyzer = Analyzer {
        env,
        scopes: vec![Vec::new()],
    };
    analyzer.analyze(syntax)
}

/// True if `s` would be read as a number rather than a name:
/// an optional sign, then either digits with at most one decimal point and
/// an optional exponent, or a `digits/digits` ratio. `+123`, `.5`, `+124.`,
/// `1e-3` and `+1/2` are numeric; `+`, `-`, `+foo`, `1+` and `1/` are not.
pub fn is_numeric(s: &str) -> bool {
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    if let Some((num, den)) = unsigned.split_once('/') {
        let all_digits = |t: &str| !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit());
        return all_digits(num) && all_digits(den);
    }
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(pos) => (&unsigned[..pos], Some(&unsigned[pos + 1..])),
        None => (unsigned, None),
    };

    let mut digits = 0;
    let mut points = 0;
    for c in mantissa.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => points += 1,
            _ => return false,
        }
    }
    if digits == 0 || points > 1 {
        return false;
    }

    match exponent {
        None => true,
        Some(exp) => {
            let exp = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            !exp.is_empty() && exp.chars().all(|c| c.is_ascii_digit())
        }
    }
}

/// Check that `name` can name a variable
pub fn validate_variable(name: &str) -> Result<(), Error> {
    let invalid = || Err(Error::InvalidVariable(name.to_string()));
    let Some(first) = name.chars().next() else {
        return invalid();
    };
    if first.is_ascii_digit() || first == '.' || first == '@' {
        return invalid();
    }
    if name.contains(['#', '\'', '"', '`']) {
        return invalid();
    }
    if is_numeric(name) {
        return invalid();
    }
    Ok(())
}

struct Analyzer<'a> {
    env: &'a Environment,
    /// Names bound by enclosing forms, innermost last. The outermost entry
    /// collects names defined at top level by the form being analyzed.
    scopes: Vec<Vec<String>>,
}

impl Analyzer<'_> {
    fn is_user_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.iter().any(|n| n == name))
            || self.env.is_bound(self.env.global(), name)
    }

    fn with_scope<T>(
        &mut self,
        names: Vec<String>,
        f: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        self.scopes.push(names);
        let result = f(self);
        self.scopes.pop();
        result
    }

    fn analyze(&mut self, syntax: &Syntax) -> Result<Expr, Error> {
        ensure_sufficient_stack(|| match syntax {
            Syntax::Integer(n) => Ok(Expr::Integer(*n)),
            Syntax::Rational(r) => Ok(Expr::Rational(*r)),
            Syntax::String(s) => Ok(Expr::String(Rc::from(s.as_str()))),
            Syntax::Boolean(b) => Ok(Expr::Boolean(*b)),
            Syntax::Symbol(name) => {
                validate_variable(name)?;
                Ok(Expr::Variable(name.clone()))
            }
            Syntax::Dot => Err(Error::syntax("unexpected `.` outside a quoted list")),
            Syntax::List(items) => self.analyze_list(syntax, items),
        })
    }

    fn analyze_all(&mut self, items: &[Syntax]) -> Result<Vec<Expr>, Error> {
        items.iter().map(|item| self.analyze(item)).collect()
    }

    fn analyze_list(&mut self, whole: &Syntax, items: &[Syntax]) -> Result<Expr, Error> {
        let Some((head, args)) = items.split_first() else {
            return Ok(Expr::Quote(Syntax::List(Vec::new())));
        };

        if let Syntax::Symbol(name) = head
            && !self.is_user_bound(name)
        {
            if let Some(op) = find_primitive(name) {
                return self.analyze_primitive(op, whole, args);
            }
            if let Some(word) = find_reserved(name) {
                return self.analyze_special_form(word, whole, args);
            }
        }

        let operator = self.analyze(head)?;
        let operands = self.analyze_all(args)?;
        Ok(Expr::Apply {
            operator: Box::new(operator),
            operands,
        })
    }

    fn analyze_primitive(
        &mut self,
        op: &'static Primitive,
        whole: &Syntax,
        args: &[Syntax],
    ) -> Result<Expr, Error> {
        if !op.arity.accepts(args.len()) {
            return Err(Error::arity_error_with_expr(
                op.arity,
                args.len(),
                whole.to_string(),
            ));
        }

        let mut operands = self.analyze_all(args)?;
        Ok(match operands.len() {
            0 => match op.empty_call {
                Some(fold) => fold(),
                None => Expr::Variadic { op, operands },
            },
            1 => Expr::Unary {
                op,
                operand: Box::new(operands.remove(0)),
            },
            2 => {
                let rhs = operands.remove(1);
                let lhs = operands.remove(0);
                Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                }
            }
            _ => Expr::Variadic { op, operands },
        })
    }

    fn analyze_special_form(
        &mut self,
        word: ReservedWord,
        whole: &Syntax,
        args: &[Syntax],
    ) -> Result<Expr, Error> {
        match word {
            ReservedWord::Quote => match args {
                [datum] => Ok(Expr::Quote(datum.clone())),
                _ => Err(malformed("quote", whole)),
            },
            ReservedWord::If => self.analyze_if(whole, args),
            ReservedWord::Cond => self.analyze_cond(whole, args),
            ReservedWord::Begin => {
                if args.is_empty() {
                    return Err(malformed("begin", whole));
                }
                Ok(Expr::Begin(self.analyze_all(args)?))
            }
            ReservedWord::And => Ok(Expr::And(self.analyze_all(args)?)),
            ReservedWord::Or => Ok(Expr::Or(self.analyze_all(args)?)),
            ReservedWord::Lambda => match args {
                [params, body] => {
                    let params = parameter_names(params, whole)?;
                    Ok(Expr::Lambda(self.analyze_lambda(params, body)?))
                }
                _ => Err(malformed("lambda", whole)),
            },
            ReservedWord::Define => self.analyze_define(whole, args),
            ReservedWord::Let => self.analyze_let(whole, args, false),
            ReservedWord::Letrec => self.analyze_let(whole, args, true),
            ReservedWord::Set => match args {
                [Syntax::Symbol(name), value] => {
                    validate_variable(name)?;
                    Ok(Expr::Set {
                        name: name.clone(),
                        value: Box::new(self.analyze(value)?),
                    })
                }
                _ => Err(malformed("set!", whole)),
            },
        }
    }

    fn analyze_if(&mut self, whole: &Syntax, args: &[Syntax]) -> Result<Expr, Error> {
        let (test, consequent, alternative) = match args {
            [test, consequent] => (test, consequent, None),
            [test, consequent, alternative] => (test, consequent, Some(alternative)),
            _ => return Err(malformed("if", whole)),
        };
        Ok(Expr::If {
            test: Box::new(self.analyze(test)?),
            consequent: Box::new(self.analyze(consequent)?),
            alternative: match alternative {
                Some(alt) => Some(Box::new(self.analyze(alt)?)),
                None => None,
            },
        })
    }

    fn analyze_cond(&mut self, whole: &Syntax, args: &[Syntax]) -> Result<Expr, Error> {
        if args.is_empty() {
            return Err(Error::syntax(format!(
                "cond requires at least one clause: {whole}"
            )));
        }

        let mut clauses = Vec::with_capacity(args.len());
        for (i, clause) in args.iter().enumerate() {
            let Syntax::List(parts) = clause else {
                return Err(Error::syntax(format!(
                    "cond clause must be a non-empty list: {clause}"
                )));
            };
            let Some((test, body)) = parts.split_first() else {
                return Err(Error::syntax(format!(
                    "cond clause must be a non-empty list: {clause}"
                )));
            };

            let body = self.analyze_all(body)?;
            if test.as_symbol() == Some("else") && !self.is_user_bound("else") {
                if i != args.len() - 1 {
                    return Err(Error::syntax(format!(
                        "else must be the last clause of cond: {whole}"
                    )));
                }
                clauses.push(CondClause::Else(body));
            } else {
                clauses.push(CondClause::Test {
                    test: self.analyze(test)?,
                    body,
                });
            }
        }
        Ok(Expr::Cond(clauses))
    }

    fn analyze_lambda(&mut self, params: Vec<String>, body: &Syntax) -> Result<Rc<Lambda>, Error> {
        let body = self.with_scope(params.clone(), |a| a.analyze(body))?;
        Ok(Rc::new(Lambda { params, body }))
    }

    fn analyze_define(&mut self, whole: &Syntax, args: &[Syntax]) -> Result<Expr, Error> {
        match args {
            [Syntax::Symbol(name), value] => {
                validate_variable(name)?;
                self.declare(name);
                Ok(Expr::Define {
                    name: name.clone(),
                    value: Box::new(self.analyze(value)?),
                })
            }
            // (define (name p ...) body) is (define name (lambda (p ...) body))
            [Syntax::List(signature), body] => {
                let Some((Syntax::Symbol(name), params)) = signature.split_first() else {
                    return Err(malformed("define", whole));
                };
                validate_variable(name)?;
                let params = symbol_names(params, whole)?;
                self.declare(name);
                Ok(Expr::Define {
                    name: name.clone(),
                    value: Box::new(Expr::Lambda(self.analyze_lambda(params, body)?)),
                })
            }
            _ => Err(malformed("define", whole)),
        }
    }

    /// Record a definition in the innermost scope so later forms in the same
    /// body treat the name as a user binding
    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut()
            && !scope.iter().any(|n| n == name)
        {
            scope.push(name.to_string());
        }
    }

    fn analyze_let(
        &mut self,
        whole: &Syntax,
        args: &[Syntax],
        recursive: bool,
    ) -> Result<Expr, Error> {
        let keyword = if recursive { "letrec" } else { "let" };
        let Some((Syntax::List(binding_forms), body)) = args.split_first() else {
            return Err(malformed(keyword, whole));
        };
        if body.is_empty() {
            return Err(malformed(keyword, whole));
        }

        let mut pairs = Vec::with_capacity(binding_forms.len());
        for form in binding_forms {
            match form {
                Syntax::List(parts) => match parts.as_slice() {
                    [Syntax::Symbol(name), init] => {
                        validate_variable(name)?;
                        pairs.push((name.clone(), init));
                    }
                    _ => return Err(malformed(keyword, whole)),
                },
                _ => return Err(malformed(keyword, whole)),
            }
        }
        let names: Vec<String> = pairs.iter().map(|(n, _)| n.clone()).collect();
        check_unique(&names, whole)?;

        let analyze_inits = |a: &mut Self| -> Result<Vec<(String, Expr)>, Error> {
            pairs
                .iter()
                .map(|(name, init)| Ok((name.clone(), a.analyze(init)?)))
                .collect()
        };

        let (bindings, body) = if recursive {
            self.with_scope(names, |a| {
                let bindings = analyze_inits(a)?;
                Ok((bindings, a.analyze_body(body)?))
            })?
        } else {
            let bindings = analyze_inits(self)?;
            (bindings, self.with_scope(names, |a| a.analyze_body(body))?)
        };

        let body = Box::new(body);
        Ok(if recursive {
            Expr::Letrec { bindings, body }
        } else {
            Expr::Let { bindings, body }
        })
    }

    /// One or more forms, the last of which gives the value
    fn analyze_body(&mut self, forms: &[Syntax]) -> Result<Expr, Error> {
        match forms {
            [single] => self.analyze(single),
            _ => Ok(Expr::Begin(self.analyze_all(forms)?)),
        }
    }
}

fn malformed(keyword: &str, whole: &Syntax) -> Error {
    Error::syntax(format!("malformed {keyword}: {whole}"))
}

fn parameter_names(params: &Syntax, whole: &Syntax) -> Result<Vec<String>, Error> {
    match params {
        Syntax::List(items) => symbol_names(items, whole),
        _ => Err(Error::syntax(format!(
            "lambda parameters must be a list of symbols: {whole}"
        ))),
    }
}

fn symbol_names(items: &[Syntax], whole: &Syntax) -> Result<Vec<String>, Error> {
    let mut names = Vec::with_capacity(items.len());
    for item in items {
        let Syntax::Symbol(name) = item else {
            return Err(Error::syntax(format!(
                "parameter must be a symbol, got {item}: {whole}"
            )));
        };
        validate_variable(name)?;
        names.push(name.clone());
    }
    check_unique(&names, whole)?;
    Ok(names)
}

fn check_unique(names: &[String], whole: &Syntax) -> Result<(), Error> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(Error::syntax(format!("duplicate name {name}: {whole}")));
        }
    }
    Ok(())
}

#[cfg(all(test, feature = "reader"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::reader::read_syntax;

    fn analyze_str(input: &str) -> Result<Expr, Error> {
        analyze_in(input, &Environment::new())
    }

    fn analyze_in(input: &str, env: &Environment) -> Result<Expr, Error> {
        analyze(&read_syntax(input).unwrap(), env)
    }

    fn op_name(expr: &Expr) -> Option<(&'static str, &'static str)> {
        match expr {
            Expr::Unary { op, .. } => Some(("unary", op.name)),
            Expr::Binary { op, .. } => Some(("binary", op.name)),
            Expr::Variadic { op, .. } => Some(("variadic", op.name)),
            _ => None,
        }
    }

    #[test]
    fn test_numeric_detection() {
        let numeric = [
            "1", "-1", "+123", ".123", "1e-3", "+124.", "-.5", "2E10", "1.5e+3", "+1/2", "-3/4", "1/0",
        ];
        for s in numeric {
            assert!(is_numeric(s), "{s} should be numeric");
        }
        let not_numeric = [
            "+", "-", "+foo", "1+", "e5", ".", "..", "1e", "1.2.3", "-e", "1/", "/2", "+1/x", "1/2/3", "a/b",
        ];
        for s in not_numeric {
            assert!(!is_numeric(s), "{s} should not be numeric");
        }
    }

    #[test]
    fn test_variable_validation() {
        let valid = ["x", "+foo", "list->vector", "set-car!", "a1", "-", "x.y", "λ"];
        for name in valid {
            validate_variable(name).unwrap();
        }
        let invalid = [
            "", "1x", ".x", "...", "@x", "a#b", "a'b", "a\"b", "a`b", "+123", "+124.", "-.5", "+1/2",
        ];
        for name in invalid {
            assert_eq!(
                validate_variable(name),
                Err(Error::InvalidVariable(name.to_string())),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_arity_specialization() {
        let cases = vec![
            ("(- 5)", Some(("unary", "-"))),
            ("(+ 1)", Some(("unary", "+"))),
            ("(+ 1 2)", Some(("binary", "+"))),
            ("(+ 1 2 3)", Some(("variadic", "+"))),
            ("(< 1 2 3 4)", Some(("variadic", "<"))),
            ("(car x)", Some(("unary", "car"))),
            ("(cons 1 2)", Some(("binary", "cons"))),
            ("(list)", Some(("variadic", "list"))),
        ];
        for (input, expected) in cases {
            let expr = analyze_str(input).unwrap();
            assert_eq!(op_name(&expr), expected, "{input}");
        }

        assert_eq!(analyze_str("(+)").unwrap(), Expr::Integer(0));
        assert_eq!(analyze_str("(*)").unwrap(), Expr::Integer(1));
        assert_eq!(analyze_str("(void)").unwrap(), Expr::Void);
        assert_eq!(analyze_str("(exit)").unwrap(), Expr::Exit);
    }

    #[test]
    fn test_primitive_arity_checked_at_analysis() {
        for input in ["(car)", "(cons 1)", "(modulo 1 2 3)", "(-)", "(void 1)", "(list (not))"] {
            match analyze_str(input) {
                Err(Error::ArityError { expression, .. }) => assert!(expression.is_some()),
                other => panic!("{input}: expected ArityError, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_shadowing_turns_primitive_call_into_application() {
        let expr = analyze_str("(lambda (car) (car 1))").unwrap();
        let Expr::Lambda(lambda) = expr else {
            panic!("expected lambda");
        };
        assert!(matches!(lambda.body, Expr::Apply { .. }));

        let mut env = Environment::new();
        env.define(env.global(), "list", crate::value::val(1));
        assert!(matches!(
            analyze_in("(list 1 2)", &env).unwrap(),
            Expr::Apply { .. }
        ));

        // A local definition shadows for the rest of the body
        let expr = analyze_str("(let () (define (cdr x) x) (cdr 5))").unwrap();
        let Expr::Let { body, .. } = expr else {
            panic!("expected let");
        };
        let Expr::Begin(forms) = *body else {
            panic!("expected begin body");
        };
        assert!(matches!(forms[1], Expr::Apply { .. }));
    }

    #[test]
    fn test_special_form_shapes() {
        assert_eq!(
            analyze_str("'()").unwrap(),
            Expr::Quote(Syntax::List(Vec::new()))
        );
        assert_eq!(analyze_str("()").unwrap(), Expr::Quote(Syntax::List(Vec::new())));
        assert!(matches!(
            analyze_str("(if #t 1)").unwrap(),
            Expr::If { alternative: None, .. }
        ));
        assert!(matches!(
            analyze_str("(define (f x) x)").unwrap(),
            Expr::Define { value, .. } if matches!(*value, Expr::Lambda(_))
        ));
        assert!(matches!(
            analyze_str("(cond (#f 1) (else 2))").unwrap(),
            Expr::Cond(clauses) if matches!(clauses[1], CondClause::Else(_))
        ));
        assert!(matches!(analyze_str("(and)").unwrap(), Expr::And(v) if v.is_empty()));
        assert!(matches!(analyze_str("(foo 1 2)").unwrap(), Expr::Apply { .. }));
        assert!(matches!(
            analyze_str("((lambda (x) x) 1)").unwrap(),
            Expr::Apply { .. }
        ));
    }

    #[test]
    fn test_malformed_forms() {
        let cases = vec![
            "(quote)",
            "(quote 1 2)",
            "(if)",
            "(if 1)",
            "(if 1 2 3 4)",
            "(begin)",
            "(cond)",
            "(cond ())",
            "(cond 1)",
            "(cond (else 1) (#t 2))",
            "(lambda x x)",
            "(lambda (x))",
            "(lambda (x) x x)",
            "(lambda (x 1) x)",
            "(lambda (x x) x)",
            "(define)",
            "(define x)",
            "(define 1 2)",
            "(define () 1)",
            "(define (f x x) x)",
            "(let ((x)) x)",
            "(let ((x 1) (x 2)) x)",
            "(let ((x 1)))",
            "(let x 1)",
            "(letrec)",
            "(set! x)",
            "(set! 1 2)",
            "(1 . 2)",
            "(f . x)",
        ];
        for input in cases {
            assert!(
                matches!(analyze_str(input), Err(Error::SyntaxError(_))),
                "{input} should be a syntax error, got {:?}",
                analyze_str(input)
            );
        }
    }

    #[test]
    fn test_invalid_variable_references() {
        for input in ["+123", "(+ 1 .5)", "(define +5 1)", "(lambda (.x) 1)", "(set! 1e3 2)"] {
            assert!(
                matches!(analyze_str(input), Err(Error::InvalidVariable(_))),
                "{input} should be rejected, got {:?}",
                analyze_str(input)
            );
        }
        assert!(matches!(analyze_str("+foo").unwrap(), Expr::Variable(_)));
    }
}
