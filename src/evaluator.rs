//! Expression evaluation.
//!
//! Evaluation walks an analyzed [`Expr`] directly; there are no tail calls,
//! so every nested evaluation consumes native stack (grown on demand) and
//! every active closure call counts against
//! [`EvalConfig::max_depth`](crate::EvalConfig).
//!
//! All procedure calls that are not specialized primitive nodes go through
//! [`apply`], which handles closures and first-class primitives alike.

pub mod datum;

use tracing::{debug, instrument, trace, warn};

use crate::Error;
use crate::environment::{Environment, FrameId};
use crate::expr::{CondClause, Expr, Lambda};
use crate::primitives::primitive_value;
use crate::stack::ensure_sufficient_stack;
use crate::value::{Closure, Procedure, Value};

/// Evaluate a top-level expression in the global frame.
///
/// Frames pushed while evaluating are reclaimed afterwards unless a closure
/// created during the evaluation may refer to them.
#[instrument(level = "debug", skip_all)]
pub fn evaluate(expr: &Expr, env: &mut Environment) -> Result<Value, Error> {
    let mark = env.mark();
    let global = env.global();
    let result = eval_with_depth_tracking(expr, env, global, 0);
    env.release(mark);
    if let Err(e) = &result {
        debug!(error = %e, "evaluation failed");
    }
    result
}

/// Call `procedure` with already evaluated arguments
pub fn apply(
    procedure: &Procedure,
    args: Vec<Value>,
    env: &mut Environment,
) -> Result<Value, Error> {
    apply_with_depth_tracking(procedure, args, env, 0)
}

fn eval_with_depth_tracking(
    expr: &Expr,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    ensure_sufficient_stack(|| match expr {
        Expr::Integer(n) => Ok(Value::Integer(*n)),
        Expr::Rational(r) => Ok(Value::Rational(*r)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Boolean(b) => Ok(Value::Boolean(*b)),
        Expr::Void => Ok(Value::Void),
        Expr::Exit => Ok(Value::Terminate),

        Expr::Variable(name) => lookup_variable(name, env, frame),

        // Arity of direct primitive calls was checked during analysis
        Expr::Unary { op, operand } => {
            let value = eval_with_depth_tracking(operand, env, frame, depth)?;
            (op.func)(&[value])
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs = eval_with_depth_tracking(lhs, env, frame, depth)?;
            let rhs = eval_with_depth_tracking(rhs, env, frame, depth)?;
            (op.func)(&[lhs, rhs])
        }
        Expr::Variadic { op, operands } => {
            let args = eval_args(operands, env, frame, depth)?;
            (op.func)(&args)
        }

        Expr::Quote(datum) => datum::convert(datum),
        Expr::If {
            test,
            consequent,
            alternative,
        } => eval_if(test, consequent, alternative.as_deref(), env, frame, depth),
        Expr::Cond(clauses) => eval_cond(clauses, env, frame, depth),
        Expr::Begin(exprs) => eval_sequence(exprs, env, frame, depth),
        Expr::And(exprs) => eval_and(exprs, env, frame, depth),
        Expr::Or(exprs) => eval_or(exprs, env, frame, depth),
        Expr::Lambda(lambda) => Ok(env.capture(Closure {
            lambda: lambda.clone(),
            env: frame,
        })),
        // Redefinition updates the visible binding, wherever it lives
        Expr::Define { name, value } => {
            let value = eval_with_depth_tracking(value, env, frame, depth)?;
            if env.is_bound(frame, name) {
                env.assign(frame, name, value)?;
            } else {
                env.define(frame, name, value);
            }
            Ok(Value::Void)
        }
        Expr::Let { bindings, body } => eval_let(bindings, body, env, frame, depth),
        Expr::Letrec { bindings, body } => eval_letrec(bindings, body, env, frame, depth),
        Expr::Set { name, value } => {
            let value = eval_with_depth_tracking(value, env, frame, depth)?;
            env.assign(frame, name, value)?;
            Ok(Value::Void)
        }
        Expr::Apply { operator, operands } => {
            let operator = eval_with_depth_tracking(operator, env, frame, depth)?;
            let Value::Procedure(procedure) = operator else {
                return Err(Error::NotAProcedure(operator.to_string()));
            };
            let args = eval_args(operands, env, frame, depth)?;
            apply_with_depth_tracking(&procedure, args, env, depth)
        }
    })
}

/// A binding wins over a primitive of the same name; an unbound primitive
/// name evaluates to the primitive itself
fn lookup_variable(name: &str, env: &Environment, frame: FrameId) -> Result<Value, Error> {
    env.lookup(frame, name)
        .or_else(|| primitive_value(name))
        .ok_or_else(|| Error::UnboundVariable(name.to_string()))
}

/// Evaluate operands left to right
fn eval_args(
    exprs: &[Expr],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Vec<Value>, Error> {
    exprs
        .iter()
        .map(|expr| eval_with_depth_tracking(expr, env, frame, depth))
        .collect()
}

fn apply_with_depth_tracking(
    procedure: &Procedure,
    args: Vec<Value>,
    env: &mut Environment,
    depth: usize,
) -> Result<Value, Error> {
    match procedure {
        Procedure::Primitive(op) => op.call(&args),
        Procedure::Closure(closure) => {
            let Lambda { params, body } = closure.lambda.as_ref();
            if params.len() != args.len() {
                return Err(Error::arity_error(params.len(), args.len()));
            }

            let depth = depth + 1;
            let max_depth = env.config().max_depth;
            if depth > max_depth {
                warn!(max_depth, "procedure call depth limit exceeded");
                return Err(Error::DepthLimit(max_depth));
            }

            trace!(params = ?params, depth, "apply closure");
            let mark = env.mark();
            let bindings = params.iter().cloned().zip(args).collect();
            let frame = env.extend(closure.env, bindings)?;
            let result = eval_with_depth_tracking(body, env, frame, depth);
            env.release(mark);

            result.map_err(|err| match err {
                Error::TypeError(msg) => Error::TypeError(format!(
                    "{msg}\n  In lambda: (lambda ({}) ...)",
                    params.join(" ")
                )),
                other => other,
            })
        }
    }
}

fn eval_if(
    test: &Expr,
    consequent: &Expr,
    alternative: Option<&Expr>,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    if eval_with_depth_tracking(test, env, frame, depth)?.is_truthy() {
        eval_with_depth_tracking(consequent, env, frame, depth)
    } else {
        match alternative {
            Some(alt) => eval_with_depth_tracking(alt, env, frame, depth),
            None => Ok(Value::Void),
        }
    }
}

/// Each test runs at most once. A matching clause without body yields the
/// test value; no match yields void.
fn eval_cond(
    clauses: &[CondClause],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    for clause in clauses {
        match clause {
            CondClause::Else(body) => return eval_sequence(body, env, frame, depth),
            CondClause::Test { test, body } => {
                let value = eval_with_depth_tracking(test, env, frame, depth)?;
                if value.is_truthy() {
                    if body.is_empty() {
                        return Ok(value);
                    }
                    return eval_sequence(body, env, frame, depth);
                }
            }
        }
    }
    Ok(Value::Void)
}

/// Evaluate in order and return the last value (void when empty)
fn eval_sequence(
    exprs: &[Expr],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Void;
    for expr in exprs {
        result = eval_with_depth_tracking(expr, env, frame, depth)?;
    }
    Ok(result)
}

fn eval_and(
    exprs: &[Expr],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mut result = Value::Boolean(true);
    for expr in exprs {
        result = eval_with_depth_tracking(expr, env, frame, depth)?;
        if !result.is_truthy() {
            break;
        }
    }
    Ok(result)
}

fn eval_or(
    exprs: &[Expr],
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    for expr in exprs {
        let value = eval_with_depth_tracking(expr, env, frame, depth)?;
        if value.is_truthy() {
            return Ok(value);
        }
    }
    Ok(Value::Boolean(false))
}

/// Initializers see the enclosing frame only
fn eval_let(
    bindings: &[(String, Expr)],
    body: &Expr,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mut values = Vec::with_capacity(bindings.len());
    for (name, init) in bindings {
        let value = eval_with_depth_tracking(init, env, frame, depth)?;
        values.push((name.clone(), value));
    }

    let mark = env.mark();
    let inner = env.extend(frame, values)?;
    let result = eval_with_depth_tracking(body, env, inner, depth);
    env.release(mark);
    result
}

/// Every name is bound (to void) before any initializer runs, so
/// initializers can refer to each other
fn eval_letrec(
    bindings: &[(String, Expr)],
    body: &Expr,
    env: &mut Environment,
    frame: FrameId,
    depth: usize,
) -> Result<Value, Error> {
    let mark = env.mark();
    let placeholders = bindings
        .iter()
        .map(|(name, _)| (name.clone(), Value::Void))
        .collect();
    let inner = env.extend(frame, placeholders)?;

    let result = bindings
        .iter()
        .try_for_each(|(name, init)| {
            let value = eval_with_depth_tracking(init, env, inner, depth)?;
            env.define(inner, name, value);
            Ok(())
        })
        .and_then(|()| eval_with_depth_tracking(body, env, inner, depth));
    env.release(mark);
    result
}
