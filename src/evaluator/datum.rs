//! Conversion of quoted syntax into runtime values.

use crate::Error;
use crate::stack::ensure_sufficient_stack;
use crate::syntax::Syntax;
use crate::value::Value;

/// Turn a quoted datum into a value. Lists become fresh pairs on every
/// call, so mutating the result of `'(1 2)` never changes the program.
///
/// A list may contain one `.`, which must be the second-to-last element and
/// not the first: `(1 2 . 3)` is accepted, `(. 1)`, `(1 .)`, `(1 . 2 3)` and
/// `(1 . 2 . 3)` are not.
pub fn convert(syntax: &Syntax) -> Result<Value, Error> {
    ensure_sufficient_stack(|| match syntax {
        Syntax::Integer(n) => Ok(Value::Integer(*n)),
        Syntax::Rational(r) => Ok(Value::Rational(*r)),
        Syntax::String(s) => Ok(Value::string(s)),
        Syntax::Symbol(s) => Ok(Value::symbol(s)),
        Syntax::Boolean(b) => Ok(Value::Boolean(*b)),
        Syntax::Dot => Err(Error::syntax("illegal use of `.`")),
        Syntax::List(items) => convert_list(syntax, items),
    })
}

fn convert_list(whole: &Syntax, items: &[Syntax]) -> Result<Value, Error> {
    let mut dots = items
        .iter()
        .enumerate()
        .filter(|(_, item)| matches!(item, Syntax::Dot))
        .map(|(i, _)| i);

    match (dots.next(), dots.next()) {
        (None, _) => {
            let values = items.iter().map(convert).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(values))
        }
        (Some(pos), None) if pos != 0 && pos + 2 == items.len() => {
            let head = items[..pos]
                .iter()
                .map(convert)
                .collect::<Result<Vec<_>, _>>()?;
            let tail = convert(&items[pos + 1])?;
            Ok(Value::list_with_tail(head, tail))
        }
        (Some(_), None) => Err(Error::syntax(format!("illegal dot position in {whole}"))),
        (Some(_), Some(_)) => Err(Error::syntax(format!("illegal dot count in {whole}"))),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn int(n: i64) -> Syntax {
        Syntax::Integer(n)
    }

    fn list(items: Vec<Syntax>) -> Syntax {
        Syntax::List(items)
    }

    #[test]
    fn test_convert() {
        let cases = vec![
            (int(5), "5"),
            (Syntax::symbol("abc"), "abc"),
            (Syntax::String("s".into()), "\"s\""),
            (Syntax::Boolean(false), "#f"),
            (list(vec![]), "()"),
            (list(vec![int(1), int(2), int(3)]), "(1 2 3)"),
            (list(vec![int(1), Syntax::Dot, int(2)]), "(1 . 2)"),
            (
                list(vec![int(1), int(2), Syntax::Dot, int(3)]),
                "(1 2 . 3)",
            ),
            (
                list(vec![int(1), Syntax::Dot, list(vec![int(2), int(3)])]),
                "(1 2 3)",
            ),
            (
                list(vec![list(vec![int(1), Syntax::Dot, int(2)]), int(3)]),
                "((1 . 2) 3)",
            ),
        ];
        for (syntax, expected) in cases {
            assert_eq!(convert(&syntax).unwrap().to_string(), expected, "{syntax}");
        }
    }

    #[test]
    fn test_illegal_dots() {
        let cases = vec![
            Syntax::Dot,
            list(vec![Syntax::Dot, int(1)]),
            list(vec![int(1), Syntax::Dot]),
            list(vec![int(1), Syntax::Dot, int(2), int(3)]),
            list(vec![int(1), Syntax::Dot, int(2), Syntax::Dot, int(3)]),
            list(vec![int(1), list(vec![Syntax::Dot])]),
        ];
        for syntax in cases {
            assert!(
                matches!(convert(&syntax), Err(Error::SyntaxError(_))),
                "{syntax} should be rejected"
            );
        }
    }

    #[test]
    fn test_quoted_lists_are_fresh() {
        let syntax = list(vec![int(1), int(2)]);
        let a = convert(&syntax).unwrap();
        let b = convert(&syntax).unwrap();
        assert_eq!(a, b);
        assert!(!a.is_eq(&b));
    }
}
