//! S-expression reader.
//!
//! Turns source text into [`Syntax`] trees. The reader knows nothing about
//! special forms or variables: every token that is not a number, boolean,
//! string or lone `.` becomes a symbol, and the analyzer decides whether it
//! is a legal name.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0, multispace1, not_line_ending},
    combinator::{cut, value},
    error::{ErrorKind, ParseError},
    multi::{many0, many0_count},
    sequence::preceded,
};

use crate::number::Number;
use crate::stack::ensure_sufficient_stack;
use crate::syntax::Syntax;
use crate::{Error, MAX_READ_DEPTH, ReadError, ReadErrorKind};

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReadConfig {
    /// Skip `;` line comments. When unset a `;` is a syntax error.
    pub handle_comments: bool,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            handle_comments: true,
        }
    }
}

/// Parser error carrying the reader error category
#[derive(Debug)]
struct ReaderError<'a> {
    input: &'a str,
    kind: ReadErrorKind,
    message: String,
}

impl<'a> ReaderError<'a> {
    fn new(input: &'a str, kind: ReadErrorKind, message: impl Into<String>) -> Self {
        ReaderError {
            input,
            kind,
            message: message.into(),
        }
    }

    fn failure<T>(
        input: &'a str,
        kind: ReadErrorKind,
        message: impl Into<String>,
    ) -> PResult<'a, T> {
        Err(nom::Err::Failure(Self::new(input, kind, message)))
    }
}

impl<'a> ParseError<&'a str> for ReaderError<'a> {
    fn from_error_kind(input: &'a str, _kind: ErrorKind) -> Self {
        match input.chars().next() {
            None => Self::new(input, ReadErrorKind::Incomplete, "unexpected end of input"),
            Some(c) => Self::new(input, ReadErrorKind::InvalidSyntax, format!("unexpected `{c}`")),
        }
    }

    fn append(_input: &'a str, _kind: ErrorKind, other: Self) -> Self {
        other
    }
}

type PResult<'a, T> = IResult<&'a str, T, ReaderError<'a>>;

/// Whitespace and, when enabled, comments
fn atmosphere(input: &str, config: ReadConfig) -> PResult<'_, ()> {
    if config.handle_comments {
        value(
            (),
            many0_count(alt((multispace1, preceded(char(';'), not_line_ending)))),
        )
        .parse(input)
    } else {
        value((), multispace0).parse(input)
    }
}

fn is_atom_char(c: char) -> bool {
    !c.is_whitespace() && !matches!(c, '(' | ')' | '\'' | '"' | ';')
}

fn is_integer(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_unsigned(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Read one datum, skipping leading atmosphere
fn datum(input: &str, config: ReadConfig, depth: usize) -> PResult<'_, Syntax> {
    if depth >= MAX_READ_DEPTH {
        return ReaderError::failure(
            input,
            ReadErrorKind::TooDeeplyNested,
            format!("datum too deeply nested (max depth: {MAX_READ_DEPTH})"),
        );
    }
    ensure_sufficient_stack(|| {
        preceded(
            |i| atmosphere(i, config),
            alt((
                |i| list(i, config, depth),
                |i| quoted(i, config, depth),
                string_literal,
                atom,
            )),
        )
        .parse(input)
    })
}

/// `( datum* )`, where a lone `.` is kept as [`Syntax::Dot`] for the consumer
fn list(input: &str, config: ReadConfig, depth: usize) -> PResult<'_, Syntax> {
    let (input, _) = char('(').parse(input)?;
    let (input, items) = many0(|i| datum(i, config, depth + 1)).parse(input)?;
    let (input, _) = cut(preceded(|i| atmosphere(i, config), char(')'))).parse(input)?;
    Ok((input, Syntax::List(items)))
}

/// `'x` reads as `(quote x)`
fn quoted(input: &str, config: ReadConfig, depth: usize) -> PResult<'_, Syntax> {
    let (input, _) = char('\'').parse(input)?;
    let (input, datum) = cut(|i| datum(i, config, depth + 1)).parse(input)?;
    Ok((input, Syntax::List(vec![Syntax::symbol("quote"), datum])))
}

fn string_literal(input: &str) -> PResult<'_, Syntax> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut text = String::new();

    loop {
        let mut chars = remaining.chars();
        match chars.next() {
            Some('"') => return Ok((chars.as_str(), Syntax::String(text))),
            Some('\\') => {
                match chars.next() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some(other) => {
                        return ReaderError::failure(
                            remaining,
                            ReadErrorKind::InvalidSyntax,
                            format!("unknown escape sequence `\\{other}`"),
                        );
                    }
                    None => {
                        return ReaderError::failure(
                            chars.as_str(),
                            ReadErrorKind::Incomplete,
                            "unterminated string",
                        );
                    }
                }
                remaining = chars.as_str();
            }
            Some(c) => {
                text.push(c);
                remaining = chars.as_str();
            }
            None => {
                return ReaderError::failure(
                    remaining,
                    ReadErrorKind::Incomplete,
                    "unterminated string",
                );
            }
        }
    }
}

/// A maximal run of non-delimiter characters, classified after the fact
fn atom(input: &str) -> PResult<'_, Syntax> {
    let (rest, token) = take_while1(is_atom_char).parse(input)?;
    match classify(token) {
        Ok(syntax) => Ok((rest, syntax)),
        Err((kind, message)) => ReaderError::failure(input, kind, message),
    }
}

fn classify(token: &str) -> Result<Syntax, (ReadErrorKind, String)> {
    let out_of_range = || {
        (
            ReadErrorKind::ImplementationLimit,
            format!("number out of range: {token}"),
        )
    };

    match token {
        "." => return Ok(Syntax::Dot),
        "#t" => return Ok(Syntax::Boolean(true)),
        "#f" => return Ok(Syntax::Boolean(false)),
        _ => {}
    }

    if let Some(hex) = token.strip_prefix("#x").or_else(|| token.strip_prefix("#X")) {
        if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err((
                ReadErrorKind::InvalidSyntax,
                format!("invalid hexadecimal literal: {token}"),
            ));
        }
        return i64::from_str_radix(hex, 16)
            .map(Syntax::Integer)
            .map_err(|_| out_of_range());
    }

    if token.starts_with('#') {
        return Err((
            ReadErrorKind::InvalidSyntax,
            format!("unknown token: {token}"),
        ));
    }

    if is_integer(token) {
        return token
            .parse::<i64>()
            .map(Syntax::Integer)
            .map_err(|_| out_of_range());
    }

    if let Some((num, den)) = token.split_once('/')
        && is_integer(num)
        && is_unsigned(den)
    {
        let num = num.parse::<i64>().map_err(|_| out_of_range())?;
        let den = den.parse::<i64>().map_err(|_| out_of_range())?;
        if den == 0 {
            return Err((
                ReadErrorKind::InvalidSyntax,
                format!("zero denominator: {token}"),
            ));
        }
        return Number::ratio(i128::from(num), i128::from(den), "read")
            .map(Syntax::from)
            .map_err(|_| out_of_range());
    }

    Ok(Syntax::Symbol(token.to_string()))
}

fn to_error(input: &str, err: nom::Err<ReaderError<'_>>) -> Error {
    match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let offset = input.len().saturating_sub(e.input.len());
            let found: String = e.input.chars().take_while(|c| is_atom_char(*c)).collect();
            let found = if found.is_empty() {
                e.input.chars().next().map(String::from)
            } else {
                Some(found)
            };
            ReadError::with_context(e.kind, e.message, input, offset, found).into()
        }
        nom::Err::Incomplete(_) => {
            ReadError::from_message(ReadErrorKind::Incomplete, "incomplete input").into()
        }
    }
}

/// Read the first datum of `input` with the default configuration.
///
/// Returns the datum and the unread rest, or `None` when only whitespace
/// and comments remain.
pub fn read_one(input: &str) -> Result<Option<(Syntax, &str)>, Error> {
    read_one_with_config(input, ReadConfig::default())
}

pub fn read_one_with_config(
    input: &str,
    config: ReadConfig,
) -> Result<Option<(Syntax, &str)>, Error> {
    let (rest, ()) = atmosphere(input, config).map_err(|e| to_error(input, e))?;
    if rest.is_empty() {
        return Ok(None);
    }
    let (rest, syntax) = datum(rest, config, 0).map_err(|e| to_error(input, e))?;
    Ok(Some((syntax, rest)))
}

/// Read exactly one datum; anything but atmosphere after it is an error
pub fn read_syntax(input: &str) -> Result<Syntax, Error> {
    let Some((syntax, rest)) = read_one(input)? else {
        return Err(ReadError::from_message(ReadErrorKind::Incomplete, "empty input").into());
    };
    if read_one(rest)?.is_some() {
        let offset = input.len() - rest.len();
        return Err(ReadError::with_context(
            ReadErrorKind::TrailingContent,
            "unexpected input after datum",
            input,
            offset,
            Some(rest.trim().to_string()),
        )
        .into());
    }
    Ok(syntax)
}

/// Read every datum in `input`
pub fn read_all(input: &str) -> Result<Vec<Syntax>, Error> {
    let mut forms = Vec::new();
    let mut rest = input;
    while let Some((syntax, next)) = read_one(rest)? {
        forms.push(syntax);
        rest = next;
    }
    Ok(forms)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn int(n: i64) -> Syntax {
        Syntax::Integer(n)
    }

    fn sym(name: &str) -> Syntax {
        Syntax::symbol(name)
    }

    fn list(items: Vec<Syntax>) -> Syntax {
        Syntax::List(items)
    }

    fn kind_of(result: Result<Syntax, Error>) -> Option<ReadErrorKind> {
        match result {
            Err(Error::ReadError(e)) => Some(e.kind),
            _ => None,
        }
    }

    #[test]
    fn test_read_atoms() {
        let cases = vec![
            ("42", int(42)),
            ("-5", int(-5)),
            ("0", int(0)),
            ("#x1A", int(26)),
            ("#XfF", int(255)),
            ("#t", Syntax::Boolean(true)),
            ("#f", Syntax::Boolean(false)),
            ("foo", sym("foo")),
            ("list->vector", sym("list->vector")),
            ("+", sym("+")),
            ("-", sym("-")),
            ("+7", sym("+7")),
            ("1e-3", sym("1e-3")),
            (".123", sym(".123")),
            ("...", sym("...")),
            ("1/2/3", sym("1/2/3")),
            ("\"hello\"", Syntax::String("hello".into())),
            ("\"a\\nb\\t\\\"c\\\\\"", Syntax::String("a\nb\t\"c\\".into())),
            ("  \n 7  ", int(7)),
        ];
        for (input, expected) in cases {
            assert_eq!(read_syntax(input).unwrap(), expected, "reading {input:?}");
        }
    }

    #[test]
    fn test_read_rationals() {
        let cases = vec![
            ("1/2", "1/2"),
            ("-3/6", "-1/2"),
            ("4/2", "2"),
            ("0/5", "0"),
        ];
        for (input, expected) in cases {
            assert_eq!(read_syntax(input).unwrap().to_string(), expected, "reading {input:?}");
        }
        assert!(matches!(read_syntax("4/2").unwrap(), Syntax::Integer(2)));
        assert_eq!(kind_of(read_syntax("1/0")), Some(ReadErrorKind::InvalidSyntax));
        assert_eq!(read_syntax("1/-2").unwrap(), sym("1/-2"));
    }

    #[test]
    fn test_read_lists() {
        let cases = vec![
            ("()", list(vec![])),
            ("( )", list(vec![])),
            ("(1 2 3)", list(vec![int(1), int(2), int(3)])),
            ("(a(b)c)", list(vec![sym("a"), list(vec![sym("b")]), sym("c")])),
            ("(1 . 2)", list(vec![int(1), Syntax::Dot, int(2)])),
            ("'x", list(vec![sym("quote"), sym("x")])),
            (
                "'(1 'a)",
                list(vec![
                    sym("quote"),
                    list(vec![int(1), list(vec![sym("quote"), sym("a")])]),
                ]),
            ),
            (
                "(define x ; the answer\n 42)",
                list(vec![sym("define"), sym("x"), int(42)]),
            ),
        ];
        for (input, expected) in cases {
            assert_eq!(read_syntax(input).unwrap(), expected, "reading {input:?}");
        }
    }

    #[test]
    fn test_read_errors() {
        let cases = vec![
            ("", ReadErrorKind::Incomplete),
            ("; only a comment", ReadErrorKind::Incomplete),
            ("(1 2", ReadErrorKind::Incomplete),
            ("'", ReadErrorKind::Incomplete),
            ("\"abc", ReadErrorKind::Incomplete),
            ("((", ReadErrorKind::Incomplete),
            (")", ReadErrorKind::InvalidSyntax),
            ("#q", ReadErrorKind::InvalidSyntax),
            ("#xZZ", ReadErrorKind::InvalidSyntax),
            ("\"\\q\"", ReadErrorKind::InvalidSyntax),
            ("1 2", ReadErrorKind::TrailingContent),
            ("(a) b", ReadErrorKind::TrailingContent),
            ("99999999999999999999", ReadErrorKind::ImplementationLimit),
            ("#xFFFFFFFFFFFFFFFFF", ReadErrorKind::ImplementationLimit),
        ];
        for (input, expected) in cases {
            assert_eq!(kind_of(read_syntax(input)), Some(expected), "reading {input:?}");
        }
    }

    #[test]
    fn test_quote_before_close_paren() {
        // `'` needs a datum; `)` is not one
        assert_eq!(kind_of(read_syntax("(')")), Some(ReadErrorKind::InvalidSyntax));
    }

    #[test]
    fn test_depth_limit() {
        let ok = format!("{}{}", "(".repeat(MAX_READ_DEPTH - 1), ")".repeat(MAX_READ_DEPTH - 1));
        assert!(read_syntax(&ok).is_ok());

        let deep = format!("{}{}", "(".repeat(MAX_READ_DEPTH + 1), ")".repeat(MAX_READ_DEPTH + 1));
        assert_eq!(kind_of(read_syntax(&deep)), Some(ReadErrorKind::TooDeeplyNested));
    }

    #[test]
    fn test_error_context() {
        let Err(Error::ReadError(err)) = read_syntax("(foo #bad)") else {
            panic!("expected a read error");
        };
        assert_eq!(err.found.as_deref(), Some("#bad"));
        assert_eq!(err.context.as_deref(), Some("(foo #bad)"));

        // Offsets are bytes; the snippet window is counted in characters
        let input = format!("({} #bad)", "λ".repeat(25));
        let Err(Error::ReadError(err)) = read_syntax(&input) else {
            panic!("expected a read error");
        };
        let expected = format!("[...]{} #bad)", "λ".repeat(19));
        assert_eq!(err.context.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_read_one_and_all() {
        let (first, rest) = read_one("(+ 1 2) ; sum\n x").unwrap().unwrap();
        assert_eq!(first, list(vec![sym("+"), int(1), int(2)]));
        let (second, rest) = read_one(rest).unwrap().unwrap();
        assert_eq!(second, sym("x"));
        assert!(read_one(rest).unwrap().is_none());

        let forms = read_all("(define x 1)\n'x ; done\n").unwrap();
        assert_eq!(forms.len(), 2);
        assert!(read_all("   ").unwrap().is_empty());
        assert!(read_all("(ok) (broken").unwrap_err().is_incomplete());
    }

    #[test]
    fn test_comments_disabled() {
        let config = ReadConfig {
            handle_comments: false,
        };
        assert!(read_one_with_config("; note\n1", config).is_err());
        let (syntax, _) = read_one_with_config(" 1 ", config).unwrap().unwrap();
        assert_eq!(syntax, int(1));
    }
}
