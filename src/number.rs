//! Exact numeric tower: 64-bit integers and normalized rationals.
//!
//! A [`Rational`] is always in lowest terms with a denominator greater
//! than one. Results whose denominator reduces to one come back as
//! [`Number::Integer`], so `(/ 6 3)` is the integer `3` and never `3/1`.
//! Intermediate products are computed in `i128` and narrowed back with a
//! range check.

use std::cmp::Ordering;
use std::fmt;

use crate::Error;

/// An exact non-integral ratio `num/den` with `den > 1` and `gcd(num, den) == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    pub fn numer(self) -> i64 {
        self.num
    }

    pub fn denom(self) -> i64 {
        self.den
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Working representation used by the arithmetic primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Number {
    Integer(i64),
    Rational(Rational),
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = b;
        b = a % b;
        a = t;
    }
    a.max(1)
}

fn narrow(n: i128, op: &str) -> Result<i64, Error> {
    i64::try_from(n).map_err(|_| Error::Overflow(op.to_string()))
}

impl Number {
    /// Build the normalized number `num/den`.
    ///
    /// Fails with [`Error::DivisionByZero`] when `den` is zero and with
    /// [`Error::Overflow`] when the reduced terms do not fit in `i64`.
    pub fn ratio(num: i128, den: i128, op: &str) -> Result<Number, Error> {
        if den == 0 {
            return Err(Error::DivisionByZero);
        }
        let g = gcd(num.unsigned_abs(), den.unsigned_abs()) as i128;
        let (mut num, mut den) = (num / g, den / g);
        if den < 0 {
            num = -num;
            den = -den;
        }
        if den == 1 {
            return Ok(Number::Integer(narrow(num, op)?));
        }
        Ok(Number::Rational(Rational {
            num: narrow(num, op)?,
            den: narrow(den, op)?,
        }))
    }

    fn terms(self) -> (i128, i128) {
        match self {
            Number::Integer(n) => (n as i128, 1),
            Number::Rational(r) => (r.num as i128, r.den as i128),
        }
    }

    pub fn is_zero(self) -> bool {
        matches!(self, Number::Integer(0))
    }

    pub fn add(self, rhs: Number) -> Result<Number, Error> {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a
                .checked_add(b)
                .map(Number::Integer)
                .ok_or_else(|| Error::Overflow("+".into())),
            (Number::Rational(a), Number::Rational(b)) => {
                let (n1, d1) = (a.num as i128, a.den as i128);
                let (n2, d2) = (b.num as i128, b.den as i128);
                Number::ratio(n1 * d2 + n2 * d1, d1 * d2, "+")
            }
            (Number::Rational(a), Number::Integer(b)) => {
                let d = a.den as i128;
                Number::ratio(a.num as i128 + b as i128 * d, d, "+")
            }
            (Number::Integer(_), Number::Rational(_)) => rhs.add(self),
        }
    }

    pub fn sub(self, rhs: Number) -> Result<Number, Error> {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a
                .checked_sub(b)
                .map(Number::Integer)
                .ok_or_else(|| Error::Overflow("-".into())),
            (Number::Rational(a), Number::Rational(b)) => {
                let (n1, d1) = (a.num as i128, a.den as i128);
                let (n2, d2) = (b.num as i128, b.den as i128);
                Number::ratio(n1 * d2 - n2 * d1, d1 * d2, "-")
            }
            (Number::Rational(a), Number::Integer(b)) => {
                let d = a.den as i128;
                Number::ratio(a.num as i128 - b as i128 * d, d, "-")
            }
            (Number::Integer(a), Number::Rational(b)) => {
                let d = b.den as i128;
                Number::ratio(a as i128 * d - b.num as i128, d, "-")
            }
        }
    }

    pub fn mul(self, rhs: Number) -> Result<Number, Error> {
        match (self, rhs) {
            (Number::Integer(a), Number::Integer(b)) => a
                .checked_mul(b)
                .map(Number::Integer)
                .ok_or_else(|| Error::Overflow("*".into())),
            (Number::Rational(a), Number::Rational(b)) => Number::ratio(
                a.num as i128 * b.num as i128,
                a.den as i128 * b.den as i128,
                "*",
            ),
            (Number::Rational(a), Number::Integer(b)) => {
                Number::ratio(a.num as i128 * b as i128, a.den as i128, "*")
            }
            (Number::Integer(_), Number::Rational(_)) => rhs.mul(self),
        }
    }

    /// Exact division. An integer quotient that divides evenly stays an integer.
    pub fn div(self, rhs: Number) -> Result<Number, Error> {
        let (n1, d1) = self.terms();
        let (n2, d2) = rhs.terms();
        Number::ratio(n1 * d2, d1 * n2, "/")
    }

    pub fn negate(self) -> Result<Number, Error> {
        Number::Integer(0).sub(self)
    }

    /// Remainder carrying the sign of the divisor. Integers only.
    pub fn modulo(self, rhs: Number) -> Result<Number, Error> {
        let (Number::Integer(a), Number::Integer(b)) = (self, rhs) else {
            return Err(Error::type_error("modulo requires integer arguments"));
        };
        if b == 0 {
            return Err(Error::DivisionByZero);
        }
        // i64::MIN % -1 overflows in hardware but is mathematically zero
        let r = a.checked_rem(b).unwrap_or(0);
        if r != 0 && (r < 0) != (b < 0) {
            Ok(Number::Integer(r + b))
        } else {
            Ok(Number::Integer(r))
        }
    }

    /// Integer power by repeated squaring. The exponent must be a
    /// non-negative integer and `0^0` is rejected.
    pub fn expt(self, rhs: Number) -> Result<Number, Error> {
        let (Number::Integer(base), Number::Integer(exp)) = (self, rhs) else {
            return Err(Error::type_error("expt requires integer arguments"));
        };
        if exp < 0 {
            return Err(Error::type_error("expt requires a non-negative exponent"));
        }
        if base == 0 && exp == 0 {
            return Err(Error::type_error("expt: 0^0 is undefined"));
        }

        let overflow = || Error::Overflow("expt".into());
        let mut result: i64 = 1;
        let mut base = base;
        let mut exp = exp;
        while exp > 0 {
            if exp & 1 == 1 {
                result = result.checked_mul(base).ok_or_else(overflow)?;
            }
            exp >>= 1;
            if exp > 0 {
                base = base.checked_mul(base).ok_or_else(overflow)?;
            }
        }
        Ok(Number::Integer(result))
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.cmp(b),
            _ => {
                let (n1, d1) = self.terms();
                let (n2, d2) = other.terms();
                (n1 * d2).cmp(&(n2 * d1))
            }
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Number::Integer(n) => write!(f, "{n}"),
            Number::Rational(r) => write!(f, "{r}"),
        }
    }
}
