use std::cmp::Ordering;
use std::fmt;

/// A numeric value. Integers stay exact until they meet a float or overflow,
/// at which point the result becomes a float.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    /// Reads a number the way the parser does: integer first, then float.
    pub fn parse(token: &str) -> Option<Number> {
        if let Ok(i) = token.parse::<i64>() {
            Some(Number::Integer(i))
        } else {
            token.parse::<f64>().ok().map(Number::Float)
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Integer(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(self) -> bool {
        match self {
            Number::Integer(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }

    fn combine(
        self,
        other: Number,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Number {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => match int_op(a, b) {
                Some(result) => Number::Integer(result),
                None => Number::Float(float_op(a as f64, b as f64)),
            },
            (a, b) => Number::Float(float_op(a.as_f64(), b.as_f64())),
        }
    }

    pub fn add(self, other: Number) -> Number {
        self.combine(other, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, other: Number) -> Number {
        self.combine(other, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, other: Number) -> Number {
        self.combine(other, i64::checked_mul, |a, b| a * b)
    }

    /// Divides, staying an integer only when the quotient is exact.
    /// Returns `None` on division by zero.
    pub fn div(self, other: Number) -> Option<Number> {
        if other.is_zero() {
            return None;
        }
        Some(self.combine(
            other,
            |a, b| {
                if a.checked_rem(b) == Some(0) {
                    a.checked_div(b)
                } else {
                    None
                }
            },
            |a, b| a / b,
        ))
    }

    pub fn neg(self) -> Number {
        match self {
            Number::Integer(i) => i
                .checked_neg()
                .map_or(Number::Float(-(i as f64)), Number::Integer),
            Number::Float(f) => Number::Float(-f),
        }
    }

    pub fn abs(self) -> Number {
        match self {
            Number::Integer(i) => i
                .checked_abs()
                .map_or(Number::Float((i as f64).abs()), Number::Integer),
            Number::Float(f) => Number::Float(f.abs()),
        }
    }

    /// Rounds to the nearest integer, ties to even. Floats stay floats.
    pub fn round(self) -> Number {
        match self {
            Number::Integer(_) => self,
            Number::Float(f) => Number::Float(f.round_ties_even()),
        }
    }

    pub fn floor(self) -> Number {
        match self {
            Number::Integer(_) => self,
            Number::Float(f) => Number::Float(f.floor()),
        }
    }

    pub fn ceil(self) -> Number {
        match self {
            Number::Integer(_) => self,
            Number::Float(f) => Number::Float(f.ceil()),
        }
    }

    /// Raises to a power; a non-negative integer exponent on an integer base
    /// stays exact while it fits.
    pub fn pow(self, exponent: Number) -> Number {
        if let (Number::Integer(base), Number::Integer(exp)) = (self, exponent) {
            if let Ok(exp) = u32::try_from(exp) {
                if let Some(result) = base.checked_pow(exp) {
                    return Number::Integer(result);
                }
            }
        }
        Number::Float(self.as_f64().powf(exponent.as_f64()))
    }
}

// Integers and floats compare by numeric value, so `2` equals `2.0`.
impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Number::Integer(a), Number::Integer(b)) => a.partial_cmp(b),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }
}

impl From<i64> for Number {
    fn from(i: i64) -> Self {
        Number::Integer(i)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            // Debug keeps the trailing ".0" so the text reads back as a float
            Number::Float(x) => write!(f, "{:?}", x),
        }
    }
}
