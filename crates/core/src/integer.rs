//! Extended integers
//!
//! Arbitrary-precision integers plus the two signed infinities. The
//! infinities take part in arithmetic with definite rules; the combinations
//! with no sensible answer (`+inf + -inf`, `inf * 0`, `inf / inf`) fail
//! with their stable error codes rather than producing a value.
//!
//! Division is floor division: the quotient rounds toward negative
//! infinity and the remainder satisfies `a == q*b + r` with `r` carrying
//! the divisor's sign.

use crate::error::ErrorCode;
use crate::hashing;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::fmt;

/// Payload of an integer object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegerRepr {
    Finite(BigInt),
    PositiveInfinity,
    NegativeInfinity,
}

impl IntegerRepr {
    pub fn from_i64(value: i64) -> IntegerRepr {
        IntegerRepr::Finite(BigInt::from(value))
    }

    pub fn from_bigint(value: BigInt) -> IntegerRepr {
        IntegerRepr::Finite(value)
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, IntegerRepr::Finite(_))
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, IntegerRepr::Finite(v) if v.is_zero())
    }

    pub fn to_i64(&self) -> Option<i64> {
        match self {
            IntegerRepr::Finite(v) => v.to_i64(),
            _ => None,
        }
    }

    pub fn finite(&self) -> Option<&BigInt> {
        match self {
            IntegerRepr::Finite(v) => Some(v),
            _ => None,
        }
    }

    /// Total order over the extended integers.
    pub fn compare(&self, other: &IntegerRepr) -> std::cmp::Ordering {
        use IntegerRepr::*;
        use std::cmp::Ordering::*;
        match (self, other) {
            (NegativeInfinity, NegativeInfinity) => Equal,
            (PositiveInfinity, PositiveInfinity) => Equal,
            (NegativeInfinity, _) => Less,
            (_, NegativeInfinity) => Greater,
            (PositiveInfinity, _) => Greater,
            (_, PositiveInfinity) => Less,
            (Finite(a), Finite(b)) => a.cmp(b),
        }
    }

    pub fn add(&self, other: &IntegerRepr) -> Result<IntegerRepr, ErrorCode> {
        use IntegerRepr::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Ok(Finite(a + b)),
            (PositiveInfinity, NegativeInfinity) | (NegativeInfinity, PositiveInfinity) => {
                Err(ErrorCode::CannotAddUnlikeInfinities)
            }
            (PositiveInfinity, _) | (_, PositiveInfinity) => Ok(PositiveInfinity),
            (NegativeInfinity, _) | (_, NegativeInfinity) => Ok(NegativeInfinity),
        }
    }

    pub fn subtract(&self, other: &IntegerRepr) -> Result<IntegerRepr, ErrorCode> {
        self.add(&other.negate())
    }

    pub fn negate(&self) -> IntegerRepr {
        use IntegerRepr::*;
        match self {
            Finite(v) => Finite(-v),
            PositiveInfinity => NegativeInfinity,
            NegativeInfinity => PositiveInfinity,
        }
    }

    pub fn multiply(&self, other: &IntegerRepr) -> Result<IntegerRepr, ErrorCode> {
        use IntegerRepr::*;
        match (self, other) {
            (Finite(a), Finite(b)) => Ok(Finite(a * b)),
            (inf, Finite(v)) | (Finite(v), inf) => {
                if v.is_zero() {
                    Err(ErrorCode::CannotMultiplyZeroAndInfinity)
                } else if (v.is_positive()) == matches!(inf, PositiveInfinity) {
                    Ok(PositiveInfinity)
                } else {
                    Ok(NegativeInfinity)
                }
            }
            (a, b) => {
                // Both infinite: signs multiply.
                let positive = matches!(a, PositiveInfinity) == matches!(b, PositiveInfinity);
                Ok(if positive { PositiveInfinity } else { NegativeInfinity })
            }
        }
    }

    /// Floor division. `n / ±inf == 0` for finite `n`; dividing an infinity
    /// by an infinity or anything by zero fails.
    pub fn divide(&self, other: &IntegerRepr) -> Result<IntegerRepr, ErrorCode> {
        use IntegerRepr::*;
        match (self, other) {
            (_, Finite(d)) if d.is_zero() => Err(ErrorCode::CannotDivideByZero),
            (Finite(a), Finite(b)) => Ok(Finite(floor_div(a, b))),
            (Finite(_), PositiveInfinity) | (Finite(_), NegativeInfinity) => {
                Ok(Finite(BigInt::zero()))
            }
            (inf, Finite(d)) => {
                let positive = matches!(inf, PositiveInfinity) == d.is_positive();
                Ok(if positive { PositiveInfinity } else { NegativeInfinity })
            }
            _ => Err(ErrorCode::CannotDivideInfinities),
        }
    }

    /// Remainder consistent with floor division: `a == (a div b)*b + r`.
    pub fn modulo(&self, other: &IntegerRepr) -> Result<IntegerRepr, ErrorCode> {
        use IntegerRepr::*;
        match (self, other) {
            (_, Finite(d)) if d.is_zero() => Err(ErrorCode::CannotDivideByZero),
            (Finite(a), Finite(b)) => {
                let q = floor_div(a, b);
                Ok(Finite(a - q * b))
            }
            (Finite(a), PositiveInfinity) | (Finite(a), NegativeInfinity) => Ok(Finite(a.clone())),
            _ => Err(ErrorCode::CannotDivideInfinities),
        }
    }
}

/// Quotient rounded toward negative infinity.
fn floor_div(a: &BigInt, b: &BigInt) -> BigInt {
    let q = a / b;
    let r = a - &q * b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        q - 1
    } else {
        q
    }
}

/// Leaf hash. Equal integers hash equal no matter how they were built; the
/// magnitude's 32-bit digits feed the aggregate polynomial with a
/// sign-dependent toggle.
pub fn hash_integer(value: &IntegerRepr) -> u32 {
    match value {
        IntegerRepr::PositiveInfinity => hashing::scramble(0x1F1E_0001),
        IntegerRepr::NegativeInfinity => hashing::scramble(0x1F1E_0002),
        IntegerRepr::Finite(v) => {
            let (sign, digits) = v.to_u32_digits();
            let toggle = match sign {
                num_bigint::Sign::Minus => 0x8000_0001,
                _ => 0x0000_0000,
            };
            let body = hashing::hash_of_elements(digits.iter().map(|d| hashing::scramble(*d)));
            hashing::scramble(body ^ toggle ^ 0x1A7E_6E70)
        }
    }
}

impl fmt::Display for IntegerRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegerRepr::Finite(v) => write!(f, "{}", v),
            IntegerRepr::PositiveInfinity => write!(f, "∞"),
            IntegerRepr::NegativeInfinity => write!(f, "-∞"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fin(n: i64) -> IntegerRepr {
        IntegerRepr::from_i64(n)
    }

    #[test]
    fn test_unlike_infinities_cannot_add() {
        let err = IntegerRepr::PositiveInfinity
            .add(&IntegerRepr::NegativeInfinity)
            .unwrap_err();
        assert_eq!(err, ErrorCode::CannotAddUnlikeInfinities);
        assert_eq!(
            IntegerRepr::PositiveInfinity
                .add(&IntegerRepr::PositiveInfinity)
                .unwrap(),
            IntegerRepr::PositiveInfinity
        );
    }

    #[test]
    fn test_zero_times_infinity_fails() {
        let err = fin(0).multiply(&IntegerRepr::PositiveInfinity).unwrap_err();
        assert_eq!(err, ErrorCode::CannotMultiplyZeroAndInfinity);
    }

    #[test]
    fn test_finite_over_infinity_is_zero() {
        for n in [-7i64, 0, 3] {
            assert!(fin(n).divide(&IntegerRepr::PositiveInfinity).unwrap().is_zero());
            assert!(fin(n).divide(&IntegerRepr::NegativeInfinity).unwrap().is_zero());
        }
    }

    #[test]
    fn test_divide_by_zero_fails() {
        assert_eq!(
            fin(3).divide(&fin(0)).unwrap_err(),
            ErrorCode::CannotDivideByZero
        );
        assert_eq!(
            IntegerRepr::PositiveInfinity.divide(&fin(0)).unwrap_err(),
            ErrorCode::CannotDivideByZero
        );
    }

    #[test]
    fn test_floor_division_rounds_down() {
        assert_eq!(fin(7).divide(&fin(2)).unwrap(), fin(3));
        assert_eq!(fin(-7).divide(&fin(2)).unwrap(), fin(-4));
        assert_eq!(fin(7).divide(&fin(-2)).unwrap(), fin(-4));
        assert_eq!(fin(-7).divide(&fin(-2)).unwrap(), fin(3));
    }

    #[test]
    fn test_modulo_tracks_divisor_sign() {
        // a == (a div b)*b + r must hold in every sign combination.
        for a in [-8i64, -1, 0, 5, 9] {
            for b in [-3i64, -2, 2, 3] {
                let q = fin(a).divide(&fin(b)).unwrap();
                let r = fin(a).modulo(&fin(b)).unwrap();
                let recombined = q.multiply(&fin(b)).unwrap().add(&r).unwrap();
                assert_eq!(recombined, fin(a), "a={a} b={b}");
            }
        }
    }

    #[test]
    fn test_hash_consistency() {
        assert_eq!(hash_integer(&fin(12)), hash_integer(&fin(12)));
        assert_ne!(hash_integer(&fin(12)), hash_integer(&fin(13)));
        assert_ne!(hash_integer(&fin(1)), hash_integer(&fin(-1)));
    }

    #[test]
    fn test_ordering() {
        use std::cmp::Ordering::*;
        assert_eq!(IntegerRepr::NegativeInfinity.compare(&fin(i64::MIN)), Less);
        assert_eq!(IntegerRepr::PositiveInfinity.compare(&fin(i64::MAX)), Greater);
        assert_eq!(fin(2).compare(&fin(2)), Equal);
    }
}
