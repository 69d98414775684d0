//! 32-bit IEEE floats
//!
//! Float objects wrap a single `f32`. Arithmetic follows IEEE 754 and never
//! fails with an error code (NaN and infinities are ordinary values here);
//! only conversions to integers can reject. Object equality is bitwise so
//! it stays an equivalence relation, and equality discovery installs
//! indirections just as it does for tuples.

use crate::error::ErrorCode;
use crate::object::{AvailObject, Repr};
use num_bigint::BigInt;
use num_traits::FromPrimitive;

pub fn add(a: f32, b: f32) -> f32 {
    a + b
}

pub fn subtract(a: f32, b: f32) -> f32 {
    a - b
}

pub fn multiply(a: f32, b: f32) -> f32 {
    a * b
}

pub fn divide(a: f32, b: f32) -> f32 {
    a / b
}

/// Truncate toward zero to an integer object. NaN and infinities reject.
pub fn to_integer(value: f32) -> Result<AvailObject, ErrorCode> {
    if !value.is_finite() {
        return Err(ErrorCode::IncorrectArgumentType);
    }
    let truncated = value.trunc() as f64;
    let big = BigInt::from_f64(truncated).ok_or(ErrorCode::IncorrectArgumentType)?;
    Ok(AvailObject::new(Repr::Integer(
        crate::integer::IntegerRepr::from_bigint(big),
    )))
}

/// Widen an integer object to a float, saturating at the IEEE infinities.
pub fn from_integer(value: &AvailObject) -> Option<f32> {
    use crate::integer::IntegerRepr::*;
    match value.as_integer()? {
        Finite(v) => Some(num_traits::ToPrimitive::to_f32(&v).unwrap_or(f32::INFINITY)),
        PositiveInfinity => Some(f32::INFINITY),
        NegativeInfinity => Some(f32::NEG_INFINITY),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_coalesces_storage() {
        let a = AvailObject::float(2.5);
        let b = AvailObject::float(2.5);
        assert!(a.equals(&b));
        // One side now forwards to the other.
        assert!(a.traverse().same_identity(&b.traverse()));
    }

    #[test]
    fn test_to_integer_truncates() {
        assert!(to_integer(2.9).unwrap().equals(&AvailObject::from_i64(2)));
        assert!(to_integer(-2.9).unwrap().equals(&AvailObject::from_i64(-2)));
        assert!(to_integer(f32::NAN).is_err());
        assert!(to_integer(f32::INFINITY).is_err());
    }

    #[test]
    fn test_from_integer_saturates() {
        let big = AvailObject::new(Repr::Integer(crate::integer::IntegerRepr::from_bigint(
            BigInt::from(10).pow(60u32),
        )));
        assert_eq!(from_integer(&big), Some(f32::INFINITY));
        assert_eq!(from_integer(&AvailObject::from_i64(3)), Some(3.0));
    }
}
