//! Serialization of objects
//!
//! Objects produced while executing a module's top level must survive to
//! load time, so they serialize through `TypedValue`: an owned mirror of
//! the object graph with no locks, no caches, and no representation
//! variety. Deserializing reconstructs `equals`-equivalent objects; the
//! physical layout on the way back in is whatever construction chooses.
//!
//! # Why a mirror type?
//!
//! The runtime object carries a mutability tag, a cached hash, and one of
//! many physical layouts; none of that belongs in a stable byte stream.
//! `TypedValue` keeps exactly the abstract value.
//!
//! # Determinism
//!
//! Map and set entries are sorted by their own encodings before writing,
//! so the same logical value always produces identical bytes (important
//! for content-addressed module caches and reproducible builds).
//!
//! Functions, variables, tokens, phrases, and fibers do not serialize;
//! they report typed errors like any other unserializable payload.

use crate::atom;
use crate::error::ErrorCode;
use crate::ids::AtomId;
use crate::integer::IntegerRepr;
use crate::map::{map_object, AvailMap};
use crate::object::{AvailObject, Repr};
use crate::set::{set_object, AvailSet};
use crate::tuple;
use crate::types::{self, PrimitiveKind, TypeBound, TypeRepr};
use num_bigint::{BigInt, Sign};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error during serialization/deserialization.
#[derive(Debug)]
pub enum SerializeError {
    /// Functions are code, not data.
    FunctionNotSerializable,
    /// Variables are live state with identity.
    VariableNotSerializable,
    /// Phrases and tokens carry parse positions that do not round-trip.
    SyntaxNotSerializable,
    /// A type form outside the serializable subset.
    TypeNotSerializable,
    /// Bincode encoding/decoding error.
    BincodeError(Box<bincode::Error>),
    /// The byte stream decoded to something malformed.
    InvalidData(String),
}

impl fmt::Display for SerializeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializeError::FunctionNotSerializable => {
                write!(f, "functions cannot be serialized - code is not data")
            }
            SerializeError::VariableNotSerializable => {
                write!(f, "variables cannot be serialized - live state")
            }
            SerializeError::SyntaxNotSerializable => {
                write!(f, "tokens and phrases cannot be serialized")
            }
            SerializeError::TypeNotSerializable => {
                write!(f, "this type form cannot be serialized")
            }
            SerializeError::BincodeError(e) => write!(f, "bincode error: {}", e),
            SerializeError::InvalidData(msg) => write!(f, "invalid data: {}", msg),
        }
    }
}

impl std::error::Error for SerializeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerializeError::BincodeError(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<bincode::Error> for SerializeError {
    fn from(e: bincode::Error) -> Self {
        SerializeError::BincodeError(Box::new(e))
    }
}

impl From<SerializeError> for ErrorCode {
    fn from(_: SerializeError) -> ErrorCode {
        ErrorCode::NotSerializable
    }
}

/// Sign-and-magnitude integer encoding (stable across bignum crates).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum TypedInteger {
    NegativeInfinity,
    Finite { negative: bool, digits: Vec<u32> },
    PositiveInfinity,
}

impl TypedInteger {
    fn from_repr(value: &IntegerRepr) -> TypedInteger {
        match value {
            IntegerRepr::PositiveInfinity => TypedInteger::PositiveInfinity,
            IntegerRepr::NegativeInfinity => TypedInteger::NegativeInfinity,
            IntegerRepr::Finite(v) => {
                let (sign, digits) = v.to_u32_digits();
                TypedInteger::Finite {
                    negative: sign == Sign::Minus,
                    digits,
                }
            }
        }
    }

    fn to_repr(&self) -> IntegerRepr {
        match self {
            TypedInteger::PositiveInfinity => IntegerRepr::PositiveInfinity,
            TypedInteger::NegativeInfinity => IntegerRepr::NegativeInfinity,
            TypedInteger::Finite { negative, digits } => {
                let sign = if digits.is_empty() {
                    Sign::NoSign
                } else if *negative {
                    Sign::Minus
                } else {
                    Sign::Plus
                };
                IntegerRepr::Finite(BigInt::from_slice(sign, digits))
            }
        }
    }
}

/// The serializable subset of type forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypedType {
    Top,
    Bottom,
    /// Discriminant of `PrimitiveKind`.
    Primitive(u8),
    IntegerRange {
        lower: TypedInteger,
        lower_inclusive: bool,
        upper: TypedInteger,
        upper_inclusive: bool,
    },
    Enumeration(Vec<TypedValue>),
}

/// Owned mirror of an object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TypedValue {
    Nil,
    Atom { id: u64, name: String },
    Character(u32),
    Integer(TypedInteger),
    /// IEEE bits, so NaNs round-trip bitwise.
    Float(u32),
    String(String),
    Tuple(Vec<TypedValue>),
    Map(Vec<(TypedValue, TypedValue)>),
    Set(Vec<TypedValue>),
    Type(TypedType),
}

impl TypedValue {
    /// Capture an object. Fails on payloads that are not data.
    pub fn from_object(object: &AvailObject) -> Result<TypedValue, SerializeError> {
        let repr = object.traverse().repr_snapshot();
        match &repr {
            Repr::Indirection(target) => TypedValue::from_object(target),
            Repr::Nil => Ok(TypedValue::Nil),
            Repr::Atom(a) => Ok(TypedValue::Atom {
                id: a.id.0,
                name: a.name.clone(),
            }),
            Repr::Character(cp) => Ok(TypedValue::Character(*cp)),
            Repr::Integer(i) => Ok(TypedValue::Integer(TypedInteger::from_repr(i))),
            Repr::Float(v) => Ok(TypedValue::Float(v.to_bits())),
            Repr::Tuple(_) => {
                if let Some(text) = tuple::extract_string(object) {
                    return Ok(TypedValue::String(text));
                }
                let elements: Result<Vec<TypedValue>, SerializeError> = tuple::tuple_iter(object)
                    .map(|e| TypedValue::from_object(&e))
                    .collect();
                Ok(TypedValue::Tuple(elements?))
            }
            Repr::Map(m) => {
                let mut entries = Vec::with_capacity(m.size());
                for (k, v) in m.entries() {
                    entries.push((TypedValue::from_object(&k)?, TypedValue::from_object(&v)?));
                }
                sort_by_encoding(&mut entries, |(k, _)| k)?;
                Ok(TypedValue::Map(entries))
            }
            Repr::Set(s) => {
                let mut elements = Vec::with_capacity(s.size());
                for e in s.elements() {
                    elements.push(TypedValue::from_object(&e)?);
                }
                sort_by_encoding(&mut elements, |e| e)?;
                Ok(TypedValue::Set(elements))
            }
            Repr::Type(t) => Ok(TypedValue::Type(typed_type(t)?)),
            Repr::Function(_) => Err(SerializeError::FunctionNotSerializable),
            Repr::Variable(_) => Err(SerializeError::VariableNotSerializable),
            Repr::Token(_) | Repr::Phrase(_) => Err(SerializeError::SyntaxNotSerializable),
        }
    }

    /// Rebuild an `equals`-equivalent object.
    pub fn to_object(&self) -> Result<AvailObject, SerializeError> {
        match self {
            TypedValue::Nil => Ok(AvailObject::nil()),
            TypedValue::Atom { id, name } => Ok(atom::atom_with_id(AtomId(*id), name.clone())),
            TypedValue::Character(cp) => Ok(AvailObject::from_code_point(*cp)),
            TypedValue::Integer(i) => Ok(AvailObject::new(Repr::Integer(i.to_repr()))),
            TypedValue::Float(bits) => Ok(AvailObject::float(f32::from_bits(*bits))),
            TypedValue::String(text) => Ok(tuple::string_from_str(text)),
            TypedValue::Tuple(elements) => {
                let objects: Result<Vec<AvailObject>, SerializeError> =
                    elements.iter().map(|e| e.to_object()).collect();
                Ok(tuple::tuple_from_objects(objects?))
            }
            TypedValue::Map(entries) => {
                let mut map = AvailMap::new();
                for (k, v) in entries {
                    map = map.with(k.to_object()?, v.to_object()?);
                }
                Ok(map_object(map))
            }
            TypedValue::Set(elements) => {
                let mut set = AvailSet::new();
                for e in elements {
                    set = set.with(e.to_object()?);
                }
                Ok(set_object(set))
            }
            TypedValue::Type(t) => typed_type_to_object(t),
        }
    }

    /// Encode to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<TypedValue, SerializeError> {
        Ok(bincode::deserialize(bytes)?)
    }
}

fn typed_type(repr: &TypeRepr) -> Result<TypedType, SerializeError> {
    match repr {
        TypeRepr::Top => Ok(TypedType::Top),
        TypeRepr::Bottom => Ok(TypedType::Bottom),
        TypeRepr::Primitive(kind) => Ok(TypedType::Primitive(*kind as u8)),
        TypeRepr::IntegerRange(range) => Ok(TypedType::IntegerRange {
            lower: TypedInteger::from_repr(&range.lower.value),
            lower_inclusive: range.lower.inclusive,
            upper: TypedInteger::from_repr(&range.upper.value),
            upper_inclusive: range.upper.inclusive,
        }),
        TypeRepr::Enumeration { instances } => {
            let mut elements = Vec::with_capacity(instances.size());
            for e in instances.elements() {
                elements.push(TypedValue::from_object(&e)?);
            }
            sort_by_encoding(&mut elements, |e| e)?;
            Ok(TypedType::Enumeration(elements))
        }
        _ => Err(SerializeError::TypeNotSerializable),
    }
}

fn typed_type_to_object(typed: &TypedType) -> Result<AvailObject, SerializeError> {
    match typed {
        TypedType::Top => Ok(types::top_type()),
        TypedType::Bottom => Ok(types::bottom_type()),
        TypedType::Primitive(discriminant) => {
            let kind = match discriminant {
                0 => PrimitiveKind::Any,
                1 => PrimitiveKind::Atom,
                2 => PrimitiveKind::Character,
                3 => PrimitiveKind::Number,
                4 => PrimitiveKind::Float,
                5 => PrimitiveKind::Map,
                6 => PrimitiveKind::Set,
                7 => PrimitiveKind::Token,
                8 => PrimitiveKind::Variable,
                9 => PrimitiveKind::Type,
                other => {
                    return Err(SerializeError::InvalidData(format!(
                        "unknown primitive kind {other}"
                    )))
                }
            };
            Ok(match kind {
                PrimitiveKind::Any => types::any_type(),
                PrimitiveKind::Atom => types::atom_type(),
                PrimitiveKind::Character => types::character_type(),
                PrimitiveKind::Number => types::number_type(),
                PrimitiveKind::Float => types::float_type(),
                PrimitiveKind::Map => types::map_type(),
                PrimitiveKind::Set => types::set_type(),
                PrimitiveKind::Token => types::token_type(),
                PrimitiveKind::Variable => types::variable_type(),
                PrimitiveKind::Type => types::type_type(),
            })
        }
        TypedType::IntegerRange {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        } => Ok(types::integer_range_type(
            TypeBound {
                value: lower.to_repr(),
                inclusive: *lower_inclusive,
            },
            TypeBound {
                value: upper.to_repr(),
                inclusive: *upper_inclusive,
            },
        )),
        TypedType::Enumeration(elements) => {
            let mut set = AvailSet::new();
            for e in elements {
                set = set.with(e.to_object()?);
            }
            Ok(types::enumeration_type(set))
        }
    }
}

/// Sort by each item's own byte encoding, for deterministic output.
fn sort_by_encoding<T: Clone>(
    items: &mut Vec<T>,
    key: impl Fn(&T) -> &TypedValue,
) -> Result<(), SerializeError> {
    let mut paired: Vec<(Vec<u8>, T)> = Vec::with_capacity(items.len());
    for item in items.iter() {
        paired.push((bincode::serialize(key(item))?, item.clone()));
    }
    paired.sort_by(|a, b| a.0.cmp(&b.0));
    *items = paired.into_iter().map(|(_, item)| item).collect();
    Ok(())
}

/// One-call convenience: object to bytes.
pub fn serialize_object(object: &AvailObject) -> Result<Vec<u8>, SerializeError> {
    TypedValue::from_object(object)?.to_bytes()
}

/// One-call convenience: bytes to object.
pub fn deserialize_object(bytes: &[u8]) -> Result<AvailObject, SerializeError> {
    TypedValue::from_bytes(bytes)?.to_object()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(object: &AvailObject) -> AvailObject {
        let bytes = serialize_object(object).unwrap();
        deserialize_object(&bytes).unwrap()
    }

    #[test]
    fn test_scalars_round_trip() {
        for object in [
            AvailObject::nil(),
            AvailObject::from_i64(0),
            AvailObject::from_i64(-123_456_789_012_345),
            AvailObject::new(Repr::Integer(IntegerRepr::PositiveInfinity)),
            AvailObject::float(3.25),
            AvailObject::character('☃'),
        ] {
            assert!(round_trip(&object).equals(&object));
        }
    }

    #[test]
    fn test_aggregates_round_trip() {
        let tuple = tuple::tuple_from_objects(vec![
            AvailObject::from_i64(1),
            tuple::string_from_str("two"),
            AvailObject::float(3.0),
        ]);
        assert!(round_trip(&tuple).equals(&tuple));

        let map = map_object(
            AvailMap::new()
                .with(tuple::string_from_str("k"), AvailObject::from_i64(1))
                .with(AvailObject::from_i64(2), tuple::string_from_str("v")),
        );
        assert!(round_trip(&map).equals(&map));

        let set = set_object(AvailSet::from_elements([
            AvailObject::from_i64(5),
            AvailObject::from_i64(6),
        ]));
        assert!(round_trip(&set).equals(&set));
    }

    #[test]
    fn test_atom_identity_round_trips() {
        let original = atom::create_atom("exported-name");
        let restored = round_trip(&original);
        assert!(restored.equals(&original));
    }

    #[test]
    fn test_types_round_trip() {
        let range = types::integer_range_type(
            TypeBound::inclusive(IntegerRepr::from_i64(3)),
            TypeBound::inclusive(IntegerRepr::from_i64(9)),
        );
        assert!(round_trip(&range).equals(&range));
        assert!(round_trip(&types::boolean_type()).equals(&types::boolean_type()));
    }

    #[test]
    fn test_determinism_ignores_insertion_order() {
        let a = map_object(
            AvailMap::new()
                .with(AvailObject::from_i64(1), AvailObject::from_i64(10))
                .with(AvailObject::from_i64(2), AvailObject::from_i64(20)),
        );
        let b = map_object(
            AvailMap::new()
                .with(AvailObject::from_i64(2), AvailObject::from_i64(20))
                .with(AvailObject::from_i64(1), AvailObject::from_i64(10)),
        );
        assert_eq!(
            serialize_object(&a).unwrap(),
            serialize_object(&b).unwrap()
        );
    }

    #[test]
    fn test_functions_do_not_serialize() {
        let f = crate::function::function_object(std::sync::Arc::new(
            crate::function::RawFunction {
                num_args: 0,
                local_variable_types: Vec::new(),
                num_constants: 0,
                literals: Vec::new(),
                code: vec![crate::function::L1Instruction::Return],
                function_type: types::function_type(Vec::new(), types::top_type()),
                primitive: None,
            },
        ));
        assert!(matches!(
            serialize_object(&f),
            Err(SerializeError::FunctionNotSerializable)
        ));
    }
}
