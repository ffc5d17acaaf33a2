//! Content hashing for stage sources
//!
//! A stage source is serialized to JSON, rewritten into a canonical form
//! (object keys sorted, no insignificant whitespace) and digested with
//! SHA-256. Structurally equal values therefore produce the same hex digest
//! regardless of field declaration or map insertion order, and the digest is
//! stable across process runs.
//!
//! JSON cannot represent NaN or infinities; `serde_json` writes them as
//! `null`. Values containing them are rejected before serialization so that
//! distinct sources never share a digest.

use serde::ser::{self, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::Result;

/// Hash a serializable value into a lowercase hex SHA-256 digest.
///
/// Serialization failures (for example maps keyed by non-string values or
/// non-finite floats) are returned as [`crate::Error::Hash`] rather than
/// coerced.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    value.serialize(FiniteFloatCheck)?;
    let json = serde_json::to_value(value)?;

    let mut canonical = String::new();
    write_canonical(&json, &mut canonical)?;

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(format!("{:x}", digest))
}

fn write_canonical(value: &Value, out: &mut String) -> Result<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_canonical(item, out)?;
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        leaf => out.push_str(&serde_json::to_string(leaf)?),
    }
    Ok(())
}

// ============================================================================
// Non-finite float check
// ============================================================================

/// Serializer that only walks a value, failing on NaN or infinite floats
struct FiniteFloatCheck;

type CheckResult = std::result::Result<(), serde_json::Error>;

fn check_finite(value: f64) -> CheckResult {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ser::Error::custom(format!("cannot hash non-finite float {}", value)))
    }
}

macro_rules! accept_scalars {
    ($($method:ident($ty:ty)),* $(,)?) => {
        $(
            fn $method(self, _: $ty) -> CheckResult {
                Ok(())
            }
        )*
    };
}

impl ser::Serializer for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    accept_scalars!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_i128(i128),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_u128(u128),
        serialize_char(char),
        serialize_str(&str),
        serialize_bytes(&[u8]),
        serialize_unit_struct(&'static str),
    );

    fn serialize_f32(self, v: f32) -> CheckResult {
        check_finite(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> CheckResult {
        check_finite(v)
    }

    fn serialize_none(self) -> CheckResult {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_unit(self) -> CheckResult {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> CheckResult {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_map(self, _: Option<usize>) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> std::result::Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> CheckResult {
        key.serialize(FiniteFloatCheck)
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteFloatCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        _: &'static str,
        value: &T,
    ) -> CheckResult {
        value.serialize(FiniteFloatCheck)
    }

    fn end(self) -> CheckResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;
    use std::collections::{BTreeMap, HashMap};

    #[derive(Serialize)]
    struct Ab {
        a: u32,
        b: &'static str,
    }

    #[derive(Serialize)]
    struct Ba {
        b: &'static str,
        a: u32,
    }

    #[test]
    fn test_field_order_does_not_change_hash() {
        let h1 = content_hash(&Ab { a: 1, b: "x" }).unwrap();
        let h2 = content_hash(&Ba { b: "x", a: 1 }).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_map_insertion_order_does_not_change_hash() {
        let mut m1 = HashMap::new();
        m1.insert("zeta".to_string(), 1);
        m1.insert("alpha".to_string(), 2);
        m1.insert("mid".to_string(), 3);

        let mut m2 = BTreeMap::new();
        m2.insert("mid".to_string(), 3);
        m2.insert("alpha".to_string(), 2);
        m2.insert("zeta".to_string(), 1);

        assert_eq!(content_hash(&m1).unwrap(), content_hash(&m2).unwrap());
    }

    #[test]
    fn test_different_values_differ() {
        let h1 = content_hash(&Ab { a: 1, b: "x" }).unwrap();
        let h2 = content_hash(&Ab { a: 2, b: "x" }).unwrap();
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let h = content_hash(&vec![1, 2, 3]).unwrap();
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit()));
        // Stable across runs: digest of the canonical text "[1,2,3]"
        assert_eq!(h, format!("{:x}", Sha256::digest(b"[1,2,3]")));
    }

    #[test]
    fn test_nested_keys_are_sorted_before_hashing() {
        let value = serde_json::json!({"b": {"y": 1, "x": [true, null]}, "a": "s"});
        let canonical = r#"{"a":"s","b":{"x":[true,null],"y":1}}"#;
        assert_eq!(
            content_hash(&value).unwrap(),
            format!("{:x}", Sha256::digest(canonical.as_bytes()))
        );
    }

    #[test]
    fn test_non_string_map_keys_fail_loudly() {
        let mut m = HashMap::new();
        m.insert(vec![1u8], 1);
        assert!(matches!(content_hash(&m), Err(crate::Error::Hash(_))));
    }

    #[derive(Serialize)]
    struct Curve {
        name: &'static str,
        values: Vec<f64>,
        offset: Option<f32>,
    }

    #[test]
    fn test_non_finite_floats_fail_loudly() {
        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(content_hash(&vec![bad]), Err(crate::Error::Hash(_))));
            let nested = Curve {
                name: "pitch",
                values: vec![1.0, bad],
                offset: None,
            };
            assert!(matches!(content_hash(&nested), Err(crate::Error::Hash(_))));
        }
        let offset = Curve {
            name: "pitch",
            values: vec![1.0],
            offset: Some(f32::NAN),
        };
        assert!(content_hash(&offset).is_err());

        let mut keyed = BTreeMap::new();
        keyed.insert("a".to_string(), f64::NAN);
        assert!(content_hash(&keyed).is_err());
    }

    #[test]
    fn test_null_and_nan_do_not_share_a_digest() {
        let none: Vec<Option<f64>> = vec![None];
        assert!(content_hash(&none).is_ok());
        assert!(content_hash(&vec![Some(f64::NAN)]).is_err());
    }
}
