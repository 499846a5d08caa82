//! MessagePack encode/decode helpers used by every non-Arrow wire shape.

use crate::error::{AirportError, Result};
use serde::{Deserialize, Serialize};

/// A dynamically-typed MessagePack value, used for `app_metadata` maps
/// whose shape varies by entry type (spec.md §4.3).
pub type Value = rmpv::Value;

/// Encode `value` as a MessagePack byte buffer.
pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    value.serialize(&mut rmp_serde::Serializer::new(&mut buf).with_struct_map())?;
    Ok(buf)
}

/// Decode a MessagePack byte buffer into `T`.
pub fn from_slice<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(AirportError::from)
}

/// Build a MessagePack map from `(key, value)` pairs, used for
/// hand-assembled `app_metadata` / action-parameter maps that don't have
/// a single static struct shape.
pub fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::String(k.into()), v))
            .collect(),
    )
}

/// Look up a key in a MessagePack map value, returning `None` for
/// anything but `Value::Map` or a missing/nil entry.
pub fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    match value {
        Value::Map(entries) => entries.iter().find_map(|(k, v)| {
            if k.as_str() == Some(key) && !v.is_nil() {
                Some(v)
            } else {
                None
            }
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_struct() {
        let s = Sample {
            a: 7,
            b: "hi".into(),
        };
        let bytes = to_vec(&s).unwrap();
        let back: Sample = from_slice(&bytes).unwrap();
        assert_eq!(s, back);
    }

    #[test]
    fn map_get_ignores_nil() {
        let v = map(vec![
            ("present", Value::from(1)),
            ("absent", Value::Nil),
        ]);
        assert!(map_get(&v, "present").is_some());
        assert!(map_get(&v, "absent").is_none());
        assert!(map_get(&v, "missing").is_none());
    }
}
