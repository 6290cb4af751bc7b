//! The decoded-but-uninterpreted value universe of the wire codec.
//!
//! `PackedValue` is what [`crate::codec`] produces for a cell whose concrete
//! type is only known from the peer's schema, not from the stream itself —
//! row data, in particular, arrives as `PackedValue::Array` of cells that
//! an adapter's column-conversion table (see `kitchensync-adapter`) later
//! interprets against a `ColumnKind`.

use std::fmt;

/// Any value representable by the packed-value codec.
#[derive(Debug, Clone, PartialEq)]
pub enum PackedValue {
    Nil,
    Bool(bool),
    /// A signed integer, regardless of the wire width it was packed at.
    Int(i64),
    /// An unsigned integer, regardless of the wire width it was packed at.
    UInt(u64),
    F32(f32),
    F64(f64),
    /// Raw bytes — used for both opaque byte strings and, by convention,
    /// for UTF-8 text (the codec itself does not distinguish strings from
    /// byte strings; callers interpret bytes as text when their schema
    /// says to).
    Bytes(Vec<u8>),
    Array(Vec<PackedValue>),
    Map(Vec<(PackedValue, PackedValue)>),
}

impl PackedValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PackedValue::Nil => "nil",
            PackedValue::Bool(_) => "bool",
            PackedValue::Int(_) => "int",
            PackedValue::UInt(_) => "uint",
            PackedValue::F32(_) => "f32",
            PackedValue::F64(_) => "f64",
            PackedValue::Bytes(_) => "bytes",
            PackedValue::Array(_) => "array",
            PackedValue::Map(_) => "map",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, PackedValue::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PackedValue::Int(v) => Some(*v),
            PackedValue::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            PackedValue::UInt(v) => Some(*v),
            PackedValue::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PackedValue::F64(v) => Some(*v),
            PackedValue::F32(v) => Some(f64::from(*v)),
            PackedValue::Int(v) => Some(*v as f64),
            PackedValue::UInt(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PackedValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_array(&self) -> Option<&[PackedValue]> {
        match self {
            PackedValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(PackedValue, PackedValue)]> {
        match self {
            PackedValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Look up a value in a `Map` by a string key, the shape every schema
    /// payload map (spec.md §6) uses.
    pub fn map_get(&self, key: &str) -> Option<&PackedValue> {
        self.as_map()?.iter().find(|(k, _)| k.as_str() == Some(key)).map(|(_, v)| v)
    }
}

impl fmt::Display for PackedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackedValue::Nil => write!(f, "nil"),
            PackedValue::Bool(b) => write!(f, "{b}"),
            PackedValue::Int(v) => write!(f, "{v}"),
            PackedValue::UInt(v) => write!(f, "{v}"),
            PackedValue::F32(v) => write!(f, "{v}"),
            PackedValue::F64(v) => write!(f, "{v}"),
            PackedValue::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            PackedValue::Array(a) => write!(f, "<array of {}>", a.len()),
            PackedValue::Map(m) => write!(f, "<map of {}>", m.len()),
        }
    }
}

impl From<bool> for PackedValue {
    fn from(v: bool) -> Self {
        PackedValue::Bool(v)
    }
}

impl From<i64> for PackedValue {
    fn from(v: i64) -> Self {
        PackedValue::Int(v)
    }
}

impl From<i32> for PackedValue {
    fn from(v: i32) -> Self {
        PackedValue::Int(i64::from(v))
    }
}

impl From<u64> for PackedValue {
    fn from(v: u64) -> Self {
        PackedValue::UInt(v)
    }
}

impl From<f64> for PackedValue {
    fn from(v: f64) -> Self {
        PackedValue::F64(v)
    }
}

impl From<&str> for PackedValue {
    fn from(v: &str) -> Self {
        PackedValue::Bytes(v.as_bytes().to_vec())
    }
}

impl From<String> for PackedValue {
    fn from(v: String) -> Self {
        PackedValue::Bytes(v.into_bytes())
    }
}

impl From<Vec<u8>> for PackedValue {
    fn from(v: Vec<u8>) -> Self {
        PackedValue::Bytes(v)
    }
}

impl<T: Into<PackedValue>> From<Option<T>> for PackedValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => PackedValue::Nil,
        }
    }
}

impl<T: Into<PackedValue>> FromIterator<T> for PackedValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PackedValue::Array(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_uint_cross_convert_when_in_range() {
        assert_eq!(PackedValue::Int(5).as_u64(), Some(5));
        assert_eq!(PackedValue::UInt(5).as_i64(), Some(5));
        assert_eq!(PackedValue::Int(-1).as_u64(), None);
    }

    #[test]
    fn map_get_finds_string_keyed_entry() {
        let map = PackedValue::Map(vec![
            (PackedValue::from("name"), PackedValue::from("widgets")),
            (PackedValue::from("nullable"), PackedValue::Bool(false)),
        ]);
        assert_eq!(map.map_get("name").and_then(PackedValue::as_str), Some("widgets"));
        assert_eq!(map.map_get("nullable").and_then(PackedValue::as_bool), Some(false));
        assert!(map.map_get("missing").is_none());
    }

    #[test]
    fn display_never_panics_on_any_variant() {
        for v in [
            PackedValue::Nil,
            PackedValue::Bool(true),
            PackedValue::Int(-1),
            PackedValue::UInt(1),
            PackedValue::F32(1.0),
            PackedValue::F64(1.0),
            PackedValue::Bytes(vec![1, 2, 3]),
            PackedValue::Array(vec![PackedValue::Nil]),
            PackedValue::Map(vec![]),
        ] {
            let _ = v.to_string();
        }
    }
}
