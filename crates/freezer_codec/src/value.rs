//! Dynamic tagged value type.

use std::fmt;

/// A dynamic value as stored in a Freezer tuple.
///
/// Each variant corresponds to one type tag of the on-disk layout. `Null`
/// is reserved for removal markers and cannot be the value of a user
/// attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null marker (tag 0).
    Null,
    /// Signed integer (tag 1).
    Integer(i64),
    /// Double-precision float (tag 2).
    Double(f64),
    /// UTF-8 text (tag 3).
    String(String),
    /// Opaque bytes (tag 4).
    Blob(Vec<u8>),
    /// Seconds since the Unix epoch (tag 5).
    Date(i64),
    /// Reference to another entity by id (tag 6).
    Reference(String),
}

impl Value {
    /// Returns the type tag for this value.
    #[must_use]
    pub fn tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) => 1,
            Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Blob(_) => 4,
            Value::Date(_) => 5,
            Value::Reference(_) => 6,
        }
    }

    /// Classifies this value as an attribute type.
    ///
    /// Returns `None` for `Null`, which is not a valid attribute value.
    #[must_use]
    pub fn attribute_type(&self) -> Option<AttributeType> {
        AttributeType::from_tag(self.tag())
    }

    /// Check if this value is the null marker.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get this value as an integer, if it is one.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Get this value as a double, if it is one.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    /// Get this value as a string, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get this value as a blob, if it is one.
    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Get this value as a date (epoch seconds), if it is one.
    #[must_use]
    pub fn as_date(&self) -> Option<i64> {
        match self {
            Value::Date(secs) => Some(*secs),
            _ => None,
        }
    }

    /// Get this value as an entity reference, if it is one.
    #[must_use]
    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Value::Reference(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Double(x) => write!(f, "{x}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Blob(b) => write!(f, "blob[{}]", b.len()),
            Value::Date(secs) => write!(f, "date:{secs}"),
            Value::Reference(id) => write!(f, "ref:{id}"),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Value::Blob(b.to_vec())
    }
}

/// The declared type of an attribute.
///
/// Attribute types are a closed set; the discriminants are the type tags
/// of the on-disk layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeType {
    /// Signed 64-bit integer.
    Integer,
    /// Double-precision float.
    Double,
    /// UTF-8 text.
    String,
    /// Opaque bytes.
    Blob,
    /// Seconds since the Unix epoch.
    Date,
    /// Reference to another entity.
    Reference,
}

impl AttributeType {
    /// Returns the type tag for this attribute type.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            AttributeType::Integer => 1,
            AttributeType::Double => 2,
            AttributeType::String => 3,
            AttributeType::Blob => 4,
            AttributeType::Date => 5,
            AttributeType::Reference => 6,
        }
    }

    /// Resolves a type tag to an attribute type.
    ///
    /// Returns `None` for the null tag and for unknown tags.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(AttributeType::Integer),
            2 => Some(AttributeType::Double),
            3 => Some(AttributeType::String),
            4 => Some(AttributeType::Blob),
            5 => Some(AttributeType::Date),
            6 => Some(AttributeType::Reference),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Integer => "integer",
            AttributeType::Double => "double",
            AttributeType::String => "string",
            AttributeType::Blob => "blob",
            AttributeType::Date => "date",
            AttributeType::Reference => "reference",
        };
        write!(f, "{name}")
    }
}
