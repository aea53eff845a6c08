//! # Freezer Codec
//!
//! Fixed, versioned value encoding for the Freezer store.
//!
//! Every value persisted by Freezer is a self-describing blob: a one-byte
//! type tag followed by the canonical payload for that tag.
//!
//! | Tag | Type | Payload |
//! |---|---|---|
//! | 0 | null | empty |
//! | 1 | integer | 8 bytes, little-endian `i64` |
//! | 2 | double | 8 bytes, little-endian `f64` bits |
//! | 3 | string | UTF-8 bytes |
//! | 4 | blob | raw bytes |
//! | 5 | date | 8 bytes, little-endian `i64` seconds since the Unix epoch |
//! | 6 | reference | UTF-8 bytes of the referenced entity id |
//!
//! ## Usage
//!
//! ```
//! use freezer_codec::{encode, decode, Value};
//!
//! let value = Value::Integer(42);
//! let bytes = encode(&value);
//! assert_eq!(decode(&bytes).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode, Decoder};
pub use encoder::{encode, Encoder};
pub use error::{CodecError, CodecResult};
pub use value::{AttributeType, Value};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_null() {
        let bytes = encode(&Value::Null);
        assert_eq!(decode(&bytes).unwrap(), Value::Null);
    }

    #[test]
    fn roundtrip_integer() {
        for n in [0i64, 1, -1, 42, i64::MIN, i64::MAX] {
            let value = Value::Integer(n);
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_double() {
        for x in [0.0f64, -0.0, 1.5, -273.15, f64::MAX] {
            let value = Value::Double(x);
            assert_eq!(decode(&encode(&value)).unwrap(), value);
        }
    }

    #[test]
    fn roundtrip_string() {
        let value = Value::String("hello world".to_string());
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn roundtrip_empty_string() {
        let value = Value::String(String::new());
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn roundtrip_blob() {
        let value = Value::Blob(vec![0, 1, 2, 255]);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn roundtrip_date() {
        let value = Value::Date(1_381_363_200);
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }

    #[test]
    fn roundtrip_reference() {
        let value = Value::Reference("f47ac10b-58cc-4372-a567-0e02b2c3d479".to_string());
        assert_eq!(decode(&encode(&value)).unwrap(), value);
    }
}
