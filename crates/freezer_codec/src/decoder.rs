//! Tagged value decoder.

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Decode a value from its tagged byte layout.
///
/// # Errors
///
/// Returns an error on an empty input, an unknown tag, a truncated
/// fixed-width payload, trailing bytes after a fixed-width payload, or
/// invalid UTF-8 in a string payload.
pub fn decode(bytes: &[u8]) -> CodecResult<Value> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.decode()?;
    if !decoder.is_empty() {
        return Err(CodecError::TrailingBytes {
            count: decoder.remaining().len(),
        });
    }
    Ok(value)
}

/// A tagged value decoder.
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    /// Create a new decoder for the given bytes.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value.
    ///
    /// Variable-width payloads (string, blob, reference) consume the rest
    /// of the input; fixed-width payloads consume exactly their width.
    pub fn decode(&mut self) -> CodecResult<Value> {
        let tag = self.read_byte()?;
        match tag {
            0 => Ok(Value::Null),
            1 => Ok(Value::Integer(self.read_i64()?)),
            2 => Ok(Value::Double(f64::from_bits(self.read_i64()? as u64))),
            3 => self.read_text().map(Value::String),
            4 => Ok(Value::Blob(self.read_rest().to_vec())),
            5 => Ok(Value::Date(self.read_i64()?)),
            6 => self.read_text().map(Value::Reference),
            other => Err(CodecError::UnknownTag { tag: other }),
        }
    }

    /// Check if all bytes have been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Get remaining bytes.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    #[inline]
    fn read_byte(&mut self) -> CodecResult<u8> {
        if self.pos >= self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let byte = self.data[self.pos];
        self.pos += 1;
        Ok(byte)
    }

    #[inline]
    fn read_i64(&mut self) -> CodecResult<i64> {
        if self.pos + 8 > self.data.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(i64::from_le_bytes(buf))
    }

    #[inline]
    fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    fn read_text(&mut self) -> CodecResult<String> {
        let bytes = self.read_rest();
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| CodecError::InvalidUtf8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert!(matches!(decode(&[]), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn unknown_tag() {
        assert!(matches!(
            decode(&[9]),
            Err(CodecError::UnknownTag { tag: 9 })
        ));
    }

    #[test]
    fn truncated_integer() {
        assert!(matches!(
            decode(&[1, 0, 0, 0]),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn trailing_bytes_after_null() {
        assert!(matches!(
            decode(&[0, 1]),
            Err(CodecError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn trailing_bytes_after_integer() {
        let mut bytes = vec![1];
        bytes.extend_from_slice(&42i64.to_le_bytes());
        bytes.push(0xff);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn invalid_utf8_string() {
        assert!(matches!(decode(&[3, 0xff, 0xfe]), Err(CodecError::InvalidUtf8)));
    }

    #[test]
    fn empty_blob() {
        assert_eq!(decode(&[4]).unwrap(), Value::Blob(Vec::new()));
    }
}
