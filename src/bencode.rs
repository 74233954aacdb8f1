//! Minimal bencode support (BEP-3 encoding only).
//!
//! The peer protocol needs bencode for two things: the extended-handshake
//! dictionary (BEP-10) and the ut_metadata / ut_pex payloads (BEP-9, BEP-11).
//! This module provides just the value model and a strict encoder/decoder
//! for those payloads; it is not a .torrent parser.

use std::collections::BTreeMap;

use bytes::Bytes;
use thiserror::Error;

const MAX_DEPTH: usize = 32;

/// Errors produced while decoding bencode payloads.
#[derive(Debug, Error)]
pub enum BencodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("unexpected character: {0}")]
    UnexpectedChar(char),

    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    #[error("invalid string length")]
    InvalidStringLength,

    #[error("nesting too deep")]
    NestingTooDeep,

    #[error("trailing data after value")]
    TrailingData,
}

/// A bencode value: integer, byte string, list, or dictionary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Integer(i64),
    Bytes(Bytes),
    List(Vec<Value>),
    Dict(BTreeMap<Bytes, Value>),
}

impl Value {
    /// Creates a byte string value from a UTF-8 string.
    pub fn string(s: &str) -> Self {
        Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary lookup by key; returns `None` for non-dicts.
    pub fn get(&self, key: &[u8]) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }
}

/// Encodes a value to its canonical bencode form.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(value, &mut out);
    out
}

fn encode_into(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Integer(i) => {
            out.push(b'i');
            out.extend_from_slice(i.to_string().as_bytes());
            out.push(b'e');
        }
        Value::Bytes(b) => {
            out.extend_from_slice(b.len().to_string().as_bytes());
            out.push(b':');
            out.extend_from_slice(b);
        }
        Value::List(items) => {
            out.push(b'l');
            for item in items {
                encode_into(item, out);
            }
            out.push(b'e');
        }
        Value::Dict(dict) => {
            out.push(b'd');
            for (key, val) in dict {
                out.extend_from_slice(key.len().to_string().as_bytes());
                out.push(b':');
                out.extend_from_slice(key);
                encode_into(val, out);
            }
            out.push(b'e');
        }
    }
}

/// Decodes exactly one bencode value; trailing bytes are an error.
pub fn decode(data: &[u8]) -> Result<Value, BencodeError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    if pos != data.len() {
        return Err(BencodeError::TrailingData);
    }
    Ok(value)
}

/// Decodes one value from the front of `data`, returning it with the number
/// of bytes consumed. Used for payloads where raw data follows the dict
/// (ut_metadata Data messages).
pub fn decode_prefix(data: &[u8]) -> Result<(Value, usize), BencodeError> {
    let mut pos = 0;
    let value = decode_value(data, &mut pos, 0)?;
    Ok((value, pos))
}

fn decode_value(data: &[u8], pos: &mut usize, depth: usize) -> Result<Value, BencodeError> {
    if depth > MAX_DEPTH {
        return Err(BencodeError::NestingTooDeep);
    }
    match data.get(*pos).copied() {
        None => Err(BencodeError::UnexpectedEof),
        Some(b'i') => decode_integer(data, pos),
        Some(b'l') => {
            *pos += 1;
            let mut items = Vec::new();
            while *pos < data.len() && data[*pos] != b'e' {
                items.push(decode_value(data, pos, depth + 1)?);
            }
            expect_end(data, pos)?;
            Ok(Value::List(items))
        }
        Some(b'd') => {
            *pos += 1;
            let mut dict = BTreeMap::new();
            while *pos < data.len() && data[*pos] != b'e' {
                let key = decode_string(data, pos)?;
                let val = decode_value(data, pos, depth + 1)?;
                dict.insert(key, val);
            }
            expect_end(data, pos)?;
            Ok(Value::Dict(dict))
        }
        Some(b'0'..=b'9') => Ok(Value::Bytes(decode_string(data, pos)?)),
        Some(c) => Err(BencodeError::UnexpectedChar(c as char)),
    }
}

fn expect_end(data: &[u8], pos: &mut usize) -> Result<(), BencodeError> {
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }
    *pos += 1;
    Ok(())
}

fn decode_integer(data: &[u8], pos: &mut usize) -> Result<Value, BencodeError> {
    *pos += 1;
    let start = *pos;
    while *pos < data.len() && data[*pos] != b'e' {
        *pos += 1;
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }
    let text = std::str::from_utf8(&data[start..*pos])
        .map_err(|_| BencodeError::InvalidInteger("not utf8".into()))?;
    if text.is_empty() || text == "-" {
        return Err(BencodeError::InvalidInteger("empty".into()));
    }
    if text.starts_with("-0") || (text.starts_with('0') && text.len() > 1) {
        return Err(BencodeError::InvalidInteger("leading zeros".into()));
    }
    let value: i64 = text
        .parse()
        .map_err(|_| BencodeError::InvalidInteger(text.into()))?;
    *pos += 1;
    Ok(Value::Integer(value))
}

fn decode_string(data: &[u8], pos: &mut usize) -> Result<Bytes, BencodeError> {
    let start = *pos;
    while *pos < data.len() && data[*pos] != b':' {
        *pos += 1;
    }
    if *pos >= data.len() {
        return Err(BencodeError::UnexpectedEof);
    }
    if start == *pos || !data[start..*pos].iter().all(u8::is_ascii_digit) {
        return Err(BencodeError::InvalidStringLength);
    }
    let len: usize = std::str::from_utf8(&data[start..*pos])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(BencodeError::InvalidStringLength)?;
    *pos += 1;
    if *pos + len > data.len() {
        return Err(BencodeError::UnexpectedEof);
    }
    let bytes = Bytes::copy_from_slice(&data[*pos..*pos + len]);
    *pos += len;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_roundtrip() {
        let encoded = encode(&Value::Integer(-42));
        assert_eq!(encoded, b"i-42e");
        assert_eq!(decode(&encoded).unwrap(), Value::Integer(-42));
    }

    #[test]
    fn test_dict_sorted_keys() {
        let mut dict = BTreeMap::new();
        dict.insert(Bytes::from_static(b"m"), Value::Integer(1));
        dict.insert(Bytes::from_static(b"a"), Value::Integer(2));
        let encoded = encode(&Value::Dict(dict));
        assert_eq!(encoded, b"d1:ai2e1:mi1ee");
    }

    #[test]
    fn test_rejects_trailing_data() {
        assert!(matches!(decode(b"i1eXX"), Err(BencodeError::TrailingData)));
    }

    #[test]
    fn test_rejects_leading_zeros() {
        assert!(decode(b"i042e").is_err());
        assert!(decode(b"i-0e").is_err());
    }

    #[test]
    fn test_decode_prefix_reports_consumed() {
        let (value, consumed) = decode_prefix(b"d1:xi7eeRAWDATA").unwrap();
        assert_eq!(value.get(b"x").and_then(Value::as_integer), Some(7));
        assert_eq!(consumed, 8);
    }

    #[test]
    fn test_nested_list() {
        let decoded = decode(b"ll3:abcei9ee").unwrap();
        let list = decoded.as_list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].as_list().unwrap()[0].as_str(), Some("abc"));
    }
}
