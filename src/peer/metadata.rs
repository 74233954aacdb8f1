//! Metadata exchange extension (ut_metadata, BEP-9).
//!
//! Lets peers fetch the info dictionary from each other, which is how
//! magnet-link downloads bootstrap. The dispatcher only *serves* metadata
//! here; fetching is a higher-layer concern.

use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::ProtocolError;
use crate::bencode::{decode_prefix, encode, Value};

/// The size of a metadata piece (16 KiB).
pub const METADATA_PIECE_SIZE: usize = 16384;

/// ut_metadata message sub-types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    Request = 0,
    Data = 1,
    Reject = 2,
}

impl MetadataKind {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(MetadataKind::Request),
            1 => Some(MetadataKind::Data),
            2 => Some(MetadataKind::Reject),
            _ => None,
        }
    }
}

/// A ut_metadata message: a bencoded header dict, with the raw piece bytes
/// appended for Data messages.
#[derive(Debug, Clone)]
pub struct MetadataMessage {
    pub kind: MetadataKind,
    pub piece: u32,
    pub total_size: Option<u32>,
    pub data: Option<Bytes>,
}

impl MetadataMessage {
    pub fn request(piece: u32) -> Self {
        Self {
            kind: MetadataKind::Request,
            piece,
            total_size: None,
            data: None,
        }
    }

    pub fn data(piece: u32, total_size: u32, data: Bytes) -> Self {
        Self {
            kind: MetadataKind::Data,
            piece,
            total_size: Some(total_size),
            data: Some(data),
        }
    }

    pub fn reject(piece: u32) -> Self {
        Self {
            kind: MetadataKind::Reject,
            piece,
            total_size: None,
            data: None,
        }
    }

    pub fn encode(&self) -> Bytes {
        let mut dict = BTreeMap::new();
        dict.insert(
            Bytes::from_static(b"msg_type"),
            Value::Integer(self.kind as i64),
        );
        dict.insert(
            Bytes::from_static(b"piece"),
            Value::Integer(self.piece as i64),
        );
        if let Some(total_size) = self.total_size {
            dict.insert(
                Bytes::from_static(b"total_size"),
                Value::Integer(total_size as i64),
            );
        }

        let mut out = encode(&Value::Dict(dict));
        if let Some(ref data) = self.data {
            out.extend_from_slice(data);
        }
        Bytes::from(out)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        let (value, header_len) = decode_prefix(payload)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| ProtocolError::Extension("expected dict".into()))?;

        let kind = dict
            .get(b"msg_type".as_slice())
            .and_then(|v| v.as_integer())
            .and_then(|v| u8::try_from(v).ok())
            .and_then(MetadataKind::from_byte)
            .ok_or_else(|| ProtocolError::Extension("bad msg_type".into()))?;

        let piece = dict
            .get(b"piece".as_slice())
            .and_then(|v| v.as_integer())
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| ProtocolError::Extension("missing piece".into()))?;

        let total_size = dict
            .get(b"total_size".as_slice())
            .and_then(|v| v.as_integer())
            .and_then(|v| u32::try_from(v).ok());

        let data = if kind == MetadataKind::Data && header_len < payload.len() {
            Some(Bytes::copy_from_slice(&payload[header_len..]))
        } else {
            None
        };

        Ok(Self {
            kind,
            piece,
            total_size,
            data,
        })
    }
}

/// Number of metadata pieces for a metadata blob of this size.
pub fn metadata_piece_count(metadata_size: usize) -> usize {
    metadata_size.div_ceil(METADATA_PIECE_SIZE)
}

/// The byte range of one metadata piece, empty when out of range.
pub fn metadata_piece_bounds(piece: u32, total_size: usize) -> Option<(usize, usize)> {
    let start = piece as usize * METADATA_PIECE_SIZE;
    if start >= total_size {
        return None;
    }
    Some((start, (start + METADATA_PIECE_SIZE).min(total_size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_roundtrip() {
        let msg = MetadataMessage::request(5);
        let decoded = MetadataMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.kind, MetadataKind::Request);
        assert_eq!(decoded.piece, 5);
        assert!(decoded.data.is_none());
    }

    #[test]
    fn test_data_roundtrip() {
        let data = Bytes::from_static(b"metadata bytes");
        let msg = MetadataMessage::data(2, 1000, data.clone());
        let decoded = MetadataMessage::decode(&msg.encode()).unwrap();
        assert_eq!(decoded.kind, MetadataKind::Data);
        assert_eq!(decoded.piece, 2);
        assert_eq!(decoded.total_size, Some(1000));
        assert_eq!(decoded.data, Some(data));
    }

    #[test]
    fn test_reject_roundtrip() {
        let decoded = MetadataMessage::decode(&MetadataMessage::reject(10).encode()).unwrap();
        assert_eq!(decoded.kind, MetadataKind::Reject);
        assert_eq!(decoded.piece, 10);
    }

    #[test]
    fn test_piece_bounds() {
        assert_eq!(metadata_piece_bounds(0, 100), Some((0, 100)));
        assert_eq!(metadata_piece_bounds(0, 20000), Some((0, 16384)));
        assert_eq!(metadata_piece_bounds(1, 20000), Some((16384, 20000)));
        assert_eq!(metadata_piece_bounds(2, 20000), None);
    }

    #[test]
    fn test_piece_count() {
        assert_eq!(metadata_piece_count(0), 0);
        assert_eq!(metadata_piece_count(16384), 1);
        assert_eq!(metadata_piece_count(16385), 2);
    }
}
