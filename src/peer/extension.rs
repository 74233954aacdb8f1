use std::collections::BTreeMap;

use bytes::Bytes;

use super::error::ProtocolError;
use crate::bencode::{decode, encode, Value};

/// The extended handshake dictionary (BEP-10).
///
/// Exchanged as extension message id 0 once both sides advertise the
/// extension protocol. The `m` dictionary maps extension names to the ids
/// the sender expects them on.
#[derive(Debug, Clone, Default)]
pub struct ExtendedHandshake {
    /// Extension name → message id the sender listens on.
    pub extensions: BTreeMap<String, u8>,
    /// Client name and version.
    pub client: Option<String>,
    /// Maximum outstanding piece requests the sender accepts.
    pub reqq: Option<i64>,
    /// The sender's listen port.
    pub port: Option<u16>,
    /// Metadata size in bytes, for ut_metadata.
    pub metadata_size: Option<i64>,
}

impl ExtendedHandshake {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_extensions(extensions: &[(&str, u8)]) -> Self {
        let mut hs = Self::new();
        for (name, id) in extensions {
            hs.extensions.insert((*name).to_string(), *id);
        }
        hs
    }

    pub fn encode(&self) -> Bytes {
        let mut dict = BTreeMap::new();

        let mut m = BTreeMap::new();
        for (name, id) in &self.extensions {
            m.insert(
                Bytes::copy_from_slice(name.as_bytes()),
                Value::Integer(*id as i64),
            );
        }
        dict.insert(Bytes::from_static(b"m"), Value::Dict(m));

        if let Some(ref client) = self.client {
            dict.insert(Bytes::from_static(b"v"), Value::string(client));
        }
        if let Some(reqq) = self.reqq {
            dict.insert(Bytes::from_static(b"reqq"), Value::Integer(reqq));
        }
        if let Some(port) = self.port {
            dict.insert(Bytes::from_static(b"p"), Value::Integer(port as i64));
        }
        if let Some(size) = self.metadata_size {
            dict.insert(Bytes::from_static(b"metadata_size"), Value::Integer(size));
        }

        Bytes::from(encode(&Value::Dict(dict)))
    }

    pub fn decode(data: &[u8]) -> Result<Self, ProtocolError> {
        let value = decode(data)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| ProtocolError::Extension("expected dict".into()))?;

        let mut hs = Self::new();

        if let Some(m) = dict.get(b"m".as_slice()).and_then(|v| v.as_dict()) {
            for (key, val) in m {
                if let (Ok(name), Some(id)) = (std::str::from_utf8(key), val.as_integer()) {
                    // id 0 disables a previously advertised extension
                    if (1..=255).contains(&id) {
                        hs.extensions.insert(name.to_string(), id as u8);
                    }
                }
            }
        }

        hs.client = dict
            .get(b"v".as_slice())
            .and_then(|v| v.as_str())
            .map(String::from);

        hs.reqq = dict.get(b"reqq".as_slice()).and_then(|v| v.as_integer());

        hs.port = dict
            .get(b"p".as_slice())
            .and_then(|v| v.as_integer())
            .filter(|p| (1..=u16::MAX as i64).contains(p))
            .map(|p| p as u16);

        hs.metadata_size = dict
            .get(b"metadata_size".as_slice())
            .and_then(|v| v.as_integer());

        Ok(hs)
    }

    pub fn extension_id(&self, name: &str) -> Option<u8> {
        self.extensions.get(name).copied()
    }
}
