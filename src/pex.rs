//! Peer Exchange (BEP-11).
//!
//! Connected peers gossip known peers over the extension protocol. The
//! message is a bencoded dictionary with compact peer lists: `added` /
//! `added.f` / `dropped` for IPv4 and the `6`-suffixed variants for IPv6.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use bytes::{BufMut, Bytes, BytesMut};

use crate::bencode::{decode, encode, Value};
use crate::peer::ProtocolError;

/// Capability flags gossiped alongside each added peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PexFlags {
    pub encryption: bool,
    pub seed: bool,
    pub utp: bool,
    pub holepunch: bool,
    pub connectable: bool,
}

impl PexFlags {
    pub fn from_byte(b: u8) -> Self {
        Self {
            encryption: (b & 0x01) != 0,
            seed: (b & 0x02) != 0,
            utp: (b & 0x04) != 0,
            holepunch: (b & 0x08) != 0,
            connectable: (b & 0x10) != 0,
        }
    }

    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.encryption {
            b |= 0x01;
        }
        if self.seed {
            b |= 0x02;
        }
        if self.utp {
            b |= 0x04;
        }
        if self.holepunch {
            b |= 0x08;
        }
        if self.connectable {
            b |= 0x10;
        }
        b
    }
}

/// One ut_pex payload: peers that appeared and peers that went away.
#[derive(Debug, Clone, Default)]
pub struct PexMessage {
    pub added: Vec<(SocketAddr, PexFlags)>,
    pub dropped: Vec<SocketAddr>,
}

impl PexMessage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, addr: SocketAddr, flags: PexFlags) {
        self.added.push((addr, flags));
    }

    pub fn drop_peer(&mut self, addr: SocketAddr) {
        self.dropped.push(addr);
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.dropped.is_empty()
    }

    /// Encodes the bencoded ut_pex dictionary.
    pub fn to_bencode(&self) -> Bytes {
        let mut dict = BTreeMap::new();

        let (v4, v6): (Vec<_>, Vec<_>) = self.added.iter().partition(|(a, _)| a.is_ipv4());

        let mut added = BytesMut::with_capacity(v4.len() * 6);
        let mut added_f = BytesMut::with_capacity(v4.len());
        for (addr, flags) in &v4 {
            if let SocketAddr::V4(a) = addr {
                added.put_slice(&a.ip().octets());
                added.put_u16(a.port());
                added_f.put_u8(flags.to_byte());
            }
        }
        dict.insert(Bytes::from_static(b"added"), Value::Bytes(added.freeze()));
        dict.insert(
            Bytes::from_static(b"added.f"),
            Value::Bytes(added_f.freeze()),
        );

        let mut added6 = BytesMut::with_capacity(v6.len() * 18);
        let mut added6_f = BytesMut::with_capacity(v6.len());
        for (addr, flags) in &v6 {
            if let SocketAddr::V6(a) = addr {
                added6.put_slice(&a.ip().octets());
                added6.put_u16(a.port());
                added6_f.put_u8(flags.to_byte());
            }
        }
        dict.insert(Bytes::from_static(b"added6"), Value::Bytes(added6.freeze()));
        dict.insert(
            Bytes::from_static(b"added6.f"),
            Value::Bytes(added6_f.freeze()),
        );

        let mut dropped = BytesMut::new();
        let mut dropped6 = BytesMut::new();
        for addr in &self.dropped {
            match addr {
                SocketAddr::V4(a) => {
                    dropped.put_slice(&a.ip().octets());
                    dropped.put_u16(a.port());
                }
                SocketAddr::V6(a) => {
                    dropped6.put_slice(&a.ip().octets());
                    dropped6.put_u16(a.port());
                }
            }
        }
        dict.insert(
            Bytes::from_static(b"dropped"),
            Value::Bytes(dropped.freeze()),
        );
        dict.insert(
            Bytes::from_static(b"dropped6"),
            Value::Bytes(dropped6.freeze()),
        );

        Bytes::from(encode(&Value::Dict(dict)))
    }

    /// Decodes a ut_pex payload. Unknown keys are ignored; truncated
    /// compact entries are dropped.
    pub fn from_bencode(payload: &[u8]) -> Result<Self, ProtocolError> {
        fn field<'a>(dict: &'a BTreeMap<Bytes, Value>, key: &[u8]) -> &'a [u8] {
            dict.get(key)
                .and_then(Value::as_bytes)
                .map(|b| b.as_ref())
                .unwrap_or(&[])
        }

        let value = decode(payload)?;
        let dict = value
            .as_dict()
            .ok_or_else(|| ProtocolError::Extension("pex: expected dict".into()))?;

        let mut msg = Self::new();
        msg.added = decode_compact_v4(field(dict, b"added"), field(dict, b"added.f"));
        msg.added.extend(decode_compact_v6(
            field(dict, b"added6"),
            field(dict, b"added6.f"),
        ));
        msg.dropped = decode_compact_v4(field(dict, b"dropped"), &[])
            .into_iter()
            .map(|(a, _)| a)
            .collect();
        msg.dropped.extend(
            decode_compact_v6(field(dict, b"dropped6"), &[])
                .into_iter()
                .map(|(a, _)| a),
        );

        Ok(msg)
    }
}

fn decode_compact_v4(data: &[u8], flags: &[u8]) -> Vec<(SocketAddr, PexFlags)> {
    data.chunks_exact(6)
        .enumerate()
        .map(|(i, chunk)| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            let f = flags.get(i).copied().map(PexFlags::from_byte).unwrap_or_default();
            (SocketAddr::V4(SocketAddrV4::new(ip, port)), f)
        })
        .collect()
}

fn decode_compact_v6(data: &[u8], flags: &[u8]) -> Vec<(SocketAddr, PexFlags)> {
    data.chunks_exact(18)
        .enumerate()
        .map(|(i, chunk)| {
            let mut ip = [0u8; 16];
            ip.copy_from_slice(&chunk[..16]);
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            let f = flags.get(i).copied().map(PexFlags::from_byte).unwrap_or_default();
            (
                SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(ip), port, 0, 0)),
                f,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_roundtrip() {
        let flags = PexFlags {
            encryption: true,
            utp: true,
            connectable: true,
            ..Default::default()
        };
        assert_eq!(PexFlags::from_byte(flags.to_byte()), flags);
    }

    #[test]
    fn test_pex_roundtrip_v4() {
        let mut msg = PexMessage::new();
        msg.add(
            "192.168.1.1:6881".parse().unwrap(),
            PexFlags {
                seed: true,
                ..Default::default()
            },
        );
        msg.add("10.0.0.1:51413".parse().unwrap(), PexFlags::default());
        msg.drop_peer("172.16.0.1:6881".parse().unwrap());

        let decoded = PexMessage::from_bencode(&msg.to_bencode()).unwrap();
        assert_eq!(decoded.added.len(), 2);
        assert_eq!(decoded.added[0].0, msg.added[0].0);
        assert!(decoded.added[0].1.seed);
        assert_eq!(decoded.dropped, msg.dropped);
    }

    #[test]
    fn test_pex_roundtrip_v6() {
        let mut msg = PexMessage::new();
        msg.add("[2001:db8::1]:6881".parse().unwrap(), PexFlags::default());

        let decoded = PexMessage::from_bencode(&msg.to_bencode()).unwrap();
        assert_eq!(decoded.added.len(), 1);
        assert_eq!(decoded.added[0].0, msg.added[0].0);
    }

    #[test]
    fn test_pex_truncated_entries_dropped() {
        // 7 bytes: one full v4 entry plus a stray byte
        let mut dict = BTreeMap::new();
        dict.insert(
            Bytes::from_static(b"added"),
            Value::Bytes(Bytes::from_static(&[1, 2, 3, 4, 0x1A, 0xE1, 9])),
        );
        let payload = encode(&Value::Dict(dict));

        let decoded = PexMessage::from_bencode(&payload).unwrap();
        assert_eq!(decoded.added.len(), 1);
        assert_eq!(decoded.added[0].0, "1.2.3.4:6881".parse::<SocketAddr>().unwrap());
    }
}
