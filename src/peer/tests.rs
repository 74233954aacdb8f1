use super::*;
use bytes::Bytes;

#[test]
fn test_peer_id_generate() {
    let id1 = PeerId::generate();
    let id2 = PeerId::generate();
    assert_ne!(id1.0, id2.0);
    assert!(id1.client_id().is_some());
}

#[test]
fn test_bitfield_set_and_count() {
    let mut bf = Bitfield::new(100);
    assert!(!bf.has(0));
    assert!(bf.all_false());

    bf.set(0);
    bf.set(99);
    assert!(bf.has(0));
    assert!(bf.has(99));
    assert_eq!(bf.count(), 2);
    assert!(!bf.all_true());
    assert!(!bf.all_false());
}

#[test]
fn test_bitfield_all_transitions() {
    let mut bf = Bitfield::new(13);
    bf.set_all();
    assert!(bf.all_true());
    assert_eq!(bf.count(), 13);
    // spare bits of the final byte stay clear
    assert_eq!(bf.to_bytes()[1] & 0b0000_0111, 0);

    bf.clear_all();
    assert!(bf.all_false());
}

#[test]
fn test_bitfield_from_bytes_validates() {
    assert!(Bitfield::from_bytes(&[0x80, 0x00], 16).is_some());
    // wrong byte count
    assert!(Bitfield::from_bytes(&[0x80], 16).is_none());
    // spare bit set
    assert!(Bitfield::from_bytes(&[0xFF, 0x01], 12).is_none());

    let bf = Bitfield::from_bytes(&[0x80, 0x01], 16).unwrap();
    assert!(bf.has(0));
    assert!(!bf.has(1));
    assert!(bf.has(15));
}

#[test]
fn test_handshake_encode_decode() {
    let info_hash = [1u8; 20];
    let peer_id = [2u8; 20];

    let handshake = Handshake::new(info_hash, peer_id);
    let encoded = handshake.encode();
    assert_eq!(encoded.len(), HANDSHAKE_LEN);

    let decoded = Handshake::decode(&encoded).unwrap();
    assert_eq!(decoded.info_hash, info_hash);
    assert_eq!(decoded.peer_id, peer_id);
    assert!(decoded.supports_extension_protocol());
    assert!(decoded.supports_fast_extension());
    assert!(decoded.supports_dht());
}

#[test]
fn test_handshake_rejects_wrong_protocol() {
    let mut bytes = Handshake::new([0u8; 20], [0u8; 20]).encode().to_vec();
    bytes[5] ^= 0xFF;
    assert!(matches!(
        Handshake::decode(&bytes),
        Err(ProtocolError::InvalidHandshake)
    ));
}

#[test]
fn test_message_encode_decode_all_variants() {
    let messages = vec![
        Message::KeepAlive,
        Message::Choke,
        Message::Unchoke,
        Message::Interested,
        Message::NotInterested,
        Message::Have { piece: 42 },
        Message::Bitfield(Bytes::from_static(&[0xA5, 0x0F])),
        Message::Request {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Piece {
            index: 3,
            begin: 0,
            data: Bytes::from_static(b"block data"),
        },
        Message::Cancel {
            index: 1,
            begin: 16384,
            length: 16384,
        },
        Message::Port(6881),
        Message::Suggest { piece: 9 },
        Message::HaveAll,
        Message::HaveNone,
        Message::Reject {
            index: 7,
            begin: 0,
            length: 32768,
        },
        Message::AllowedFast { piece: 17 },
        Message::Extended {
            id: 2,
            payload: Bytes::from_static(b"d1:xi1ee"),
        },
    ];

    for message in messages {
        let encoded = message.encode();
        let decoded = Message::decode(encoded).unwrap();
        assert_eq!(decoded, message);
    }
}

#[test]
fn test_message_unknown_id_is_error() {
    // length 1, id 11 (unassigned)
    let raw = Bytes::from_static(&[0, 0, 0, 1, 11]);
    assert!(matches!(
        Message::decode(raw),
        Err(ProtocolError::UnknownMessageId(11))
    ));
}

#[test]
fn test_message_truncated_is_error() {
    let raw = Bytes::from_static(&[0, 0, 0, 5, 4, 0, 0]);
    assert!(Message::decode(raw).is_err());
}

#[test]
fn test_extended_handshake_roundtrip() {
    let mut hs = ExtendedHandshake::new();
    hs.extensions.insert("ut_pex".to_string(), 1);
    hs.extensions.insert("ut_metadata".to_string(), 2);
    hs.client = Some("rswarm/0.1.0".to_string());
    hs.reqq = Some(250);
    hs.port = Some(6881);

    let decoded = ExtendedHandshake::decode(&hs.encode()).unwrap();
    assert_eq!(decoded.extension_id("ut_pex"), Some(1));
    assert_eq!(decoded.extension_id("ut_metadata"), Some(2));
    assert_eq!(decoded.client, Some("rswarm/0.1.0".to_string()));
    assert_eq!(decoded.reqq, Some(250));
    assert_eq!(decoded.port, Some(6881));
}

#[test]
fn test_extended_handshake_drops_disabled_extensions() {
    // m entries with id 0 mean "disabled"
    let payload = b"d1:md6:ut_pexi0e11:ut_metadatai3eee";
    let decoded = ExtendedHandshake::decode(payload).unwrap();
    assert_eq!(decoded.extension_id("ut_pex"), None);
    assert_eq!(decoded.extension_id("ut_metadata"), Some(3));
}

mod session {
    use super::*;
    use crate::torrent::{InfoHash, Transport};
    use std::time::Instant;

    struct NullTransport;

    impl Transport for NullTransport {
        fn send_in_flight(&self) -> bool {
            false
        }
        fn process_queue(&mut self) {}
        fn close(&mut self, _reason: &str) {}
    }

    fn session(piece_count: u32) -> PeerSession {
        PeerSession::new(
            1,
            InfoHash([0xAB; 20]),
            "127.0.0.1:6881".parse().unwrap(),
            Direction::Outgoing,
            piece_count,
            Box::new(NullTransport),
            Instant::now(),
        )
    }

    #[test]
    fn test_initial_flags() {
        let s = session(10);
        assert!(s.choke.am_choking);
        assert!(!s.choke.am_interested);
        assert!(s.choke.peer_choking);
        assert!(!s.choke.peer_interested);
        assert_eq!(s.state, SessionState::Handshaking);
        assert!(s.bitfield.all_false());
    }

    #[test]
    fn test_outbound_queue_is_fifo() {
        let mut s = session(10);
        s.enqueue(Message::Interested);
        s.enqueue(Message::Have { piece: 1 });
        s.enqueue(Message::KeepAlive);

        assert_eq!(s.next_outbound(), Some(Message::Interested));
        assert_eq!(s.next_outbound(), Some(Message::Have { piece: 1 }));
        assert_eq!(s.next_outbound(), Some(Message::KeepAlive));
        assert_eq!(s.next_outbound(), None);
    }

    #[test]
    fn test_cancel_removes_queued_piece_and_restores_count() {
        let mut s = session(10);
        let before = s.peer_request_count;

        s.enqueue_piece(2, 0, Bytes::from_static(&[0u8; 100]));
        assert_eq!(s.peer_request_count, before + 1);

        assert!(s.cancel(2, 0, 100));
        assert_eq!(s.peer_request_count, before);
        assert!(!s
            .queued()
            .any(|m| matches!(m, Message::Piece { index: 2, .. })));
    }

    #[test]
    fn test_cancel_removes_at_most_one() {
        let mut s = session(10);
        s.enqueue_piece(2, 0, Bytes::from_static(&[0u8; 100]));
        s.enqueue_piece(2, 0, Bytes::from_static(&[0u8; 100]));
        assert_eq!(s.peer_request_count, 2);

        assert!(s.cancel(2, 0, 100));
        assert_eq!(s.peer_request_count, 1);
        assert_eq!(
            s.queued()
                .filter(|m| matches!(m, Message::Piece { .. }))
                .count(),
            1
        );
    }

    #[test]
    fn test_cancel_falls_back_to_pending_read() {
        let mut s = session(10);
        s.queue_read(BlockRequest::new(4, 16384, 16384));
        assert_eq!(s.peer_request_count, 1);
        assert_eq!(s.pending_reads().len(), 1);

        assert!(s.cancel(4, 16384, 16384));
        assert_eq!(s.peer_request_count, 0);
        assert!(s.pending_reads().is_empty());
    }

    #[test]
    fn test_cancel_without_match() {
        let mut s = session(10);
        s.enqueue(Message::Have { piece: 1 });
        assert!(!s.cancel(1, 0, 100));
        assert_eq!(s.queue_len(), 1);
    }

    #[test]
    fn test_serving_piece_settles_request() {
        let mut s = session(10);
        s.enqueue_piece(1, 0, Bytes::from_static(&[0u8; 8]));
        assert_eq!(s.peer_request_count, 1);
        let _ = s.next_outbound();
        assert_eq!(s.peer_request_count, 0);
    }

    #[test]
    fn test_take_pending_read_transfers_obligation() {
        let mut s = session(10);
        s.queue_read(BlockRequest::new(0, 0, 16384));
        let read = s.take_pending_read().unwrap();
        assert_eq!(read, BlockRequest::new(0, 0, 16384));
        assert_eq!(s.peer_request_count, 0);

        // the disk completion re-enters through enqueue_piece
        s.enqueue_piece(read.piece_index, read.offset, Bytes::from_static(&[0u8; 16384]));
        assert_eq!(s.peer_request_count, 1);
    }
}
