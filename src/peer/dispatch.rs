//! Incoming message validation and routing.
//!
//! `dispatch` applies one received message to a session: capability gating
//! first, then the per-message state transition. Any error is fatal for
//! the connection; the wrapper closes the session before returning it.

use tracing::{debug, trace};

use super::error::ProtocolError;
use super::extension::ExtendedHandshake;
use super::fast::allowed_fast_set;
use super::message::{Handshake, Message};
use super::metadata::{metadata_piece_bounds, MetadataKind, MetadataMessage};
use super::piece::{Block, BlockRequest};
use super::session::{SessionId, SessionState};
use super::bitfield::Bitfield;
use crate::constants::{
    DEFAULT_PEER_REQUEST_QUEUE, EXTENSION_HANDSHAKE_ID, LT_CHAT_ID, LT_CHAT_NAME,
    MAX_REQUEST_LENGTH, MIN_REQUEST_LENGTH, UT_METADATA_ID, UT_METADATA_NAME, UT_PEX_ID,
    UT_PEX_NAME,
};
use crate::peer::PeerId;
use crate::pex::PexMessage;
use crate::torrent::{CandidatePeer, PeerSource, TorrentContext, TorrentEvent};

impl TorrentContext {
    /// Verifies a peer's handshake and, on success, transitions the
    /// session to `Connected` and queues the connect bundle. Any mismatch
    /// closes the session.
    pub fn handle_handshake(
        &mut self,
        id: SessionId,
        handshake: &Handshake,
    ) -> Result<(), ProtocolError> {
        match self.verify_handshake(id, handshake) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.close_session(id, &err.to_string());
                Err(err)
            }
        }
    }

    /// Applies one received message to a session. `Err` means the session
    /// has been closed.
    pub fn dispatch(&mut self, id: SessionId, message: Message) -> Result<(), ProtocolError> {
        match self.dispatch_inner(id, message) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.close_session(id, &err.to_string());
                Err(err)
            }
        }
    }

    fn verify_handshake(
        &mut self,
        id: SessionId,
        handshake: &Handshake,
    ) -> Result<(), ProtocolError> {
        let now = self.clock.now();
        let info_hash = self.info_hash;
        let piece_count = self.piece_count;
        let fast_set_size = self.settings.allowed_fast_set_size;
        let metadata_known = self.metadata.is_some();
        let our_all_false = self.our_bitfield.all_false();
        let our_all_true = self.our_bitfield.all_true();
        let our_bits = self.our_bitfield.to_bytes();
        let extended_handshake = self.our_extended_handshake();

        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(ProtocolError::ConnectionClosed)?;
        if session.state != SessionState::Handshaking {
            return Err(ProtocolError::InvalidHandshake);
        }
        if handshake.info_hash != info_hash.0 {
            return Err(ProtocolError::InfoHashMismatch);
        }

        let advertised = PeerId(handshake.peer_id);
        match session.peer_id {
            // first contact with a compact peer: adopt the advertised id
            Some(known) if known != advertised => return Err(ProtocolError::PeerIdMismatch),
            _ => session.peer_id = Some(advertised),
        }

        session.supports_fast = handshake.supports_fast_extension();
        session.supports_extended = handshake.supports_extension_protocol();
        session.supports_dht = handshake.supports_dht();
        session.mark_received(now);

        if session.supports_fast && metadata_known {
            session.allowed_fast_to_peer = allowed_fast_set(
                info_hash.as_bytes(),
                session.addr.ip(),
                piece_count,
                fast_set_size,
            );
        }

        session.state = SessionState::Connected;
        debug!(
            torrent = %info_hash,
            session = id,
            fast = session.supports_fast,
            extended = session.supports_extended,
            "handshake complete"
        );

        // connect bundle: bitfield-class message, extended handshake,
        // then one AllowedFast per granted piece
        if session.supports_fast {
            if our_all_false {
                session.enqueue(Message::HaveNone);
            } else if our_all_true {
                session.enqueue(Message::HaveAll);
            } else {
                session.enqueue(Message::Bitfield(our_bits));
            }
        } else {
            session.enqueue(Message::Bitfield(our_bits));
        }
        if session.supports_extended {
            session.enqueue(Message::Extended {
                id: EXTENSION_HANDSHAKE_ID,
                payload: extended_handshake.encode(),
            });
        }
        let granted: Vec<u32> = session.allowed_fast_to_peer.clone();
        for piece in granted {
            session.enqueue(Message::AllowedFast { piece });
        }

        let direction = session.direction;
        self.observers.emit(&TorrentEvent::PeerConnected {
            session: id,
            direction,
        });
        Ok(())
    }

    fn dispatch_inner(&mut self, id: SessionId, message: Message) -> Result<(), ProtocolError> {
        let now = self.clock.now();
        {
            let session = self
                .sessions
                .get_mut(&id)
                .ok_or(ProtocolError::ConnectionClosed)?;
            if session.state != SessionState::Connected {
                return Err(ProtocolError::ExpectedHandshake);
            }
            if message.is_fast_extension() && !session.supports_fast {
                return Err(ProtocolError::CapabilityViolation(
                    "fast extension not negotiated",
                ));
            }
            if matches!(message, Message::Extended { .. }) && !session.supports_extended {
                return Err(ProtocolError::CapabilityViolation(
                    "extension protocol not negotiated",
                ));
            }
            session.mark_received(now);
        }

        match message {
            Message::KeepAlive => {}

            Message::Have { piece } => {
                if piece >= self.piece_count {
                    return Err(ProtocolError::PieceOutOfRange(piece));
                }
                let we_lack = !self.our_bitfield.has(piece);
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.bitfield.set(piece);
                session.have_messages_received += 1;
                if session.bitfield.all_true() {
                    session.is_seeder = true;
                }
                if we_lack && !session.choke.am_interested {
                    session.choke.am_interested = true;
                    session.enqueue(Message::Interested);
                }
            }

            Message::HaveAll => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.bitfield.set_all();
                session.is_seeder = true;
                self.refresh_interest(id);
            }

            Message::HaveNone => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.bitfield.clear_all();
                session.is_seeder = false;
                if session.choke.am_interested {
                    session.choke.am_interested = false;
                    session.enqueue(Message::NotInterested);
                }
            }

            Message::Bitfield(bits) => {
                let Some(bitfield) = Bitfield::from_bytes(&bits, self.piece_count as usize) else {
                    return Err(ProtocolError::InvalidMessage("bad bitfield".into()));
                };
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.is_seeder = bitfield.all_true();
                session.bitfield = bitfield;
                self.refresh_interest(id);
            }

            Message::Request {
                index,
                begin,
                length,
            } => {
                if !(MIN_REQUEST_LENGTH..=MAX_REQUEST_LENGTH).contains(&length) {
                    return Err(ProtocolError::BadRequestLength(length));
                }
                if index >= self.piece_count {
                    return Err(ProtocolError::PieceOutOfRange(index));
                }
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                let serve = !session.choke.am_choking
                    || (session.supports_fast && session.allowed_fast_to_peer.contains(&index));
                if serve {
                    session.queue_read(BlockRequest::new(index, begin, length));
                } else {
                    session.enqueue(Message::Reject {
                        index,
                        begin,
                        length,
                    });
                }
            }

            Message::Piece { index, begin, data } => {
                let bytes = data.len() as u64;
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.pieces_received += 1;
                session.requests_in_flight = session.requests_in_flight.saturating_sub(1);
                session.monitor.record_download(bytes);
                self.monitor.record_download(bytes);
                self.picker.piece_received(id, Block::new(index, begin, data));
                self.request_more(id);
            }

            Message::Cancel {
                index,
                begin,
                length,
            } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                if !session.cancel(index, begin, length) {
                    trace!(session = id, index, "cancel matched nothing");
                }
            }

            Message::Choke => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.choke.peer_choking = true;
                let fast = session.supports_fast;
                if !fast {
                    // without the fast extension a choke implicitly
                    // discards everything we had in flight
                    session.requests_in_flight = 0;
                    self.picker.cancel_all(id);
                }
            }

            Message::Unchoke => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.choke.peer_choking = false;
                self.request_more(id);
            }

            Message::Interested => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.choke.peer_interested = true;
            }

            Message::NotInterested => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.choke.peer_interested = false;
            }

            Message::Port(port) => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.dht_port = Some(port);
                trace!(session = id, port, "peer advertised dht port");
            }

            Message::AllowedFast { piece } => {
                if piece >= self.piece_count {
                    trace!(session = id, piece, "allowed fast out of range");
                    return Ok(());
                }
                let we_lack = !self.our_bitfield.has(piece);
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                if we_lack {
                    session.allowed_fast_from_peer.insert(piece);
                }
            }

            Message::Suggest { piece } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                if !session.suggested_pieces.contains(&piece) {
                    session.suggested_pieces.push(piece);
                }
            }

            Message::Reject {
                index,
                begin,
                length,
            } => {
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                session.requests_in_flight = session.requests_in_flight.saturating_sub(1);
                self.picker.cancel_request(id, index, begin, length);
            }

            Message::Extended { id: ext_id, payload } => match ext_id {
                EXTENSION_HANDSHAKE_ID => self.handle_extended_handshake(id, &payload)?,
                UT_PEX_ID => self.handle_pex(id, &payload)?,
                UT_METADATA_ID => self.handle_metadata(id, &payload)?,
                LT_CHAT_ID => trace!(session = id, "ignoring {} message", LT_CHAT_NAME),
                other => {
                    if let Some(handler) = self.extension_handlers.get_mut(&other) {
                        handler.on_message(id, &payload);
                    } else {
                        trace!(session = id, ext = other, "dropping unknown extension message");
                    }
                }
            },
        }

        Ok(())
    }

    fn handle_extended_handshake(
        &mut self,
        id: SessionId,
        payload: &[u8],
    ) -> Result<(), ProtocolError> {
        let handshake = ExtendedHandshake::decode(payload)?;
        let private = self.private;
        let pex_enabled = self.settings.enable_peer_exchange;
        let metadata_known = self.metadata.is_some();

        let Some(session) = self.sessions.get_mut(&id) else {
            return Ok(());
        };
        session.peer_extensions = handshake.extensions;
        if let Some(reqq) = handshake.reqq {
            session.peer_request_queue = reqq.max(1) as usize;
        }
        if let Some(port) = handshake.port {
            session.peer_listen_port = Some(port);
        }

        let peer_has_pex = session.peer_extensions.contains_key(UT_PEX_NAME);
        session.pex_enabled = peer_has_pex && !private && pex_enabled && metadata_known;
        trace!(
            session = id,
            client = handshake.client.as_deref().unwrap_or("?"),
            pex = session.pex_enabled,
            "extended handshake"
        );
        Ok(())
    }

    fn handle_pex(&mut self, id: SessionId, payload: &[u8]) -> Result<(), ProtocolError> {
        if self.private || !self.settings.enable_peer_exchange {
            trace!(session = id, "ignoring pex message");
            return Ok(());
        }
        let message = PexMessage::from_bencode(payload)?;
        let offered = message.added.len();
        let room = self.pool_room();

        let mut added = 0;
        for (addr, flags) in message.added.into_iter().take(room) {
            let known = self.candidates.iter().any(|c| c.addr == addr)
                || self.sessions.values().any(|s| s.addr == addr);
            if known {
                continue;
            }
            self.candidates.push(CandidatePeer {
                addr,
                source: PeerSource::PeerExchange,
                flags,
            });
            added += 1;
        }

        debug!(session = id, added, offered, "pex peers");
        self.observers.emit(&TorrentEvent::PeersFound {
            added,
            offered,
            source: PeerSource::PeerExchange,
        });
        Ok(())
    }

    fn handle_metadata(&mut self, id: SessionId, payload: &[u8]) -> Result<(), ProtocolError> {
        let message = MetadataMessage::decode(payload)?;
        match message.kind {
            MetadataKind::Request => {
                let response = match &self.metadata {
                    Some(bytes) => match metadata_piece_bounds(message.piece, bytes.len()) {
                        Some((start, end)) => MetadataMessage::data(
                            message.piece,
                            bytes.len() as u32,
                            bytes.slice(start..end),
                        ),
                        None => MetadataMessage::reject(message.piece),
                    },
                    None => MetadataMessage::reject(message.piece),
                };
                let Some(session) = self.sessions.get_mut(&id) else {
                    return Ok(());
                };
                // reply on the id the peer allocated for ut_metadata
                let Some(peer_id) = session.peer_extensions.get(UT_METADATA_NAME).copied() else {
                    return Ok(());
                };
                session.enqueue(Message::Extended {
                    id: peer_id,
                    payload: response.encode(),
                });
            }
            MetadataKind::Data | MetadataKind::Reject => {
                // metadata fetching is driven above this layer
                trace!(session = id, piece = message.piece, "metadata response ignored");
            }
        }
        Ok(())
    }

    /// The extended handshake we present to peers.
    fn our_extended_handshake(&self) -> ExtendedHandshake {
        let mut extensions = vec![(LT_CHAT_NAME, LT_CHAT_ID)];
        if self.settings.enable_peer_exchange && !self.private {
            extensions.push((UT_PEX_NAME, UT_PEX_ID));
        }
        if self.metadata.is_some() {
            extensions.push((UT_METADATA_NAME, UT_METADATA_ID));
        }
        let mut handshake = ExtendedHandshake::with_extensions(&extensions);
        handshake.client = Some(format!("rswarm/{}", env!("CARGO_PKG_VERSION")));
        handshake.reqq = Some(DEFAULT_PEER_REQUEST_QUEUE as i64);
        if self.listen_port != 0 {
            handshake.port = Some(self.listen_port);
        }
        handshake.metadata_size = self.metadata.as_ref().map(|m| m.len() as i64);
        handshake
    }
}
