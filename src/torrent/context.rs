use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::events::{EventObservers, PeerSource, TorrentEvent};
use super::limiter::RateLimiter;
use super::traits::{
    Clock, ExtensionHandler, Monitor, Picker, ReciprocityController, TrackerManager, Transport,
};
use crate::config::Settings;
use crate::peer::{
    Bitfield, Direction, PeerId, PeerSession, SessionId, SessionState,
};
use crate::pex::PexFlags;

/// SHA-1 of the bencoded info dictionary; the torrent's identity.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash(pub [u8; 20]);

impl InfoHash {
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InfoHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Which phase the torrent is in; drives the tick loop's state logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentState {
    Downloading,
    Seeding,
}

/// A peer we know about but have not connected to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidatePeer {
    pub addr: SocketAddr,
    pub source: PeerSource,
    pub flags: PexFlags,
}

/// The external subsystems a torrent context drives.
pub struct Collaborators {
    pub picker: Box<dyn Picker + Send>,
    pub reciprocity: Box<dyn ReciprocityController + Send>,
    pub tracker: Box<dyn TrackerManager + Send>,
    pub monitor: Box<dyn Monitor + Send>,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

/// Per-torrent state: the session set, the shared bitfield view, settings,
/// and the collaborator subsystems.
///
/// Owned by the [`Engine`](crate::engine::Engine) arena; sessions refer to
/// it by info-hash only. All mutation happens on the torrent's single
/// logical task, except [`record_finished_piece`](Self::record_finished_piece)
/// which is the verifier's producer side of the finished-pieces queue.
pub struct TorrentContext {
    pub info_hash: InfoHash,
    pub piece_count: u32,
    pub private: bool,
    pub state: TorrentState,
    pub settings: Settings,
    pub our_peer_id: PeerId,
    /// Port we accept peer connections on, advertised via BEP-10.
    pub listen_port: u16,

    /// Pieces we have verified. Bits only ever turn on.
    pub our_bitfield: Bitfield,
    /// The raw info dictionary, once known. Gates ut_metadata serving and
    /// allowed-fast computation.
    pub metadata: Option<Bytes>,
    pub webseeds: Vec<String>,
    /// URLs handed to the host's webseed connector by the one-shot attach.
    pub attached_webseeds: Vec<String>,

    finished_pieces: Mutex<Vec<u32>>,

    pub(crate) sessions: HashMap<SessionId, PeerSession>,
    next_session_id: SessionId,
    pub candidates: Vec<CandidatePeer>,

    pub picker: Box<dyn Picker + Send>,
    pub reciprocity: Box<dyn ReciprocityController + Send>,
    pub tracker: Box<dyn TrackerManager + Send>,
    pub monitor: Box<dyn Monitor + Send>,
    pub clock: Arc<dyn Clock + Send + Sync>,

    pub(crate) observers: EventObservers,
    pub(crate) extension_handlers: HashMap<u8, Box<dyn ExtensionHandler + Send>>,

    pub(crate) download_limiter: RateLimiter,
    pub(crate) upload_limiter: RateLimiter,

    pub(crate) poisoned: bool,
    pub(crate) started_at: Instant,
    pub(crate) last_review: Option<Instant>,
    pub(crate) webseeds_attached: bool,
}

impl TorrentContext {
    pub fn new(
        info_hash: InfoHash,
        piece_count: u32,
        private: bool,
        settings: Settings,
        collaborators: Collaborators,
    ) -> Self {
        let now = collaborators.clock.now();
        let download_limiter = RateLimiter::new(settings.download_rate_limit);
        let upload_limiter = RateLimiter::new(settings.upload_rate_limit);
        Self {
            info_hash,
            piece_count,
            private,
            state: TorrentState::Downloading,
            our_peer_id: PeerId::generate(),
            listen_port: 0,
            our_bitfield: Bitfield::new(piece_count as usize),
            metadata: None,
            webseeds: Vec::new(),
            attached_webseeds: Vec::new(),
            finished_pieces: Mutex::new(Vec::new()),
            sessions: HashMap::new(),
            next_session_id: 1,
            candidates: Vec::new(),
            picker: collaborators.picker,
            reciprocity: collaborators.reciprocity,
            tracker: collaborators.tracker,
            monitor: collaborators.monitor,
            clock: collaborators.clock,
            observers: EventObservers::new(),
            extension_handlers: HashMap::new(),
            download_limiter,
            upload_limiter,
            poisoned: false,
            started_at: now,
            last_review: None,
            webseeds_attached: false,
            settings,
        }
    }

    /// Registers a session for a connection whose TCP/µTP handshake
    /// completed. Returns `None` when the torrent is poisoned or the
    /// connection pool is full.
    pub fn add_session(
        &mut self,
        addr: SocketAddr,
        direction: Direction,
        transport: Box<dyn Transport + Send>,
    ) -> Option<SessionId> {
        if self.poisoned {
            warn!(torrent = %self.info_hash, "refusing connection: torrent poisoned");
            return None;
        }
        if self.sessions.len() >= self.settings.max_connections {
            debug!(torrent = %self.info_hash, %addr, "refusing connection: pool full");
            return None;
        }

        let id = self.next_session_id;
        self.next_session_id += 1;
        let session = PeerSession::new(
            id,
            self.info_hash,
            addr,
            direction,
            self.piece_count,
            transport,
            self.clock.now(),
        );
        self.sessions.insert(id, session);
        Some(id)
    }

    /// Tears a session down: the outbound queue is dropped, outstanding
    /// picker requests are cancelled, the transport closes, and
    /// `peer_disconnected` is emitted.
    pub fn close_session(&mut self, id: SessionId, reason: &str) {
        let Some(mut session) = self.sessions.remove(&id) else {
            return;
        };
        debug!(torrent = %self.info_hash, session = id, reason, "closing session");
        session.clear_outbound();
        self.picker.cancel_all(id);
        session.transport.close(reason);
        session.state = SessionState::Closed;
        self.observers
            .emit(&TorrentEvent::PeerDisconnected { session: id });
    }

    /// Marks the torrent unusable after a broken invariant. New
    /// connections are refused and the host is told to shut the torrent
    /// down; we never silently continue.
    pub fn poison(&mut self, detail: &str) {
        if self.poisoned {
            return;
        }
        warn!(torrent = %self.info_hash, detail, "invariant violation: poisoning torrent");
        self.poisoned = true;
        self.observers.emit(&TorrentEvent::Poisoned);
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Verifier-side producer: records a piece that passed its hash check.
    /// The tick loop broadcasts `Have` for it on its next pass.
    pub fn record_finished_piece(&mut self, piece: u32) {
        if piece >= self.piece_count {
            self.poison("finished piece index out of range");
            return;
        }
        self.our_bitfield.set(piece);
        self.finished_pieces.lock().push(piece);
    }

    /// Tick-side consumer: snapshots and clears the finished set.
    pub(crate) fn take_finished_pieces(&mut self) -> Vec<u32> {
        std::mem::take(&mut *self.finished_pieces.lock())
    }

    pub fn subscribe(&mut self, observer: Box<dyn FnMut(&TorrentEvent) + Send>) {
        self.observers.subscribe(observer);
    }

    /// Routes extension messages with this local id to `handler` instead
    /// of dropping them.
    pub fn register_extension_handler(
        &mut self,
        id: u8,
        handler: Box<dyn ExtensionHandler + Send>,
    ) {
        self.extension_handlers.insert(id, handler);
    }

    pub fn session(&self, id: SessionId) -> Option<&PeerSession> {
        self.sessions.get(&id)
    }

    pub fn session_mut(&mut self, id: SessionId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(&id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &PeerSession> {
        self.sessions.values()
    }

    /// Room left in the peer pool, counting both live sessions and
    /// connect candidates.
    pub(crate) fn pool_room(&self) -> usize {
        self.settings
            .max_connections
            .saturating_sub(self.sessions.len() + self.candidates.len())
    }

    /// Flips `am_interested` to match the picker's verdict, queuing the
    /// matching declaration on transitions.
    pub(crate) fn refresh_interest(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let interesting = self.picker.is_interesting(session);
        if interesting && !session.choke.am_interested {
            session.choke.am_interested = true;
            session.enqueue(crate::peer::Message::Interested);
        } else if !interesting && session.choke.am_interested {
            session.choke.am_interested = false;
            session.enqueue(crate::peer::Message::NotInterested);
        }
    }

    /// Tops the request pipeline up to the session's depth budget.
    pub(crate) fn request_more(&mut self, id: SessionId) {
        let Some(session) = self.sessions.get_mut(&id) else {
            return;
        };
        let budget = session
            .max_pending_requests
            .saturating_sub(session.requests_in_flight);
        if budget == 0 {
            return;
        }
        let requests = self.picker.pick_requests(session, budget);
        for request in requests {
            session.requests_in_flight += 1;
            session.enqueue(crate::peer::Message::Request {
                index: request.piece_index,
                begin: request.offset,
                length: request.length,
            });
        }
    }
}
