use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::time::Instant;

use bytes::Bytes;

use super::bitfield::Bitfield;
use super::message::Message;
use super::peer_id::PeerId;
use super::piece::BlockRequest;
use crate::constants::DEFAULT_PEER_REQUEST_QUEUE;
use crate::torrent::{InfoHash, Monitor, SpeedMonitor, Transport};

/// Identifies one peer session within its torrent.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, waiting for the 68-byte handshake.
    Handshaking,
    /// Handshake verified; typed messages flow.
    Connected,
    Closed,
}

/// The four reciprocity flags, at their protocol-mandated initial values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChokeState {
    pub am_choking: bool,
    pub am_interested: bool,
    pub peer_choking: bool,
    pub peer_interested: bool,
}

impl Default for ChokeState {
    fn default() -> Self {
        Self {
            am_choking: true,
            am_interested: false,
            peer_choking: true,
            peer_interested: false,
        }
    }
}

/// Per-connection peer state.
///
/// A passive record: the dispatcher and the tick loop are the only writers,
/// both running on the torrent's single logical task. The session holds its
/// torrent's key rather than a reference, so there is no ownership cycle.
pub struct PeerSession {
    pub id: SessionId,
    pub torrent: InfoHash,
    pub addr: SocketAddr,
    pub direction: Direction,
    pub state: SessionState,
    pub peer_id: Option<PeerId>,

    // negotiated capabilities
    pub supports_fast: bool,
    pub supports_extended: bool,
    pub supports_dht: bool,

    /// What the peer has. Starts all-false; replaced wholesale by
    /// `Bitfield` / `HaveAll` / `HaveNone`.
    pub bitfield: Bitfield,
    pub choke: ChokeState,
    pub is_seeder: bool,

    /// Pieces the peer lets us request while it chokes us.
    pub allowed_fast_from_peer: HashSet<u32>,
    /// Pieces we let the peer request while we choke it.
    pub allowed_fast_to_peer: Vec<u32>,
    pub suggested_pieces: Vec<u32>,

    outbound: VecDeque<Message>,
    pending_reads: Vec<BlockRequest>,

    /// Blocks the peer has asked us for and we still owe (queued reads
    /// plus queued `Piece` messages).
    pub peer_request_count: usize,
    pub have_messages_received: u64,
    pub pieces_received: u64,
    /// Our requests to the peer that have not been answered or rejected.
    pub requests_in_flight: usize,
    /// Request pipeline depth, recomputed by the tick loop.
    pub max_pending_requests: usize,
    /// The peer's advertised `reqq`, clamped to at least 1.
    pub peer_request_queue: usize,

    pub peer_extensions: BTreeMap<String, u8>,
    pub peer_listen_port: Option<u16>,
    pub dht_port: Option<u16>,
    pub pex_enabled: bool,

    pub last_message_sent: Instant,
    pub last_message_received: Instant,

    pub monitor: Box<dyn Monitor + Send>,
    pub transport: Box<dyn Transport + Send>,
}

impl PeerSession {
    pub(crate) fn new(
        id: SessionId,
        torrent: InfoHash,
        addr: SocketAddr,
        direction: Direction,
        piece_count: u32,
        transport: Box<dyn Transport + Send>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            torrent,
            addr,
            direction,
            state: SessionState::Handshaking,
            peer_id: None,
            supports_fast: false,
            supports_extended: false,
            supports_dht: false,
            bitfield: Bitfield::new(piece_count as usize),
            choke: ChokeState::default(),
            is_seeder: false,
            allowed_fast_from_peer: HashSet::new(),
            allowed_fast_to_peer: Vec::new(),
            suggested_pieces: Vec::new(),
            outbound: VecDeque::new(),
            pending_reads: Vec::new(),
            peer_request_count: 0,
            have_messages_received: 0,
            pieces_received: 0,
            requests_in_flight: 0,
            max_pending_requests: DEFAULT_PEER_REQUEST_QUEUE,
            peer_request_queue: DEFAULT_PEER_REQUEST_QUEUE,
            peer_extensions: BTreeMap::new(),
            peer_listen_port: None,
            dht_port: None,
            pex_enabled: false,
            last_message_sent: now,
            last_message_received: now,
            monitor: Box::new(SpeedMonitor::new()),
            transport,
        }
    }

    /// Appends a message to the outbound queue. Strict FIFO; the transport
    /// drains from the front.
    pub fn enqueue(&mut self, message: Message) {
        self.outbound.push_back(message);
    }

    pub fn enqueue_bundle(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.outbound.extend(messages);
    }

    /// Queues piece data the peer requested, taking ownership of the
    /// serve obligation (see [`cancel`](Self::cancel)).
    pub fn enqueue_piece(&mut self, index: u32, begin: u32, data: Bytes) {
        self.outbound.push_back(Message::Piece { index, begin, data });
        self.peer_request_count += 1;
    }

    /// Pops the next message for transmission. Serving a `Piece` settles
    /// one of the peer's requests.
    pub fn next_outbound(&mut self) -> Option<Message> {
        let message = self.outbound.pop_front()?;
        if matches!(message, Message::Piece { .. }) {
            self.peer_request_count = self.peer_request_count.saturating_sub(1);
        }
        Some(message)
    }

    pub fn queue_len(&self) -> usize {
        self.outbound.len()
    }

    pub fn queued(&self) -> impl Iterator<Item = &Message> {
        self.outbound.iter()
    }

    pub(crate) fn clear_outbound(&mut self) {
        self.outbound.clear();
    }

    /// Records a block read the peer is owed.
    pub(crate) fn queue_read(&mut self, request: BlockRequest) {
        self.pending_reads.push(request);
        self.peer_request_count += 1;
    }

    pub fn pending_reads(&self) -> &[BlockRequest] {
        &self.pending_reads
    }

    /// Hands the oldest owed read to the disk layer. The serve obligation
    /// transfers to the eventual [`enqueue_piece`](Self::enqueue_piece), so
    /// the count drops here.
    pub fn take_pending_read(&mut self) -> Option<BlockRequest> {
        if self.pending_reads.is_empty() {
            return None;
        }
        self.peer_request_count = self.peer_request_count.saturating_sub(1);
        Some(self.pending_reads.remove(0))
    }

    /// Honors a `Cancel`: removes the matching queued `Piece` if one
    /// exists, otherwise the matching pending read. At most one removal
    /// per call; returns whether anything matched.
    pub fn cancel(&mut self, piece: u32, offset: u32, length: u32) -> bool {
        let queued = self.outbound.iter().position(|m| {
            matches!(m, Message::Piece { index, begin, data }
                if *index == piece && *begin == offset && data.len() as u32 == length)
        });
        if let Some(pos) = queued {
            self.outbound.remove(pos);
            self.peer_request_count = self.peer_request_count.saturating_sub(1);
            return true;
        }

        let pending = self
            .pending_reads
            .iter()
            .position(|r| r.piece_index == piece && r.offset == offset && r.length == length);
        if let Some(pos) = pending {
            self.pending_reads.remove(pos);
            self.peer_request_count = self.peer_request_count.saturating_sub(1);
            return true;
        }

        false
    }

    pub fn mark_sent(&mut self, now: Instant) {
        self.last_message_sent = now;
    }

    pub fn mark_received(&mut self, now: Instant) {
        self.last_message_received = now;
    }
}
