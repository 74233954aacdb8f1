//! Collaborator interfaces consumed by the dispatcher and the tick loop.
//!
//! The engine drives these; their internals (piece selection policy, the
//! choke algorithm, tracker transports, the actual socket) live outside
//! this crate. Every call returns immediately: the engine never blocks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::peer::{Block, BlockRequest, PeerSession, SessionId};

/// Piece selection policy.
pub trait Picker {
    /// Chooses up to `up_to` blocks to request from this peer, honoring its
    /// bitfield, choke state, and allowed-fast set.
    fn pick_requests(&mut self, session: &mut PeerSession, up_to: usize) -> Vec<BlockRequest>;

    /// Forgets one outstanding request to this peer.
    fn cancel_request(&mut self, session: SessionId, piece: u32, offset: u32, length: u32);

    /// Forgets every outstanding request to this peer.
    fn cancel_all(&mut self, session: SessionId);

    /// Delivers a received block.
    fn piece_received(&mut self, session: SessionId, block: Block);

    /// Whether the peer has any piece we still want.
    fn is_interesting(&self, session: &PeerSession) -> bool;
}

/// The choke/unchoke algorithm, reviewed periodically by the tick loop.
pub trait ReciprocityController {
    fn review(&mut self, sessions: &mut HashMap<SessionId, PeerSession>);
}

/// Announce events sent to trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnounceEvent {
    None,
    Started,
    Stopped,
    Completed,
}

/// Snapshot of the active tracker's announce state.
#[derive(Debug, Clone, Copy)]
pub struct TrackerStatus {
    pub last_updated: Instant,
    pub update_succeeded: bool,
    pub update_interval: Duration,
    pub min_update_interval: Duration,
}

/// The tracker tier list and its announce machinery.
pub trait TrackerManager {
    /// The currently selected tracker, if any.
    fn current(&self) -> Option<TrackerStatus>;

    fn announce(&mut self, event: AnnounceEvent);
}

/// Transfer-rate accounting, refreshed on the 1 s monitor cadence.
pub trait Monitor {
    fn tick(&mut self, now: Instant);
    fn record_download(&mut self, bytes: u64);
    fn record_upload(&mut self, bytes: u64);
    fn download_speed_bps(&self) -> u64;
    fn upload_speed_bps(&self) -> u64;
}

/// The engine-facing side of a peer connection's byte transport.
///
/// The transport drains the session's outbound queue asynchronously; the
/// tick loop only signals it.
pub trait Transport {
    /// Whether a send is currently in flight.
    fn send_in_flight(&self) -> bool;

    /// Signals the transport to drain the session's outbound queue.
    fn process_queue(&mut self);

    /// Tears down the connection. `reason` surfaces in the event stream.
    fn close(&mut self, reason: &str);
}

/// Handler for extension messages this crate doesn't interpret itself.
pub trait ExtensionHandler {
    fn on_message(&mut self, session: SessionId, payload: &Bytes);
}

/// Injected time source, so tick-loop timeouts are testable.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock advanced by hand, for tests and simulation.
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}
