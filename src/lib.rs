//! rswarm - a BitTorrent peer-protocol engine
//!
//! The per-torrent state machine of a BitTorrent client: handshakes, the
//! full peer message vocabulary with fast-extension and extension-protocol
//! gating, the periodic bookkeeping tick, and the Kademlia routing table
//! used to locate peers.
//!
//! # Modules
//!
//! - [`peer`] - BEP-3/6/10 wire codec, per-peer sessions, message dispatch
//! - [`torrent`] - per-torrent context, tick loop, collaborator interfaces
//! - [`dht`] - BEP-5 node ids and the splitting-bucket routing table
//! - [`pex`] - BEP-11 peer exchange payloads
//! - [`bencode`] - the minimal bencode support the extension messages need
//! - [`engine`] - the info-hash-keyed torrent arena
//!
//! Tracker transports, disk I/O, hashing, the choke algorithm, and piece
//! selection are consumed through the traits in [`torrent`]; this crate
//! never blocks on any of them.

pub mod bencode;
pub mod config;
pub mod constants;
pub mod dht;
pub mod engine;
pub mod peer;
pub mod pex;
pub mod torrent;

pub use bencode::{decode, encode, BencodeError, Value};
pub use config::Settings;
pub use dht::{Distance, InsertOutcome, Node, NodeId, RoutingTable, SharedRoutingTable};
pub use engine::{Engine, TorrentHandle};
pub use peer::{
    Bitfield, Block, BlockRequest, ChokeState, Direction, ExtendedHandshake, Handshake, Message,
    MessageId, PeerId, PeerSession, PeerWire, ProtocolError, SessionId, SessionState,
};
pub use pex::{PexFlags, PexMessage};
pub use torrent::{
    AnnounceEvent, CandidatePeer, Clock, Collaborators, InfoHash, ManualClock, Monitor, Picker,
    ReciprocityController, SpeedMonitor, SystemClock, TorrentContext, TorrentEvent, TorrentState,
    TrackerManager, TrackerStatus, Transport,
};
