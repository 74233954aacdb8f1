//! Peer wire protocol (BEP-3, BEP-6, BEP-10).
//!
//! The message codec, per-connection session state, and the dispatcher
//! that validates and applies incoming messages.

mod bitfield;
mod dispatch;
mod error;
mod extension;
mod fast;
mod message;
mod metadata;
mod peer_id;
mod piece;
mod session;
mod wire;

pub use bitfield::Bitfield;
pub use error::ProtocolError;
pub use extension::ExtendedHandshake;
pub use fast::allowed_fast_set;
pub use message::{Handshake, Message, MessageId, HANDSHAKE_LEN, PROTOCOL};
pub use metadata::{
    metadata_piece_bounds, metadata_piece_count, MetadataKind, MetadataMessage,
    METADATA_PIECE_SIZE,
};
pub use peer_id::PeerId;
pub use piece::{Block, BlockRequest};
pub use session::{ChokeState, Direction, PeerSession, SessionId, SessionState};
pub use wire::PeerWire;

#[cfg(test)]
mod tests;
