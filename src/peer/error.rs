use thiserror::Error;

/// Fatal per-connection protocol errors.
///
/// Any of these closes the session: the outbound queue is dropped, all
/// in-flight picker requests are cancelled, and `peer_disconnected` is
/// emitted. Transport failures are carried here too since the peer layer
/// treats them identically; reconnection is a higher-layer policy.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Network I/O error from the wire.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer sent a malformed 68-byte handshake.
    #[error("invalid handshake")]
    InvalidHandshake,

    /// The handshake's info hash doesn't match the torrent's.
    #[error("info hash mismatch")]
    InfoHashMismatch,

    /// The peer identified itself differently than previously known.
    #[error("peer id mismatch")]
    PeerIdMismatch,

    /// A typed message arrived before the handshake completed.
    #[error("message before handshake")]
    ExpectedHandshake,

    /// A message requiring an un-negotiated capability was received.
    #[error("capability violation: {0}")]
    CapabilityViolation(&'static str),

    /// Request length outside the served range.
    #[error("bad request length: {0}")]
    BadRequestLength(u32),

    /// Piece index outside the torrent.
    #[error("piece index out of range: {0}")]
    PieceOutOfRange(u32),

    /// Received a malformed protocol message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// Received an unknown message ID.
    #[error("unknown message id: {0}")]
    UnknownMessageId(u8),

    /// The connection was closed by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Wire operation timed out.
    #[error("timeout")]
    Timeout,

    /// Extension protocol error.
    #[error("extension error: {0}")]
    Extension(String),

    /// Error decoding bencode in extension messages.
    #[error("bencode error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    /// Transient transport failure reported by the transport collaborator.
    #[error("transport error: {0}")]
    Transport(String),
}
