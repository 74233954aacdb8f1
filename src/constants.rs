//! Protocol constants and tuning parameters.
//!
//! Timeouts, queue depths, and protocol limits used by the dispatcher, the
//! tick loop, and the DHT routing table. Tunables that a host may want to
//! change per torrent live in [`crate::config::Settings`] instead.

use std::time::Duration;

// ============================================================================
// Client identification
// ============================================================================

/// Client ID prefix for peer ID generation (Azureus-style).
pub const CLIENT_PREFIX: &[u8] = b"-RS0001-";

// ============================================================================
// Block and request limits
// ============================================================================

/// Standard block size (16 KiB).
pub const BLOCK_SIZE: u32 = 16384;

/// Smallest request length we will serve.
pub const MIN_REQUEST_LENGTH: u32 = 1;

/// Largest request length we will serve (128 KiB per BEP-3).
pub const MAX_REQUEST_LENGTH: u32 = 131072;

/// Request depth granted to every peer regardless of throughput.
pub const NORMAL_REQUEST_DEPTH: usize = 2;

/// One extra request of depth per this many KiB/s of download throughput.
pub const BONUS_KIBPS_PER_REQUEST: u64 = 10;

/// Assumed `reqq` for peers that never advertise one.
pub const DEFAULT_PEER_REQUEST_QUEUE: usize = 250;

/// Default number of allowed fast pieces granted to a peer (BEP-6).
pub const ALLOWED_FAST_SET_SIZE: usize = 10;

// ============================================================================
// Tick loop cadence
// ============================================================================

/// Interval between `tick()` invocations.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Monitor and rate-limiter refresh cadence.
pub const MONITOR_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Inactive-peer manager poll cadence while downloading.
pub const INACTIVE_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Send a keepalive when nothing has been sent for this long.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(90);

/// Disconnect a peer that stayed silent for this long.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(180);

/// Disconnect a peer that owes us pieces and stayed silent for this long.
pub const REQUEST_STALL_TIMEOUT: Duration = Duration::from_secs(50);

/// Wait this long before considering webseeds for a slow download.
pub const WEBSEED_ATTACH_DELAY: Duration = Duration::from_secs(60);

// ============================================================================
// Extension protocol ids (our side of the BEP-10 registry)
// ============================================================================

/// The extended-handshake message (fixed by BEP-10).
pub const EXTENSION_HANDSHAKE_ID: u8 = 0;

/// Local id we advertise for ut_pex.
pub const UT_PEX_ID: u8 = 1;

/// Local id we advertise for ut_metadata.
pub const UT_METADATA_ID: u8 = 2;

/// Local id we advertise for lt_chat.
pub const LT_CHAT_ID: u8 = 3;

pub const UT_PEX_NAME: &str = "ut_pex";
pub const UT_METADATA_NAME: &str = "ut_metadata";
pub const LT_CHAT_NAME: &str = "lt_chat";

// ============================================================================
// DHT routing table
// ============================================================================

/// Maximum live nodes per bucket.
pub const MAX_BUCKET_NODES: usize = 8;

/// Maximum entries in a bucket's replacement cache.
pub const MAX_BUCKET_REPLACEMENTS: usize = 8;

/// Consecutive failed RPCs before a node is considered dead.
pub const MAX_NODE_FAILURES: u8 = 3;
