//! Per-torrent settings.
//!
//! Everything the tick loop and dispatcher consult at runtime is carried
//! explicitly on the torrent context; there is no process-wide mutable
//! configuration.

use std::time::Duration;

use crate::constants;

/// Tunable settings for one torrent.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum simultaneous peer connections.
    pub max_connections: usize,

    /// Suppress `Have` broadcasts to peers that already hold the piece.
    pub have_suppression_enabled: bool,

    /// Participate in peer exchange (BEP-11). Ignored on private torrents.
    pub enable_peer_exchange: bool,

    /// Minimum interval between reciprocity reviews.
    pub min_time_between_reviews: Duration,

    /// Skip the reciprocity review when the upload rate exceeds this
    /// percentage of the upload limit. 0 disables the shortcut.
    pub percent_of_max_rate_to_skip_review: u32,

    /// Attach webseeds when the download rate falls below this many KiB/s.
    /// 0 attaches them unconditionally once the delay has passed.
    pub add_webseeds_speed_limit: u64,

    /// Number of allowed-fast pieces granted to each peer (BEP-6).
    pub allowed_fast_set_size: usize,

    /// Tick cadence. The per-second and per-five-second phases derive
    /// their modulus from this.
    pub tick_interval: Duration,

    /// Download rate limit in bytes/s. 0 means unlimited.
    pub download_rate_limit: u64,

    /// Upload rate limit in bytes/s. 0 means unlimited.
    pub upload_rate_limit: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_connections: 60,
            have_suppression_enabled: false,
            enable_peer_exchange: true,
            min_time_between_reviews: Duration::from_secs(30),
            percent_of_max_rate_to_skip_review: 0,
            add_webseeds_speed_limit: 0,
            allowed_fast_set_size: constants::ALLOWED_FAST_SET_SIZE,
            tick_interval: constants::TICK_INTERVAL,
            download_rate_limit: 0,
            upload_rate_limit: 0,
        }
    }
}

impl Settings {
    /// Ticks per second at the configured cadence, never zero.
    pub fn ticks_per_second(&self) -> u64 {
        (1000 / self.tick_interval.as_millis().max(1) as u64).max(1)
    }
}
