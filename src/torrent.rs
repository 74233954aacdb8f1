//! Per-torrent state and the tick loop.
//!
//! [`TorrentContext`] ties one torrent's sessions, bitfield, settings, and
//! collaborator subsystems together; the dispatcher (in [`crate::peer`])
//! and the tick loop (in `mode`) are both `impl` blocks on it, so every
//! mutation runs on the torrent's single logical task.

mod context;
mod events;
mod limiter;
mod mode;
mod monitor;
mod traits;

pub use context::{CandidatePeer, Collaborators, InfoHash, TorrentContext, TorrentState};
pub use events::{EventObservers, PeerSource, TorrentEvent};
pub use limiter::RateLimiter;
pub use monitor::SpeedMonitor;
pub use traits::{
    AnnounceEvent, Clock, ExtensionHandler, ManualClock, Monitor, Picker,
    ReciprocityController, SystemClock, TrackerManager, TrackerStatus, Transport,
};
