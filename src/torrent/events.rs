use crate::peer::{Direction, SessionId};

/// Where a candidate peer was learned about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerSource {
    Tracker,
    Dht,
    PeerExchange,
    Webseed,
    Incoming,
}

/// Events published by one torrent.
///
/// Delivery is synchronous on the tick/dispatch task; observers must not
/// re-enter the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorrentEvent {
    PeerConnected {
        session: SessionId,
        direction: Direction,
    },
    PeerDisconnected {
        session: SessionId,
    },
    PeersFound {
        added: usize,
        offered: usize,
        source: PeerSource,
    },
    /// An internal invariant broke; the torrent refuses further work.
    Poisoned,
}

/// The per-torrent observer list.
#[derive(Default)]
pub struct EventObservers {
    observers: Vec<Box<dyn FnMut(&TorrentEvent) + Send>>,
}

impl EventObservers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Box<dyn FnMut(&TorrentEvent) + Send>) {
        self.observers.push(observer);
    }

    pub fn emit(&mut self, event: &TorrentEvent) {
        for observer in &mut self.observers {
            observer(event);
        }
    }
}
