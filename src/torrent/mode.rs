//! The per-torrent tick loop.
//!
//! A scheduler calls [`TorrentContext::tick`] every 50 ms with a
//! monotonically increasing counter. Each tick runs three phases: rate
//! bookkeeping and `Have` broadcasting, state-specific logic (webseeds,
//! inactive-peer eviction, reciprocity review), and per-session
//! housekeeping (queue draining, keepalives, timeout disconnects),
//! finishing with the tracker re-announce check.

use std::time::Instant;

use tracing::{debug, trace};

use super::context::{TorrentContext, TorrentState};
use super::events::{PeerSource, TorrentEvent};
use super::traits::AnnounceEvent;
use crate::constants::{
    BONUS_KIBPS_PER_REQUEST, INACTIVITY_TIMEOUT, INACTIVE_SWEEP_INTERVAL, KEEPALIVE_INTERVAL,
    NORMAL_REQUEST_DEPTH, REQUEST_STALL_TIMEOUT, WEBSEED_ATTACH_DELAY,
};
use crate::peer::{Message, SessionId};

impl TorrentContext {
    /// One pass of periodic bookkeeping.
    ///
    /// Never runs concurrently with `dispatch` for the same torrent; the
    /// host schedules both on one logical task.
    pub fn tick(&mut self, counter: u64) {
        if self.poisoned {
            return;
        }
        let now = self.clock.now();
        let ticks_per_second = self.settings.ticks_per_second();

        // rate accounting on the 1 s cadence
        if counter % ticks_per_second == 0 {
            self.monitor.tick(now);
            for session in self.sessions.values_mut() {
                session.monitor.tick(now);
            }
            self.download_limiter.refresh(now);
            self.upload_limiter.refresh(now);
        }

        let finished = self.take_finished_pieces();
        if !finished.is_empty() {
            self.broadcast_have(&finished);
        }

        self.update_request_depths();

        match self.state {
            TorrentState::Downloading => {
                self.maybe_attach_webseeds(now);
                if counter % (ticks_per_second * INACTIVE_SWEEP_INTERVAL.as_secs()) == 0 {
                    self.sweep_inactive(now);
                }
                self.maybe_review(now);
            }
            TorrentState::Seeding => {
                self.maybe_review(now);
            }
        }

        let mut to_close: Vec<(SessionId, &'static str)> = Vec::new();
        for (&id, session) in self.sessions.iter_mut() {
            if session.queue_len() > 0 && !session.transport.send_in_flight() {
                session.transport.process_queue();
            }

            if now.saturating_duration_since(session.last_message_sent) > KEEPALIVE_INTERVAL {
                session.enqueue(Message::KeepAlive);
                session.mark_sent(now);
            }

            let silent_for = now.saturating_duration_since(session.last_message_received);
            if silent_for > INACTIVITY_TIMEOUT {
                to_close.push((id, "Inactivity"));
            } else if silent_for > REQUEST_STALL_TIMEOUT && session.requests_in_flight > 0 {
                to_close.push((id, "Didn't send pieces"));
            }
        }
        for (id, reason) in to_close {
            self.close_session(id, reason);
        }

        self.maybe_announce(now);
    }

    /// Announces freshly verified pieces.
    ///
    /// A peer that already holds the piece first gets our interest in it
    /// re-evaluated (the new piece may make it uninteresting); the `Have`
    /// itself goes out unless suppression hides it from peers that have
    /// the piece anyway.
    fn broadcast_have(&mut self, finished: &[u32]) {
        let suppression = self.settings.have_suppression_enabled;
        let ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for id in ids {
            for &piece in finished {
                let peer_has = match self.sessions.get(&id) {
                    Some(session) => session.bitfield.has(piece),
                    None => break,
                };
                if peer_has {
                    self.refresh_interest(id);
                }
                if !peer_has || !suppression {
                    if let Some(session) = self.sessions.get_mut(&id) {
                        session.enqueue(Message::Have { piece });
                    }
                }
            }
        }
    }

    /// Recomputes each session's request pipeline depth from the peer's
    /// advertised queue, the current flight, and measured throughput.
    fn update_request_depths(&mut self) {
        for session in self.sessions.values_mut() {
            let kibps = session.monitor.download_speed_bps() / 1024;
            let by_rate = NORMAL_REQUEST_DEPTH + (kibps / BONUS_KIBPS_PER_REQUEST) as usize;
            session.max_pending_requests = session
                .peer_request_queue
                .min(session.requests_in_flight + 2)
                .min(by_rate)
                .max(2);
        }
    }

    /// One-shot webseed attachment: after the grace delay, and only while
    /// the download is slower than the configured threshold, the URL list
    /// is drained into `attached_webseeds` for the host to connect. The
    /// list is never repopulated, so this happens at most once per
    /// torrent lifetime.
    fn maybe_attach_webseeds(&mut self, now: Instant) {
        if self.webseeds_attached || self.webseeds.is_empty() {
            return;
        }
        if now.saturating_duration_since(self.started_at) < WEBSEED_ATTACH_DELAY {
            return;
        }
        let limit_kibps = self.settings.add_webseeds_speed_limit;
        if limit_kibps != 0 && self.monitor.download_speed_bps() / 1024 >= limit_kibps {
            return;
        }

        let urls = std::mem::take(&mut self.webseeds);
        let count = urls.len();
        debug!(torrent = %self.info_hash, count, "attaching webseeds");
        self.attached_webseeds = urls;
        self.webseeds_attached = true;
        self.observers.emit(&TorrentEvent::PeersFound {
            added: count,
            offered: count,
            source: PeerSource::Webseed,
        });
    }

    /// When the pool is full, makes room by dropping the stalest session
    /// that never produced a piece.
    fn sweep_inactive(&mut self, now: Instant) {
        if self.sessions.len() + self.candidates.len() < self.settings.max_connections {
            return;
        }
        let victim = self
            .sessions
            .values()
            .filter(|s| {
                s.pieces_received == 0
                    && now.saturating_duration_since(s.last_message_received)
                        > REQUEST_STALL_TIMEOUT
            })
            .min_by_key(|s| s.last_message_received)
            .map(|s| s.id);
        if let Some(id) = victim {
            self.close_session(id, "Inactivity");
        }
    }

    /// Runs the reciprocity review, rate-limited by
    /// `min_time_between_reviews` and short-circuited near the upload cap.
    fn maybe_review(&mut self, now: Instant) {
        if let Some(last) = self.last_review {
            if now.saturating_duration_since(last) < self.settings.min_time_between_reviews {
                return;
            }
        }

        let skip_percent = self.settings.percent_of_max_rate_to_skip_review as u64;
        if skip_percent > 0 && !self.upload_limiter.is_unlimited() {
            let limit = self.upload_limiter.rate();
            if self.monitor.upload_speed_bps() * 100 >= limit * skip_percent {
                trace!(torrent = %self.info_hash, "skipping review near upload cap");
                self.last_review = Some(now);
                return;
            }
        }

        self.last_review = Some(now);
        self.reciprocity.review(&mut self.sessions);
    }

    /// Re-announces when the tracker's interval has elapsed, at most once
    /// per tick. Failed announces retry on the shorter interval.
    fn maybe_announce(&mut self, now: Instant) {
        let Some(status) = self.tracker.current() else {
            return;
        };
        let wait = if status.update_succeeded {
            status.update_interval
        } else {
            status.min_update_interval
        };
        if now.saturating_duration_since(status.last_updated) >= wait {
            self.tracker.announce(AnnounceEvent::None);
        }
    }
}
