use std::time::Instant;

use super::traits::Monitor;

/// Default [`Monitor`] implementation: byte counters sampled on the 1 s
/// refresh cadence, smoothed with a 3:1 moving average so a single quiet
/// second doesn't zero the rate.
#[derive(Debug, Default)]
pub struct SpeedMonitor {
    download_accum: u64,
    upload_accum: u64,
    download_rate: u64,
    upload_rate: u64,
    last_tick: Option<Instant>,
}

impl SpeedMonitor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Monitor for SpeedMonitor {
    fn tick(&mut self, now: Instant) {
        if let Some(last) = self.last_tick {
            let millis = now.saturating_duration_since(last).as_millis().max(1) as u64;
            let download = self.download_accum * 1000 / millis;
            let upload = self.upload_accum * 1000 / millis;
            self.download_rate = (self.download_rate * 3 + download) / 4;
            self.upload_rate = (self.upload_rate * 3 + upload) / 4;
        }
        self.download_accum = 0;
        self.upload_accum = 0;
        self.last_tick = Some(now);
    }

    fn record_download(&mut self, bytes: u64) {
        self.download_accum += bytes;
    }

    fn record_upload(&mut self, bytes: u64) {
        self.upload_accum += bytes;
    }

    fn download_speed_bps(&self) -> u64 {
        self.download_rate
    }

    fn upload_speed_bps(&self) -> u64 {
        self.upload_rate
    }
}
