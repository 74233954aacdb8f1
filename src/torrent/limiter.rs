use std::time::Instant;

/// A token-bucket rate limiter.
///
/// Tokens refill on the tick loop's 1 s refresh cadence; the bucket holds
/// up to two seconds of budget so short bursts are not penalized. A rate
/// of 0 means unlimited.
#[derive(Debug)]
pub struct RateLimiter {
    tokens: f64,
    capacity: f64,
    bytes_per_sec: u64,
    last_refresh: Option<Instant>,
}

impl RateLimiter {
    pub fn new(bytes_per_sec: u64) -> Self {
        let capacity = (bytes_per_sec * 2) as f64;
        Self {
            tokens: capacity,
            capacity,
            bytes_per_sec,
            last_refresh: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.bytes_per_sec == 0
    }

    pub fn rate(&self) -> u64 {
        self.bytes_per_sec
    }

    pub fn set_rate(&mut self, bytes_per_sec: u64) {
        self.bytes_per_sec = bytes_per_sec;
        self.capacity = (bytes_per_sec * 2) as f64;
        self.tokens = self.tokens.min(self.capacity);
    }

    /// Adds the tokens accrued since the last refresh.
    pub fn refresh(&mut self, now: Instant) {
        if let Some(last) = self.last_refresh {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            self.tokens = (self.tokens + elapsed * self.bytes_per_sec as f64).min(self.capacity);
        }
        self.last_refresh = Some(now);
    }

    /// Takes `bytes` from the bucket if available.
    pub fn try_acquire(&mut self, bytes: u64) -> bool {
        if self.is_unlimited() {
            return true;
        }
        let needed = bytes as f64;
        if self.tokens >= needed {
            self.tokens -= needed;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> u64 {
        if self.is_unlimited() {
            u64::MAX
        } else {
            self.tokens as u64
        }
    }
}
