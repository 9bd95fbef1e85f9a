use std::time::{Duration, Instant};

/// Continuously refilling token bucket.
///
/// Starts full. Tokens are added at `refill_rate` per second and never
/// exceed `capacity`.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64, // tokens per second
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self::new_at(capacity, refill_rate, Instant::now())
    }

    pub fn new_at(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_refill: now,
        }
    }

    /// Take `tokens` from the bucket if they are all available
    pub fn try_consume(&mut self, tokens: u32) -> bool {
        self.try_consume_at(tokens, Instant::now())
    }

    pub fn try_consume_at(&mut self, tokens: u32, now: Instant) -> bool {
        self.refill_at(now);

        if self.tokens >= tokens as f64 {
            self.tokens -= tokens as f64;
            true
        } else {
            false
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    fn refill_at(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }

        let tokens_to_add = self.refill_rate * elapsed.as_secs_f64();
        self.tokens = (self.tokens + tokens_to_add).min(self.capacity as f64);
        self.last_refill = now;
    }

    /// Time until `required_tokens` are available, `None` if they already are
    pub fn time_until_available(&mut self, required_tokens: u32) -> Option<Duration> {
        self.time_until_available_at(required_tokens, Instant::now())
    }

    pub fn time_until_available_at(
        &mut self,
        required_tokens: u32,
        now: Instant,
    ) -> Option<Duration> {
        self.refill_at(now);

        if self.tokens >= required_tokens as f64 {
            return None;
        }
        if self.refill_rate <= 0.0 || required_tokens > self.capacity {
            return Some(Duration::MAX);
        }

        let tokens_needed = required_tokens as f64 - self.tokens;
        let wait = tokens_needed / self.refill_rate;
        Some(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
    }
}
