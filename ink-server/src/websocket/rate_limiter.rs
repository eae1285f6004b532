use std::time::Duration;

use tokio::time::Instant;

/// Token bucket applied to incoming websocket messages, one per connection.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    tokens: u32,
    max_tokens: u32,
    refill_rate: Duration,
    last_refill: Instant,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::new_with_limits(60, Duration::from_millis(250))
    }

    /// Starts full. One token comes back every `refill_rate`.
    pub fn new_with_limits(max_tokens: u32, refill_rate: Duration) -> Self {
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: refill_rate.max(Duration::from_millis(1)),
            last_refill: Instant::now(),
        }
    }

    pub fn check_rate_limit(&mut self) -> bool {
        self.refill_tokens();

        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn refill_tokens(&mut self) {
        let time_passed = self.last_refill.elapsed();
        let refills = time_passed.as_millis() / self.refill_rate.as_millis();
        if refills == 0 {
            return;
        }

        let tokens_to_add = u32::try_from(refills).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(tokens_to_add).min(self.max_tokens);
        // Keep the remainder so partial intervals are not lost
        self.last_refill += self.refill_rate * tokens_to_add;
    }

    pub fn get_remaining_tokens(&mut self) -> u32 {
        self.refill_tokens();
        self.tokens
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
