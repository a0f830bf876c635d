//! Chat relay support.
//!
//! Chat is room-scoped and not persisted: a line goes to everyone currently
//! in the sender's room, the sender included. This module holds the
//! message shape, text hygiene, and a per-connection rate limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::net::ClientId;

/// Maximum message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 256;

/// Maximum display name length in characters.
pub const MAX_NAME_LENGTH: usize = 32;

/// Rate limit: messages per window.
pub const RATE_LIMIT_MESSAGES: u32 = 5;
/// Rate limit: window duration.
pub const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(10);

/// A relayed chat line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLine {
    pub id: ClientId,
    /// Sender's display name at send time.
    pub name: String,
    pub text: String,
    /// Server receive time.
    pub sent_at: DateTime<Utc>,
}

impl ChatLine {
    pub fn new(id: ClientId, name: &str, text: &str) -> Self {
        ChatLine {
            id,
            name: name.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
        }
    }
}

/// Trims chat text and caps it at [`MAX_MESSAGE_LENGTH`] characters.
/// Returns `None` for blank text.
pub fn clean_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(MAX_MESSAGE_LENGTH).collect())
}

/// Trims a display name. Returns `None` if blank or longer than
/// [`MAX_NAME_LENGTH`] characters.
pub fn clean_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_NAME_LENGTH {
        return None;
    }
    Some(trimmed.to_string())
}

/// Sliding-window rate limiter for chat spam prevention.
///
/// Callers pass the current instant so tests can drive time explicitly.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    /// Timestamps of recent messages.
    history: VecDeque<Instant>,
    /// Max messages in window.
    max_messages: u32,
    /// Window duration.
    window: Duration,
}

impl RateLimiter {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        RateLimiter {
            history: VecDeque::with_capacity(max_messages as usize),
            max_messages,
            window,
        }
    }

    fn expire(&mut self, now: Instant) {
        while let Some(&front) = self.history.front() {
            if now.saturating_duration_since(front) >= self.window {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// Records a message at `now`. Returns false if rate limited.
    pub fn record_message(&mut self, now: Instant) -> bool {
        self.expire(now);
        if (self.history.len() as u32) >= self.max_messages {
            return false;
        }
        self.history.push_back(now);
        true
    }

    /// Remaining messages in the window ending at `now`.
    pub fn remaining(&self, now: Instant) -> u32 {
        let recent = self
            .history
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < self.window)
            .count() as u32;
        self.max_messages.saturating_sub(recent)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        RateLimiter::new(RATE_LIMIT_MESSAGES, RATE_LIMIT_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_trims_and_caps() {
        assert_eq!(clean_text("  hello  ").as_deref(), Some("hello"));
        assert_eq!(clean_text("   "), None);
        let long = "é".repeat(MAX_MESSAGE_LENGTH + 10);
        assert_eq!(
            clean_text(&long).unwrap().chars().count(),
            MAX_MESSAGE_LENGTH
        );
    }

    #[test]
    fn clean_name_rejects_blank_and_long() {
        assert_eq!(clean_name(" Ada ").as_deref(), Some("Ada"));
        assert_eq!(clean_name(""), None);
        assert_eq!(clean_name(&"x".repeat(MAX_NAME_LENGTH + 1)), None);
        assert!(clean_name(&"x".repeat(MAX_NAME_LENGTH)).is_some());
    }

    #[test]
    fn rate_limiting() {
        let mut limiter = RateLimiter::new(3, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limiter.record_message(t0));
        assert!(limiter.record_message(t0));
        assert!(limiter.record_message(t0));
        assert!(!limiter.record_message(t0));
        assert_eq!(limiter.remaining(t0), 0);
    }

    #[test]
    fn rate_limit_recovery() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10));
        let t0 = Instant::now();
        assert!(limiter.record_message(t0));
        assert!(limiter.record_message(t0 + Duration::from_secs(5)));
        assert!(!limiter.record_message(t0 + Duration::from_secs(6)));

        // First message leaves the window at t0 + 10s.
        let later = t0 + Duration::from_secs(10);
        assert_eq!(limiter.remaining(later), 1);
        assert!(limiter.record_message(later));
    }
}
