//! Token-bucket rate limiting (C3), per-connection.
//!
//! Two layers: one global bucket plus a per-message-type bucket from a
//! fixed table. Pure `std::time::Instant` math — no extra crate needed,
//! matching how the teacher bounds its own work with `tokio::time::timeout`
//! rather than reaching for a rate-limiting crate.

use std::collections::HashMap;
use std::time::Instant;

/// Consecutive denials before a connection is disconnected.
const DISCONNECT_THRESHOLD: u32 = 50;

/// A single token bucket.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    max: f64,
    rate: f64,
    last_check: Instant,
}

impl Bucket {
    fn new(rate: f64, max: f64) -> Self {
        Bucket {
            tokens: max,
            max,
            rate,
            last_check: Instant::now(),
        }
    }

    /// Refills based on elapsed time, then takes one token if available.
    fn allow(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_check).as_secs_f64();
        self.last_check = now;

        self.tokens = (self.tokens + elapsed * self.rate).min(self.max);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request proceeds.
    Allowed,
    /// Request is denied, but the connection should stay open.
    Denied,
    /// Request is denied and the connection has accumulated enough
    /// consecutive violations to warrant disconnecting.
    DenyDisconnect,
}

/// Per-message-type `(rate, burst)` table. Reproduced verbatim from
/// spec.md §4.3.
const TYPE_TABLE: &[(&str, f64, f64)] = &[
    ("answer", 1.0, 3.0),
    ("get_rooms", 2.0, 5.0),
    ("get_genres", 2.0, 5.0),
    ("create_room", 0.5, 2.0),
    ("join", 1.0, 3.0),
    ("leave_room", 1.0, 3.0),
    ("start_game", 1.0, 2.0),
    ("vote", 2.0, 5.0),
    ("challenge", 0.5, 2.0),
    ("rebuttal", 0.5, 2.0),
    ("withdraw_challenge", 0.5, 2.0),
    ("ping", 1.0, 5.0),
];

/// The bucket used for any message type absent from [`TYPE_TABLE`].
const UNKNOWN_RATE: f64 = 1.0;
const UNKNOWN_BURST: f64 = 2.0;

/// Per-connection rate limiter: one global bucket, one bucket per message
/// type, and a consecutive-denial counter that escalates to disconnection.
pub struct RateLimiter {
    global: Bucket,
    per_type: HashMap<&'static str, Bucket>,
    violations: u32,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        let per_type = TYPE_TABLE
            .iter()
            .map(|&(ty, rate, burst)| (ty, Bucket::new(rate, burst)))
            .collect();

        RateLimiter {
            global: Bucket::new(10.0, 20.0),
            per_type,
            violations: 0,
        }
    }

    /// Checks both the global bucket and `msg_type`'s bucket (creating an
    /// "unknown type" bucket on demand). A message is allowed only if both
    /// buckets have a token; a denial from either counts as one violation.
    pub fn check(&mut self, msg_type: &str) -> RateDecision {
        let type_bucket = match self.per_type.get_mut(msg_type) {
            Some(b) => b,
            None => {
                // `msg_type` isn't `&'static str` here, so unknown types
                // all share one bucket keyed by a fixed sentinel rather than
                // leaking a new key per distinct garbage type string.
                self.per_type
                    .entry("__unknown__")
                    .or_insert_with(|| Bucket::new(UNKNOWN_RATE, UNKNOWN_BURST))
            }
        };

        let type_allowed = type_bucket.allow();
        let global_allowed = self.global.allow();
        let allowed = type_allowed && global_allowed;

        if allowed {
            self.violations = self.violations.saturating_sub(1);
            RateDecision::Allowed
        } else {
            self.violations += 1;
            if self.violations >= DISCONNECT_THRESHOLD {
                RateDecision::DenyDisconnect
            } else {
                RateDecision::Denied
            }
        }
    }
}
