//! Response classification and the retry policy.

use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

/// Why an attempt failed in a way worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 403/429, or a 503 challenge page
    Blocked { status: u16 },
    Timeout,
    Connect,
    /// Other 5xx
    Server { status: u16 },
}

impl FailureKind {
    pub fn is_block(self) -> bool {
        matches!(self, FailureKind::Blocked { .. })
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Blocked { status } => write!(f, "blocked (HTTP {})", status),
            FailureKind::Timeout => f.write_str("timed out"),
            FailureKind::Connect => f.write_str("connection failed"),
            FailureKind::Server { status } => write!(f, "server error (HTTP {})", status),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Retry(FailureKind),
    /// Retrying will not help (404, 410, ...)
    Reject,
}

/// Body markers of anti-bot interstitials served with a 503.
const CHALLENGE_MARKERS: &[&str] = &[
    "captcha",
    "cf-chl",
    "attention required",
    "access denied",
    "cloudflare",
    "blocked",
];

pub fn classify(status: u16, body: &str) -> ResponseClass {
    match status {
        200..=399 => ResponseClass::Success,
        403 | 429 => ResponseClass::Retry(FailureKind::Blocked { status }),
        503 if is_challenge(body) => ResponseClass::Retry(FailureKind::Blocked { status }),
        500..=599 => ResponseClass::Retry(FailureKind::Server { status }),
        _ => ResponseClass::Reject,
    }
}

fn is_challenge(body: &str) -> bool {
    let lower = body.to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
}

/// Transport errors that may succeed on another identity. `Other` covers
/// malformed requests, which no retry will fix.
pub fn classify_transport(error: &TransportError) -> Option<FailureKind> {
    match error {
        TransportError::Timeout => Some(FailureKind::Timeout),
        TransportError::Connect(_) => Some(FailureKind::Connect),
        TransportError::Other(_) => None,
    }
}

/// Attempt ceiling and backoff for one URL.
///
/// The delay before attempt `n + 1` is `base_delay * n * multiplier`, where the
/// multiplier depends on why attempt `n` failed, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub block_multiplier: f64,
    pub timeout_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            block_multiplier: 3.0,
            timeout_multiplier: 1.5,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn is_retryable(&self, kind: FailureKind) -> bool {
        match kind {
            FailureKind::Blocked { .. } | FailureKind::Timeout | FailureKind::Connect => true,
            FailureKind::Server { status } => status != 501,
        }
    }

    /// `attempt` is 1-based: the attempt that just failed.
    pub fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        attempt < self.max_attempts && self.is_retryable(kind)
    }

    pub fn delay_for(&self, attempt: u32, kind: FailureKind) -> Duration {
        let multiplier = match kind {
            FailureKind::Blocked { .. } => self.block_multiplier,
            FailureKind::Timeout | FailureKind::Connect => self.timeout_multiplier,
            FailureKind::Server { .. } => 1.0,
        };
        let secs = self.base_delay.as_secs_f64() * attempt.max(1) as f64 * multiplier;
        // Infinite or overflowing products saturate at the cap
        Duration::try_from_secs_f64(secs.max(0.0))
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_saturates_at_cap() {
        let policy = RetryPolicy {
            block_multiplier: f64::INFINITY,
            timeout_multiplier: f64::MAX,
            ..RetryPolicy::default()
        };
        assert_eq!(
            policy.delay_for(3, FailureKind::Blocked { status: 403 }),
            policy.max_delay
        );
        assert_eq!(policy.delay_for(u32::MAX, FailureKind::Timeout), policy.max_delay);

        let negative = RetryPolicy {
            block_multiplier: -2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(
            negative.delay_for(1, FailureKind::Blocked { status: 403 }),
            Duration::ZERO
        );
    }

    #[test]
    fn test_classify_blocks() {
        assert_eq!(
            classify(403, ""),
            ResponseClass::Retry(FailureKind::Blocked { status: 403 })
        );
        assert_eq!(
            classify(429, ""),
            ResponseClass::Retry(FailureKind::Blocked { status: 429 })
        );
        assert_eq!(
            classify(503, "<title>Attention Required! | Cloudflare</title>"),
            ResponseClass::Retry(FailureKind::Blocked { status: 503 })
        );
    }

    #[test]
    fn test_classify_other_statuses() {
        assert_eq!(classify(200, ""), ResponseClass::Success);
        assert_eq!(
            classify(503, "maintenance"),
            ResponseClass::Retry(FailureKind::Server { status: 503 })
        );
        assert_eq!(classify(404, ""), ResponseClass::Reject);
    }

    #[test]
    fn test_block_backoff_escalates_faster_than_timeout() {
        let policy = RetryPolicy::default();
        let blocked = FailureKind::Blocked { status: 403 };

        assert_eq!(policy.delay_for(1, blocked), Duration::from_secs(3));
        assert_eq!(policy.delay_for(2, blocked), Duration::from_secs(6));
        assert_eq!(
            policy.delay_for(2, FailureKind::Timeout),
            Duration::from_secs(3)
        );
        assert!(policy.delay_for(1, blocked) > policy.delay_for(1, FailureKind::Timeout));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default().with_base_delay(Duration::from_secs(20));
        assert_eq!(
            policy.delay_for(3, FailureKind::Blocked { status: 403 }),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_attempt_ceiling() {
        let policy = RetryPolicy::default();
        assert!(policy.should_retry(1, FailureKind::Timeout));
        assert!(policy.should_retry(2, FailureKind::Timeout));
        assert!(!policy.should_retry(3, FailureKind::Timeout));
        assert!(!policy.should_retry(1, FailureKind::Server { status: 501 }));
    }
}
