//! Client-side request rate limits, written like `2/s` or `100/m`.
//!
//! The OCR service enforces a per-account QPS quota and answers excess
//! requests with an error. Staying under the quota is cheaper than burning
//! retries.

use std::{fmt, str::FromStr, time::Duration};

use leaky_bucket::RateLimiter;

use crate::prelude::*;

/// The period a [`RateLimit`] is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitPeriod {
    /// Per second.
    Second,
    /// Per minute.
    Minute,
}

impl RateLimitPeriod {
    /// The length of this period.
    pub fn to_duration(self) -> Duration {
        match self {
            RateLimitPeriod::Second => Duration::from_secs(1),
            RateLimitPeriod::Minute => Duration::from_secs(60),
        }
    }

    /// The suffix used when parsing and printing.
    fn suffix(self) -> &'static str {
        match self {
            RateLimitPeriod::Second => "s",
            RateLimitPeriod::Minute => "m",
        }
    }
}

/// A maximum number of requests per period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RateLimit {
    /// Requests allowed per period. Always at least 1.
    pub max_requests: usize,
    /// The period.
    pub per_period: RateLimitPeriod,
}

impl RateLimit {
    /// Build a [`RateLimiter`] that spreads requests evenly over the period,
    /// while allowing an initial burst of up to `max_requests`.
    pub fn to_rate_limiter(self) -> RateLimiter {
        let max_requests = u32::try_from(self.max_requests).unwrap_or(u32::MAX);
        let interval = self.per_period.to_duration() / max_requests;
        RateLimiter::builder()
            .initial(self.max_requests)
            .refill(1)
            .max(self.max_requests)
            .interval(interval.max(Duration::from_millis(1)))
            .build()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.max_requests, self.per_period.suffix())
    }
}

impl FromStr for RateLimit {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (count, period) = s
            .split_once('/')
            .ok_or_else(|| anyhow!("rate limit {s:?} should look like \"2/s\""))?;
        let max_requests = count
            .trim()
            .parse::<usize>()
            .with_context(|| format!("bad request count in rate limit {s:?}"))?;
        if max_requests == 0 {
            return Err(anyhow!("rate limit {s:?} must allow at least 1 request"));
        }
        let per_period = match period.trim() {
            "s" => RateLimitPeriod::Second,
            "m" => RateLimitPeriod::Minute,
            other => return Err(anyhow!("unsupported rate limit period {other:?}")),
        };
        Ok(Self {
            max_requests,
            per_period,
        })
    }
}
