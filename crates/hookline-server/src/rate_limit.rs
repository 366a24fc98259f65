//! Per-endpoint sliding-window rate limiter.
//!
//! Process-local state: restarts reset the counters, and a multi-instance
//! deployment needs a shared counter instead.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use hookline_relay_db::entities::endpoint_settings;

/// Configured thresholds for one endpoint. A missing settings row means
/// the caller skips the limiter entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateLimits {
    pub per_minute: Option<i32>,
    pub per_hour: Option<i32>,
    pub per_day: Option<i32>,
}

impl RateLimits {
    pub fn from_settings(settings: &endpoint_settings::Model) -> Self {
        Self {
            per_minute: settings.rate_limit_per_minute,
            per_hour: settings.rate_limit_per_hour,
            per_day: settings.rate_limit_per_day,
        }
    }
}

/// Sliding-window counters over admission timestamps, one window per
/// endpoint, guarded by a single mutex.
#[derive(Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<Uuid, Vec<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit or deny a capture. Admission appends the current timestamp.
    pub fn check(&self, endpoint_id: Uuid, limits: &RateLimits) -> bool {
        self.check_at(endpoint_id, limits, Utc::now())
    }

    fn check_at(&self, endpoint_id: Uuid, limits: &RateLimits, now: DateTime<Utc>) -> bool {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let window = windows.entry(endpoint_id).or_default();

        // The tail only needs to cover the longest configured window.
        let tail = if limits.per_day.is_some() {
            Duration::hours(24)
        } else {
            Duration::hours(1)
        };
        window.retain(|t| *t > now - tail);

        if let Some(limit) = limits.per_minute {
            if count_since(window, now - Duration::minutes(1)) >= limit as usize {
                return false;
            }
        }
        if let Some(limit) = limits.per_hour {
            if count_since(window, now - Duration::hours(1)) >= limit as usize {
                return false;
            }
        }
        if let Some(limit) = limits.per_day {
            if count_since(window, now - Duration::hours(24)) >= limit as usize {
                return false;
            }
        }

        window.push(now);
        true
    }
}

fn count_since(window: &[DateTime<Utc>], cutoff: DateTime<Utc>) -> usize {
    window.iter().filter(|t| **t > cutoff).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minute_limit(limit: i32) -> RateLimits {
        RateLimits {
            per_minute: Some(limit),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_thresholds_always_admits() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        for _ in 0..1000 {
            assert!(limiter.check(endpoint, &RateLimits::default()));
        }
    }

    #[test]
    fn test_minute_limit_denies_at_threshold() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        let limits = minute_limit(3);
        let now = Utc::now();

        assert!(limiter.check_at(endpoint, &limits, now));
        assert!(limiter.check_at(endpoint, &limits, now + Duration::seconds(1)));
        assert!(limiter.check_at(endpoint, &limits, now + Duration::seconds(2)));
        assert!(!limiter.check_at(endpoint, &limits, now + Duration::seconds(3)));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        let limits = minute_limit(2);
        let now = Utc::now();

        assert!(limiter.check_at(endpoint, &limits, now));
        assert!(limiter.check_at(endpoint, &limits, now + Duration::seconds(1)));
        assert!(!limiter.check_at(endpoint, &limits, now + Duration::seconds(2)));
        // Once the first admission falls out of the trailing minute,
        // capacity frees up again.
        assert!(limiter.check_at(endpoint, &limits, now + Duration::seconds(61)));
    }

    #[test]
    fn test_endpoints_are_independent() {
        let limiter = RateLimiter::new();
        let limits = minute_limit(1);
        let now = Utc::now();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(limiter.check_at(a, &limits, now));
        assert!(!limiter.check_at(a, &limits, now));
        assert!(limiter.check_at(b, &limits, now));
    }

    #[test]
    fn test_day_limit_counts_a_full_day_of_history() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        let limits = RateLimits {
            per_day: Some(2),
            ..Default::default()
        };
        let now = Utc::now();

        assert!(limiter.check_at(endpoint, &limits, now));
        // Twelve hours later the first admission still counts against the
        // day window.
        let later = now + Duration::hours(12);
        assert!(limiter.check_at(endpoint, &limits, later));
        assert!(!limiter.check_at(endpoint, &limits, later + Duration::seconds(1)));
    }

    #[test]
    fn test_hour_and_minute_limits_combine() {
        let limiter = RateLimiter::new();
        let endpoint = Uuid::new_v4();
        let limits = RateLimits {
            per_minute: Some(10),
            per_hour: Some(3),
            per_day: None,
        };
        let now = Utc::now();

        // Spread far enough apart that the minute limit never trips.
        assert!(limiter.check_at(endpoint, &limits, now));
        assert!(limiter.check_at(endpoint, &limits, now + Duration::minutes(5)));
        assert!(limiter.check_at(endpoint, &limits, now + Duration::minutes(10)));
        assert!(!limiter.check_at(endpoint, &limits, now + Duration::minutes(15)));
    }
}
