//! Freshness policy for stored records.
//!
//! A stored record is served without refetching while it is younger than the
//! freshness threshold. The scheduler refreshes every 4 hours, well inside the
//! 24 hour default, so priority districts rarely go stale.

use chrono::{DateTime, Duration, Utc};

/// Default age after which a stored record is refetched.
pub const DEFAULT_MAX_AGE_HOURS: i64 = 24;

/// True when `last_updated` is less than `max_age_hours` old at `now`.
pub fn is_fresh_at(last_updated: DateTime<Utc>, max_age_hours: i64, now: DateTime<Utc>) -> bool {
    now - last_updated < Duration::hours(max_age_hours)
}

/// True when `last_updated` is less than `max_age_hours` old.
pub fn is_fresh(last_updated: DateTime<Utc>, max_age_hours: i64) -> bool {
    is_fresh_at(last_updated, max_age_hours, Utc::now())
}

/// Human readable age, e.g. `"3h ago"`, for log lines.
pub fn age_display(last_updated: DateTime<Utc>) -> String {
    let minutes = (Utc::now() - last_updated).num_minutes();
    if minutes < 1 {
        // Also covers clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        format!("{}h ago", minutes / 60)
    } else {
        format!("{}d ago", minutes / 1440)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_fresh_within_threshold() {
        let now = Utc::now();
        assert!(is_fresh_at(now, DEFAULT_MAX_AGE_HOURS, now));
        assert!(is_fresh_at(now - Duration::hours(23), DEFAULT_MAX_AGE_HOURS, now));
    }

    #[test]
    fn test_is_stale_at_and_beyond_threshold() {
        let now = Utc::now();
        assert!(!is_fresh_at(now - Duration::hours(24), DEFAULT_MAX_AGE_HOURS, now));
        assert!(!is_fresh_at(now - Duration::hours(48), DEFAULT_MAX_AGE_HOURS, now));
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        assert!(is_fresh_at(now + Duration::minutes(5), 1, now));
    }

    #[test]
    fn test_age_display() {
        assert_eq!(age_display(Utc::now()), "just now");
        assert_eq!(age_display(Utc::now() - Duration::minutes(5)), "5m ago");
        assert_eq!(age_display(Utc::now() - Duration::hours(48)), "2d ago");
    }
}
