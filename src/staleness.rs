use chrono::{DateTime, Duration, Utc};

/// Whether data fetched at `last_sync` is still fresh at `now`.
///
/// A missing sync time is never fresh. Clock skew that puts `last_sync` in
/// the future is measured as an absolute distance.
pub fn should_use_cached_data(
    last_sync: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    threshold: Duration,
) -> bool {
    match last_sync {
        Some(last_sync) => (now - last_sync).abs() < threshold,
        None => false,
    }
}

/// Whether the whole dataset has outlived `retention`, judged by the oldest
/// account. An empty store has nothing to expire.
pub fn is_dataset_expired(
    oldest_created: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    retention: Duration,
) -> bool {
    match oldest_created {
        Some(created) => now - created > retention,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_inside_threshold() {
        let ttl = Duration::seconds(600);
        assert!(should_use_cached_data(
            Some(t0()),
            t0() + Duration::seconds(599),
            ttl
        ));
        assert!(should_use_cached_data(Some(t0()), t0(), ttl));
    }

    #[test]
    fn test_stale_at_threshold() {
        let ttl = Duration::seconds(600);
        assert!(!should_use_cached_data(
            Some(t0()),
            t0() + Duration::seconds(600),
            ttl
        ));
        assert!(!should_use_cached_data(
            Some(t0()),
            t0() + Duration::hours(5),
            ttl
        ));
    }

    #[test]
    fn test_never_synced_is_stale() {
        assert!(!should_use_cached_data(
            None,
            t0(),
            Duration::seconds(600)
        ));
    }

    #[test]
    fn test_sub_second_precision() {
        let ttl = Duration::seconds(600);
        let almost = t0() + Duration::seconds(599) + Duration::milliseconds(999);
        assert!(should_use_cached_data(Some(t0()), almost, ttl));
    }

    #[test]
    fn test_dataset_expiry() {
        let week = Duration::days(7);
        assert!(!is_dataset_expired(None, t0(), week));
        assert!(!is_dataset_expired(Some(t0()), t0() + Duration::days(7), week));
        assert!(is_dataset_expired(Some(t0()), t0() + Duration::days(8), week));
    }
}
