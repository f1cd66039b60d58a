//! Small shared helpers: UTC timestamps in the wire format the platform's
//! records use everywhere (`timestamp`, `created_at`, `assigned_at`, ...).

use chrono::{DateTime, Utc};

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339()
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn parse_iso(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Max of two optional ISO-8601 timestamps, used by the feature store's
/// freshness calculation across the six families.
pub fn max_iso(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a.and_then(parse_iso), b.and_then(parse_iso)) {
        (Some(a), Some(b)) => Some(if a >= b { a } else { b }.to_rfc3339()),
        (Some(a), None) => Some(a.to_rfc3339()),
        (None, Some(b)) => Some(b.to_rfc3339()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_iso_picks_the_later_timestamp() {
        let earlier = "2024-01-01T00:00:00Z";
        let later = "2024-06-01T00:00:00Z";
        let result = max_iso(Some(earlier), Some(later)).unwrap();
        assert_eq!(parse_iso(&result), parse_iso(later));
    }

    #[test]
    fn max_iso_tolerates_missing_values() {
        assert_eq!(max_iso(None, None), None);
        assert!(max_iso(Some("2024-01-01T00:00:00Z"), None).is_some());
    }
}
