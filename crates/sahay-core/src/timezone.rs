use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Reference civil timezone for day boundaries when none is configured.
pub const DEFAULT_REFERENCE_TIME_ZONE: &str = "Asia/Kolkata";

pub fn normalize_time_zone(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    trimmed.parse::<Tz>().ok().map(|tz| tz.name().to_string())
}

pub fn parse_time_zone_or_default(value: &str) -> Tz {
    value
        .trim()
        .parse::<Tz>()
        .ok()
        .unwrap_or(chrono_tz::Asia::Kolkata)
}

/// Civil date of an instant in the reference timezone. Day boundaries are
/// always computed this way, never from host-local date functions.
pub fn civil_date(now_utc: DateTime<Utc>, reference_tz: Tz) -> NaiveDate {
    now_utc.with_timezone(&reference_tz).date_naive()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{DEFAULT_REFERENCE_TIME_ZONE, civil_date, normalize_time_zone, parse_time_zone_or_default};

    #[test]
    fn normalize_time_zone_accepts_valid_iana_name() {
        assert_eq!(
            normalize_time_zone("Asia/Kolkata"),
            Some("Asia/Kolkata".to_string())
        );
    }

    #[test]
    fn normalize_time_zone_rejects_invalid_values() {
        assert_eq!(normalize_time_zone(""), None);
        assert_eq!(normalize_time_zone("Mars/Olympus"), None);
    }

    #[test]
    fn invalid_zone_falls_back_to_reference_default() {
        let tz = parse_time_zone_or_default("not-a-time-zone");
        assert_eq!(tz.name(), DEFAULT_REFERENCE_TIME_ZONE);
    }

    #[test]
    fn civil_date_is_pinned_to_reference_zone_not_utc() {
        // 20:00 UTC is already the next day in Asia/Kolkata (UTC+05:30).
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 20, 0, 0)
            .single()
            .expect("valid utc datetime");

        let date = civil_date(now, chrono_tz::Asia::Kolkata);
        assert_eq!(date.to_string(), "2026-03-11");
    }

    #[test]
    fn instants_one_second_apart_can_fall_on_different_civil_days() {
        // 23:59:59 and 00:00:01 IST straddle the reference-day boundary.
        let before = Utc
            .with_ymd_and_hms(2026, 3, 10, 18, 29, 59)
            .single()
            .expect("valid utc datetime");
        let after = Utc
            .with_ymd_and_hms(2026, 3, 10, 18, 30, 1)
            .single()
            .expect("valid utc datetime");

        let tz = chrono_tz::Asia::Kolkata;
        assert_eq!(civil_date(before, tz).to_string(), "2026-03-10");
        assert_eq!(civil_date(after, tz).to_string(), "2026-03-11");
    }
}
