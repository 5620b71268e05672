//! Period keyer — maps timestamps to week/month keys in a fixed local timezone.
//!
//! Pure and deterministic. Every rollover decision elsewhere (lazy counter
//! rollover, weekly reset guard, retention pruning) compares keys produced
//! here, so the same timestamp must always yield the same key.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

static ISO_WEEK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-W\d{2}$").expect("valid regex"));
static DATE_WEEK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Clock fixed to a workspace-local UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct PeriodClock {
    offset: FixedOffset,
}

impl Default for PeriodClock {
    fn default() -> Self {
        // UTC+9, the deployment default.
        Self::from_offset_hours(9)
    }
}

impl PeriodClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Build a clock from a whole-hour UTC offset. Out-of-range offsets
    /// fall back to UTC.
    pub fn from_offset_hours(hours: i32) -> Self {
        let offset = FixedOffset::east_opt(hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self { offset }
    }

    /// ISO week key, `YYYY-Www`, in the workspace-local timezone.
    pub fn week_key(&self, t: DateTime<Utc>) -> String {
        let iso = t.with_timezone(&self.offset).iso_week();
        format!("{:04}-W{:02}", iso.year(), iso.week())
    }

    /// Month key, `YYYY-MM`, in the workspace-local timezone.
    pub fn month_key(&self, t: DateTime<Utc>) -> String {
        let local = t.with_timezone(&self.offset);
        format!("{:04}-{:02}", local.year(), local.month())
    }

    /// Oldest week key to retain when keeping `weeks_to_keep` weeks of
    /// history. Keeping one week (or fewer) means keeping only the current
    /// week.
    pub fn min_week_key_to_keep(&self, now: DateTime<Utc>, weeks_to_keep: u32) -> String {
        if weeks_to_keep <= 1 {
            return self.week_key(now);
        }
        self.week_key(now - Duration::weeks(i64::from(weeks_to_keep) - 1))
    }

    /// Accepts a `YYYY-Www` key as-is, re-keys a bare `YYYY-MM-DD` date to
    /// its ISO week, and rejects anything else.
    pub fn normalize_week_key(&self, value: &str) -> Option<String> {
        let key = value.trim();
        if key.is_empty() {
            return None;
        }
        if ISO_WEEK_PATTERN.is_match(key) {
            return Some(key.to_string());
        }
        if DATE_WEEK_PATTERN.is_match(key) {
            let date = NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()?;
            let iso = date.iso_week();
            return Some(format!("{:04}-W{:02}", iso.year(), iso.week()));
        }
        None
    }

    /// Day of month (1-31) in the workspace-local timezone. Gates the
    /// eager monthly reset.
    pub fn local_day_of_month(&self, t: DateTime<Utc>) -> u32 {
        t.with_timezone(&self.offset).day()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn week_key_uses_iso_week_in_local_tz() {
        let clock = PeriodClock::from_offset_hours(9);
        // 2024-01-01 is a Monday, ISO week 1.
        assert_eq!(clock.week_key(utc(2024, 1, 1, 0, 0)), "2024-W01");
        // 2023-12-31 23:00 UTC is already 2024-01-01 08:00 local.
        assert_eq!(clock.week_key(utc(2023, 12, 31, 23, 0)), "2024-W01");
        // ISO year differs from calendar year at the boundary:
        // 2021-01-01 falls in 2020-W53.
        assert_eq!(clock.week_key(utc(2021, 1, 1, 0, 0)), "2020-W53");
    }

    #[test]
    fn month_key_respects_local_offset() {
        let clock = PeriodClock::from_offset_hours(9);
        assert_eq!(clock.month_key(utc(2024, 3, 15, 12, 0)), "2024-03");
        // 15:30 UTC on the last day of the month is the 1st locally.
        assert_eq!(clock.month_key(utc(2024, 3, 31, 15, 30)), "2024-04");
    }

    #[test]
    fn min_week_key_spans_backwards() {
        let clock = PeriodClock::from_offset_hours(9);
        let now = utc(2024, 6, 10, 0, 0); // 2024-W24
        assert_eq!(clock.min_week_key_to_keep(now, 1), "2024-W24");
        assert_eq!(clock.min_week_key_to_keep(now, 0), "2024-W24");
        assert_eq!(clock.min_week_key_to_keep(now, 12), "2024-W13");
    }

    #[test]
    fn normalize_accepts_keys_and_dates() {
        let clock = PeriodClock::default();
        assert_eq!(
            clock.normalize_week_key("2024-W09").as_deref(),
            Some("2024-W09")
        );
        assert_eq!(
            clock.normalize_week_key("2024-02-26").as_deref(),
            Some("2024-W09")
        );
        assert_eq!(clock.normalize_week_key(""), None);
        assert_eq!(clock.normalize_week_key("garbage"), None);
        assert_eq!(clock.normalize_week_key("2024/02/26"), None);
    }

    #[test]
    fn local_day_gates_on_offset() {
        let clock = PeriodClock::from_offset_hours(9);
        assert_eq!(clock.local_day_of_month(utc(2024, 3, 31, 16, 0)), 1);
        assert_eq!(clock.local_day_of_month(utc(2024, 3, 31, 14, 0)), 31);
    }
}
