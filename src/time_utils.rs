// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for clocks, operating hours and day buckets.
//!
//! All calendar math happens in the configured local zone: the operating
//! window, the day bucket used as the stats key and the collection windows
//! sent to the fleet API.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};

/// First local hour (inclusive) during which scheduled collection may run.
pub const OPERATING_START_HOUR: u32 = 6;
/// Local hour (exclusive) at which scheduled collection stops.
pub const OPERATING_END_HOUR: u32 = 23;

/// Source of "now" for everything time-dependent.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.now_ms
            .store(instant.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move forward by a duration.
    pub fn advance(&self, by: chrono::Duration) {
        self.now_ms
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms.load(Ordering::SeqCst)).unwrap_or_default()
    }
}

/// Query window for metrics and earnings plus the storage key of its day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionWindow {
    /// Window start, epoch seconds (fleet API).
    pub from_secs: i64,
    /// Window end, epoch seconds (fleet API).
    pub to_secs: i64,
    /// Local midnight of the window's day, epoch milliseconds (storage).
    pub day_bucket: i64,
}

/// Whether `now` falls inside the 06:00-23:00 local operating window.
pub fn within_operating_hours(now: DateTime<Utc>, tz: &Tz) -> bool {
    let hour = now.with_timezone(tz).hour();
    (OPERATING_START_HOUR..OPERATING_END_HOUR).contains(&hour)
}

/// First instant of `date` in `tz`.
///
/// If local midnight does not exist (DST gap), the earliest valid instant
/// of that date is used.
pub fn local_midnight(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let mut time = NaiveTime::MIN;
    for _ in 0..4 {
        if let Some(dt) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            return dt.with_timezone(&Utc);
        }
        time += chrono::Duration::minutes(30);
    }
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// Day bucket (local midnight, epoch ms) containing `now`.
pub fn day_bucket(now: DateTime<Utc>, tz: &Tz) -> i64 {
    local_midnight(now.with_timezone(tz).date_naive(), tz).timestamp_millis()
}

/// Compute the collection window for a run starting at `now`.
///
/// Returns `None` outside operating hours. A first run covers the whole
/// previous local day; later runs cover today from midnight up to `now`.
pub fn collection_window(now: DateTime<Utc>, tz: &Tz, is_first_run: bool) -> Option<CollectionWindow> {
    if !within_operating_hours(now, tz) {
        return None;
    }

    let today = now.with_timezone(tz).date_naive();
    let today_start = local_midnight(today, tz);

    if is_first_run {
        let yesterday = today.pred_opt()?;
        let yesterday_start = local_midnight(yesterday, tz);
        return Some(CollectionWindow {
            from_secs: yesterday_start.timestamp(),
            to_secs: today_start.timestamp() - 1,
            day_bucket: yesterday_start.timestamp_millis(),
        });
    }

    Some(CollectionWindow {
        from_secs: today_start.timestamp(),
        to_secs: now.timestamp(),
        day_bucket: today_start.timestamp_millis(),
    })
}

/// Parse the calendar-date part of a string (`YYYY-MM-DD[T...]`) as UTC midnight.
///
/// Malformed or impossible dates yield `None`.
pub fn parse_utc_calendar_date(raw: &str) -> Option<DateTime<Utc>> {
    let date_part = raw.trim().split('T').next()?;
    if date_part.len() != 10 {
        return None;
    }
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

/// Parse a loosely-typed upstream timestamp.
///
/// Accepts RFC 3339 strings, bare calendar dates and epoch milliseconds.
pub fn parse_instant(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| parse_utc_calendar_date(s)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Format an instant as the `YYYY-MM-DD` calendar date (UTC).
pub fn format_calendar_date(date: DateTime<Utc>) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Europe::Budapest;

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Budapest
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_operating_hours_boundaries() {
        assert!(!within_operating_hours(local(2025, 3, 10, 5, 59), &Budapest));
        assert!(within_operating_hours(local(2025, 3, 10, 6, 0), &Budapest));
        assert!(within_operating_hours(local(2025, 3, 10, 22, 59), &Budapest));
        assert!(!within_operating_hours(local(2025, 3, 10, 23, 0), &Budapest));
    }

    #[test]
    fn test_window_outside_hours_is_none() {
        assert!(collection_window(local(2025, 3, 10, 2, 0), &Budapest, false).is_none());
        assert!(collection_window(local(2025, 3, 10, 23, 30), &Budapest, true).is_none());
    }

    #[test]
    fn test_intraday_window() {
        let now = local(2025, 3, 10, 14, 30);
        let window = collection_window(now, &Budapest, false).unwrap();

        let midnight = local(2025, 3, 10, 0, 0);
        assert_eq!(window.from_secs, midnight.timestamp());
        assert_eq!(window.to_secs, now.timestamp());
        assert_eq!(window.day_bucket, midnight.timestamp_millis());
    }

    #[test]
    fn test_first_run_window_covers_previous_day() {
        let now = local(2025, 3, 10, 6, 0);
        let window = collection_window(now, &Budapest, true).unwrap();

        let yesterday = local(2025, 3, 9, 0, 0);
        let today = local(2025, 3, 10, 0, 0);
        assert_eq!(window.from_secs, yesterday.timestamp());
        assert_eq!(window.to_secs, today.timestamp() - 1);
        assert_eq!(window.day_bucket, yesterday.timestamp_millis());
    }

    #[test]
    fn test_first_run_window_across_dst_change() {
        // Europe switches to summer time on 2025-03-30; that day has 23 hours.
        let now = local(2025, 3, 31, 7, 0);
        let window = collection_window(now, &Budapest, true).unwrap();
        assert_eq!(window.to_secs - window.from_secs + 1, 23 * 3600);
    }

    #[test]
    fn test_day_bucket_uses_local_midnight() {
        // 23:30 UTC on the 9th is already the 10th in Budapest (UTC+1).
        let now = Utc.with_ymd_and_hms(2025, 3, 9, 23, 30, 0).unwrap();
        assert_eq!(
            day_bucket(now, &Budapest),
            local(2025, 3, 10, 0, 0).timestamp_millis()
        );
    }

    #[test]
    fn test_parse_utc_calendar_date() {
        let parsed = parse_utc_calendar_date("2024-02-29T10:11:12Z").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());

        assert!(parse_utc_calendar_date("2023-02-29").is_none());
        assert!(parse_utc_calendar_date("2024-13-01").is_none());
        assert!(parse_utc_calendar_date("not a date").is_none());
        assert!(parse_utc_calendar_date("").is_none());
    }

    #[test]
    fn test_parse_instant_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();

        assert_eq!(
            parse_instant(&serde_json::json!("2025-01-02T03:04:05Z")),
            Some(expected)
        );
        assert_eq!(
            parse_instant(&serde_json::json!(expected.timestamp_millis())),
            Some(expected)
        );
        assert!(parse_instant(&serde_json::json!("garbage")).is_none());
        assert!(parse_instant(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }
}
