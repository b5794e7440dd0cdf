// src/day_key.rs
//! Calendar day keys and the clocks that assign them.
//!
//! A day key is always the *local* calendar day of a timestamp, taken in the
//! clock's timezone. Slicing a UTC ISO string would move entries made near
//! midnight onto the neighbouring day, so that form is never used.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDate, TimeZone, Utc};

use crate::error::CalendarError;

/// A calendar day, rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayKey(NaiveDate);

impl DayKey {
    pub fn from_date(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn from_ymd(year: i32, month: u32, day: u32) -> Result<Self, CalendarError> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| CalendarError::InvalidDayKey(format!("{year:04}-{month:02}-{day:02}")))
    }

    /// Local calendar day of `timestamp_ms` in `tz`.
    pub fn from_timestamp_ms<Tz: TimeZone>(timestamp_ms: i64, tz: &Tz) -> Option<Self> {
        DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
            .map(|instant| Self(instant.with_timezone(tz).date_naive()))
    }

    pub fn date(self) -> NaiveDate {
        self.0
    }

    pub fn year(self) -> i32 {
        self.0.year()
    }

    /// Zero-based month (0 = January).
    pub fn month0(self) -> u32 {
        self.0.month0()
    }

    pub fn day(self) -> u32 {
        self.0.day()
    }

    pub fn succ(self) -> Option<Self> {
        self.0.succ_opt().map(Self)
    }

    /// Every day from `self` to `end`, both inclusive. Empty when `end` is
    /// before `self`.
    pub fn through(self, end: Self) -> impl Iterator<Item = DayKey> {
        self.0
            .iter_days()
            .take_while(move |date| *date <= end.0)
            .map(Self)
    }

    /// Storage key for this day's ledger, e.g. `notes-2024-02-29`.
    pub fn storage_key(self, prefix: &str) -> String {
        format!("{prefix}{self}")
    }

    /// Epoch milliseconds of local midnight at the start of this day in `tz`.
    pub fn start_ms<Tz: TimeZone>(self, tz: &Tz) -> Option<i64> {
        let midnight = self.0.and_hms_opt(0, 0, 0)?;
        tz.from_local_datetime(&midnight)
            .earliest()
            .map(|start| start.timestamp_millis())
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DayKey {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Self)
            .map_err(|_| CalendarError::InvalidDayKey(s.to_string()))
    }
}

impl From<NaiveDate> for DayKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

/// Source of "now" and of the timezone used to bucket entries by day.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;

    /// Day key of `timestamp_ms` in this clock's timezone.
    fn day_of(&self, timestamp_ms: i64) -> Option<DayKey>;

    /// Epoch milliseconds of the first instant of `day`.
    fn start_of_day_ms(&self, day: DayKey) -> Option<i64>;

    fn today(&self) -> DayKey;
}

/// Wall clock in the device's local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }

    fn day_of(&self, timestamp_ms: i64) -> Option<DayKey> {
        DayKey::from_timestamp_ms(timestamp_ms, &Local)
    }

    fn start_of_day_ms(&self, day: DayKey) -> Option<i64> {
        day.start_ms(&Local)
    }

    fn today(&self) -> DayKey {
        DayKey(Local::now().date_naive())
    }
}

/// A clock that only moves when told to, pinned to a fixed UTC offset.
#[derive(Debug)]
pub struct ManualClock {
    now_ms: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        Self {
            now_ms: AtomicI64::new(now.timestamp_millis()),
            offset: *now.offset(),
        }
    }

    pub fn set_ms(&self, timestamp_ms: i64) {
        self.now_ms.store(timestamp_ms, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn day_of(&self, timestamp_ms: i64) -> Option<DayKey> {
        DayKey::from_timestamp_ms(timestamp_ms, &self.offset)
    }

    fn start_of_day_ms(&self, day: DayKey) -> Option<i64> {
        day.start_ms(&self.offset)
    }

    fn today(&self) -> DayKey {
        self.day_of(self.now_ms())
            .unwrap_or_else(|| DayKey(NaiveDate::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offset(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    #[test]
    fn formats_and_parses_round_trip() {
        let key: DayKey = "2024-02-29".parse().unwrap();
        assert_eq!(key.to_string(), "2024-02-29");
        assert_eq!(key.year(), 2024);
        assert_eq!(key.month0(), 1);
        assert_eq!(key.day(), 29);
        assert_eq!(key.storage_key("notes-"), "notes-2024-02-29");
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!("2023-02-29".parse::<DayKey>().is_err());
        assert!("yesterday".parse::<DayKey>().is_err());
    }

    #[test]
    fn day_follows_local_calendar_not_utc() {
        // 2024-03-10 23:30 at UTC+02:00 is still 21:30 UTC on the 10th,
        // while 00:30 local on the 11th is 22:30 UTC on the 10th.
        let tz = offset(2);
        let late = tz.with_ymd_and_hms(2024, 3, 10, 23, 30, 0).unwrap();
        let after_midnight = tz.with_ymd_and_hms(2024, 3, 11, 0, 30, 0).unwrap();

        let late_key = DayKey::from_timestamp_ms(late.timestamp_millis(), &tz).unwrap();
        let next_key =
            DayKey::from_timestamp_ms(after_midnight.timestamp_millis(), &tz).unwrap();

        assert_eq!(late_key.to_string(), "2024-03-10");
        assert_eq!(next_key.to_string(), "2024-03-11");
        assert_eq!(
            DayKey::from_timestamp_ms(after_midnight.timestamp_millis(), &Utc)
                .unwrap()
                .to_string(),
            "2024-03-10"
        );
    }

    #[test]
    fn through_is_inclusive_and_empty_when_inverted() {
        let start: DayKey = "2024-02-27".parse().unwrap();
        let end: DayKey = "2024-03-01".parse().unwrap();

        let days: Vec<String> = start.through(end).map(|d| d.to_string()).collect();
        assert_eq!(days, ["2024-02-27", "2024-02-28", "2024-02-29", "2024-03-01"]);
        assert_eq!(end.through(start).count(), 0);
    }

    #[test]
    fn manual_clock_reports_its_own_day() {
        let tz = offset(-5);
        let clock = ManualClock::new(tz.with_ymd_and_hms(2024, 1, 31, 22, 0, 0).unwrap());
        assert_eq!(clock.today().to_string(), "2024-01-31");

        clock.advance_ms(3 * 3600 * 1000);
        assert_eq!(clock.today().to_string(), "2024-02-01");

        let start = clock.start_of_day_ms(clock.today()).unwrap();
        assert_eq!(
            start,
            tz.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap().timestamp_millis()
        );
    }
}
