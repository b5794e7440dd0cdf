// src/aggregate.rs
//! Month views over the day ledger: day grids, per-day counts and heatmap
//! shading.
//!
//! Months are zero-based throughout (0 = January), so `month_grid(2024, 1)`
//! is February 2024.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::day_key::DayKey;
use crate::entry::EntryRecord;
use crate::error::CalendarError;
use crate::ledger::{DayLedger, DayLedgerStore};
use crate::storage::KeyValueStore;

/// How entry counts map to heatmap shading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierPolicy {
    /// 0 → empty, 1..=2 → low, more → high.
    #[default]
    Fixed,
    /// count / busiest day of the displayed month.
    Relative,
}

impl FromStr for TierPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(TierPolicy::Fixed),
            "relative" => Ok(TierPolicy::Relative),
            other => Err(format!("unknown tier policy `{other}` (expected fixed or relative)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntensityTier {
    Empty,
    Low,
    High,
}

impl IntensityTier {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => IntensityTier::Empty,
            1..=2 => IntensityTier::Low,
            _ => IntensityTier::High,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shade {
    Tier(IntensityTier),
    /// In `0.0..=1.0`.
    Scale(f32),
}

impl Shade {
    pub fn for_count(policy: TierPolicy, count: usize, busiest: usize) -> Self {
        match policy {
            TierPolicy::Fixed => Shade::Tier(IntensityTier::for_count(count)),
            TierPolicy::Relative if busiest == 0 => Shade::Scale(0.0),
            TierPolicy::Relative => Shade::Scale(count.min(busiest) as f32 / busiest as f32),
        }
    }
}

/// A displayed year and zero-based month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonthCursor {
    year: i32,
    month0: u32,
}

impl MonthCursor {
    pub fn new(year: i32, month0: u32) -> Result<Self, CalendarError> {
        if month0 > 11 {
            return Err(CalendarError::InvalidMonth(month0));
        }
        NaiveDate::from_ymd_opt(year, month0 + 1, 1).ok_or(CalendarError::UnrepresentableMonth {
            year,
            month: month0 + 1,
        })?;
        Ok(Self { year, month0 })
    }

    pub fn containing(day: DayKey) -> Self {
        Self {
            year: day.year(),
            month0: day.month0(),
        }
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month0(self) -> u32 {
        self.month0
    }

    pub fn previous(self) -> Self {
        if self.month0 == 0 {
            Self {
                year: self.year - 1,
                month0: 11,
            }
        } else {
            Self {
                year: self.year,
                month0: self.month0 - 1,
            }
        }
    }

    pub fn next(self) -> Self {
        if self.month0 == 11 {
            Self {
                year: self.year + 1,
                month0: 0,
            }
        } else {
            Self {
                year: self.year,
                month0: self.month0 + 1,
            }
        }
    }

    pub fn contains(self, day: DayKey) -> bool {
        day.year() == self.year && day.month0() == self.month0
    }

    pub fn days(self) -> Result<Vec<DayKey>, CalendarError> {
        month_grid(self.year, self.month0)
    }
}

impl fmt::Display for MonthCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month0 + 1)
    }
}

/// Every day of the month in order, 1 through the month's length.
pub fn month_grid(year: i32, month0: u32) -> Result<Vec<DayKey>, CalendarError> {
    if month0 > 11 {
        return Err(CalendarError::InvalidMonth(month0));
    }
    let month = month0 + 1;
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or(CalendarError::UnrepresentableMonth { year, month })?;
    Ok(first
        .iter_days()
        .take_while(|date| date.month() == month)
        .map(DayKey::from_date)
        .collect())
}

/// Today when it falls in the displayed month, otherwise nothing.
pub fn default_selection(cursor: MonthCursor, today: DayKey) -> Option<DayKey> {
    cursor.contains(today).then_some(today)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DayCell {
    pub day: DayKey,
    pub count: usize,
    pub shade: Shade,
}

/// One loaded month: which days exist, what they hold, which one is selected.
#[derive(Debug, Clone)]
pub struct MonthView {
    cursor: MonthCursor,
    policy: TierPolicy,
    days: Vec<DayKey>,
    entries: BTreeMap<DayKey, Vec<EntryRecord>>,
    selected: Option<DayKey>,
}

impl MonthView {
    /// Builds the view from per-day ledgers. Days outside the month and empty
    /// days are not kept.
    pub fn from_ledgers(
        cursor: MonthCursor,
        policy: TierPolicy,
        ledgers: Vec<DayLedger>,
        today: DayKey,
    ) -> Result<Self, CalendarError> {
        let days = cursor.days()?;
        let entries = ledgers
            .into_iter()
            .filter(|ledger| cursor.contains(ledger.day) && !ledger.is_empty())
            .map(|ledger| (ledger.day, ledger.entries))
            .collect();
        Ok(Self {
            cursor,
            policy,
            days,
            entries,
            selected: default_selection(cursor, today),
        })
    }

    pub fn cursor(&self) -> MonthCursor {
        self.cursor
    }

    pub fn policy(&self) -> TierPolicy {
        self.policy
    }

    pub fn days(&self) -> &[DayKey] {
        &self.days
    }

    /// Number of entries on `day`, 0 if none.
    pub fn intensity_for(&self, day: DayKey) -> usize {
        self.entries.get(&day).map_or(0, Vec::len)
    }

    pub fn busiest_count(&self) -> usize {
        self.entries.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn shade_for(&self, day: DayKey) -> Shade {
        Shade::for_count(self.policy, self.intensity_for(day), self.busiest_count())
    }

    pub fn cells(&self) -> Vec<DayCell> {
        let busiest = self.busiest_count();
        self.days
            .iter()
            .map(|&day| {
                let count = self.intensity_for(day);
                DayCell {
                    day,
                    count,
                    shade: Shade::for_count(self.policy, count, busiest),
                }
            })
            .collect()
    }

    pub fn total_entries(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn selected(&self) -> Option<DayKey> {
        self.selected
    }

    pub fn select_day(&mut self, day: DayKey) -> Result<(), CalendarError> {
        if !self.cursor.contains(day) {
            return Err(CalendarError::OutsideMonth {
                day,
                month: self.cursor.to_string(),
            });
        }
        self.selected = Some(day);
        Ok(())
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Entries of `day`, newest first.
    pub fn entries_for(&self, day: DayKey) -> &[EntryRecord] {
        self.entries.get(&day).map_or(&[][..], Vec::as_slice)
    }

    pub fn selected_entries(&self) -> &[EntryRecord] {
        self.selected.map_or(&[][..], |day| self.entries_for(day))
    }

    /// Drops `entry` from the loaded state after it was deleted from storage.
    pub fn forget_entry(&mut self, day: DayKey, entry: &EntryRecord) {
        if let Some(entries) = self.entries.get_mut(&day) {
            entries.retain(|candidate| !candidate.is_same_entry(entry));
            if entries.is_empty() {
                self.entries.remove(&day);
            }
        }
    }
}

/// Loads month views from a ledger store.
pub struct EntryAggregator<'a, S> {
    store: &'a DayLedgerStore<S>,
    policy: TierPolicy,
}

impl<'a, S: KeyValueStore> EntryAggregator<'a, S> {
    pub fn new(store: &'a DayLedgerStore<S>, policy: TierPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn load_month(&self, cursor: MonthCursor) -> Result<MonthView, CalendarError> {
        let days = cursor.days()?;
        let ledgers = match (days.first(), days.last()) {
            (Some(&first), Some(&last)) => self.store.read_range(first, last).await,
            _ => Vec::new(),
        };
        MonthView::from_ledgers(cursor, self.policy, ledgers, self.store.clock().today())
    }

    /// Entry count for a single day, read straight from storage.
    pub async fn intensity_for(&self, day: DayKey) -> usize {
        self.store.read_day(day).await.len()
    }
}
