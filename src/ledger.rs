// src/ledger.rs
//! Day ledger store: entry lists persisted per calendar day.
//!
//! Each day lives under one storage key as a JSON array of entries. Reads
//! never fail: a missing, unreadable or malformed value reads as an empty
//! ledger, and the returned [`LedgerStatus`] records which fallback was
//! taken. Entries are returned newest first; storage order is append order.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::day_key::{Clock, DayKey};
use crate::entry::EntryRecord;
use crate::error::{LedgerError, StorageDecodeError};
use crate::storage::KeyValueStore;

/// Default storage key prefix, giving keys like `notes-2024-02-29`.
pub const DEFAULT_KEY_PREFIX: &str = "notes-";

/// How a day's stored value was interpreted.
#[derive(Debug)]
pub enum LedgerStatus {
    /// Nothing stored for the day.
    Missing,
    /// Every stored record decoded.
    Intact,
    /// Some records were invalid and skipped.
    Recovered { dropped: usize },
    /// The value was unusable and read as an empty ledger.
    Corrupt(StorageDecodeError),
}

impl LedgerStatus {
    /// True when data on disk was ignored to produce this read.
    pub fn fell_back(&self) -> bool {
        matches!(self, LedgerStatus::Recovered { .. } | LedgerStatus::Corrupt(_))
    }
}

#[derive(Debug)]
pub struct DayLedger {
    pub day: DayKey,
    /// Newest first.
    pub entries: Vec<EntryRecord>,
    pub status: LedgerStatus,
}

impl DayLedger {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// `remaining == 0` means the day's key was removed.
    Removed { removed: usize, remaining: usize },
    /// No stored entry matched; storage was left untouched.
    NotFound,
}

/// Decodes a stored ledger value, falling back to an empty list.
pub fn decode_ledger(raw: Option<&str>) -> (Vec<EntryRecord>, LedgerStatus) {
    let Some(raw) = raw else {
        return (Vec::new(), LedgerStatus::Missing);
    };

    let items = match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(_) => return (Vec::new(), LedgerStatus::Corrupt(StorageDecodeError::NotAnArray)),
        Err(err) => return (Vec::new(), LedgerStatus::Corrupt(err.into())),
    };

    let total = items.len();
    let entries: Vec<EntryRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();

    let dropped = total - entries.len();
    let status = if dropped == 0 {
        LedgerStatus::Intact
    } else {
        LedgerStatus::Recovered { dropped }
    };
    (entries, status)
}

pub fn encode_ledger(entries: &[EntryRecord]) -> serde_json::Result<String> {
    serde_json::to_string(entries)
}

/// Newest first. Ties keep their stored order.
pub fn sort_for_display(entries: &mut [EntryRecord]) {
    entries.sort_by_key(|entry| Reverse(entry.timestamp()));
}

/// Durable mapping from day key to that day's entries.
///
/// `append` and `delete` are read-modify-write cycles. Within one store
/// instance they are serialized per day, so overlapping callers never drop
/// each other's writes. Separate processes sharing a backend remain
/// last-write-wins.
pub struct DayLedgerStore<S> {
    backend: S,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    day_locks: Mutex<HashMap<DayKey, Arc<Mutex<()>>>>,
}

impl<S: KeyValueStore> DayLedgerStore<S> {
    pub fn new(backend: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            day_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn storage_key(&self, day: DayKey) -> String {
        day.storage_key(&self.key_prefix)
    }

    async fn lock_day(&self, day: DayKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.day_locks.lock().await;
            Arc::clone(locks.entry(day).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry for `day` once nobody holds or waits on it.
    async fn release_day(&self, day: DayKey, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut locks = self.day_locks.lock().await;
        if locks
            .get(&day)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&day);
        }
    }

    #[cfg(test)]
    async fn tracked_days(&self) -> usize {
        self.day_locks.lock().await.len()
    }

    /// Stored entries in storage order.
    async fn load(&self, day: DayKey) -> (Vec<EntryRecord>, LedgerStatus) {
        let key = self.storage_key(day);
        let (entries, status) = match self.backend.get(&key).await {
            Ok(raw) => decode_ledger(raw.as_deref()),
            Err(err) => (
                Vec::new(),
                LedgerStatus::Corrupt(StorageDecodeError::Unreadable(err.to_string())),
            ),
        };
        match &status {
            LedgerStatus::Corrupt(err) => warn!("Ledger {key} unusable, reading as empty: {err}"),
            LedgerStatus::Recovered { dropped } => {
                warn!("Ledger {key}: skipped {dropped} invalid record(s)")
            }
            LedgerStatus::Missing | LedgerStatus::Intact => {}
        }
        (entries, status)
    }

    async fn write(&self, day: DayKey, entries: &[EntryRecord]) -> Result<(), LedgerError> {
        let key = self.storage_key(day);
        if entries.is_empty() {
            self.backend.remove(&key).await?;
            return Ok(());
        }
        let value = encode_ledger(entries).map_err(|source| LedgerError::Encode { day, source })?;
        self.backend.set(&key, &value).await?;
        Ok(())
    }

    pub async fn read_day(&self, day: DayKey) -> DayLedger {
        let (mut entries, status) = self.load(day).await;
        sort_for_display(&mut entries);
        DayLedger {
            day,
            entries,
            status,
        }
    }

    pub async fn read_today(&self) -> DayLedger {
        self.read_day(self.clock.today()).await
    }

    /// Reads every day from `start` through `end` inclusive, one at a time.
    /// Days that fail to decode come back empty rather than failing the range.
    pub async fn read_range(&self, start: DayKey, end: DayKey) -> Vec<DayLedger> {
        let mut ledgers = Vec::new();
        for day in start.through(end) {
            ledgers.push(self.read_day(day).await);
        }
        ledgers
    }

    pub async fn append(&self, day: DayKey, entry: EntryRecord) -> Result<(), LedgerError> {
        let guard = self.lock_day(day).await;
        let result = self.append_locked(day, entry).await;
        self.release_day(day, guard).await;
        result
    }

    async fn append_locked(&self, day: DayKey, entry: EntryRecord) -> Result<(), LedgerError> {
        let (mut entries, _) = self.load(day).await;
        entries.push(entry);
        self.write(day, &entries).await?;
        debug!("Appended entry to {day} ({} total)", entries.len());
        Ok(())
    }

    /// Removes every stored entry with the same identity as `target`.
    pub async fn delete(
        &self,
        day: DayKey,
        target: &EntryRecord,
    ) -> Result<DeleteOutcome, LedgerError> {
        let guard = self.lock_day(day).await;
        let result = self.delete_locked(day, target).await;
        self.release_day(day, guard).await;
        result
    }

    async fn delete_locked(
        &self,
        day: DayKey,
        target: &EntryRecord,
    ) -> Result<DeleteOutcome, LedgerError> {
        let (mut entries, _) = self.load(day).await;
        let before = entries.len();
        entries.retain(|entry| !entry.is_same_entry(target));
        let removed = before - entries.len();
        if removed == 0 {
            return Ok(DeleteOutcome::NotFound);
        }
        self.write(day, &entries).await?;
        debug!("Deleted {removed} entry(s) from {day}, {} left", entries.len());
        Ok(DeleteOutcome::Removed {
            removed,
            remaining: entries.len(),
        })
    }
}
