// src/journal.rs
//! Journal operations: the flows behind "save", "stop recording", "delete"
//! and the heatmap.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};

use log::{info, warn};

use crate::aggregate::{EntryAggregator, MonthCursor, MonthView, TierPolicy};
use crate::day_key::DayKey;
use crate::enrichment::{AnalysisOutcome, Enricher};
use crate::entry::{AudioRef, EntryRecord};
use crate::error::JournalError;
use crate::ledger::{DayLedger, DayLedgerStore, DeleteOutcome};
use crate::playback::{AudioSession, PlaybackSlot};
use crate::recording::{CaptureDevice, RecordingSessionManager};
use crate::storage::KeyValueStore;

pub struct Journal<S, E> {
    ledger: DayLedgerStore<S>,
    enricher: E,
    tier_policy: TierPolicy,
    /// Recordings are only ever deleted from inside this directory.
    audio_dir: Option<PathBuf>,
    last_timestamp: AtomicI64,
}

impl<S: KeyValueStore, E: Enricher> Journal<S, E> {
    pub fn new(ledger: DayLedgerStore<S>, enricher: E, tier_policy: TierPolicy) -> Self {
        Self {
            ledger,
            enricher,
            tier_policy,
            audio_dir: None,
            last_timestamp: AtomicI64::new(i64::MIN),
        }
    }

    /// Lets `delete_entry` remove recordings that live under `dir`. Without
    /// it, deleting a voice entry leaves every audio file in place.
    pub fn with_audio_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audio_dir = Some(dir.into());
        self
    }

    pub fn audio_dir(&self) -> Option<&Path> {
        self.audio_dir.as_deref()
    }

    pub fn ledger(&self) -> &DayLedgerStore<S> {
        &self.ledger
    }

    pub fn enricher(&self) -> &E {
        &self.enricher
    }

    pub fn tier_policy(&self) -> TierPolicy {
        self.tier_policy
    }

    /// Current time, never earlier than a timestamp already handed out.
    fn next_timestamp(&self) -> i64 {
        let now = self.ledger.clock().now_ms();
        let previous = self.last_timestamp.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }

    fn day_of(&self, timestamp: i64) -> DayKey {
        let clock = self.ledger.clock();
        clock.day_of(timestamp).unwrap_or_else(|| clock.today())
    }

    async fn append_now(&self, entry: EntryRecord) -> Result<EntryRecord, JournalError> {
        let day = self.day_of(entry.timestamp());
        self.ledger.append(day, entry.clone()).await?;
        Ok(entry)
    }

    pub async fn save_text(&self, text: &str) -> Result<EntryRecord, JournalError> {
        let entry = EntryRecord::text(self.next_timestamp(), text)?;
        let entry = self.append_now(entry).await?;
        info!("Saved text entry at {}", entry.timestamp());
        Ok(entry)
    }

    /// Stops the recording, transcribes it and stores it as a voice entry.
    /// A failed transcription stores a placeholder instead of dropping the
    /// entry. Returns `None` when nothing was being recorded.
    pub async fn finish_recording<D: CaptureDevice>(
        &self,
        session: &mut RecordingSessionManager<D>,
    ) -> Result<Option<EntryRecord>, JournalError> {
        let Some(audio) = session.stop()? else {
            return Ok(None);
        };
        session.reset();
        // Filed under the moment recording stopped, however long
        // transcription takes.
        let timestamp = self.next_timestamp();

        let transcription = self.enricher.transcribe(&audio).await;
        if transcription.is_placeholder() {
            warn!("Storing {audio} with placeholder transcription");
        }

        let entry = EntryRecord::voice(timestamp, audio, Some(transcription.into_text()));
        let entry = self.append_now(entry).await?;
        info!("Saved voice entry at {}", entry.timestamp());
        Ok(Some(entry))
    }

    /// Deletes `entry` from `day`. Its recording stops playing first. Once
    /// the record is gone, the audio file is removed too if it sits in the
    /// audio directory and no other entry of that day still points at it.
    pub async fn delete_entry<P: AudioSession>(
        &self,
        day: DayKey,
        entry: &EntryRecord,
        playback: &mut PlaybackSlot<P>,
    ) -> Result<DeleteOutcome, JournalError> {
        if let Some(audio) = entry.audio_ref() {
            playback.stop_if_loaded(audio);
        }

        let outcome = self.ledger.delete(day, entry).await?;
        if let (DeleteOutcome::Removed { remaining, .. }, Some(audio)) =
            (outcome, entry.audio_ref())
        {
            let shared = remaining > 0
                && self
                    .ledger
                    .read_day(day)
                    .await
                    .entries
                    .iter()
                    .any(|other| other.audio_ref() == Some(audio));
            if shared {
                info!("Keeping {audio}; another entry still uses it");
            } else if let Some(dir) = &self.audio_dir {
                remove_recording(dir, audio).await;
            }
        }
        Ok(outcome)
    }

    /// Today's entries, newest first. Records stamped before local midnight
    /// are left out even if they were filed under today's key.
    pub async fn today(&self) -> DayLedger {
        let mut ledger = self.ledger.read_today().await;
        if let Some(start) = self.ledger.clock().start_of_day_ms(ledger.day) {
            ledger.entries.retain(|entry| entry.timestamp() >= start);
        }
        ledger
    }

    pub async fn day(&self, day: DayKey) -> DayLedger {
        self.ledger.read_day(day).await
    }

    /// Sends the day's text and transcriptions, newest first, for analysis.
    pub async fn analyze_day(&self, day: DayKey) -> AnalysisOutcome {
        let ledger = self.ledger.read_day(day).await;
        let texts: Vec<String> = ledger
            .entries
            .iter()
            .filter_map(EntryRecord::body)
            .filter(|body| !body.is_empty())
            .map(str::to_string)
            .collect();
        self.enricher.analyze(&texts).await
    }

    pub async fn month_view(&self, cursor: MonthCursor) -> Result<MonthView, JournalError> {
        let view = EntryAggregator::new(&self.ledger, self.tier_policy)
            .load_month(cursor)
            .await?;
        Ok(view)
    }
}

/// Resolves `audio` to a file under `audio_dir`, if it is one.
async fn owned_recording(audio_dir: &Path, audio: &AudioRef) -> Option<PathBuf> {
    let path = audio.local_path()?;
    let dir = tokio::fs::canonicalize(audio_dir).await.ok()?;
    let path = tokio::fs::canonicalize(&path).await.ok()?;
    (path.starts_with(&dir) && path != dir).then_some(path)
}

async fn remove_recording(audio_dir: &Path, audio: &AudioRef) {
    let Some(path) = owned_recording(audio_dir, audio).await else {
        warn!("Not removing {audio}: missing or outside {}", audio_dir.display());
        return;
    };
    match tokio::fs::remove_file(&path).await {
        Ok(()) => info!("Removed recording {}", path.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!("Could not remove recording {}: {err}", path.display()),
    }
}
