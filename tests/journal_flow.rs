use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};

use vent_journal::{
    AnalysisOutcome, AudioRef, Clock, DayKey, DayLedgerStore, DeleteOutcome, Enricher, EntryKind,
    FileStore, IntensityTier, Journal, KeyValueStore, LedgerStatus, ManualClock, MonthCursor,
    Shade, TierPolicy, Transcription,
};

struct OfflineEnricher;

#[async_trait]
impl Enricher for OfflineEnricher {
    async fn transcribe(&self, _audio: &AudioRef) -> Transcription {
        Transcription::network_failure()
    }

    async fn analyze(&self, entries: &[String]) -> AnalysisOutcome {
        if entries.is_empty() {
            AnalysisOutcome::NoEntries
        } else {
            AnalysisOutcome::Failed {
                error: "Failed to analyze entries. offline".into(),
            }
        }
    }
}

async fn journal_in(
    dir: &tempfile::TempDir,
    clock: Arc<ManualClock>,
) -> Journal<FileStore, OfflineEnricher> {
    let store = FileStore::open(dir.path()).await.unwrap();
    Journal::new(
        DayLedgerStore::new(store, clock),
        OfflineEnricher,
        TierPolicy::Fixed,
    )
}

#[tokio::test]
async fn entries_survive_reopening_and_feed_the_heatmap() {
    let dir = tempfile::tempdir().unwrap();
    let tz = FixedOffset::west_opt(5 * 3600).unwrap();
    // 23:30 local on the 14th is already the 15th in UTC.
    let clock = Arc::new(ManualClock::new(
        tz.with_ymd_and_hms(2024, 3, 14, 23, 30, 0).unwrap(),
    ));

    let journal = journal_in(&dir, clock.clone()).await;
    for text in ["coffee", "walk", "call mom"] {
        journal.save_text(text).await.unwrap();
        clock.advance_ms(60_000);
    }
    clock.advance_ms(3_600_000);
    journal.save_text("after midnight").await.unwrap();
    drop(journal);

    let journal = journal_in(&dir, clock.clone()).await;
    let fourteenth = DayKey::from_ymd(2024, 3, 14).unwrap();
    let fifteenth = DayKey::from_ymd(2024, 3, 15).unwrap();

    let ledger = journal.day(fourteenth).await;
    assert!(matches!(ledger.status, LedgerStatus::Intact));
    let bodies: Vec<_> = ledger.entries.iter().filter_map(|e| e.body()).collect();
    assert_eq!(bodies, ["call mom", "walk", "coffee"]);

    let view = journal
        .month_view(MonthCursor::new(2024, 2).unwrap())
        .await
        .unwrap();
    assert_eq!(view.days().len(), 31);
    assert_eq!(view.intensity_for(fourteenth), 3);
    assert_eq!(view.intensity_for(fifteenth), 1);
    assert_eq!(view.shade_for(fourteenth), Shade::Tier(IntensityTier::High));
    assert_eq!(view.shade_for(fifteenth), Shade::Tier(IntensityTier::Low));
    assert_eq!(view.selected(), Some(clock.today()));
}

#[tokio::test]
async fn deleting_the_last_entry_removes_the_day_file() {
    let dir = tempfile::tempdir().unwrap();
    let tz = FixedOffset::east_opt(0).unwrap();
    let clock = Arc::new(ManualClock::new(
        tz.with_ymd_and_hms(2025, 1, 2, 9, 0, 0).unwrap(),
    ));
    let journal = journal_in(&dir, clock.clone()).await;

    let entry = journal.save_text("only one").await.unwrap();
    let key = journal.ledger().storage_key(clock.today());
    assert!(journal.ledger().backend().get(&key).await.unwrap().is_some());

    let mut playback = vent_journal::PlaybackSlot::new(SilentPlayer);
    let outcome = journal
        .delete_entry(clock.today(), &entry, &mut playback)
        .await
        .unwrap();

    assert_eq!(outcome, DeleteOutcome::Removed { removed: 1, remaining: 0 });
    assert!(journal.ledger().backend().get(&key).await.unwrap().is_none());
    assert!(journal.today().await.is_empty());
}

#[tokio::test]
async fn corrupt_day_file_reads_as_empty_and_is_replaced_on_write() {
    let dir = tempfile::tempdir().unwrap();
    let tz = FixedOffset::east_opt(0).unwrap();
    let clock = Arc::new(ManualClock::new(
        tz.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let journal = journal_in(&dir, clock.clone()).await;
    let key = journal.ledger().storage_key(clock.today());
    std::fs::write(dir.path().join(format!("{key}.json")), "{not json").unwrap();

    let ledger = journal.today().await;
    assert!(ledger.is_empty());
    assert!(matches!(ledger.status, LedgerStatus::Corrupt(_)));

    journal.save_text("fresh start").await.unwrap();
    let ledger = journal.today().await;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.entries[0].kind(), EntryKind::Text);
}

#[tokio::test]
async fn analysis_of_an_empty_day_reports_no_entries() {
    let dir = tempfile::tempdir().unwrap();
    let tz = FixedOffset::east_opt(0).unwrap();
    let clock = Arc::new(ManualClock::new(
        tz.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
    ));
    let journal = journal_in(&dir, clock.clone()).await;

    let outcome = journal.analyze_day(clock.today()).await;
    assert_eq!(outcome, AnalysisOutcome::NoEntries);
    assert_eq!(outcome.error_message(), Some("No entries for today."));
}

struct SilentPlayer;

impl vent_journal::AudioSession for SilentPlayer {
    fn load_and_play(&mut self, _audio: &AudioRef) -> Result<(), vent_journal::error::PlaybackError> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn unload(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }
}
