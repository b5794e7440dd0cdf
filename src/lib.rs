// src/lib.rs
//! Vent: a daily journal of typed and spoken entries.
//!
//! Entries are filed under the local calendar day they were created on, one
//! ledger per day, newest first. Voice entries keep a reference to their
//! recording plus a transcription fetched from a remote service.

pub mod aggregate;
pub mod config;
pub mod day_key;
pub mod enrichment;
pub mod entry;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod playback;
pub mod recording;
pub mod storage;

pub use aggregate::{EntryAggregator, IntensityTier, MonthCursor, MonthView, Shade, TierPolicy};
pub use config::Config;
pub use day_key::{Clock, DayKey, ManualClock, SystemClock};
pub use enrichment::{AnalysisOutcome, AnalysisReport, Enricher, HttpEnricher, Transcription};
pub use entry::{AudioRef, EntryKind, EntryRecord};
pub use error::JournalError;
pub use journal::Journal;
pub use ledger::{DayLedger, DayLedgerStore, DeleteOutcome, LedgerStatus};
pub use playback::{AudioSession, PlaybackSlot, RodioPlayer};
pub use recording::{CaptureDevice, CpalCapture, RecordingSessionManager, SessionPhase};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
