// src/error.rs
//! Error types shared by the journal modules.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` with context.

use thiserror::Error;

use crate::day_key::DayKey;

/// Entry construction or decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("text entry is empty")]
    EmptyText,
    #[error("voice entry has no audio reference")]
    MissingAudio,
    #[error("{kind} entry must not carry `{field}`")]
    StrayField {
        kind: &'static str,
        field: &'static str,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("month index {0} is out of range (expected 0..=11)")]
    InvalidMonth(u32),
    #[error("{year}-{month:02} is outside the supported calendar range")]
    UnrepresentableMonth { year: i32, month: u32 },
    #[error("invalid day key `{0}` (expected YYYY-MM-DD)")]
    InvalidDayKey(String),
    #[error("{day} is not part of {month}")]
    OutsideMonth { day: DayKey, month: String },
}

/// Key-value backend failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage key `{0}` is not allowed")]
    InvalidKey(String),
    #[error("failed to {op} `{key}`")]
    Io {
        op: &'static str,
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Why a stored ledger value was treated as empty.
#[derive(Debug, Error)]
pub enum StorageDecodeError {
    #[error("stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stored value is not a JSON array")]
    NotAnArray,
    #[error("stored value could not be read: {0}")]
    Unreadable(String),
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("failed to encode ledger for {day}")]
    Encode {
        day: DayKey,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("microphone access was denied")]
    PermissionDenied,
    #[error("no audio input device available")]
    NoInputDevice,
    #[error("audio capture failed: {0}")]
    Capture(String),
    #[error("audio file error")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("`{0}` is not a local audio file")]
    NotLocal(String),
    #[error("cannot open `{path}`")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode audio: {0}")]
    Decode(String),
}

/// Everything a journal operation can fail with.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Entry(#[from] EntryError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Recording(#[from] RecordingError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
