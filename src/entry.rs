// src/entry.rs
//! Journal entry records and their persisted JSON shape.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EntryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Voice,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Text => "text",
            EntryKind::Voice => "voice",
        }
    }
}

/// Opaque locator of a recorded media file (a path or a URI).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AudioRef(String);

impl AudioRef {
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.display().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem path behind this reference, if it points at a local file.
    /// `file://` URIs are unwrapped; any other scheme is remote.
    pub fn local_path(&self) -> Option<PathBuf> {
        if let Some(path) = self.0.strip_prefix("file://") {
            return Some(PathBuf::from(path));
        }
        if self.0.contains("://") {
            return None;
        }
        Some(PathBuf::from(&self.0))
    }
}

impl std::fmt::Display for AudioRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntry {
    timestamp: i64,
    text: String,
}

impl TextEntry {
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceEntry {
    timestamp: i64,
    audio_ref: AudioRef,
    transcription: Option<String>,
}

impl VoiceEntry {
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn audio_ref(&self) -> &AudioRef {
        &self.audio_ref
    }

    pub fn transcription(&self) -> Option<&str> {
        self.transcription.as_deref()
    }
}

/// One journal entry. Only the fields valid for each kind exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EntryWire", into = "EntryWire")]
pub enum EntryRecord {
    Text(TextEntry),
    Voice(VoiceEntry),
}

/// The part of an entry that decides whether two records are the same one:
/// `(timestamp, kind, text | audioRef)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryIdentity<'a> {
    pub timestamp: i64,
    pub content: IdentityContent<'a>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityContent<'a> {
    Text(&'a str),
    Voice(&'a AudioRef),
}

impl EntryRecord {
    /// Builds a text entry. Surrounding whitespace is trimmed and blank text
    /// is refused.
    pub fn text(timestamp: i64, text: &str) -> Result<Self, EntryError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EntryError::EmptyText);
        }
        Ok(EntryRecord::Text(TextEntry {
            timestamp,
            text: text.to_string(),
        }))
    }

    pub fn voice(timestamp: i64, audio_ref: AudioRef, transcription: Option<String>) -> Self {
        EntryRecord::Voice(VoiceEntry {
            timestamp,
            audio_ref,
            transcription,
        })
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            EntryRecord::Text(_) => EntryKind::Text,
            EntryRecord::Voice(_) => EntryKind::Voice,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            EntryRecord::Text(entry) => entry.timestamp,
            EntryRecord::Voice(entry) => entry.timestamp,
        }
    }

    pub fn audio_ref(&self) -> Option<&AudioRef> {
        match self {
            EntryRecord::Text(_) => None,
            EntryRecord::Voice(entry) => Some(&entry.audio_ref),
        }
    }

    /// Readable content: the text itself, or a voice entry's transcription.
    pub fn body(&self) -> Option<&str> {
        match self {
            EntryRecord::Text(entry) => Some(&entry.text),
            EntryRecord::Voice(entry) => entry.transcription.as_deref(),
        }
    }

    pub fn identity(&self) -> EntryIdentity<'_> {
        let content = match self {
            EntryRecord::Text(entry) => IdentityContent::Text(&entry.text),
            EntryRecord::Voice(entry) => IdentityContent::Voice(&entry.audio_ref),
        };
        EntryIdentity {
            timestamp: self.timestamp(),
            content,
        }
    }

    /// Whether `other` denotes the same entry. Transcriptions are ignored.
    pub fn is_same_entry(&self, other: &EntryRecord) -> bool {
        self.identity() == other.identity()
    }
}

/// Flat JSON form. Accepts the older `type`/`uri` field names on read.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryWire {
    #[serde(alias = "type")]
    kind: EntryKind,
    timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, alias = "uri", skip_serializing_if = "Option::is_none")]
    audio_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transcription: Option<String>,
}

impl TryFrom<EntryWire> for EntryRecord {
    type Error = EntryError;

    fn try_from(wire: EntryWire) -> Result<Self, Self::Error> {
        match wire.kind {
            EntryKind::Text => {
                if wire.audio_ref.is_some() {
                    return Err(EntryError::StrayField {
                        kind: "text",
                        field: "audioRef",
                    });
                }
                if wire.transcription.is_some() {
                    return Err(EntryError::StrayField {
                        kind: "text",
                        field: "transcription",
                    });
                }
                EntryRecord::text(wire.timestamp, wire.text.as_deref().unwrap_or_default())
            }
            EntryKind::Voice => {
                if wire.text.is_some() {
                    return Err(EntryError::StrayField {
                        kind: "voice",
                        field: "text",
                    });
                }
                let audio_ref = wire
                    .audio_ref
                    .filter(|locator| !locator.is_empty())
                    .ok_or(EntryError::MissingAudio)?;
                Ok(EntryRecord::voice(
                    wire.timestamp,
                    AudioRef(audio_ref),
                    wire.transcription,
                ))
            }
        }
    }
}

impl From<EntryRecord> for EntryWire {
    fn from(record: EntryRecord) -> Self {
        match record {
            EntryRecord::Text(entry) => EntryWire {
                kind: EntryKind::Text,
                timestamp: entry.timestamp,
                text: Some(entry.text),
                audio_ref: None,
                transcription: None,
            },
            EntryRecord::Voice(entry) => EntryWire {
                kind: EntryKind::Voice,
                timestamp: entry.timestamp,
                text: None,
                audio_ref: Some(entry.audio_ref.0),
                transcription: entry.transcription,
            },
        }
    }
}
