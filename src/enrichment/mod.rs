// src/enrichment/mod.rs
//! Remote transcription and analysis.
//!
//! Neither call can fail from the caller's point of view: transport and
//! server errors come back as a placeholder transcription or as
//! [`AnalysisOutcome::Failed`], so entries are always saved and the UI
//! always has something to show.

mod http;

pub use http::HttpEnricher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::entry::AudioRef;

pub const TRANSCRIPTION_SERVER_ERROR: &str = "Transcription failed: Server error.";
pub const TRANSCRIPTION_NETWORK_ERROR: &str = "Transcription failed: Network/Processing error.";
pub const NO_ENTRIES_MESSAGE: &str = "No entries for today.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Server { status: u16 },
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transcription {
    Text(String),
    /// Stand-in text stored when the service could not transcribe.
    Placeholder { reason: FailureReason, text: String },
}

impl Transcription {
    pub fn server_failure(status: u16) -> Self {
        Transcription::Placeholder {
            reason: FailureReason::Server { status },
            text: TRANSCRIPTION_SERVER_ERROR.to_string(),
        }
    }

    pub fn network_failure() -> Self {
        Transcription::Placeholder {
            reason: FailureReason::Network,
            text: TRANSCRIPTION_NETWORK_ERROR.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Transcription::Placeholder { .. })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Transcription::Text(text) | Transcription::Placeholder { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Transcription::Text(text) | Transcription::Placeholder { text, .. } => text,
        }
    }
}

/// Successful `/analyze` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub analysis: String,
    pub nature: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Report(AnalysisReport),
    /// Nothing to analyze; the service was not called.
    NoEntries,
    Failed { error: String },
}

impl AnalysisOutcome {
    /// Message to show instead of a report.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            AnalysisOutcome::Report(_) => None,
            AnalysisOutcome::NoEntries => Some(NO_ENTRIES_MESSAGE),
            AnalysisOutcome::Failed { error } => Some(error),
        }
    }
}

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn transcribe(&self, audio: &AudioRef) -> Transcription;

    /// Implementations return [`AnalysisOutcome::NoEntries`] for an empty
    /// slice without any network traffic.
    async fn analyze(&self, entries: &[String]) -> AnalysisOutcome;
}
