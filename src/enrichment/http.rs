// src/enrichment/http.rs
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{error, info, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{AnalysisOutcome, AnalysisReport, Enricher, Transcription};
use crate::entry::AudioRef;

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    entries: &'a [String],
}

/// Client for the `/transcribe` and `/analyze` endpoints.
#[derive(Debug, Clone)]
pub struct HttpEnricher {
    client: Client,
    base_url: String,
}

impl HttpEnricher {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Uses a preconfigured client, e.g. one with custom proxy settings.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("m4a") => "audio/m4a",
        Some("mp3") => "audio/mpeg",
        Some("caf") => "audio/x-caf",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Enricher for HttpEnricher {
    async fn transcribe(&self, audio: &AudioRef) -> Transcription {
        let Some(path) = audio.local_path() else {
            warn!("Cannot upload non-local recording {audio}");
            return Transcription::network_failure();
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) => {
                error!("Failed to read recording {}: {err}", path.display());
                return Transcription::network_failure();
            }
        };
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("recording.wav")
            .to_string();
        let part = match Part::bytes(bytes).file_name(file_name).mime_str(mime_for(&path)) {
            Ok(part) => part,
            Err(err) => {
                error!("Failed to build upload for {audio}: {err}");
                return Transcription::network_failure();
            }
        };
        let form = Form::new().part("audio", part);

        info!("Uploading {audio} for transcription");
        let response = match self
            .client
            .post(self.endpoint("transcribe"))
            .multipart(form)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("Transcription request failed: {err}");
                return Transcription::network_failure();
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Transcription service answered {status}: {body}");
            return Transcription::server_failure(status.as_u16());
        }

        match response.json::<TranscribeResponse>().await {
            Ok(body) => Transcription::Text(body.text.unwrap_or_default()),
            Err(err) => {
                error!("Unreadable transcription response: {err}");
                Transcription::network_failure()
            }
        }
    }

    async fn analyze(&self, entries: &[String]) -> AnalysisOutcome {
        if entries.is_empty() {
            return AnalysisOutcome::NoEntries;
        }

        info!("Submitting {} entries for analysis", entries.len());
        let response = match self
            .client
            .post(self.endpoint("analyze"))
            .json(&AnalyzeRequest { entries })
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!("Analysis request failed: {err}");
                return AnalysisOutcome::Failed {
                    error: format!("Failed to analyze entries. {err}"),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("Analysis service answered {status}");
            return AnalysisOutcome::Failed {
                error: format!("Server error: {}", status.as_u16()),
            };
        }

        match response.json::<AnalysisReport>().await {
            Ok(report) => AnalysisOutcome::Report(report),
            Err(err) => AnalysisOutcome::Failed {
                error: format!("Failed to analyze entries. {err}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::{FailureReason, TRANSCRIPTION_NETWORK_ERROR, TRANSCRIPTION_SERVER_ERROR};
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn unreachable_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    async fn echo_upload(mut multipart: Multipart) -> Json<Value> {
        let mut seen = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let size = field.bytes().await.unwrap().len();
            seen.push(format!("{name}:{size}"));
        }
        Json(json!({ "text": seen.join(",") }))
    }

    async fn summarize(Json(body): Json<Value>) -> Json<Value> {
        let count = body["entries"].as_array().map_or(0, Vec::len);
        Json(json!({
            "analysis": format!("{count} entries"),
            "nature": "reflective",
            "timestamp": 1_700_000_000_000_i64
        }))
    }

    fn client(base: &str) -> HttpEnricher {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        HttpEnricher::with_client(client, base)
    }

    fn recording(dir: &tempfile::TempDir) -> AudioRef {
        let path = dir.path().join("recording-1.wav");
        std::fs::write(&path, b"RIFF!").unwrap();
        AudioRef::from_path(&path)
    }

    #[tokio::test]
    async fn transcribes_uploaded_audio() {
        let base = serve(Router::new().route("/transcribe", post(echo_upload))).await;
        let dir = tempfile::tempdir().unwrap();

        let result = client(&base).transcribe(&recording(&dir)).await;

        assert_eq!(result, Transcription::Text("audio:5".into()));
    }

    #[tokio::test]
    async fn reply_without_text_is_an_empty_transcription() {
        let app = Router::new().route("/transcribe", post(|| async { Json(json!({})) }));
        let base = serve(app).await;
        let dir = tempfile::tempdir().unwrap();

        let result = client(&base).transcribe(&recording(&dir)).await;

        assert_eq!(result, Transcription::Text(String::new()));
    }

    #[tokio::test]
    async fn server_errors_become_a_placeholder() {
        let app = Router::new().route(
            "/transcribe",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let dir = tempfile::tempdir().unwrap();

        let result = client(&base).transcribe(&recording(&dir)).await;

        assert_eq!(
            result,
            Transcription::Placeholder {
                reason: FailureReason::Server { status: 500 },
                text: TRANSCRIPTION_SERVER_ERROR.into(),
            }
        );
    }

    #[tokio::test]
    async fn unreachable_service_becomes_a_placeholder() {
        let base = unreachable_url().await;
        let dir = tempfile::tempdir().unwrap();

        let result = client(&base).transcribe(&recording(&dir)).await;

        assert_eq!(result.as_str(), TRANSCRIPTION_NETWORK_ERROR);
    }

    #[tokio::test]
    async fn missing_recording_file_becomes_a_placeholder() {
        let base = unreachable_url().await;
        let result = client(&base)
            .transcribe(&AudioRef::new("/definitely/not/here.wav"))
            .await;
        assert!(result.is_placeholder());
    }

    #[tokio::test]
    async fn analyzes_collected_entries() {
        let base = serve(Router::new().route("/analyze", post(summarize))).await;
        let entries = vec!["woke up early".to_string(), "long walk".to_string()];

        let outcome = client(&base).analyze(&entries).await;

        let AnalysisOutcome::Report(report) = outcome else {
            panic!("expected a report, got {outcome:?}");
        };
        assert_eq!(report.analysis, "2 entries");
        assert_eq!(report.nature, "reflective");
    }

    #[tokio::test]
    async fn empty_analysis_never_reaches_the_network() {
        let base = unreachable_url().await;
        assert_eq!(client(&base).analyze(&[]).await, AnalysisOutcome::NoEntries);
    }

    #[tokio::test]
    async fn analysis_failures_carry_an_error_message() {
        let app = Router::new().route(
            "/analyze",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "busy") }),
        );
        let base = serve(app).await;
        let entries = vec!["x".to_string()];

        let outcome = client(&base).analyze(&entries).await;
        assert_eq!(
            outcome,
            AnalysisOutcome::Failed {
                error: "Server error: 503".into()
            }
        );

        let offline = client(&unreachable_url().await).analyze(&entries).await;
        assert!(offline
            .error_message()
            .is_some_and(|msg| msg.starts_with("Failed to analyze entries.")));
    }

    #[test]
    fn joins_endpoints_without_double_slashes() {
        let enricher = client("http://localhost:3000/");
        assert_eq!(enricher.endpoint("analyze"), "http://localhost:3000/analyze");
    }
}
