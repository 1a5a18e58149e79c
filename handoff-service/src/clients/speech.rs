use std::path::Path;

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::info;

use super::{ensure_success, join_url};
use crate::config::TranscriptionConfig;

/// Speech-to-text over an audio file on disk
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<String>;
}

/// OpenAI-compatible `/audio/transcriptions` client (Whisper)
pub struct HostedTranscriber {
    http: reqwest::Client,
    config: TranscriptionConfig,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

impl HostedTranscriber {
    pub fn new(http: reqwest::Client, config: TranscriptionConfig) -> Self {
        Self { http, config }
    }
}

#[async_trait]
impl Transcriber for HostedTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> anyhow::Result<String> {
        let audio = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("audio path has no file name"))?
            .to_string();

        info!(bytes = audio.len(), file = %file_name, "sending audio for transcription");

        let form = Form::new()
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "json")
            .part("file", Part::bytes(audio).file_name(file_name));

        let response = self
            .http
            .post(join_url(&self.config.api_base, "audio/transcriptions"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;

        let parsed: TranscriptionResponse =
            ensure_success("transcription", response).await?.json().await?;
        Ok(parsed.text)
    }
}
