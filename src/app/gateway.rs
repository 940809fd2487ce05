use chrono::Utc;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::Settings;
use crate::http::{HttpError, post_json};

use super::episode::{Episode, Transcript};

pub(crate) const MISSING_TRANSCRIPT: &str = "No transcript returned from server.";

pub(crate) const PROGRESS_STEPS: [&str; 4] = [
    "Connecting to generation workflow...",
    "Writing story around your words...",
    "Synthesizing audio...",
    "Finalizing...",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationRequest {
    pub(crate) topic: String,
    pub(crate) words: Vec<String>,
    pub(crate) main_voice: String,
    pub(crate) guest_voice: String,
    pub(crate) duration: u32,
}

impl GenerationRequest {
    pub(crate) fn new(topic: &str, words: &[String], settings: &Settings) -> Self {
        Self {
            topic: topic.trim().to_string(),
            words: words.to_vec(),
            main_voice: settings.main_voice.clone(),
            guest_voice: settings.guest_voice.clone(),
            duration: settings.duration_minutes,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), GenerationError> {
        if self.topic.trim().is_empty() {
            return Err(GenerationError::InvalidRequest("topic is empty".to_string()));
        }
        if self.words.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "add at least one target word".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerationResponse {
    story_title: Option<String>,
    transcript: Option<Value>,
    audio_url: Option<String>,
}

#[derive(Debug, Error)]
pub(crate) enum GenerationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("generation request failed: {0}")]
    Http(#[from] HttpError),
    #[error("generation response was not valid JSON: {0}")]
    Decode(String),
}

/// Sends `request` to the configured workflow and turns the reply into a new
/// episode. Nothing is persisted here.
pub(crate) fn generate(
    settings: &Settings,
    request: &GenerationRequest,
) -> Result<Episode, GenerationError> {
    request.validate()?;
    let body = serde_json::to_string(request)
        .map_err(|err| GenerationError::InvalidRequest(err.to_string()))?;
    info!(
        "requesting episode for topic {:?} with {} word(s) from {}",
        request.topic,
        request.words.len(),
        settings.webhook_url
    );

    let raw = post_json(
        &settings.webhook_url,
        &body,
        settings.connect_timeout(),
        settings.read_timeout(),
    )
    .inspect_err(|err| warn!("generation failed: {err}"))?;

    let response: GenerationResponse =
        serde_json::from_str(&raw).map_err(|err| GenerationError::Decode(err.to_string()))?;
    let episode = episode_from_response(request, response);
    info!("generated episode {} ({})", episode.id, episode.title);
    Ok(episode)
}

fn episode_from_response(request: &GenerationRequest, response: GenerationResponse) -> Episode {
    let title = response
        .story_title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| request.topic.clone());
    let transcript = match response.transcript {
        None | Some(Value::Null) => Transcript::Plain(MISSING_TRANSCRIPT.to_string()),
        Some(Value::String(text)) if text.trim().is_empty() => {
            Transcript::Plain(MISSING_TRANSCRIPT.to_string())
        }
        Some(value) => Transcript::from_value(&value),
    };
    Episode {
        id: uuid::Uuid::new_v4().to_string(),
        title,
        topic: request.topic.clone(),
        target_words: request.words.clone(),
        transcript,
        audio_url: response
            .audio_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty()),
        created_at: Utc::now(),
    }
}
