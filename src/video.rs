//! Hosted video-conversation service integration
//!
//! Starts a face-to-face session with the avatar replica and returns the
//! link the user follows to join. The session is not managed afterwards;
//! not following the link is how it is abandoned.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::VideoConfig;
use crate::{Error, Result};

/// Client for the video-conversation API
#[derive(Debug, Clone)]
pub struct VideoClient {
    /// HTTP client
    client: Client,
    /// Base URL for the API (e.g. <https://tavusapi.com/v2>)
    api_url: String,
    /// API key sent as `x-api-key`
    api_key: SecretString,
}

/// Request body for starting a conversation
#[derive(Debug, Clone, Serialize)]
pub struct VideoConversationRequest {
    pub replica_id: String,
    pub persona_id: String,
    pub conversation_name: String,
    pub conversational_context: String,
    pub custom_greeting: String,
    pub properties: ConversationProperties,
}

/// Session properties
#[derive(Debug, Clone, Serialize)]
pub struct ConversationProperties {
    /// Maximum call length in seconds
    pub max_call_duration: u32,
    pub enable_transcription: bool,
    pub language: String,
}

#[derive(Debug, Deserialize)]
struct ConversationResponse {
    conversation_url: Option<String>,
}

impl VideoConversationRequest {
    /// Build the request from configuration
    #[must_use]
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            replica_id: config.replica_id.clone(),
            persona_id: config.persona_id.clone(),
            conversation_name: config.conversation_name.clone(),
            conversational_context: config.conversational_context.trim().to_string(),
            custom_greeting: config.custom_greeting.clone(),
            properties: ConversationProperties {
                max_call_duration: config.max_call_duration,
                enable_transcription: config.enable_transcription,
                language: config.language.clone(),
            },
        }
    }
}

impl VideoClient {
    /// Create a new video client
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no API key is configured
    pub fn new(config: &VideoConfig, api_key: Option<SecretString>) -> Result<Self> {
        let api_key =
            api_key.ok_or_else(|| Error::Config("TAVUS_API_KEY is required".to_string()))?;

        Ok(Self {
            client: Client::builder().timeout(config.timeout).build()?,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// Start a conversation and return its join URL
    ///
    /// # Errors
    ///
    /// Returns `Error::Video` if the request fails, times out, is rejected,
    /// or the response carries no usable URL
    pub async fn start_conversation(&self, request: &VideoConversationRequest) -> Result<String> {
        let url = format!("{}/conversations", self.api_url);

        tracing::debug!(
            replica_id = %request.replica_id,
            persona_id = %request.persona_id,
            "starting video conversation"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Video(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, body = %body, "video API rejected request");
            return Err(Error::Video(format!("API error: {status}")));
        }

        let body: ConversationResponse = response
            .json()
            .await
            .map_err(|e| Error::Video(format!("invalid response: {e}")))?;

        let conversation_url = body
            .conversation_url
            .ok_or_else(|| Error::Video("response did not include a conversation URL".to_string()))?;

        let parsed = url::Url::parse(&conversation_url)
            .map_err(|e| Error::Video(format!("invalid conversation URL: {e}")))?;

        tracing::info!(url = %parsed, "video conversation started");
        Ok(parsed.to_string())
    }
}
