//! Single-turn dialogue with a language model

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::{Error, Result};

/// One chat message sent to the language model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// A chat-completion service
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the conversation; `None` when the service returned no content
    ///
    /// # Errors
    ///
    /// Returns error on network or service failure
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>>;
}

/// Produces assistant replies for a transcript
pub struct Dialogue {
    model: Box<dyn LanguageModel>,
}

impl Dialogue {
    #[must_use]
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Chat completions configured from `config`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn from_config(config: &Config) -> Result<Self> {
        let chat = OpenAiChat::new(
            config.api_keys.openai.clone(),
            config.dialogue.model.clone(),
            config.openai_base_url.as_str(),
            config.request_timeout,
        )?;
        Ok(Self::new(Box::new(chat)))
    }

    /// Ask for a reply to `transcript` under the system `persona`
    ///
    /// Each call is stateless: exactly one system and one user message are sent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Dialogue` on service failure or when the reply is empty
    pub async fn respond(&self, transcript: &str, persona: &str) -> Result<String> {
        let messages = [ChatMessage::system(persona), ChatMessage::user(transcript)];

        let reply = self.model.complete(&messages).await.map_err(|e| match e {
            Error::Dialogue(_) => e,
            other => Error::Dialogue(other.to_string()),
        })?;

        match reply {
            Some(text) if !text.trim().is_empty() => {
                tracing::info!(reply_chars = text.len(), "reply received");
                Ok(text)
            }
            _ => Err(Error::Dialogue("language model returned an empty reply".to_string())),
        }
    }
}

/// `OpenAI` chat completions over HTTP
pub struct OpenAiChat {
    client: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    /// Create a new chat client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(
        api_key: SecretString,
        model: String,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            api_key,
            model,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "requesting completion");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Dialogue(format!("OpenAI request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Dialogue(format!("OpenAI API error: {status} - {body}")));
        }

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Dialogue(format!("Failed to parse OpenAI response: {e}")))?;

        Ok(result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    struct Recorded {
        calls: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
        reply: Option<String>,
    }

    #[async_trait]
    impl LanguageModel for Recorded {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<Option<String>> {
            self.calls.lock().unwrap().push(messages.to_vec());
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn test_single_turn_request_shape() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dialogue = Dialogue::new(Box::new(Recorded {
            calls: Arc::clone(&calls),
            reply: Some("Revenue was up.".to_string()),
        }));

        let reply = dialogue.respond("How was Q3?", "You are Neon").await.unwrap();
        assert_eq!(reply, "Revenue was up.");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0],
            vec![ChatMessage::system("You are Neon"), ChatMessage::user("How was Q3?")]
        );
    }

    #[tokio::test]
    async fn test_missing_or_blank_reply_is_error() {
        for reply in [None, Some(String::new()), Some("  \n".to_string())] {
            let dialogue = Dialogue::new(Box::new(Recorded {
                calls: Arc::new(Mutex::new(Vec::new())),
                reply,
            }));
            let err = dialogue.respond("hi", "persona").await.unwrap_err();
            assert!(matches!(err, Error::Dialogue(_)));
        }
    }

    #[test]
    fn test_request_serialization() {
        let messages = [ChatMessage::system("s"), ChatMessage::user("u")];
        let request = ChatCompletionRequest {
            model: "gpt-3.5-turbo",
            messages: &messages,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "u");
    }
}
