use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, warn};
use url::Url;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// Any failure of a remote chat call. Recovered by the caller, never retried.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("request to Gemini failed: {0}")]
    Transport(reqwest::Error),

    #[error("Gemini API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("prompt was blocked by Gemini: {reason}")]
    Blocked { reason: String },

    #[error("Gemini returned no text (finish reason: {finish_reason})")]
    EmptyResponse { finish_reason: String },

    #[error("invalid Gemini endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
}

impl From<reqwest::Error> for RemoteError {
    // The request URL carries the API key in its query string.
    fn from(err: reqwest::Error) -> Self {
        RemoteError::Transport(err.without_url())
    }
}

/// A conversation with the remote model that remembers earlier turns.
#[async_trait]
pub trait RemoteChat: Send {
    async fn send(&mut self, text: &str) -> Result<String, RemoteError>;
}

/// Something that can open a fresh remote conversation.
pub trait ChatBackend: Send + Sync {
    fn start_chat(&self) -> Box<dyn RemoteChat>;
}

#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    api_base: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: &str, timeout: Option<Duration>) -> Result<Self, RemoteError> {
        Self::with_api_base(api_key, model, DEFAULT_API_BASE, timeout)
    }

    pub fn with_api_base(
        api_key: String,
        model: &str,
        api_base: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, RemoteError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: builder.build()?,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> Result<Url, RemoteError> {
        let mut url = Url::parse(&format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base, self.model
        ))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    /// Sends the whole conversation and returns the model's reply text.
    pub async fn generate_content(&self, contents: &[Content]) -> Result<String, RemoteError> {
        let formatted_messages = contents
            .iter()
            .map(|content| {
                json!({
                    "role": content.role,
                    "parts": [
                        {
                            "text": content.text
                        }
                    ]
                })
            })
            .collect::<Vec<_>>();

        let request_body = json!({
            "contents": formatted_messages,
            "generationConfig": {
                "temperature": 1.0,
                "topP": 0.95,
                "topK": 40,
                "maxOutputTokens": 8192
            }
        });

        debug!(
            model = %self.model,
            "Sending request to Gemini API: {}",
            serde_json::to_string_pretty(&request_body).unwrap_or_default()
        );

        let response = self
            .client
            .post(self.endpoint()?)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API request failed with response: {}", error_text);
            return Err(RemoteError::Api {
                status: status.as_u16(),
                message: api_error_message(&error_text),
            });
        }

        let response: GenerateContentResponse = response.json().await?;
        debug!("Received response from Gemini API: {:?}", response);

        response.into_text()
    }
}

impl ChatBackend for GeminiClient {
    fn start_chat(&self) -> Box<dyn RemoteChat> {
        Box::new(GeminiChat::new(self.clone()))
    }
}

/// One turn as the Gemini API sees it. The model's turns use the role `"model"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Content {
    pub role: &'static str,
    pub text: String,
}

impl Content {
    pub fn user(text: &str) -> Self {
        Self { role: "user", text: text.to_string() }
    }

    pub fn model(text: &str) -> Self {
        Self { role: "model", text: text.to_string() }
    }
}

/// A multi-turn Gemini conversation. History only grows when a call succeeds.
pub struct GeminiChat {
    client: GeminiClient,
    history: Vec<Content>,
}

impl GeminiChat {
    pub fn new(client: GeminiClient) -> Self {
        Self { client, history: Vec::new() }
    }

    #[cfg(test)]
    pub fn history(&self) -> &[Content] {
        &self.history
    }
}

#[async_trait]
impl RemoteChat for GeminiChat {
    async fn send(&mut self, text: &str) -> Result<String, RemoteError> {
        let mut contents = self.history.clone();
        contents.push(Content::user(text));

        let reply = self.client.generate_content(&contents).await?;

        contents.push(Content::model(&reply));
        self.history = contents;
        Ok(reply)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn into_text(self) -> Result<String, RemoteError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            warn!("Prompt blocked: {}", reason);
            return Err(RemoteError::Blocked { reason });
        }

        let Some(first_candidate) = self.candidates.into_iter().next() else {
            return Err(RemoteError::EmptyResponse {
                finish_reason: "NO_CANDIDATES".to_string(),
            });
        };

        let text = first_candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(RemoteError::EmptyResponse {
                finish_reason: first_candidate
                    .finish_reason
                    .unwrap_or_else(|| "UNKNOWN".to_string()),
            });
        }

        Ok(text)
    }
}

/// Pulls `error.message` out of a Gemini error body, or returns the body as-is.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
