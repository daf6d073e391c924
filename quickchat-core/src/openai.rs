//! Blocking HTTP client for the chat-completion and image endpoints.

use crate::error::{ChatError, Result};
use crate::request::{ChatRequest, ImageRequest, IMAGE_TIMEOUT_SECONDS};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const RELEASES_URL: &str = "https://api.github.com/repos/quickchat-app/quickchat/releases/latest";

/// The remote API as seen by a session. One blocking call per invocation.
/// The key is passed per call because it is only known once the
/// configuration has been loaded.
pub trait ChatApi {
    /// Returns the assistant text, or an empty string when the response held
    /// no usable content.
    fn chat(&self, api_key: &str, request: &ChatRequest, timeout: Duration) -> Result<String>;

    /// Returns the URL of the generated image, or an empty string.
    fn image(&self, api_key: &str, request: &ImageRequest) -> Result<String>;

    /// Tag name of the latest published release.
    fn latest_release(&self) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

pub fn parse_chat_response(body: &str) -> Result<String> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::Transport(format!("Invalid response JSON: {e}")))?;
    if let Some(error) = response.error {
        return Err(ChatError::Api(error.message));
    }
    Ok(response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .unwrap_or_default())
}

pub fn parse_image_response(body: &str) -> Result<String> {
    let response: ImageResponse = serde_json::from_str(body)
        .map_err(|e| ChatError::Transport(format!("Invalid response JSON: {e}")))?;
    if let Some(error) = response.error {
        return Err(ChatError::Api(error.message));
    }
    Ok(response
        .data
        .into_iter()
        .next()
        .and_then(|image| image.url)
        .unwrap_or_default())
}

pub struct OpenAiClient {
    http: reqwest::blocking::Client,
    base_url: String,
}

impl OpenAiClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("quickchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ChatError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn post<T: serde::Serialize>(
        &self,
        api_key: &str,
        path: &str,
        body: &T,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(body)
            .send()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|e| ChatError::Transport(format!("Failed to read response: {e}")))?;
        debug!(%status, body = %text, "Response");
        Ok(text)
    }
}

impl ChatApi for OpenAiClient {
    fn chat(&self, api_key: &str, request: &ChatRequest, timeout: Duration) -> Result<String> {
        debug!(request = ?request, "Chat request");
        let body = self.post(api_key, "/v1/chat/completions", request, timeout)?;
        parse_chat_response(&body)
    }

    fn image(&self, api_key: &str, request: &ImageRequest) -> Result<String> {
        debug!(request = ?request, "Image request");
        let body = self.post(
            api_key,
            "/v1/images/generations",
            request,
            Duration::from_secs(IMAGE_TIMEOUT_SECONDS),
        )?;
        parse_image_response(&body)
    }

    fn latest_release(&self) -> Result<String> {
        let release: Release = self
            .http
            .get(RELEASES_URL)
            .timeout(Duration::from_secs(IMAGE_TIMEOUT_SECONDS))
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| ChatError::Transport(e.to_string()))?
            .json()
            .map_err(|e| ChatError::Transport(format!("Failed to parse release JSON: {e}")))?;
        Ok(release.tag_name)
    }
}
