use crate::config::Config;
use crate::models::{Exchange, Message};
use crate::parse::ParsedRequest;
use crate::util::{chars_for_tokens, truncate};
use serde::Serialize;
use std::time::Duration;

/// Extra time granted to models known to respond slowly.
pub const SLOW_MODEL_EXTRA_SECONDS: u64 = 120;
pub const IMAGE_TIMEOUT_SECONDS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRequest {
    pub n: u8,
    pub prompt: String,
    pub size: String,
    pub response_format: String,
}

impl ImageRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            n: 1,
            prompt: prompt.into(),
            size: "1024x1024".to_string(),
            response_format: "url".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserMessage {
    pub content: String,
    pub truncated: bool,
}

/// Build the final user entry: the residual message (re-prefixed when the
/// persona keeps its keyword), cut to the token budget, then the addendum.
pub fn compose_user_message(
    residual: &str,
    prefix: Option<&str>,
    addendum: Option<&str>,
    max_tokens: usize,
) -> UserMessage {
    let message = match prefix {
        Some(prefix) => format!("{prefix} {residual}"),
        None => residual.to_string(),
    };
    let max_chars = chars_for_tokens(max_tokens);
    let truncated = message.chars().count() > max_chars;
    let mut content = if truncated {
        truncate(&message, max_chars)
    } else {
        message
    };

    if let Some(addendum) = addendum.map(str::trim).filter(|a| !a.is_empty()) {
        if !content.ends_with(['.', '!', '?', ':', ';', '…']) {
            content.push('.');
        }
        content.push(' ');
        content.push_str(addendum);
    }

    UserMessage { content, truncated }
}

/// System entry, replayed history as user/assistant pairs (oldest first),
/// then the current user entry.
pub fn assemble_messages(system: &str, replay: &[&Exchange], user_message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(replay.len() * 2 + 2);
    messages.push(Message::system(system));
    for exchange in replay {
        messages.push(Message::user(exchange.user_message.clone()));
        messages.push(Message::assistant(exchange.assistant_message.clone()));
    }
    messages.push(Message::user(user_message));
    messages
}

pub fn is_slow_model(model: &str) -> bool {
    model.starts_with("gpt-4")
}

pub struct RequestBuilder<'c, 'a> {
    config: &'c Config<'a>,
}

impl<'c, 'a> RequestBuilder<'c, 'a> {
    pub fn new(config: &'c Config<'a>) -> Self {
        Self { config }
    }

    pub fn chat_request(&self, parsed: &ParsedRequest) -> ChatRequest {
        ChatRequest {
            model: parsed.model.clone(),
            temperature: parsed.temperature,
            messages: parsed.messages.clone(),
            max_tokens: self.config.max_response_tokens(),
        }
    }

    pub fn image_request(&self, parsed: &ParsedRequest) -> ImageRequest {
        ImageRequest::new(parsed.residual.clone())
    }

    pub fn timeout(&self, model: &str) -> Duration {
        let mut seconds = self.config.timeout_seconds();
        if is_slow_model(model) {
            seconds = seconds.saturating_add(SLOW_MODEL_EXTRA_SECONDS);
        }
        Duration::from_secs(seconds)
    }
}
