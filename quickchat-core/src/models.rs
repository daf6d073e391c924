use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One request/response pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub timestamp: DateTime<Utc>,
    /// Input as typed, before modifiers were stripped.
    pub input_text: String,
    /// Message actually sent as the final user entry.
    pub user_message: String,
    pub assistant_message: String,
    pub transient: bool,
}

impl Exchange {
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub system_message: String,
    pub retain_prefix: bool,
    pub transient: bool,
    pub postprocessing: Option<PostTask>,
    pub description: Option<String>,
    pub emoji: Option<String>,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_message: system_message.into(),
            retain_prefix: false,
            transient: false,
            postprocessing: None,
            description: None,
            emoji: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Work applied to the response text after a successful request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostTask {
    CopyToClipboard,
    /// Prefix the response with the user message, for "continue writing" personas.
    ConcatenateMessages,
}

impl PostTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostTask::CopyToClipboard => "copy-to-clipboard",
            PostTask::ConcatenateMessages => "concatenate-messages",
        }
    }
}

impl fmt::Display for PostTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostTask {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "copy-to-clipboard" => Ok(PostTask::CopyToClipboard),
            "concatenate-messages" => Ok(PostTask::ConcatenateMessages),
            other => Err(format!("Unknown post-processing task: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
}
