use thiserror::Error;

/// Every failure is terminal for the current invocation. The `Display` text is
/// what the user sees.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Invalid option value, unknown option, or missing/malformed API key.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected persona definition.
    #[error("Failed to set persona: {0}")]
    Persona(String),

    /// No text was entered and the clipboard was empty.
    #[error("No text was entered.")]
    EmptyInput,

    /// Transport failure or timeout talking to the API.
    #[error("The request failed: {0}")]
    Transport(String),

    /// Error payload returned by the API.
    #[error("The API returned an error: {0}")]
    Api(String),

    /// SQLite failure in the preference store.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn persona(message: impl Into<String>) -> Self {
        Self::Persona(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
