//! Validated configuration options backed by the `settings` table.

use crate::db::Database;
use crate::error::{ChatError, Result};
use crate::modifier::temperature_literal;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info};

pub const MODELS: &[&str] = &["gpt-3.5-turbo", "gpt-4", "gpt-4-32k"];
pub const DEFAULT_ACTIONS: &[&str] = &["open", "insert", "quicklook", "alert", "copy", "largetype"];
pub const FILENAME_EXTENSIONS: &[&str] = &["txt", "md", "markdown"];
const BOOLEANS: &[&str] = &["true", "false"];

static API_KEY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sk-[A-Za-z0-9_-]{20,}$").expect("valid api key pattern"));

#[derive(Debug, Clone, Copy)]
pub enum OptionKind {
    ApiKey,
    Choice(&'static [&'static str]),
    Temperature,
    Integer,
    /// Integer, or `infinity` for no limit.
    IntegerOrInfinity,
    Text,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfigOption {
    pub key: &'static str,
    pub default: &'static str,
    pub kind: OptionKind,
}

pub const OPTIONS: &[ConfigOption] = &[
    ConfigOption { key: "api_key", default: "", kind: OptionKind::ApiKey },
    ConfigOption { key: "cache_enable", default: "true", kind: OptionKind::Choice(BOOLEANS) },
    ConfigOption { key: "cache_expiration_minutes", default: "5", kind: OptionKind::Integer },
    ConfigOption { key: "cache_min_words", default: "3", kind: OptionKind::Integer },
    ConfigOption { key: "default_action", default: "open", kind: OptionKind::Choice(DEFAULT_ACTIONS) },
    ConfigOption { key: "default_action_auto", default: "false", kind: OptionKind::Choice(BOOLEANS) },
    ConfigOption { key: "filename_extension", default: "txt", kind: OptionKind::Choice(FILENAME_EXTENSIONS) },
    ConfigOption { key: "max_history_minutes", default: "480", kind: OptionKind::Integer },
    ConfigOption { key: "max_history_tokens", default: "1000", kind: OptionKind::Integer },
    ConfigOption { key: "max_response_tokens", default: "2000", kind: OptionKind::IntegerOrInfinity },
    ConfigOption { key: "max_user_message_tokens", default: "1000", kind: OptionKind::Integer },
    ConfigOption { key: "model", default: "gpt-3.5-turbo", kind: OptionKind::Choice(MODELS) },
    ConfigOption { key: "temperature", default: "0.1", kind: OptionKind::Temperature },
    ConfigOption { key: "timeout", default: "30", kind: OptionKind::Integer },
    ConfigOption {
        key: "user_message_addendum",
        default: "Be succinct. Limit prose. Never repeat the user message.",
        kind: OptionKind::Text,
    },
];

pub fn option(key: &str) -> Option<&'static ConfigOption> {
    OPTIONS.iter().find(|o| o.key == key)
}

pub fn is_valid_api_key(value: &str) -> bool {
    API_KEY_PATTERN.is_match(value)
}

pub struct Config<'a> {
    db: &'a Database,
    values: BTreeMap<String, String>,
}

impl<'a> Config<'a> {
    /// Load stored options, seeding defaults on first run.
    pub fn load(db: &'a Database) -> Result<Self> {
        let values: BTreeMap<String, String> = db
            .get_all_settings()?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect();
        debug!(options = values.len(), "Loaded configuration");
        let mut config = Self { db, values };
        if config.values.is_empty() {
            config.reset(&[])?;
        }
        Ok(config)
    }

    /// Adopt an API key from the environment when none is configured.
    pub fn import_api_key(&mut self, env_value: Option<String>) -> Result<()> {
        if !self.api_key().is_empty() {
            return Ok(());
        }
        if let Some(key) = env_value.map(|v| v.trim().to_string()) {
            if is_valid_api_key(&key) {
                info!("Using API key from environment");
                self.store("api_key", &key)?;
            }
        }
        Ok(())
    }

    /// Restore every option to its default, except those in `retain`.
    pub fn reset(&mut self, retain: &[&str]) -> Result<()> {
        let retained: Vec<(String, String)> = retain
            .iter()
            .filter_map(|key| self.values.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect();
        self.db.delete_all_settings()?;
        self.values.clear();
        for (key, value) in retained {
            self.store(&key, &value)?;
        }
        for option in OPTIONS {
            if !retain.contains(&option.key) {
                self.store(option.key, option.default)?;
            }
        }
        info!("Configuration reset to defaults");
        Ok(())
    }

    /// Validate and persist one option. Returns the value as it should be
    /// shown to the user.
    pub fn set(&mut self, key: &str, value: &str) -> Result<String> {
        let option = option(key).ok_or_else(|| {
            ChatError::config(format!(
                "“{key}” is not a valid configuration option. To view all configuration options use the “config” command."
            ))
        })?;
        let value = value.trim();
        let stored = match option.kind {
            OptionKind::ApiKey => {
                if value.is_empty() {
                    return Err(ChatError::config(format!("“{key}” must not be empty.")));
                }
                if !is_valid_api_key(value) {
                    return Err(ChatError::config(
                        "Not a valid API key (OpenAI API keys start with “sk-”).",
                    ));
                }
                value.to_string()
            }
            OptionKind::Choice(choices) => {
                if !choices.contains(&value) {
                    return Err(invalid_choice(key, choices.iter().copied()));
                }
                value.to_string()
            }
            OptionKind::Temperature => {
                if temperature_literal(value).is_none() {
                    return Err(invalid_choice(key, ["0.0", "0.1", "…", "2.0"]));
                }
                value.to_string()
            }
            OptionKind::IntegerOrInfinity if value.eq_ignore_ascii_case("infinity") => {
                "infinity".to_string()
            }
            OptionKind::IntegerOrInfinity => parse_integer::<u32>(key, value)?,
            OptionKind::Integer => parse_integer::<u64>(key, value)?,
            OptionKind::Text => value.to_string(),
        };
        self.store(key, &stored)?;
        info!(key, "Configuration saved");
        Ok(display_value(key, &stored))
    }

    fn store(&mut self, key: &str, value: &str) -> Result<()> {
        self.db.set_setting(key, value)?;
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    pub fn get(&self, key: &str) -> &str {
        self.values
            .get(key)
            .map(String::as_str)
            .or_else(|| option(key).map(|o| o.default))
            .unwrap_or("")
    }

    fn number(&self, key: &str) -> u64 {
        self.get(key)
            .parse()
            .ok()
            .or_else(|| option(key).and_then(|o| o.default.parse().ok()))
            .unwrap_or(0)
    }

    fn flag(&self, key: &str) -> bool {
        self.get(key) == "true"
    }

    pub fn api_key(&self) -> &str {
        self.get("api_key")
    }

    pub fn model(&self) -> &str {
        self.get("model")
    }

    pub fn temperature(&self) -> f32 {
        temperature_literal(self.get("temperature")).unwrap_or(0.1)
    }

    pub fn cache_enabled(&self) -> bool {
        self.flag("cache_enable")
    }

    pub fn cache_expiration_minutes(&self) -> u64 {
        self.number("cache_expiration_minutes")
    }

    pub fn cache_min_words(&self) -> usize {
        self.number("cache_min_words") as usize
    }

    pub fn default_action(&self) -> &str {
        self.get("default_action")
    }

    pub fn default_action_auto(&self) -> bool {
        self.flag("default_action_auto")
    }

    pub fn filename_extension(&self) -> &str {
        self.get("filename_extension")
    }

    pub fn max_history_minutes(&self) -> u64 {
        self.number("max_history_minutes")
    }

    pub fn max_history_tokens(&self) -> u64 {
        self.number("max_history_tokens")
    }

    /// `None` means unlimited.
    pub fn max_response_tokens(&self) -> Option<u32> {
        match self.get("max_response_tokens") {
            "infinity" => None,
            value => Some(value.parse().unwrap_or(2000)),
        }
    }

    pub fn max_user_message_tokens(&self) -> usize {
        self.number("max_user_message_tokens") as usize
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.number("timeout")
    }

    pub fn user_message_addendum(&self) -> &str {
        self.get("user_message_addendum")
    }

    pub fn show(&self) -> String {
        OPTIONS
            .iter()
            .map(|o| format!("{}: {}\n", o.key, display_value(o.key, self.get(o.key))))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Digits only, and within range of the type the getter reads it as.
fn parse_integer<T>(key: &str, value: &str) -> Result<String>
where
    T: std::str::FromStr + ToString,
{
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ChatError::config(format!("“{key}” must be an integer.")));
    }
    value
        .parse::<T>()
        .map(|n| n.to_string())
        .map_err(|_| ChatError::config(format!("“{key}” is out of range.")))
}

fn invalid_choice<'s>(key: &str, choices: impl IntoIterator<Item = &'s str>) -> ChatError {
    let choices: Vec<&str> = choices.into_iter().collect();
    ChatError::config(format!(
        "“{key}” must contain one of the following values:\n\n{}",
        choices.join("\n")
    ))
}

fn display_value(key: &str, value: &str) -> String {
    if key == "api_key" && !value.is_empty() {
        let prefix: String = value.chars().take(7).collect();
        format!("{prefix}…")
    } else {
        value.to_string()
    }
}
