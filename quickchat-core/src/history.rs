//! Time-bounded log of prior exchanges, used for response caching and for
//! replaying conversation context.

use crate::db::Database;
use crate::error::Result;
use crate::models::Exchange;
use crate::util::{estimate_tokens, save_file};
use chrono::{Duration, Local, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Exchanges older than this are dropped whenever the store is opened.
pub const RETENTION_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Best-effort filter for boilerplate that is never useful as cached content.
/// Each rule is a pattern and its replacement, applied in order.
static DISCLAIMER_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)^[^.]*(as an ai language model|i am a language model)[^.]*\.")
                .expect("valid disclaimer pattern"),
            "",
        ),
        (
            Regex::new(r"(?i)^sorry, I (cannot|can.t) [^.]+\.").expect("valid apology pattern"),
            "",
        ),
    ]
});

pub fn strip_disclaimers(text: &str) -> String {
    DISCLAIMER_RULES
        .iter()
        .fold(text.to_string(), |acc, (pattern, replacement)| {
            pattern.replace(&acc, *replacement).trim().to_string()
        })
}

/// Windows and budgets that bound cache lookups and context replay. The cache
/// window and the replay window are configured independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub cache_expiration_minutes: u64,
    pub max_history_minutes: u64,
    pub max_history_tokens: u64,
}

impl HistoryLimits {
    pub fn from_config(config: &crate::config::Config<'_>) -> Self {
        Self {
            cache_expiration_minutes: config.cache_expiration_minutes(),
            max_history_minutes: config.max_history_minutes(),
            max_history_tokens: config.max_history_tokens(),
        }
    }
}

pub struct ConversationHistory<'a> {
    db: &'a Database,
    limits: HistoryLimits,
    /// Newest first.
    entries: Vec<Exchange>,
}

impl<'a> ConversationHistory<'a> {
    pub fn load(db: &'a Database, limits: HistoryLimits) -> Result<Self> {
        let mut history = Self {
            db,
            limits,
            entries: db.list_exchanges()?,
        };
        history.truncate(RETENTION_SECONDS)?;
        debug!(count = history.entries.len(), "Loaded conversation history");
        Ok(history)
    }

    /// Store an exchange. Returns `false` without storing when any part is
    /// empty after disclaimer stripping.
    pub fn add(
        &mut self,
        input_text: &str,
        user_message: &str,
        assistant_message: &str,
        transient: bool,
    ) -> Result<bool> {
        let assistant_message = strip_disclaimers(assistant_message);
        if input_text.is_empty() || user_message.is_empty() || assistant_message.is_empty() {
            debug!("history.add: refusing to store an empty string");
            return Ok(false);
        }
        self.record(Exchange {
            timestamp: Utc::now(),
            input_text: input_text.to_string(),
            user_message: user_message.to_string(),
            assistant_message,
            transient,
        })?;
        Ok(true)
    }

    pub(crate) fn record(&mut self, exchange: Exchange) -> Result<()> {
        self.db.insert_exchange(&exchange)?;
        self.entries.insert(0, exchange);
        Ok(())
    }

    pub fn exists(&self, input_text: &str) -> bool {
        self.get(input_text).is_some()
    }

    /// Most recent exchange for exactly this input, if still within the cache
    /// expiration window.
    pub fn get(&self, input_text: &str) -> Option<&Exchange> {
        let now = Utc::now();
        let max_age = minutes_to_seconds(self.limits.cache_expiration_minutes);
        self.entries
            .iter()
            .find(|e| e.input_text == input_text && e.age_seconds(now) <= max_age)
    }

    /// Exchanges to replay as context, oldest first. Newer exchanges win the
    /// token budget; the first one that would exceed it ends the list.
    pub fn list(&self) -> Vec<&Exchange> {
        let now = Utc::now();
        let max_age = minutes_to_seconds(self.limits.max_history_minutes);
        let budget = self.limits.max_history_tokens as f64;
        let mut tokens = 0.0;
        let mut included = Vec::new();
        for exchange in self
            .entries
            .iter()
            .filter(|e| !e.transient && e.age_seconds(now) <= max_age)
        {
            tokens += estimate_tokens(&exchange.user_message)
                + estimate_tokens(&exchange.assistant_message);
            if tokens > budget {
                debug!(
                    age_seconds = exchange.age_seconds(now),
                    "History excluded exchange (exceeded max_history_tokens)"
                );
                break;
            }
            debug!(
                age_seconds = exchange.age_seconds(now),
                user = %exchange.user_message,
                "History included exchange"
            );
            included.push(exchange);
        }
        included.reverse();
        included
    }

    pub fn latest(&self) -> Option<&Exchange> {
        self.entries.first()
    }

    pub fn pop(&mut self) -> Result<Option<Exchange>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        self.db.delete_newest_exchange()?;
        Ok(Some(self.entries.remove(0)))
    }

    pub fn clear(&mut self) -> Result<()> {
        self.db.delete_all_exchanges()?;
        self.entries.clear();
        info!("Conversation history erased");
        Ok(())
    }

    pub fn truncate(&mut self, max_age_seconds: i64) -> Result<()> {
        let now = Utc::now();
        let removed = self
            .db
            .delete_exchanges_before(now - Duration::seconds(max_age_seconds))?;
        self.entries.retain(|e| e.age_seconds(now) <= max_age_seconds);
        if removed > 0 {
            debug!(removed, "Truncated conversation history");
        }
        Ok(())
    }

    /// Newest first.
    pub fn entries(&self) -> &[Exchange] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the whole history as a dated transcript, oldest first. Returns
    /// `None` when there is nothing to export.
    pub fn export_to(&self, dir: &Path, extension: &str, model: &str) -> Result<Option<PathBuf>> {
        if self.entries.is_empty() {
            return Ok(None);
        }
        let now = Utc::now();
        let path = dir.join(format!(
            "quickchat export {}-{}.{extension}",
            now.format("%Y-%m-%d"),
            now.timestamp()
        ));
        let mut sections = vec![format!(
            "# Conversation with {model} exported from quickchat {}",
            Local::now().format("%Y-%m-%d, %H:%M:%S")
        )];
        sections.extend(self.entries.iter().rev().map(|e| {
            let assistant = if e.assistant_message.starts_with("```")
                || e.assistant_message.contains('\n')
            {
                format!("\n\n{}", e.assistant_message)
            } else {
                e.assistant_message.clone()
            };
            format!(
                "---\n\n**User:** {}\n\n**Assistant:** {assistant}",
                e.user_message
            )
        }));
        save_file(&path, &sections.join("\n\n"))?;
        info!(path = %path.display(), "Conversation history exported");
        Ok(Some(path))
    }
}

fn minutes_to_seconds(minutes: u64) -> i64 {
    i64::try_from(minutes.saturating_mul(60)).unwrap_or(i64::MAX)
}
