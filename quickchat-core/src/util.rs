use crate::error::{ChatError, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Approximate characters per token for common English text.
pub const CHARS_PER_TOKEN: usize = 4;

pub fn estimate_tokens(text: &str) -> f64 {
    text.chars().count() as f64 / CHARS_PER_TOKEN as f64
}

pub fn chars_for_tokens(tokens: usize) -> usize {
    tokens.saturating_mul(CHARS_PER_TOKEN)
}

/// Collapse runs of horizontal whitespace into a single space and trim.
/// Line breaks are preserved.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\n' && c != '\r' {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out.trim().to_string()
}

/// Shorten `text` to at most `max_chars` characters, ellipsis included,
/// cutting at the last word boundary.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let budget = max_chars - 1;
    let byte_at = |n: usize| {
        text.char_indices()
            .nth(n)
            .map(|(i, _)| i)
            .unwrap_or(text.len())
    };
    // A space right after the budget still counts as a boundary.
    let window = &text[..byte_at(budget + 1)];
    let cut = match window.rfind(' ') {
        Some(i) => &window[..i],
        None => &text[..byte_at(budget)],
    };
    let cut = cut.trim_end_matches([',', '.', '!', '?', ' ']).trim();
    format!("{cut}…")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn fnv1a_hash(text: &str) -> u32 {
    const FNV_PRIME: u32 = 0x0100_0193;
    const FNV_OFFSET: u32 = 0x811c_9dc5;
    text.trim().encode_utf16().fold(FNV_OFFSET, |hash, unit| {
        (hash ^ unit as u32).wrapping_mul(FNV_PRIME)
    })
}

pub fn slug(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut slug = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Filesystem-safe name derived from arbitrary input: a readable slug plus a
/// hash so distinct inputs never collide.
pub fn safe_filename(text: &str) -> String {
    let hash = fnv1a_hash(text).to_string();
    let slug: String = slug(text).chars().take(250 - hash.len()).collect();
    format!("{slug}-{hash}")
}

pub fn cache_dir() -> Result<PathBuf> {
    Ok(crate::db::Database::data_dir()?.join("cache"))
}

pub fn downloads_dir() -> Result<PathBuf> {
    dirs::download_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| ChatError::config("Cannot determine downloads directory"))
}

pub fn save_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    debug!(path = %path.display(), "Created file");
    Ok(())
}
