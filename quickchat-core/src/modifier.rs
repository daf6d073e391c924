//! Leading-word modifiers and the per-word scan decision.
//!
//! The keyword table here is the single source for both the scanner and the
//! persona registry's reserved-name check.

use crate::models::Persona;
use crate::persona::PersonaRegistry;

/// Model selected by the upgrade keyword.
pub const UPGRADED_MODEL: &str = "gpt-4";
/// Pseudo-model that routes the request to image generation.
pub const IMAGE_MODEL: &str = "dall-e";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    UpgradeModel,
    Image,
    NewConversation,
    Transient,
    Copy,
    Redo,
}

pub const MODIFIERS: &[(&str, Modifier)] = &[
    ("4", Modifier::UpgradeModel),
    ("gpt4", Modifier::UpgradeModel),
    ("image", Modifier::Image),
    ("new", Modifier::NewConversation),
    ("transient", Modifier::Transient),
    ("copy", Modifier::Copy),
    ("redo", Modifier::Redo),
];

pub fn lookup(key: &str) -> Option<Modifier> {
    MODIFIERS
        .iter()
        .find(|(keyword, _)| *keyword == key)
        .map(|(_, modifier)| *modifier)
}

/// Parse a temperature literal from the fixed set `0.0`, `0.1`, … `2.0`.
pub fn temperature_literal(word: &str) -> Option<f32> {
    let bytes = word.as_bytes();
    if bytes.len() != 3 || bytes[1] != b'.' || !bytes[2].is_ascii_digit() {
        return None;
    }
    match bytes[0] {
        b'0' | b'1' => {}
        b'2' if bytes[2] == b'0' => {}
        _ => return None,
    }
    word.parse().ok()
}

/// Names a persona may not use because the scanner would consume them as
/// modifiers.
pub fn is_reserved(name: &str) -> bool {
    let key = match_key(name);
    temperature_literal(&key).is_some() || lookup(&key).is_some()
}

/// Lower-cased, ASCII-only form of a word used for keyword matching.
pub fn match_key(word: &str) -> String {
    word.chars()
        .filter(char::is_ascii)
        .collect::<String>()
        .to_ascii_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Temperature(f32),
    Modifier(Modifier),
    Persona(Persona),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScanStep {
    Consumed(Effect),
    Stop,
}

/// Decide what a single leading word does. A persona name only counts while
/// no persona has been selected yet in the current scan.
pub fn classify_word(key: &str, personas: &PersonaRegistry, persona_selected: bool) -> ScanStep {
    if let Some(temperature) = temperature_literal(key) {
        return ScanStep::Consumed(Effect::Temperature(temperature));
    }
    if let Some(modifier) = lookup(key) {
        return ScanStep::Consumed(Effect::Modifier(modifier));
    }
    if !persona_selected {
        if let Some(persona) = personas.get(key) {
            return ScanStep::Consumed(Effect::Persona(persona.clone()));
        }
    }
    ScanStep::Stop
}
