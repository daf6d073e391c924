use crate::db::Database;
use crate::error::{ChatError, Result};
use crate::models::{Persona, PostTask};
use crate::modifier::{is_reserved, match_key};
use crate::util::{save_file, truncate};
use chrono::{Local, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_PERSONA: &str = "_default";

const OCCUPATIONAL_EMOJI: &[&str] = &[
    "🧐", "🧑‍⚕️", "🧑‍🎓", "💂", "🧑‍⚖️", "👷", "🕵️", "🧑‍🎨", "🧑‍🌾", "🧟", "🧑‍🍳",
];

const TRANSIENT_NOTE: &str = "† These personas are transient. Messages sent using a transient persona will not include conversation history, and will not be sent in future history. Responses will still be cached.";

const COPYEDITOR: &str = "As a copyeditor, your role is to edit text to enhance clarity and consistency. Adhere to rules set forth in style guides such as \"AP Stylebook\" and \"Chicago Manual of Style\". In general: avoid clichés, remove superfluous adjectives, use short words, cut unnecessary words, and prefer the active voice.";

const COPYWRITER: &str = "As a copywriter, your role is to write text that is clear, consistent, well reasoned, and emotionally intelligent. Adhere to rules set forth in style guides such as \"AP Stylebook\" and \"Chicago Manual of Style\". In general: avoid clichés, remove superfluous adjectives, use short words, cut unnecessary words, and prefer the active voice.";

fn builtin(
    name: &str,
    emoji: &str,
    description: &str,
    system_message: String,
    retain_prefix: bool,
    transient: bool,
) -> Persona {
    Persona {
        name: name.to_string(),
        system_message,
        retain_prefix,
        transient,
        postprocessing: None,
        description: Some(description.to_string()),
        emoji: Some(emoji.to_string()),
    }
}

/// The seed set installed on first run and by `persona reset`.
pub fn default_personas() -> Vec<Persona> {
    let mut complete = builtin(
        "complete",
        "🧙",
        "Continue writing at the end of the text.",
        format!("{COPYWRITER} Please continue writing where the user message ends to complete the text into a coherent paragraph."),
        false,
        true,
    );
    complete.postprocessing = Some(PostTask::ConcatenateMessages);

    vec![
        Persona {
            name: DEFAULT_PERSONA.to_string(),
            system_message: "You are a helpful assistant to an expert user with an advanced comprehension level. Be succinct. Limit prose. Never repeat the user message. Never apologize. Never say \"As an AI language model\".".to_string(),
            retain_prefix: true,
            transient: false,
            postprocessing: None,
            description: None,
            emoji: None,
        },
        builtin(
            "changelog",
            "🧑‍🔧",
            "Write release notes based on a git commit log.",
            "Please write public release notes based on the given git commit log. Use non-technical language. Only include significant new features.".to_string(),
            false,
            true,
        ),
        builtin(
            "code",
            "🧑‍💻",
            "Write code only, no explanation or description.",
            "You are an assistant to a senior software engineer. Please write code only, no description or explanation besides code comments. If the code is more than 3 lines long, add comments to the code. Be succinct. Limit prose.".to_string(),
            true,
            false,
        ),
        builtin(
            "commit",
            "🥷",
            "Write a git commit message from diff output.",
            "Please write an appropriate git commit message based on the code changes in the given diff output.".to_string(),
            false,
            true,
        ),
        complete,
        builtin(
            "condense",
            "🦸",
            "Shorten text while maintaining its original meaning.",
            format!("{COPYEDITOR} Please shorten the given text while maintaining its original meaning."),
            false,
            true,
        ),
        builtin(
            "expand",
            "🦹",
            "Expand on text by adding details.",
            format!("{COPYEDITOR} Please expand on the following text, adding information to enhance understanding of the topic."),
            false,
            true,
        ),
        builtin(
            "fix",
            "🧑‍🏭",
            "Correct spelling and grammar.",
            "Please correct the spelling and grammar in given text. Make no other changes. Do not include an introduction or explanation.".to_string(),
            false,
            true,
        ),
        builtin(
            "list",
            "🧑‍🏫",
            "Respond with a bulleted list.",
            "Please respond in the form of a bulleted list. Do not include an introduction or description of the list.".to_string(),
            true,
            false,
        ),
        builtin(
            "rewrite",
            "🧑‍🎤",
            "Rewrite the text to enhance clarity and consistency.",
            format!("{COPYEDITOR} Please rewrite the given text to enhance clarity and consistency, so that it is well reasoned and emotionally intelligent."),
            false,
            true,
        ),
        builtin(
            "safe",
            "🧑‍🔬",
            "List health and safety concerns for the given ingredients.",
            "List health and safety concerns for ingredients in food and consumer products using data from public safety databases.\n\nPlease list the given ingredients with an abbreviated safety profile. Prefix with \"- ✅\" for safe ingredients and \"- 🚫\" for those with health, ecotoxicity, contamination, or negative externality concerns.".to_string(),
            false,
            true,
        ),
        builtin(
            "write",
            "🧛",
            "Write clear, consistent text according to the user’s instructions.",
            format!("{COPYWRITER} Please write according to the user's instructions."),
            true,
            true,
        ),
    ]
}

pub struct PersonaRegistry<'a> {
    db: &'a Database,
    personas: BTreeMap<String, Persona>,
    fallback_default: Persona,
}

impl<'a> PersonaRegistry<'a> {
    /// Load saved personas, seeding the built-in set when none exist.
    pub fn load(db: &'a Database) -> Result<Self> {
        let personas: BTreeMap<String, Persona> = db
            .list_personas()?
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect();
        debug!(count = personas.len(), "Loaded personas");
        let fallback_default = default_personas().swap_remove(0);
        let mut registry = Self {
            db,
            personas,
            fallback_default,
        };
        if registry.personas.is_empty() {
            registry.set_defaults()?;
        }
        Ok(registry)
    }

    pub fn set_defaults(&mut self) -> Result<()> {
        self.db.delete_all_personas()?;
        self.personas.clear();
        for persona in default_personas() {
            debug!(name = %persona.name, "Setting default persona");
            self.db.upsert_persona(&persona)?;
            self.personas.insert(persona.name.clone(), persona);
        }
        info!("Personas reset to defaults");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Persona> {
        self.personas.get(&name.to_lowercase())
    }

    /// The persona used when no persona modifier is present.
    pub fn default_persona(&self) -> &Persona {
        self.personas
            .get(DEFAULT_PERSONA)
            .unwrap_or(&self.fallback_default)
    }

    pub fn list(&self) -> impl Iterator<Item = &Persona> {
        self.personas.values()
    }

    /// Create or overwrite a persona. `default` updates the default persona.
    pub fn set(&mut self, name: &str, system_message: &str) -> Result<()> {
        let name = name.trim().to_lowercase();
        let system_message = system_message.trim();
        if name.is_empty() {
            return Err(ChatError::persona("Persona name must not be empty."));
        }
        if system_message.is_empty() {
            return Err(ChatError::persona("Persona behavior must not be empty."));
        }
        if is_reserved(&name) {
            return Err(ChatError::persona(format!(
                "“{name}” is a reserved keyword. Please choose a different name for your new persona."
            )));
        }
        // Input words are matched in their ASCII-only form, so any other name
        // could never be selected.
        if match_key(&name) != name {
            return Err(ChatError::persona(format!(
                "“{name}” may only contain ASCII characters."
            )));
        }

        let persona = if name == "default" || name == DEFAULT_PERSONA {
            Persona {
                retain_prefix: true,
                ..Persona::new(DEFAULT_PERSONA, system_message)
            }
        } else {
            Persona::new(name, system_message)
        };
        self.db.upsert_persona(&persona)?;
        info!(name = %persona.name, "Persona saved");
        self.personas.insert(persona.name.clone(), persona);
        Ok(())
    }

    /// Remove a persona. Returns whether it existed.
    pub fn unset(&mut self, name: &str) -> Result<bool> {
        let name = name.trim().to_lowercase();
        if name == "default" || name == DEFAULT_PERSONA {
            return Err(ChatError::persona(
                "The default persona cannot be deleted. Use “persona set default MESSAGE” to change it.",
            ));
        }
        let removed = self.db.delete_persona(&name)?;
        self.personas.remove(&name);
        if removed {
            info!(name = %name, "Persona deleted");
        }
        Ok(removed)
    }

    /// One-line summary per persona, default first.
    pub fn show(&self) -> String {
        self.personas
            .values()
            .map(|p| {
                if p.name == DEFAULT_PERSONA {
                    return format!(
                        "🎭 default (used when no persona is specified): “{}”\n",
                        p.system_message
                    );
                }
                let summary = match &p.description {
                    Some(description) => description.clone(),
                    None => format!("“{}”", truncate(&p.system_message, 50)),
                };
                let transient_note = if p.transient { "†" } else { "" };
                format!("{} {}: {summary}{transient_note}\n", emoji_for(p), p.name)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Write every persona and its prompt to a dated file in `dir`.
    pub fn export_to(&self, dir: &Path, extension: &str) -> Result<PathBuf> {
        let now = Utc::now();
        let path = dir.join(format!(
            "quickchat personas {}-{}.{extension}",
            now.format("%Y-%m-%d"),
            now.timestamp()
        ));
        let mut sections = vec![format!(
            "# Personas exported from quickchat {}",
            Local::now().format("%Y-%m-%d, %H:%M:%S")
        )];
        sections.extend(self.personas.values().map(|p| {
            if p.name == DEFAULT_PERSONA {
                format!("## 🎭 Default persona\n\n{}", p.system_message)
            } else {
                let transient_note = if p.transient { " †" } else { "" };
                format!(
                    "## {} {}{transient_note}\n\n{}",
                    emoji_for(p),
                    p.name,
                    p.system_message
                )
            }
        }));
        sections.push(format!("---\n{TRANSIENT_NOTE}"));
        save_file(&path, &sections.join("\n\n"))?;
        info!(path = %path.display(), "Personas exported");
        Ok(path)
    }
}

pub fn transient_note() -> &'static str {
    TRANSIENT_NOTE
}

fn emoji_for(persona: &Persona) -> String {
    if let Some(emoji) = &persona.emoji {
        return emoji.clone();
    }
    let hash: usize = persona.name.encode_utf16().map(usize::from).sum();
    OCCUPATIONAL_EMOJI[hash % OCCUPATIONAL_EMOJI.len()].to_string()
}
