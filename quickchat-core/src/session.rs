//! One invocation end to end: parse the input, run a command or send a chat
//! request, record the exchange and apply post-processing.

use crate::command::{Command, CommandKind};
use crate::config::Config;
use crate::db::Database;
use crate::error::{ChatError, Result};
use crate::help;
use crate::history::{ConversationHistory, HistoryLimits};
use crate::host::{Host, APP_NAME};
use crate::models::{Exchange, PostTask};
use crate::modifier::IMAGE_MODEL;
use crate::openai::ChatApi;
use crate::parse::{Invocation, ModifierParser, ParsedRequest};
use crate::request::{is_slow_model, RequestBuilder};
use crate::util::{safe_filename, save_file, word_count};
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where response files and exports are written.
#[derive(Debug, Clone)]
pub struct SessionPaths {
    pub cache_dir: PathBuf,
    pub export_dir: PathBuf,
}

impl SessionPaths {
    pub fn standard() -> Result<Self> {
        Ok(Self {
            cache_dir: crate::util::cache_dir()?,
            export_dir: crate::util::downloads_dir()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    Text { title: String, body: String },
    /// Newest first.
    History(Vec<Exchange>),
    File(PathBuf),
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub text: String,
    /// File holding the response, when one was written.
    pub path: Option<PathBuf>,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Command(CommandOutput),
    Response(Response),
    Declined,
}

pub struct Session<'a, 'h> {
    config: Config<'a>,
    personas: crate::persona::PersonaRegistry<'a>,
    history: ConversationHistory<'a>,
    host: &'h dyn Host,
    api: &'h dyn ChatApi,
    paths: SessionPaths,
}

impl<'a, 'h> Session<'a, 'h> {
    pub fn open(
        db: &'a Database,
        host: &'h dyn Host,
        api: &'h dyn ChatApi,
        paths: SessionPaths,
    ) -> Result<Self> {
        let config = Config::load(db)?;
        let personas = crate::persona::PersonaRegistry::load(db)?;
        let history = ConversationHistory::load(db, HistoryLimits::from_config(&config))?;
        Ok(Self {
            config,
            personas,
            history,
            host,
            api,
            paths,
        })
    }

    /// Adopt a key found outside the database, e.g. `OPENAI_API_KEY`, when
    /// none is configured.
    pub fn import_api_key(&mut self, key: Option<String>) -> Result<()> {
        self.config.import_api_key(key)
    }

    pub fn config(&self) -> &Config<'a> {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistory<'a> {
        &self.history
    }

    pub fn run(&mut self, input: &str) -> Result<Outcome> {
        let invocation = ModifierParser::new(
            &self.config,
            &self.personas,
            &mut self.history,
            self.host,
        )
        .parse(input)?;

        match invocation {
            Invocation::Command(command) => Ok(Outcome::Command(self.execute(command)?)),
            Invocation::Declined => Ok(Outcome::Declined),
            Invocation::Chat(parsed) => self.send(parsed).map(Outcome::Response),
        }
    }

    fn send(&mut self, parsed: ParsedRequest) -> Result<Response> {
        let api_key = self.config.api_key().to_string();
        if api_key.is_empty() {
            return Err(ChatError::config(help::api_key()));
        }

        if !parsed.redo
            && self.config.cache_enabled()
            && word_count(&parsed.input_text) >= self.config.cache_min_words()
        {
            if let Some(hit) = self.history.get(&parsed.input_text) {
                info!(input = %parsed.input_text, "Serving cached response");
                let text = hit.assistant_message.clone();
                return self.finish(&parsed, text, true);
            }
        }

        let builder = RequestBuilder::new(&self.config);
        let text = if parsed.model == IMAGE_MODEL {
            self.api.image(&api_key, &builder.image_request(&parsed))?
        } else {
            let timeout = builder.timeout(&parsed.model);
            if is_slow_model(&parsed.model) {
                self.host.notify(
                    APP_NAME,
                    &format!("Message sent. {} is slow; please have patience!", parsed.model),
                );
            }
            self.api
                .chat(&api_key, &builder.chat_request(&parsed), timeout)?
        };

        if text.is_empty() {
            warn!("The response was empty");
            self.host.notify(APP_NAME, "The response was empty.");
            return Ok(Response {
                text,
                path: None,
                cached: false,
            });
        }

        self.history.add(
            &parsed.input_text,
            &parsed.user_message,
            &text,
            parsed.transient,
        )?;
        self.finish(&parsed, text, false)
    }

    fn finish(&self, parsed: &ParsedRequest, mut text: String, cached: bool) -> Result<Response> {
        if parsed.postprocessing.contains(&PostTask::ConcatenateMessages) {
            text = format!("{} {text}", parsed.residual);
        }
        if parsed.postprocessing.contains(&PostTask::CopyToClipboard) {
            self.host.set_clipboard_text(&text)?;
            self.host.notify("Copied to clipboard", &text);
        }

        let path = self.paths.cache_dir.join(format!(
            "{}.{}",
            safe_filename(&parsed.input_text),
            self.config.filename_extension()
        ));
        save_file(&path, &text)?;

        Ok(Response {
            text,
            path: Some(path),
            cached,
        })
    }

    fn confirmed(&self, message: &str, action: &str) -> bool {
        self.host
            .confirm("Are you sure?", message, &[action, "Cancel"])
            == 0
    }

    fn execute(&mut self, command: Command) -> Result<CommandOutput> {
        debug!(command = ?command.kind, args = %command.args, "Executing command");
        let output = match command.kind {
            CommandKind::Help => CommandOutput::Text {
                title: APP_NAME.to_string(),
                body: help::general(&self.config),
            },

            CommandKind::History => {
                if self.history.is_empty() {
                    self.host.notify(APP_NAME, "History is empty.");
                    CommandOutput::Done
                } else {
                    CommandOutput::History(self.history.entries().to_vec())
                }
            }

            CommandKind::Clear => {
                if self.confirmed("This will erase all conversation history.", "Erase") {
                    self.history.clear()?;
                    self.host.notify(APP_NAME, "Conversation history erased.");
                }
                CommandOutput::Done
            }

            CommandKind::Export => {
                match self.history.export_to(
                    &self.paths.export_dir,
                    self.config.filename_extension(),
                    self.config.model(),
                )? {
                    Some(path) => {
                        self.host.notify(
                            APP_NAME,
                            &format!("Conversation history saved to {}.", path.display()),
                        );
                        CommandOutput::File(path)
                    }
                    None => {
                        self.host.notify(APP_NAME, "History is empty.");
                        CommandOutput::Done
                    }
                }
            }

            CommandKind::Cache => {
                std::fs::create_dir_all(&self.paths.cache_dir)?;
                self.host.open_path(&self.paths.cache_dir)?;
                CommandOutput::Done
            }

            CommandKind::Version => CommandOutput::Text {
                title: format!("{APP_NAME} version {}", env!("CARGO_PKG_VERSION")),
                body: self.version_report(),
            },

            CommandKind::ConfigList => CommandOutput::Text {
                title: format!("{APP_NAME} configuration"),
                body: help::config(&self.config),
            },

            CommandKind::ConfigReset => {
                if self.confirmed(
                    "This will erase all configuration options, resetting them to their default values.",
                    "Reset",
                ) {
                    self.config.reset(&["api_key"])?;
                    self.host.notify(APP_NAME, "Configuration reset to default.");
                }
                CommandOutput::Done
            }

            CommandKind::ConfigSet => {
                let (key, value) = command.key_and_value();
                let shown = self.config.set(key, value)?;
                self.host.notify(
                    &format!("{APP_NAME} configuration saved"),
                    &format!("“{key}” has been set to “{shown}”"),
                );
                CommandOutput::Done
            }

            CommandKind::PersonaList => CommandOutput::Text {
                title: format!("{APP_NAME} personas"),
                body: help::persona(&self.personas),
            },

            CommandKind::PersonaSet => {
                let (name, message) = command.key_and_value();
                self.personas.set(name, message)?;
                self.host.notify(
                    &format!("{APP_NAME} persona saved"),
                    &format!("“{}” has been set to “{message}”", name.to_lowercase()),
                );
                CommandOutput::Done
            }

            CommandKind::PersonaDelete => {
                let name = command.args.trim();
                if self.personas.unset(name)? {
                    self.host
                        .notify(APP_NAME, &format!("Persona “{name}” deleted."));
                } else {
                    self.host
                        .notify(APP_NAME, &format!("Persona “{name}” does not exist."));
                }
                CommandOutput::Done
            }

            CommandKind::PersonaReset => {
                if self.confirmed(
                    "This will erase all personas, resetting them to their default values.",
                    "Reset",
                ) {
                    self.personas.set_defaults()?;
                    self.host.notify(APP_NAME, "Personas reset to default.");
                }
                CommandOutput::Done
            }

            CommandKind::PersonaExport => {
                let path = self
                    .personas
                    .export_to(&self.paths.export_dir, self.config.filename_extension())?;
                self.host
                    .notify(APP_NAME, &format!("Personas saved to {}.", path.display()));
                CommandOutput::File(path)
            }
        };
        Ok(output)
    }

    fn version_report(&self) -> String {
        let current = env!("CARGO_PKG_VERSION");
        match self.api.latest_release() {
            Ok(latest) => match compare_versions(current, &latest) {
                Ordering::Equal => {
                    format!("You have version {current} which is the latest version available.")
                }
                Ordering::Greater => format!(
                    "You have version {current} which is newer than the latest version available ({latest})."
                ),
                Ordering::Less => format!(
                    "{latest} is the latest version available. You have version {current}."
                ),
            },
            Err(e) => format!("Failed to check if a new version is available. {e}"),
        }
    }
}

/// Compare dotted version strings numerically, ignoring a leading `v`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    fn parts(version: &str) -> Vec<u64> {
        version
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .map(|part| {
                part.chars()
                    .take_while(char::is_ascii_digit)
                    .collect::<String>()
                    .parse()
                    .unwrap_or(0)
            })
            .collect()
    }
    let (a, b) = (parts(a), parts(b));
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            a.get(i)
                .copied()
                .unwrap_or(0)
                .cmp(&b.get(i).copied().unwrap_or(0))
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}
