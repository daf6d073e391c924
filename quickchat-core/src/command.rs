//! Management commands recognized before any modifier parsing.

use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    History,
    Clear,
    Export,
    Cache,
    Version,
    ConfigList,
    ConfigReset,
    ConfigSet,
    PersonaList,
    PersonaSet,
    PersonaDelete,
    PersonaReset,
    PersonaExport,
}

/// Keyword → command. Sub-commands are keyed by the concatenated words, so
/// `config set` is `configset`.
pub const COMMANDS: &[(&str, CommandKind)] = &[
    ("help", CommandKind::Help),
    ("history", CommandKind::History),
    ("clear", CommandKind::Clear),
    ("export", CommandKind::Export),
    ("cache", CommandKind::Cache),
    ("version", CommandKind::Version),
    ("config", CommandKind::ConfigList),
    ("configlist", CommandKind::ConfigList),
    ("configreset", CommandKind::ConfigReset),
    ("configset", CommandKind::ConfigSet),
    ("persona", CommandKind::PersonaList),
    ("personalist", CommandKind::PersonaList),
    ("personaset", CommandKind::PersonaSet),
    ("personadelete", CommandKind::PersonaDelete),
    ("personareset", CommandKind::PersonaReset),
    ("personaexport", CommandKind::PersonaExport),
];

// `set` needs a trailing space so that a bare "config set" is not a command.
static SUBCOMMAND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^(config|persona) *(delete|export|list|reset|set )(.*)$")
        .expect("valid subcommand pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    /// Text following the command keywords, original case preserved.
    pub args: String,
}

impl Command {
    /// Recognize a management command in already-normalized input.
    pub fn parse(input: &str) -> Option<Command> {
        let (key, args) = match SUBCOMMAND.captures(input) {
            Some(caps) => (
                format!("{}{}", &caps[1], caps[2].trim()).to_lowercase(),
                caps[3].trim().to_string(),
            ),
            None => (input.trim().to_lowercase(), String::new()),
        };
        COMMANDS
            .iter()
            .find(|(keyword, _)| *keyword == key)
            .map(|(_, kind)| Command { kind: *kind, args })
    }

    /// Split the arguments into the first word and the rest, e.g. the option
    /// name and its value for `config set`.
    pub fn key_and_value(&self) -> (&str, &str) {
        match self.args.split_once(' ') {
            Some((key, value)) => (key, value.trim()),
            None => (self.args.as_str(), ""),
        }
    }
}
