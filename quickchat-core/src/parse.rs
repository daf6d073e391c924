//! Turns one line of user input into a management command or a fully formed
//! chat request.
//!
//! Leading words are scanned left to right. Each word is either consumed as a
//! modifier (temperature, model, persona, flags) and stripped, or it stops the
//! scan; that word and everything after it is the message.

use crate::command::Command;
use crate::config::Config;
use crate::error::{ChatError, Result};
use crate::history::ConversationHistory;
use crate::host::{Host, APP_NAME};
use crate::models::{Message, PostTask};
use crate::modifier::{classify_word, match_key, Effect, Modifier, ScanStep, IMAGE_MODEL, UPGRADED_MODEL};
use crate::persona::PersonaRegistry;
use crate::request::{assemble_messages, compose_user_message};
use crate::util::{normalize_whitespace, truncate};
use rand::Rng;
use tracing::debug;

const CLIPBOARD_PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRequest {
    /// Input as typed (normalized), used as the cache key.
    pub input_text: String,
    /// Message after modifier stripping and persona re-prefixing.
    pub residual: String,
    /// Final user entry as sent, including any addendum.
    pub user_message: String,
    pub model: String,
    pub temperature: f32,
    /// System entry, replayed history, then the user entry.
    pub messages: Vec<Message>,
    pub transient: bool,
    pub postprocessing: Vec<PostTask>,
    /// Selected persona, `None` for the default.
    pub persona: Option<String>,
    /// The input was substituted by a redo.
    pub redo: bool,
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Command(Command),
    Chat(ParsedRequest),
    /// The user declined to send the clipboard contents.
    Declined,
}

/// Settings accumulated while scanning leading words.
#[derive(Debug, Clone)]
struct ScanState {
    model: String,
    temperature: f32,
    system_message: String,
    transient: bool,
    postprocessing: Vec<PostTask>,
    persona: Option<String>,
    prefix: Option<String>,
    redo: bool,
}

enum ScanOutcome {
    Residual(String),
    /// Start over on the input of a popped exchange.
    Restart(String),
}

pub struct ModifierParser<'p, 'a> {
    config: &'p Config<'a>,
    personas: &'p PersonaRegistry<'a>,
    history: &'p mut ConversationHistory<'a>,
    host: &'p dyn Host,
}

impl<'p, 'a> ModifierParser<'p, 'a> {
    pub fn new(
        config: &'p Config<'a>,
        personas: &'p PersonaRegistry<'a>,
        history: &'p mut ConversationHistory<'a>,
        host: &'p dyn Host,
    ) -> Self {
        Self {
            config,
            personas,
            history,
            host,
        }
    }

    fn initial_state(&self) -> ScanState {
        ScanState {
            model: self.config.model().to_string(),
            temperature: self.config.temperature(),
            system_message: self.personas.default_persona().system_message.clone(),
            transient: false,
            postprocessing: Vec::new(),
            persona: None,
            prefix: None,
            redo: false,
        }
    }

    pub fn parse(&mut self, raw_input: &str) -> Result<Invocation> {
        let mut input_text = normalize_whitespace(raw_input);

        if let Some(command) = Command::parse(&input_text) {
            debug!(command = ?command.kind, "Matched command");
            return Ok(Invocation::Command(command));
        }

        let mut state = self.initial_state();
        let mut residual = loop {
            match self.scan(&input_text, &mut state)? {
                ScanOutcome::Residual(residual) => break residual,
                ScanOutcome::Restart(previous_input) => {
                    debug!(input = %previous_input, "Redo: rescanning previous input");
                    input_text = previous_input;
                    state = self.initial_state();
                    state.redo = true;
                    state.temperature = rand::rng().random_range(0..=10) as f32 / 10.0;
                }
            }
        };

        if residual.is_empty() {
            let clipboard = self
                .host
                .clipboard_text()
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .ok_or(ChatError::EmptyInput)?;
            let choice = self.host.confirm(
                "Send this clipboard text?",
                &format!("“{}”", truncate(&clipboard, CLIPBOARD_PREVIEW_CHARS)),
                &["Ok", "Cancel"],
            );
            if choice != 0 {
                debug!("Clipboard text declined");
                return Ok(Invocation::Declined);
            }
            debug!(text = %clipboard, "Input from clipboard");
            input_text = format!("{input_text} {clipboard}").trim().to_string();
            residual = clipboard;
        }

        Ok(Invocation::Chat(self.build(input_text, residual, state)))
    }

    fn scan(&mut self, input_text: &str, state: &mut ScanState) -> Result<ScanOutcome> {
        let words: Vec<&str> = input_text.split(' ').collect();
        let mut consumed = 0;

        for word in &words {
            let key = match_key(word);
            let effect = match classify_word(&key, self.personas, state.persona.is_some()) {
                ScanStep::Stop => {
                    debug!("Done scanning modifiers");
                    break;
                }
                ScanStep::Consumed(effect) => effect,
            };

            match effect {
                Effect::Temperature(temperature) => state.temperature = temperature,
                Effect::Modifier(Modifier::UpgradeModel) => state.model = UPGRADED_MODEL.to_string(),
                Effect::Modifier(Modifier::Image) => {
                    state.model = IMAGE_MODEL.to_string();
                    state.transient = true;
                }
                Effect::Modifier(Modifier::NewConversation) => self.history.clear()?,
                Effect::Modifier(Modifier::Transient) => state.transient = true,
                Effect::Modifier(Modifier::Copy) => push_task(state, PostTask::CopyToClipboard),
                Effect::Modifier(Modifier::Redo) => {
                    // Only one substitution per invocation, and never from an
                    // input that itself asked for a redo.
                    let substitute = !state.redo
                        && self
                            .history
                            .latest()
                            .is_some_and(|previous| !match_key(&previous.input_text).contains("redo"));
                    if substitute {
                        if let Some(previous) = self.history.pop()? {
                            return Ok(ScanOutcome::Restart(previous.input_text));
                        }
                    }
                    debug!("Redo: nothing to substitute");
                }
                Effect::Persona(persona) => {
                    state.system_message = persona.system_message.clone();
                    if persona.retain_prefix {
                        state.prefix = Some(word.to_string());
                    }
                    state.transient |= persona.transient;
                    if let Some(task) = persona.postprocessing {
                        push_task(state, task);
                    }
                    state.persona = Some(persona.name);
                }
            }
            debug!(modifier = %key, "Scanned modifier");
            consumed += 1;
        }

        Ok(ScanOutcome::Residual(words[consumed..].join(" ")))
    }

    fn build(&mut self, input_text: String, residual: String, state: ScanState) -> ParsedRequest {
        // The addendum is tuned for the default persona; named personas carry
        // their own instructions.
        let addendum = state
            .persona
            .is_none()
            .then(|| self.config.user_message_addendum());
        let max_tokens = self.config.max_user_message_tokens();
        let composed = compose_user_message(&residual, state.prefix.as_deref(), addendum, max_tokens);
        if composed.truncated {
            self.host.notify(
                APP_NAME,
                &format!("Your message was truncated to {max_tokens} tokens."),
            );
        }

        let replay = if state.transient {
            Vec::new()
        } else {
            self.history.list()
        };
        let messages = assemble_messages(&state.system_message, &replay, &composed.content);

        let residual = match &state.prefix {
            Some(prefix) => format!("{prefix} {residual}"),
            None => residual,
        };

        ParsedRequest {
            input_text,
            residual,
            user_message: composed.content,
            model: state.model,
            temperature: state.temperature,
            messages,
            transient: state.transient,
            postprocessing: state.postprocessing,
            persona: state.persona,
            redo: state.redo,
            truncated: composed.truncated,
        }
    }
}

fn push_task(state: &mut ScanState, task: PostTask) {
    if !state.postprocessing.contains(&task) {
        state.postprocessing.push(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;
    use crate::db::Database;
    use crate::history::HistoryLimits;
    use crate::host::testing::RecordingHost;
    use crate::models::{Exchange, Role};
    use chrono::Utc;

    struct Fixture {
        db: Database,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                db: Database::open_in_memory().unwrap(),
            }
        }

        fn parse_with(&self, host: &RecordingHost, input: &str) -> Result<Invocation> {
            let config = Config::load(&self.db).unwrap();
            let personas = PersonaRegistry::load(&self.db).unwrap();
            let mut history =
                ConversationHistory::load(&self.db, HistoryLimits::from_config(&config)).unwrap();
            ModifierParser::new(&config, &personas, &mut history, host).parse(input)
        }

        fn chat(&self, input: &str) -> ParsedRequest {
            match self.parse_with(&RecordingHost::default(), input).unwrap() {
                Invocation::Chat(parsed) => parsed,
                other => panic!("expected chat request, got {other:?}"),
            }
        }

        fn remember(&self, input: &str, user: &str, assistant: &str) {
            self.db
                .insert_exchange(&Exchange {
                    timestamp: Utc::now(),
                    input_text: input.to_string(),
                    user_message: user.to_string(),
                    assistant_message: assistant.to_string(),
                    transient: false,
                })
                .unwrap();
        }
    }

    #[test]
    fn temperature_literals_are_stripped() {
        let fixture = Fixture::new();
        for tenth in 0..=20 {
            let literal = format!("{}.{}", tenth / 10, tenth % 10);
            let parsed = fixture.chat(&format!("{literal} why is the sky blue"));
            assert_eq!(parsed.residual, "why is the sky blue", "{literal}");
            assert!((parsed.temperature - tenth as f32 / 10.0).abs() < f32::EPSILON);
        }
    }

    #[test]
    fn plain_input_is_left_untouched() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("  why   is the sky blue?  ");

        assert_eq!(parsed.input_text, "why is the sky blue?");
        assert_eq!(parsed.residual, "why is the sky blue?");
        assert_eq!(parsed.model, "gpt-3.5-turbo");
        assert_eq!(parsed.temperature, 0.1);
        assert!(parsed.persona.is_none());
        assert!(parsed.postprocessing.is_empty());
    }

    #[test]
    fn persona_with_retained_prefix_and_model_switch() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("code 4 write a uuid function");
        let personas = PersonaRegistry::load(&fixture.db).unwrap();

        assert_eq!(parsed.residual, "code write a uuid function");
        assert_eq!(parsed.user_message, "code write a uuid function");
        assert_eq!(parsed.model, UPGRADED_MODEL);
        assert_eq!(parsed.persona.as_deref(), Some("code"));
        assert_eq!(parsed.messages[0].role, Role::System);
        assert_eq!(
            parsed.messages[0].content,
            personas.get("code").unwrap().system_message
        );
        assert_eq!(parsed.messages.last().unwrap().content, parsed.user_message);
    }

    #[test]
    fn second_persona_word_is_message_text() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("fix list of things");

        assert_eq!(parsed.persona.as_deref(), Some("fix"));
        assert_eq!(parsed.residual, "list of things");
        assert!(parsed.transient);
    }

    #[test]
    fn flags_accumulate_until_first_plain_word() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("copy transient 1.5 gpt4 tell me a joke copy");

        assert_eq!(parsed.residual, "tell me a joke copy");
        assert_eq!(parsed.postprocessing, vec![PostTask::CopyToClipboard]);
        assert!(parsed.transient);
        assert_eq!(parsed.temperature, 1.5);
        assert_eq!(parsed.model, "gpt-4");
    }

    #[test]
    fn default_persona_gets_addendum_and_punctuation() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("why is the sky blue");

        assert_eq!(
            parsed.user_message,
            "why is the sky blue. Be succinct. Limit prose. Never repeat the user message."
        );
        let personas = PersonaRegistry::load(&fixture.db).unwrap();
        assert_eq!(
            parsed.messages[0].content,
            personas.default_persona().system_message
        );
    }

    #[test]
    fn history_is_replayed_unless_transient() {
        let fixture = Fixture::new();
        fixture.remember("earlier", "earlier question", "earlier answer");

        let parsed = fixture.chat("and then?");
        let roles: Vec<Role> = parsed.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(parsed.messages[1].content, "earlier question");

        let parsed = fixture.chat("transient and then?");
        assert_eq!(parsed.messages.len(), 2);
    }

    #[test]
    fn new_clears_history() {
        let fixture = Fixture::new();
        fixture.remember("earlier", "earlier question", "earlier answer");

        let parsed = fixture.chat("new hello there");
        assert_eq!(parsed.residual, "hello there");
        assert_eq!(parsed.messages.len(), 2);
        assert!(fixture.db.list_exchanges().unwrap().is_empty());
    }

    #[test]
    fn image_modifier_selects_image_model() {
        let fixture = Fixture::new();
        let parsed = fixture.chat("image a red bicycle");

        assert_eq!(parsed.model, IMAGE_MODEL);
        assert!(parsed.transient);
        assert_eq!(parsed.residual, "a red bicycle");
    }

    #[test]
    fn redo_substitutes_previous_input() {
        let fixture = Fixture::new();
        fixture.remember("code 4 write a uuid function", "code write a uuid function", "fn uuid() {}");

        let parsed = fixture.chat("redo");
        assert!(parsed.redo);
        assert_eq!(parsed.input_text, "code 4 write a uuid function");
        assert_eq!(parsed.residual, "code write a uuid function");
        assert_eq!(parsed.model, UPGRADED_MODEL);
        assert!((0.0..=1.0).contains(&parsed.temperature));
        assert!(fixture.db.list_exchanges().unwrap().is_empty());
    }

    #[test]
    fn redo_does_not_chain() {
        let fixture = Fixture::new();
        fixture.remember("redo tell me more", "tell me more", "more");
        let host = RecordingHost::default();

        // The latest input already asked for a redo, so nothing is popped and
        // the empty residual falls back to the (empty) clipboard.
        let result = fixture.parse_with(&host, "redo");
        assert!(matches!(result, Err(ChatError::EmptyInput)));
        assert_eq!(fixture.db.list_exchanges().unwrap().len(), 1);

        // A redo that was substituted does not substitute again.
        fixture.remember("first question", "first question", "first answer");
        let parsed = fixture.chat("redo redo");
        assert_eq!(parsed.input_text, "first question");
        assert_eq!(fixture.db.list_exchanges().unwrap().len(), 1);
    }

    #[test]
    fn empty_input_uses_clipboard_after_confirmation() {
        let fixture = Fixture::new();
        let host = RecordingHost::with_clipboard("  some copied text ");

        let invocation = fixture.parse_with(&host, "fix").unwrap();
        let Invocation::Chat(parsed) = invocation else {
            panic!("expected chat request");
        };
        assert_eq!(parsed.residual, "some copied text");
        assert_eq!(parsed.input_text, "fix some copied text");
        assert_eq!(host.prompts.borrow().len(), 1);
    }

    #[test]
    fn declined_clipboard_aborts() {
        let fixture = Fixture::new();
        let host = RecordingHost::declining();
        *host.clipboard.borrow_mut() = Some("copied".to_string());

        assert_eq!(
            fixture.parse_with(&host, "copy").unwrap(),
            Invocation::Declined
        );
    }

    #[test]
    fn empty_input_and_clipboard_is_an_error() {
        let fixture = Fixture::new();
        let host = RecordingHost::default();
        assert!(matches!(
            fixture.parse_with(&host, "   "),
            Err(ChatError::EmptyInput)
        ));
    }

    #[test]
    fn long_messages_are_truncated_with_notice() {
        let fixture = Fixture::new();
        let mut config = Config::load(&fixture.db).unwrap();
        config.set("max_user_message_tokens", "5").unwrap();
        let host = RecordingHost::default();

        let Invocation::Chat(parsed) = fixture
            .parse_with(&host, "transient one two three four five six seven eight")
            .unwrap()
        else {
            panic!("expected chat request");
        };
        assert!(parsed.truncated);
        assert!(parsed.user_message.starts_with("one two three four…"));
        assert!(host.notified("truncated"));
    }

    #[test]
    fn commands_take_precedence() {
        let fixture = Fixture::new();
        let invocation = fixture
            .parse_with(&RecordingHost::default(), "persona set demo Be terse.")
            .unwrap();
        let Invocation::Command(command) = invocation else {
            panic!("expected command");
        };
        assert_eq!(command.kind, CommandKind::PersonaSet);
    }
}
