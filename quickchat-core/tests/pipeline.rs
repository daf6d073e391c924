use quickchat_core::request::{ChatRequest, ImageRequest};
use quickchat_core::{
    ChatApi, ChatError, CommandOutput, Database, Host, Outcome, Response, Role, Session,
    SessionPaths,
};
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const API_KEY: &str = "sk-abcdefghijklmnopqrstuvwxyz0123";

#[derive(Default)]
struct FakeHost {
    clipboard: RefCell<Option<String>>,
    notifications: RefCell<Vec<String>>,
    decline: Cell<bool>,
}

impl Host for FakeHost {
    fn clipboard_text(&self) -> Option<String> {
        self.clipboard.borrow().clone()
    }

    fn set_clipboard_text(&self, text: &str) -> quickchat_core::Result<()> {
        *self.clipboard.borrow_mut() = Some(text.to_string());
        Ok(())
    }

    fn notify(&self, title: &str, message: &str) {
        self.notifications
            .borrow_mut()
            .push(format!("{title}: {message}"));
    }

    fn confirm(&self, _title: &str, _message: &str, _buttons: &[&str]) -> usize {
        usize::from(self.decline.get())
    }

    fn open_path(&self, _path: &Path) -> quickchat_core::Result<()> {
        Ok(())
    }
}

/// Answers every chat request with a fixed reply and records what was sent.
struct FakeApi {
    reply: std::result::Result<String, String>,
    requests: RefCell<Vec<ChatRequest>>,
    images: RefCell<Vec<ImageRequest>>,
    keys: RefCell<Vec<String>>,
}

impl FakeApi {
    fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            requests: RefCell::new(Vec::new()),
            images: RefCell::new(Vec::new()),
            keys: RefCell::new(Vec::new()),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            ..Self::replying("")
        }
    }

    fn calls(&self) -> usize {
        self.requests.borrow().len() + self.images.borrow().len()
    }

    fn answer(&self) -> quickchat_core::Result<String> {
        self.reply.clone().map_err(ChatError::Api)
    }
}

impl ChatApi for FakeApi {
    fn chat(
        &self,
        api_key: &str,
        request: &ChatRequest,
        _timeout: Duration,
    ) -> quickchat_core::Result<String> {
        self.keys.borrow_mut().push(api_key.to_string());
        self.requests.borrow_mut().push(request.clone());
        self.answer()
    }

    fn image(&self, api_key: &str, request: &ImageRequest) -> quickchat_core::Result<String> {
        self.keys.borrow_mut().push(api_key.to_string());
        self.images.borrow_mut().push(request.clone());
        self.answer()
    }

    fn latest_release(&self) -> quickchat_core::Result<String> {
        Ok("v0.0.1".to_string())
    }
}

struct Fixture {
    db: Database,
    host: FakeHost,
    api: FakeApi,
    dir: TempDir,
}

impl Fixture {
    fn new(api: FakeApi) -> Self {
        Self {
            db: Database::open_in_memory().unwrap(),
            host: FakeHost::default(),
            api,
            dir: TempDir::new().unwrap(),
        }
    }

    fn paths(&self) -> SessionPaths {
        SessionPaths {
            cache_dir: self.dir.path().join("cache"),
            export_dir: self.dir.path().join("exports"),
        }
    }

    /// Each call is a separate invocation, as when launched from a launcher.
    fn run(&self, input: &str) -> quickchat_core::Result<Outcome> {
        let mut session = Session::open(&self.db, &self.host, &self.api, self.paths())?;
        session.run(input)
    }

    fn with_key(api: FakeApi) -> Self {
        let fixture = Self::new(api);
        fixture
            .run(&format!("config set api_key {API_KEY}"))
            .unwrap();
        fixture
    }

    fn respond(&self, input: &str) -> Response {
        match self.run(input).unwrap() {
            Outcome::Response(response) => response,
            other => panic!("expected a response, got {other:?}"),
        }
    }

    fn notified(&self, needle: &str) -> bool {
        self.host
            .notifications
            .borrow()
            .iter()
            .any(|n| n.contains(needle))
    }
}

#[test]
fn missing_api_key_is_a_configuration_error() {
    let fixture = Fixture::new(FakeApi::replying("hi"));
    match fixture.run("why is the sky blue") {
        Err(ChatError::Config(message)) => assert!(message.contains("config set api_key")),
        other => panic!("expected configuration error, got {other:?}"),
    }
    assert_eq!(fixture.api.calls(), 0);
}

#[test]
fn response_is_recorded_and_written_to_cache_file() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    let response = fixture.respond("why is the sky blue");

    assert_eq!(response.text, "Rayleigh scattering.");
    assert!(!response.cached);
    let path = response.path.expect("response file");
    assert!(path.starts_with(fixture.dir.path().join("cache")));
    assert!(path.to_string_lossy().ends_with(".txt"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), "Rayleigh scattering.");
    assert_eq!(fixture.api.keys.borrow().as_slice(), [API_KEY]);

    let stored = fixture.db.list_exchanges().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].input_text, "why is the sky blue");
}

#[test]
fn repeated_input_is_served_from_cache() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    fixture.respond("why is the sky blue");
    let second = fixture.respond("why is the sky blue");

    assert!(second.cached);
    assert_eq!(second.text, "Rayleigh scattering.");
    assert_eq!(fixture.api.calls(), 1);
}

#[test]
fn short_inputs_and_disabled_cache_always_hit_the_api() {
    let fixture = Fixture::with_key(FakeApi::replying("Hello!"));
    fixture.respond("hi there");
    fixture.respond("hi there");
    assert_eq!(fixture.api.calls(), 2);

    fixture.run("config set cache_enable false").unwrap();
    fixture.respond("why is the sky blue");
    fixture.respond("why is the sky blue");
    assert_eq!(fixture.api.calls(), 4);
}

#[test]
fn empty_response_is_not_cached() {
    let fixture = Fixture::with_key(FakeApi::replying(""));
    let response = fixture.respond("why is the sky blue");

    assert!(response.text.is_empty());
    assert!(response.path.is_none());
    assert!(fixture.notified("empty"));
    assert!(fixture.db.list_exchanges().unwrap().is_empty());

    fixture.respond("why is the sky blue");
    assert_eq!(fixture.api.calls(), 2);
}

#[test]
fn api_errors_propagate() {
    let fixture = Fixture::with_key(FakeApi::failing("Incorrect API key provided"));
    match fixture.run("why is the sky blue") {
        Err(ChatError::Api(message)) => assert_eq!(message, "Incorrect API key provided"),
        other => panic!("expected api error, got {other:?}"),
    }
    assert!(fixture.db.list_exchanges().unwrap().is_empty());
}

#[test]
fn copy_modifier_puts_response_on_clipboard() {
    let fixture = Fixture::with_key(FakeApi::replying("fn uuid() {}"));
    let response = fixture.respond("code copy 4 write a uuid function");

    assert_eq!(fixture.host.clipboard.borrow().as_deref(), Some("fn uuid() {}"));
    assert_eq!(response.text, "fn uuid() {}");

    let requests = fixture.api.requests.borrow();
    assert_eq!(requests[0].model, "gpt-4");
    let last = requests[0].messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content, "code write a uuid function");
}

#[test]
fn complete_persona_concatenates_message_and_response() {
    let fixture = Fixture::with_key(FakeApi::replying("jumps over the lazy dog."));
    let response = fixture.respond("complete the quick brown fox");
    assert_eq!(response.text, "the quick brown fox jumps over the lazy dog.");
}

#[test]
fn history_is_replayed_as_context() {
    let fixture = Fixture::with_key(FakeApi::replying("Paris."));
    fixture.respond("what is the capital of france");
    fixture.respond("and of germany");

    let requests = fixture.api.requests.borrow();
    let second = &requests[1].messages;
    assert_eq!(second.len(), 4);
    assert_eq!(second[0].role, Role::System);
    assert!(second[1].content.starts_with("what is the capital of france"));
    assert_eq!(second[2].content, "Paris.");
}

#[test]
fn redo_resends_the_previous_input() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    fixture.respond("why is the sky blue");
    let redone = fixture.respond("redo");

    assert!(!redone.cached);
    assert_eq!(fixture.api.calls(), 2);
    let requests = fixture.api.requests.borrow();
    assert!(requests[1].messages.last().unwrap().content.starts_with("why is the sky blue"));
    assert_eq!(fixture.db.list_exchanges().unwrap().len(), 1);
}

#[test]
fn image_modifier_sends_an_image_request() {
    let fixture = Fixture::with_key(FakeApi::replying("https://example.com/cat.png"));
    let response = fixture.respond("image a cat wearing a hat");

    assert_eq!(response.text, "https://example.com/cat.png");
    assert_eq!(fixture.api.images.borrow()[0].prompt, "a cat wearing a hat");
    assert!(fixture.db.list_exchanges().unwrap()[0].transient);
}

#[test]
fn config_reset_keeps_the_api_key() {
    let fixture = Fixture::with_key(FakeApi::replying("ok"));
    fixture.run("config set model gpt-4").unwrap();
    fixture.run("config reset").unwrap();

    assert_eq!(fixture.db.get_setting("model").unwrap().as_deref(), Some("gpt-3.5-turbo"));
    assert_eq!(fixture.db.get_setting("api_key").unwrap().as_deref(), Some(API_KEY));
}

#[test]
fn declined_confirmation_leaves_history_alone() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    fixture.respond("why is the sky blue");

    fixture.host.decline.set(true);
    fixture.run("clear").unwrap();
    assert_eq!(fixture.db.list_exchanges().unwrap().len(), 1);

    fixture.host.decline.set(false);
    fixture.run("clear").unwrap();
    assert!(fixture.db.list_exchanges().unwrap().is_empty());
}

#[test]
fn invalid_config_value_is_rejected() {
    let fixture = Fixture::with_key(FakeApi::replying("ok"));
    assert!(matches!(
        fixture.run("config set temperature 3"),
        Err(ChatError::Config(_))
    ));
    assert_eq!(fixture.db.get_setting("temperature").unwrap().as_deref(), Some("0.1"));
}

#[test]
fn custom_persona_is_used_by_name() {
    let fixture = Fixture::with_key(FakeApi::replying("Bonjour"));
    fixture
        .run("persona set pierre Translate the following text into French")
        .unwrap();
    fixture.respond("pierre good morning");

    let requests = fixture.api.requests.borrow();
    assert_eq!(
        requests[0].messages[0].content,
        "Translate the following text into French"
    );
    assert_eq!(requests[0].messages.last().unwrap().content, "good morning");
}

#[test]
fn export_writes_history_file() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    fixture.respond("why is the sky blue");

    let path = match fixture.run("export").unwrap() {
        Outcome::Command(CommandOutput::File(path)) => path,
        other => panic!("expected a file, got {other:?}"),
    };
    assert!(path.starts_with(fixture.dir.path().join("exports")));
    let transcript = std::fs::read_to_string(&path).unwrap();
    assert!(transcript.contains("**Assistant:** Rayleigh scattering."));
}

#[test]
fn version_reports_newer_local_build() {
    let fixture = Fixture::new(FakeApi::replying(""));
    match fixture.run("version").unwrap() {
        Outcome::Command(CommandOutput::Text { body, .. }) => {
            assert!(body.contains("newer than the latest version available"));
        }
        other => panic!("expected text, got {other:?}"),
    }
}

#[test]
fn empty_input_falls_back_to_clipboard() {
    let fixture = Fixture::with_key(FakeApi::replying("Rayleigh scattering."));
    *fixture.host.clipboard.borrow_mut() = Some("why is the sky blue".to_string());
    let response = fixture.respond("4");

    assert_eq!(response.text, "Rayleigh scattering.");
    assert_eq!(fixture.api.requests.borrow()[0].model, "gpt-4");

    *fixture.host.clipboard.borrow_mut() = None;
    assert!(matches!(fixture.run("4"), Err(ChatError::EmptyInput)));
}
