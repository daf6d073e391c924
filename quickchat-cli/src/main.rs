use clap::builder::PossibleValuesParser;
use clap::Parser;
use quickchat_core::config::DEFAULT_ACTIONS;
use quickchat_core::{
    result_lines, ChatError, CommandOutput, Database, Host, OpenAiClient, Outcome, Response,
    Session, SessionPaths, APP_NAME,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const FILE_SEPARATOR: &str = "\n----\n";

#[derive(Parser)]
#[command(name = "quickchat")]
#[command(about = "Send text to a chat-completion API, prefixed with optional modifiers")]
#[command(version)]
struct Cli {
    /// Path to the database file (defaults to ~/.local/share/quickchat/quickchat.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Answer every confirmation prompt affirmatively
    #[arg(long, short = 'y')]
    yes: bool,

    /// Append the contents of a file to the message (repeatable)
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// What to do with the response. `open` and `quicklook` open the response
    /// file, `copy` copies it; `insert`, `alert` and `largetype` print it
    #[arg(long, value_parser = PossibleValuesParser::new(DEFAULT_ACTIONS.iter().copied()))]
    action: Option<String>,

    /// Print the response as classified lines in JSON
    #[arg(long)]
    lines: bool,

    /// Modifiers followed by the message, e.g. `code copy 4 js uuid function`
    #[arg(trailing_var_arg = true)]
    input: Vec<String>,
}

/// Host backed by the terminal and the system clipboard.
struct TerminalHost {
    assume_yes: bool,
}

impl Host for TerminalHost {
    fn clipboard_text(&self) -> Option<String> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.get_text())
            .ok()
    }

    fn set_clipboard_text(&self, text: &str) -> quickchat_core::Result<()> {
        arboard::Clipboard::new()
            .and_then(|mut clipboard| clipboard.set_text(text.to_string()))
            .map_err(|e| ChatError::Clipboard(format!("Failed to set clipboard: {e}")))
    }

    fn notify(&self, title: &str, message: &str) {
        eprintln!("{title}: {message}");
    }

    fn confirm(&self, title: &str, message: &str, buttons: &[&str]) -> usize {
        if self.assume_yes {
            return 0;
        }
        let cancel = buttons.len().saturating_sub(1);
        eprintln!("{title}\n{message}");
        for (i, button) in buttons.iter().enumerate() {
            eprintln!("  {}) {button}", i + 1);
        }
        eprint!("> ");
        std::io::stderr().flush().ok();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) | Err(_) => cancel,
            Ok(_) => answer
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=buttons.len()).contains(n))
                .map_or(cancel, |n| n - 1),
        }
    }

    fn open_path(&self, path: &Path) -> quickchat_core::Result<()> {
        open::that(path).map_err(|e| {
            ChatError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to open {}: {e}", path.display()),
            ))
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn get_db(db_path: Option<PathBuf>) -> quickchat_core::Result<Database> {
    match db_path {
        Some(path) => Database::with_path(&path),
        None => Database::new(),
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn read_input(cli: &Cli) -> quickchat_core::Result<String> {
    let mut parts = vec![cli.input.join(" ")];
    for file in &cli.files {
        let content = std::fs::read_to_string(file).map_err(|e| {
            ChatError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read file {}: {e}", file.display()),
            ))
        })?;
        parts.push(content);
    }
    Ok(parts
        .into_iter()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(FILE_SEPARATOR))
}

fn run(cli: Cli) -> quickchat_core::Result<()> {
    let input = read_input(&cli)?;
    let input = if input.trim().is_empty() {
        "help".to_string()
    } else {
        input
    };

    let db = get_db(cli.db.clone())?;
    let host = TerminalHost {
        assume_yes: cli.yes,
    };
    let api = OpenAiClient::new()?;
    let mut session = Session::open(&db, &host, &api, SessionPaths::standard()?)?;
    session.import_api_key(std::env::var("OPENAI_API_KEY").ok())?;

    match session.run(&input)? {
        Outcome::Declined => Ok(()),
        Outcome::Command(output) => {
            print_command_output(output);
            Ok(())
        }
        Outcome::Response(response) => {
            let action = cli
                .action
                .clone()
                .or_else(|| {
                    session
                        .config()
                        .default_action_auto()
                        .then(|| session.config().default_action().to_string())
                })
                .unwrap_or_default();
            deliver(&host, &response, &action, cli.lines)
        }
    }
}

fn print_command_output(output: CommandOutput) {
    match output {
        CommandOutput::Text { title, body } => {
            println!("{title}\n\n{body}");
        }
        CommandOutput::History(entries) => {
            for exchange in &entries {
                let marker = if exchange.transient { " (transient)" } else { "" };
                println!(
                    "{}{marker}\n  {}\n  → {}\n",
                    exchange.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    exchange.user_message,
                    exchange.assistant_message.replace('\n', "\n    ")
                );
            }
            println!("Total: {} exchanges", entries.len());
        }
        CommandOutput::File(path) => println!("{}", path.display()),
        CommandOutput::Done => {}
    }
}

fn deliver(
    host: &TerminalHost,
    response: &Response,
    action: &str,
    lines: bool,
) -> quickchat_core::Result<()> {
    if response.text.is_empty() {
        return Ok(());
    }
    tracing::debug!(action, cached = response.cached, "Delivering response");
    if lines {
        let json = serde_json::to_string_pretty(&result_lines(&response.text))
            .map_err(|e| ChatError::Transport(format!("Failed to serialize lines: {e}")))?;
        println!("{json}");
        return Ok(());
    }

    match action {
        "open" | "quicklook" => match &response.path {
            Some(path) => host.open_path(path)?,
            None => println!("{}", response.text),
        },
        "copy" => {
            host.set_clipboard_text(&response.text)?;
            host.notify(APP_NAME, "Response copied to clipboard.");
        }
        _ => println!("{}", response.text),
    }
    Ok(())
}
