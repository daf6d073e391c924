pub mod command;
pub mod config;
pub mod db;
pub mod error;
pub mod help;
pub mod history;
pub mod host;
pub mod modifier;
pub mod models;
pub mod openai;
pub mod output;
pub mod parse;
pub mod persona;
pub mod request;
pub mod session;
pub mod util;

pub use config::Config;
pub use db::Database;
pub use error::{ChatError, Result};
pub use host::{Host, APP_NAME};
pub use models::{Exchange, Message, Persona, PostTask, Role, Setting};
pub use openai::{ChatApi, OpenAiClient};
pub use output::{result_lines, LineKind, ResultLine};
pub use session::{CommandOutput, Outcome, Response, Session, SessionPaths};
