//! Purpose: `tambot` CLI entry point for the TamTam Bot API.
//! Role: Binary crate root; parses args, runs one command, emits JSON on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `tambot::to_exit_code`.
//! Invariants: The access token is read from flags or env and never echoed.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};
use std::error::Error as StdError;

mod command_dispatch;

use tambot::{Error, ErrorKind, to_exit_code};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse_from(std::env::args_os()) {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Usage)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint(clap_error_hint(&err)));
            }
        },
    };

    tambot::logging::init_logging(cli.log_level.as_deref())?;
    command_dispatch::dispatch_command(cli.command, &cli.connection).map_err(add_transport_hint)
}

#[derive(Parser)]
#[command(
    name = "tambot",
    version,
    about = "Command-line client for the TamTam Bot API",
    long_about = None,
    after_help = r#"EXAMPLES
  $ export TAMBOT_TOKEN=...
  $ tambot me
  $ tambot chats --count 10
  $ tambot send --chat 12345 "hello from tambot"
  $ tambot handlers .handler-saves/step.save

  Output is JSON on stdout; errors are JSON on stderr."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    #[arg(
        long,
        global = true,
        help = "Log filter, e.g. `debug` or `tambot=trace` (default: RUST_LOG, then error)"
    )]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Clone)]
struct ConnectionArgs {
    #[arg(
        long,
        global = true,
        env = "TAMBOT_TOKEN",
        hide_env_values = true,
        help = "Bot access token"
    )]
    token: Option<String>,
    #[arg(
        long,
        global = true,
        env = "TAMBOT_API_URL",
        help = "API base URL (default: https://botapi.tamtam.chat)",
        value_hint = ValueHint::Url
    )]
    api_url: Option<String>,
    #[arg(long, global = true, help = "Read timeout in seconds")]
    timeout: Option<u64>,
    #[arg(long, global = true, help = "HTTP proxy URL")]
    proxy: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Show the bot's own profile")]
    Me,
    #[command(about = "List chats the bot participates in")]
    Chats {
        #[arg(long, help = "Page size")]
        count: Option<u32>,
        #[arg(long, help = "Marker from a previous page")]
        marker: Option<i64>,
    },
    #[command(about = "Show one chat by numeric id or public link")]
    Chat {
        #[arg(
            allow_negative_numbers = true,
            help = "Chat id, or a public link name such as @channel"
        )]
        chat: String,
    },
    #[command(about = "List chat members")]
    Members {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
        #[arg(long, help = "Page size")]
        count: Option<u32>,
        #[arg(long, help = "Marker from a previous page")]
        marker: Option<i64>,
        #[arg(long = "user-id", help = "Restrict to these user ids (repeatable)")]
        user_ids: Vec<i64>,
    },
    #[command(about = "List chat administrators")]
    Admins {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    #[command(about = "List messages in a chat or by id")]
    Messages {
        #[arg(long, allow_negative_numbers = true, help = "Chat to read from")]
        chat: Option<i64>,
        #[arg(long = "id", help = "Message ids to fetch (repeatable)")]
        ids: Vec<String>,
        #[arg(long, help = "Start time (unix ms)")]
        from: Option<i64>,
        #[arg(long, help = "End time (unix ms)")]
        to: Option<i64>,
        #[arg(long, help = "Maximum number of messages")]
        count: Option<u32>,
    },
    #[command(about = "Show one message by id")]
    Message { message_id: String },
    #[command(about = "Send a text message to a chat or user")]
    Send {
        #[command(flatten)]
        target: SendTarget,
        text: String,
        #[command(flatten)]
        body: BodyArgs,
        #[arg(long, help = "Reply to this message id")]
        reply_to: Option<String>,
    },
    #[command(about = "Replace the text of a sent message")]
    Edit {
        message_id: String,
        text: String,
        #[command(flatten)]
        body: BodyArgs,
    },
    #[command(about = "Delete a message")]
    Delete { message_id: String },
    #[command(about = "Leave a chat")]
    Leave {
        #[arg(allow_negative_numbers = true)]
        chat_id: i64,
    },
    #[command(about = "Inspect a persisted handler file without consuming it")]
    Handlers {
        #[arg(value_hint = ValueHint::FilePath)]
        path: PathBuf,
        #[arg(long, value_enum, default_value = "step", help = "Which handler set the file holds")]
        kind: HandlerKind,
    },
    #[command(about = "Print a shell completion script")]
    Completion { shell: Shell },
}

#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
struct SendTarget {
    #[arg(long, allow_negative_numbers = true, help = "Destination chat id")]
    chat: Option<i64>,
    #[arg(long, help = "Destination user id (dialog)")]
    user: Option<i64>,
}

#[derive(Args, Debug, Clone)]
struct BodyArgs {
    #[arg(long, value_enum, help = "Text markup")]
    format: Option<FormatArg>,
    #[arg(long, help = "Deliver without notifying participants")]
    silent: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FormatArg {
    Markdown,
    Html,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum HandlerKind {
    Step,
    Reply,
}

fn add_transport_hint(err: Error) -> Error {
    if err.kind() != ErrorKind::Transport || err.hint().is_some() {
        return err;
    }
    err.with_hint("Check network access and --api-url; use --timeout for slow links.")
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Usage\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Usage => "usage error",
        ErrorKind::InvalidRequest => "invalid request",
        ErrorKind::Authentication => "authentication error",
        ErrorKind::NotFound => "not found",
        ErrorKind::MethodNotAllowed => "method not allowed",
        ErrorKind::RateLimited => "rate limited",
        ErrorKind::ServiceUnavailable => "service unavailable",
        ErrorKind::Remote => "remote error",
        ErrorKind::MalformedResponse => "malformed response",
        ErrorKind::Transport => "transport error",
        ErrorKind::Persistence => "persistence error",
    }
    .to_string()
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(method) = err.method() {
        inner.insert("method".to_string(), json!(method));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(body) = err.body().filter(|body| !body.is_empty()) {
        let body = serde_json::from_str::<Value>(body).unwrap_or_else(|_| json!(body));
        inner.insert("body".to_string(), body);
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(method) = err.method() {
        lines.push(format!("method: {method}"));
    }
    if let Some(status) = err.status() {
        lines.push(format!("status: {status}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    lines.join("\n")
}

fn clap_error_summary(err: &clap::Error) -> String {
    err.to_string()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.strip_prefix("error:").unwrap_or(line).trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn clap_error_hint(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let command = rendered
        .lines()
        .find_map(|line| line.trim().strip_prefix("Usage: "))
        .and_then(|usage| {
            let mut tokens = usage.split_whitespace().skip_while(|t| *t != "tambot");
            tokens.next()?;
            tokens.next().filter(|t| !t.starts_with(['-', '<', '[']))
        });
    match command {
        Some(command) => format!("Try `tambot {command} --help`."),
        None => "Try `tambot --help`.".to_string(),
    }
}
