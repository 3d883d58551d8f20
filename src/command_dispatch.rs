//! Purpose: Hold top-level CLI command dispatch for `tambot`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each API command issues its request(s) on the main thread and prints one JSON value.
//! Invariants: `handlers` never deletes the file it inspects.

use std::time::Duration;

use serde::Serialize;
use tambot::api::types::{ChatMembersQuery, MessageRecipient, MessagesQuery, NewMessageBody, TextFormat};
use tambot::{Bot, BotConfig, HandlerSet};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    connection: &ConnectionArgs,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::aot::generate(shell, &mut cmd, "tambot", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Handlers { path, kind } => {
            let set = match kind {
                HandlerKind::Step => HandlerSet::next_step(),
                HandlerKind::Reply => HandlerSet::reply(),
            };
            let exists = path.is_file();
            let loaded = set.load(&path, false)?;
            let handlers: Map<String, Value> = set
                .snapshot()
                .into_iter()
                .map(|(key, list)| (key.to_string(), json!(list)))
                .collect();
            emit_json(&json!({
                "set": set.label(),
                "path": path.display().to_string(),
                "exists": exists,
                "keys": loaded,
                "inspected_at": now_rfc3339(),
                "handlers": handlers,
            }))
        }
        Command::Me => emit_json(&connect(connection)?.get_me()?),
        Command::Chats { count, marker } => {
            emit_json(&connect(connection)?.get_chats(count, marker)?)
        }
        Command::Chat { chat } => {
            let bot = connect(connection)?;
            match chat.parse::<i64>() {
                Ok(chat_id) => emit_json(&bot.get_chat(chat_id)?),
                Err(_) => emit_json(&bot.get_chat_by_link(&chat)?),
            }
        }
        Command::Members {
            chat_id,
            count,
            marker,
            user_ids,
        } => {
            let query = ChatMembersQuery {
                user_ids,
                marker,
                count,
            };
            emit_json(&connect(connection)?.get_members(chat_id, &query)?)
        }
        Command::Admins { chat_id } => emit_json(&connect(connection)?.get_admins(chat_id)?),
        Command::Messages {
            chat,
            ids,
            from,
            to,
            count,
        } => {
            if chat.is_none() && ids.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("messages requires --chat or at least one --id")
                    .with_hint("Use `tambot messages --chat <id>` or `tambot messages --id <mid>`."));
            }
            let query = MessagesQuery {
                chat_id: chat,
                message_ids: ids,
                from,
                to,
                count,
            };
            emit_json(&connect(connection)?.get_messages(&query)?)
        }
        Command::Message { message_id } => {
            emit_json(&connect(connection)?.get_message(&message_id)?)
        }
        Command::Send {
            target,
            text,
            body,
            reply_to,
        } => {
            let recipient = match (target.chat, target.user) {
                (Some(chat_id), _) => MessageRecipient::Chat(chat_id),
                (None, Some(user_id)) => MessageRecipient::User(user_id),
                (None, None) => {
                    return Err(Error::new(ErrorKind::Usage)
                        .with_message("send requires --chat or --user"));
                }
            };
            let mut message = message_body(text, &body);
            if let Some(mid) = reply_to {
                message = message.replying_to(mid);
            }
            emit_json(&connect(connection)?.send_message(recipient, &message)?)
        }
        Command::Edit {
            message_id,
            text,
            body,
        } => {
            let message = message_body(text, &body);
            emit_json(&connect(connection)?.edit_message(&message_id, &message)?)
        }
        Command::Delete { message_id } => {
            emit_json(&connect(connection)?.delete_message(&message_id)?)
        }
        Command::Leave { chat_id } => emit_json(&connect(connection)?.leave_chat(chat_id)?),
    }
}

fn connect(args: &ConnectionArgs) -> Result<Bot, Error> {
    let token = args
        .token
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message("missing access token")
                .with_hint("Pass --token or set TAMBOT_TOKEN.")
        })?;
    let mut config = BotConfig::new(token)?;
    if let Some(api_url) = args.api_url.as_deref().filter(|url| !url.trim().is_empty()) {
        config = config.with_api_url(api_url)?;
    }
    if let Some(secs) = args.timeout {
        let connect = config.connect_timeout();
        config = config.with_timeouts(connect, Duration::from_secs(secs));
    }
    if let Some(proxy) = &args.proxy {
        config = config.with_proxy(proxy)?;
    }
    Ok(Bot::with_config(config))
}

fn message_body(text: String, args: &BodyArgs) -> NewMessageBody {
    let mut body = NewMessageBody::text(text);
    if let Some(format) = args.format {
        body = body.with_format(match format {
            FormatArg::Markdown => TextFormat::Markdown,
            FormatArg::Html => TextFormat::Html,
        });
    }
    if args.silent {
        body = body.with_notify(false);
    }
    body
}

fn emit_json<T: Serialize>(value: &T) -> Result<RunOutcome, Error> {
    let rendered = serde_json::to_string_pretty(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("failed to encode output json")
            .with_source(err)
    })?;
    println!("{rendered}");
    Ok(RunOutcome::ok())
}

fn now_rfc3339() -> Option<String> {
    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
