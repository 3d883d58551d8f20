//! Purpose: End-to-end tests for the bot client against a loopback API stub.
//! Exports: None (integration test module).
//! Role: Validate URL/token construction, endpoint bindings, and status classification.
//! Invariants: Every request targets the in-process stub; no external network.

mod support;

use serde_json::{Value, json};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;
use support::StubServer;
use tambot::api::types::{
    ChatMembersQuery, ChatType, MessageRecipient, MessagesQuery, NewMessageBody, SenderAction,
    TextFormat, UploadType,
};
use tambot::api::{Bot, BotConfig, Verb};
use tambot::ErrorKind;

const TOKEN: &str = "test-token-123";

fn bot_for(server: &StubServer) -> Bot {
    let config = BotConfig::new(TOKEN)
        .expect("config")
        .with_api_url(server.base_url())
        .expect("api url")
        .with_timeouts(Duration::from_secs(2), Duration::from_secs(5));
    Bot::with_config(config)
}

fn message_json(mid: &str, text: &str) -> Value {
    json!({
        "sender": {"user_id": 1, "name": "bot", "is_bot": true, "last_activity_time": 0},
        "recipient": {"chat_id": 77, "chat_type": "chat"},
        "timestamp": 1_700_000_000_000_i64,
        "body": {"mid": mid, "seq": 1, "text": text}
    })
}

#[test]
fn get_me_sends_token_and_decodes_profile() {
    let server = StubServer::start();
    server.route(
        "GET",
        "/me",
        200,
        r#"{"user_id":9,"name":"helper","username":"helper_bot","is_bot":true,"last_activity_time":5,"commands":[{"name":"start"}]}"#,
    );
    let info = bot_for(&server).get_me().expect("me");
    assert_eq!(info.user.user_id, 9);
    assert_eq!(info.user.username.as_deref(), Some("helper_bot"));
    assert_eq!(info.commands.len(), 1);

    let request = server.last_request();
    assert_eq!(request.method, "GET");
    assert_eq!(request.path, "/me");
    assert_eq!(request.query_value("access_token"), Some(TOKEN));
}

#[test]
fn api_url_path_prefix_is_preserved() {
    let server = StubServer::start();
    server.route("GET", "/botapi/chats", 200, r#"{"chats":[],"marker":null}"#);
    let config = BotConfig::new(TOKEN)
        .expect("config")
        .with_api_url(&format!("{}/botapi", server.base_url()))
        .expect("api url");
    let chats = Bot::with_config(config)
        .get_chats(Some(10), None)
        .expect("chats");
    assert!(chats.chats.is_empty());
    let request = server.last_request();
    assert_eq!(request.path, "/botapi/chats");
    assert_eq!(request.query_value("count"), Some("10"));
    assert_eq!(request.query_value("marker"), None);
}

#[test]
fn status_codes_map_to_error_kinds() {
    let server = StubServer::start();
    let cases = [
        (400, ErrorKind::InvalidRequest),
        (401, ErrorKind::Authentication),
        (404, ErrorKind::NotFound),
        (405, ErrorKind::MethodNotAllowed),
        (429, ErrorKind::RateLimited),
        (503, ErrorKind::ServiceUnavailable),
        (500, ErrorKind::Remote),
        (502, ErrorKind::Remote),
        (418, ErrorKind::Remote),
    ];
    let bot = bot_for(&server);
    for (status, kind) in cases {
        let chat_id = i64::from(status);
        let body = format!(r#"{{"code":"err.{status}","message":"failed with {status}"}}"#);
        server.route("GET", &format!("/chats/{chat_id}"), status, body.clone());

        let err = bot.get_chat(chat_id).expect_err("status error");
        assert_eq!(err.kind(), kind, "status {status}");
        assert_eq!(err.status(), Some(status));
        assert_eq!(err.method(), Some(format!("GET /chats/{chat_id}").as_str()));
        assert_eq!(err.body(), Some(body.as_str()));
        let message = err.message().expect("message");
        assert!(message.contains(&format!("failed with {status}")), "{message}");
        assert!(!err.to_string().contains(TOKEN));
    }
}

#[test]
fn invalid_json_on_success_is_malformed_response() {
    let server = StubServer::start();
    server.route("GET", "/chats/1", 200, "<html>ok</html>");
    server.route("GET", "/chats/2", 200, "");
    server.route("GET", "/chats/3", 200, r#"{"unexpected":true}"#);
    let bot = bot_for(&server);
    for chat_id in [1, 2, 3] {
        let err = bot.get_chat(chat_id).expect_err("malformed");
        assert_eq!(err.kind(), ErrorKind::MalformedResponse, "chat {chat_id}");
    }
    let err = bot
        .call(Verb::Get, &["chats", "1"], &[], None)
        .expect_err("malformed");
    assert_eq!(err.kind(), ErrorKind::MalformedResponse);
    assert_eq!(err.body(), Some("<html>ok</html>"));
}

#[test]
fn connection_refused_is_transport_error_without_token() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };
    let config = BotConfig::new(TOKEN)
        .expect("config")
        .with_api_url(&format!("http://127.0.0.1:{port}"))
        .expect("api url")
        .with_timeouts(Duration::from_secs(1), Duration::from_secs(1));
    let err = Bot::with_config(config).get_me().expect_err("transport");
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(err.status(), None);
    assert!(!err.to_string().contains(TOKEN));
}

#[test]
fn generic_call_passes_json_body_and_query() {
    let server = StubServer::start();
    server.route("POST", "/answers", 200, r#"{"success":true}"#);
    let reply = bot_for(&server)
        .call(
            Verb::Post,
            &["answers"],
            &[("callback_id", "cb.1".to_string())],
            Some(&json!({"notification": "done"})),
        )
        .expect("call");
    assert_eq!(reply, json!({"success": true}));

    let request = server.last_request();
    assert_eq!(request.query_value("callback_id"), Some("cb.1"));
    assert_eq!(request.content_type.as_deref(), Some("application/json"));
    let body: Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(body, json!({"notification": "done"}));
}

#[test]
fn send_message_targets_chat_and_decodes_result() {
    let server = StubServer::start();
    server.route(
        "POST",
        "/messages",
        200,
        json!({"message": message_json("mid.5", "hello")}).to_string(),
    );
    let body = NewMessageBody::text("hello")
        .with_format(TextFormat::Html)
        .with_notify(false);
    let sent = bot_for(&server)
        .send_message(MessageRecipient::Chat(77), &body)
        .expect("send");
    assert_eq!(sent.message.body.mid, "mid.5");
    assert_eq!(sent.message.recipient.chat_type, ChatType::Chat);

    let request = server.last_request();
    assert_eq!(request.query_value("chat_id"), Some("77"));
    assert_eq!(request.query_value("user_id"), None);
    let sent_body: Value = serde_json::from_str(&request.body).expect("json body");
    assert_eq!(
        sent_body,
        json!({"text": "hello", "format": "html", "notify": false})
    );
}

#[test]
fn message_endpoints_use_documented_verbs() {
    let server = StubServer::start();
    server.route("PUT", "/messages", 200, r#"{"success":true}"#);
    server.route("DELETE", "/messages", 200, r#"{"success":false,"message":"gone"}"#);
    server.route("GET", "/messages/mid.9", 200, message_json("mid.9", "x").to_string());
    server.route(
        "GET",
        "/messages",
        200,
        json!({"messages": [message_json("mid.1", "a"), message_json("mid.2", "b")]}).to_string(),
    );
    let bot = bot_for(&server);

    assert!(bot.edit_message("mid.9", &NewMessageBody::text("y")).expect("edit").success);
    assert_eq!(server.last_request().query_value("message_id"), Some("mid.9"));

    let deleted = bot.delete_message("mid.9").expect("delete");
    assert!(!deleted.success);
    assert_eq!(deleted.message.as_deref(), Some("gone"));
    assert_eq!(server.last_request().method, "DELETE");

    assert_eq!(bot.get_message("mid.9").expect("get").body.mid, "mid.9");

    let query = MessagesQuery {
        count: Some(2),
        ..MessagesQuery::for_chat(77)
    };
    assert_eq!(bot.get_messages(&query).expect("list").messages.len(), 2);
    let request = server.last_request();
    assert_eq!(request.query_value("chat_id"), Some("77"));
    assert_eq!(request.query_value("count"), Some("2"));
}

#[test]
fn chat_membership_endpoints_build_paths_and_queries() {
    let server = StubServer::start();
    let member = json!({
        "user_id": 3, "name": "ann", "last_access_time": 1, "is_owner": false,
        "is_admin": true, "join_time": 2, "permissions": ["write"]
    });
    server.route(
        "GET",
        "/chats/-5/members",
        200,
        json!({"members": [member.clone()], "marker": 44}).to_string(),
    );
    server.route("GET", "/chats/-5/members/me", 200, member.to_string());
    server.route("DELETE", "/chats/-5/members", 200, r#"{"success":true}"#);
    server.route("POST", "/chats/-5/members", 200, r#"{"success":true}"#);
    server.route("DELETE", "/chats/-5/members/me", 200, r#"{"success":true}"#);
    server.route("POST", "/chats/-5/actions", 200, r#"{"success":true}"#);
    let bot = bot_for(&server);

    let query = ChatMembersQuery {
        user_ids: vec![3, 4],
        ..ChatMembersQuery::default()
    };
    let members = bot.get_members(-5, &query).expect("members");
    assert_eq!(members.marker, Some(44));
    assert!(members.members[0].is_admin);
    assert_eq!(server.last_request().query_value("user_ids"), Some("3,4"));

    assert_eq!(bot.get_membership(-5).expect("me").user.name, "ann");

    bot.remove_member(-5, 3, true).expect("remove");
    let request = server.last_request();
    assert_eq!(request.method, "DELETE");
    assert_eq!(request.query_value("user_id"), Some("3"));
    assert_eq!(request.query_value("block"), Some("true"));

    bot.add_members(-5, &[8, 9]).expect("add");
    let body: Value = serde_json::from_str(&server.last_request().body).expect("json");
    assert_eq!(body, json!({"user_ids": [8, 9]}));

    bot.send_action(-5, SenderAction::TypingOn).expect("action");
    let body: Value = serde_json::from_str(&server.last_request().body).expect("json");
    assert_eq!(body, json!({"action": "typing_on"}));

    assert!(bot.leave_chat(-5).expect("leave").success);
    assert_eq!(server.last_request().path, "/chats/-5/members/me");
}

#[test]
fn pinned_message_may_be_absent() {
    let server = StubServer::start();
    server.route("GET", "/chats/4/pin", 200, r#"{"message":null}"#);
    assert_eq!(bot_for(&server).get_pinned_message(4).expect("pin"), None);
}

#[test]
fn upload_url_request_names_the_kind() {
    let server = StubServer::start();
    server.route(
        "POST",
        "/uploads",
        200,
        r#"{"url":"https://vu.tamtam.chat/upload?id=7","token":"v1"}"#,
    );
    let endpoint = bot_for(&server)
        .get_upload_url(UploadType::Video)
        .expect("upload url");
    assert_eq!(endpoint.url, "https://vu.tamtam.chat/upload?id=7");
    assert_eq!(endpoint.token.as_deref(), Some("v1"));
    let request = server.last_request();
    assert_eq!(request.query_value("type"), Some("video"));
    assert_eq!(request.query_value("access_token"), Some(TOKEN));
}

#[test]
fn non_success_statuses_below_400_are_remote_errors() {
    let server = StubServer::start();
    server.route("GET", "/chats/300", 300, r#"{"chat_id":300,"type":"chat","status":"active"}"#);
    server.route("GET", "/chats/304", 304, "");
    let bot = bot_for(&server);
    for status in [300_u16, 304] {
        let err = bot.get_chat(i64::from(status)).expect_err("non-2xx");
        assert_eq!(err.kind(), ErrorKind::Remote, "status {status}");
        assert_eq!(err.status(), Some(status));
    }
    server.route("GET", "/me", 300, r#"{"user_id":1}"#);
    let err = bot.call(Verb::Get, &["me"], &[], None).expect_err("non-2xx");
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(err.body(), Some(r#"{"user_id":1}"#));
}

#[test]
fn sessions_work_across_threads_and_after_reset() {
    let server = StubServer::start();
    server.route("GET", "/chats/1", 200, r#"{"chat_id":1,"type":"dialog","status":"active"}"#);
    let bot = bot_for(&server);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let bot = bot.clone();
            thread::spawn(move || {
                let first = bot.get_chat(1).expect("first");
                bot.reset_session();
                let second = bot.get_chat(1).expect("second");
                assert_eq!(first, second);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }
    assert_eq!(server.requests().len(), 8);
}
