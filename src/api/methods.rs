//! Purpose: Typed bindings for the TamTam Bot API endpoints.
//! Exports: Inherent `Bot` methods, one per endpoint.
//! Role: Fixes verb, path and parameter names; all transport goes through `Bot::request`.
//! Invariants: Each method issues exactly one request and never retries.
#![allow(clippy::result_large_err)]

use crate::api::client::{ApiResult, Bot, Verb};
use crate::api::types::{
    ActionRequest, BotInfo, BotPatch, CallbackAnswer, Chat, ChatList, ChatMember,
    ChatMembersList, ChatMembersQuery, ChatPatch, GetPinnedMessageResult, Message, MessageList,
    MessageRecipient, MessagesQuery, NewMessageBody, PinMessageBody, SendMessageResult,
    SenderAction, SimpleQueryResult, UploadEndpoint, UploadType, UserIdsList,
};

impl Bot {
    pub fn get_me(&self) -> ApiResult<BotInfo> {
        self.get(&["me"], &[])
    }

    pub fn edit_me(&self, patch: &BotPatch) -> ApiResult<BotInfo> {
        self.send(Verb::Patch, &["me"], &[], patch)
    }

    pub fn get_chats(&self, count: Option<u32>, marker: Option<i64>) -> ApiResult<ChatList> {
        let mut query = Vec::new();
        if let Some(count) = count {
            query.push(("count", count.to_string()));
        }
        if let Some(marker) = marker {
            query.push(("marker", marker.to_string()));
        }
        self.get(&["chats"], &query)
    }

    pub fn get_chat(&self, chat_id: i64) -> ApiResult<Chat> {
        self.get(&["chats", &chat_id.to_string()], &[])
    }

    /// Resolve a public chat by its link name (with or without a leading `@`).
    pub fn get_chat_by_link(&self, link: &str) -> ApiResult<Chat> {
        self.get(&["chats", link], &[])
    }

    pub fn edit_chat(&self, chat_id: i64, patch: &ChatPatch) -> ApiResult<Chat> {
        self.send(Verb::Patch, &["chats", &chat_id.to_string()], &[], patch)
    }

    pub fn delete_chat(&self, chat_id: i64) -> ApiResult<SimpleQueryResult> {
        self.request::<(), _>(Verb::Delete, &["chats", &chat_id.to_string()], &[], None)
    }

    pub fn send_action(&self, chat_id: i64, action: SenderAction) -> ApiResult<SimpleQueryResult> {
        self.send(
            Verb::Post,
            &["chats", &chat_id.to_string(), "actions"],
            &[],
            &ActionRequest { action },
        )
    }

    pub fn get_pinned_message(&self, chat_id: i64) -> ApiResult<Option<Message>> {
        let result: GetPinnedMessageResult = self.get(&["chats", &chat_id.to_string(), "pin"], &[])?;
        Ok(result.message)
    }

    pub fn pin_message(&self, chat_id: i64, body: &PinMessageBody) -> ApiResult<SimpleQueryResult> {
        self.send(Verb::Put, &["chats", &chat_id.to_string(), "pin"], &[], body)
    }

    pub fn unpin_message(&self, chat_id: i64) -> ApiResult<SimpleQueryResult> {
        self.request::<(), _>(Verb::Delete, &["chats", &chat_id.to_string(), "pin"], &[], None)
    }

    pub fn get_membership(&self, chat_id: i64) -> ApiResult<ChatMember> {
        self.get(&["chats", &chat_id.to_string(), "members", "me"], &[])
    }

    pub fn leave_chat(&self, chat_id: i64) -> ApiResult<SimpleQueryResult> {
        self.request::<(), _>(
            Verb::Delete,
            &["chats", &chat_id.to_string(), "members", "me"],
            &[],
            None,
        )
    }

    pub fn get_admins(&self, chat_id: i64) -> ApiResult<ChatMembersList> {
        self.get(&["chats", &chat_id.to_string(), "members", "admins"], &[])
    }

    pub fn get_members(&self, chat_id: i64, query: &ChatMembersQuery) -> ApiResult<ChatMembersList> {
        self.get(&["chats", &chat_id.to_string(), "members"], &query.to_query())
    }

    pub fn add_members(&self, chat_id: i64, user_ids: &[i64]) -> ApiResult<SimpleQueryResult> {
        let body = UserIdsList {
            user_ids: user_ids.to_vec(),
        };
        self.send(Verb::Post, &["chats", &chat_id.to_string(), "members"], &[], &body)
    }

    pub fn remove_member(
        &self,
        chat_id: i64,
        user_id: i64,
        block: bool,
    ) -> ApiResult<SimpleQueryResult> {
        let query = [("user_id", user_id.to_string()), ("block", block.to_string())];
        self.request::<(), _>(
            Verb::Delete,
            &["chats", &chat_id.to_string(), "members"],
            &query,
            None,
        )
    }

    pub fn get_messages(&self, query: &MessagesQuery) -> ApiResult<MessageList> {
        self.get(&["messages"], &query.to_query())
    }

    pub fn get_message(&self, message_id: &str) -> ApiResult<Message> {
        self.get(&["messages", message_id], &[])
    }

    pub fn send_message(
        &self,
        recipient: MessageRecipient,
        body: &NewMessageBody,
    ) -> ApiResult<SendMessageResult> {
        self.send(Verb::Post, &["messages"], &[recipient.query_pair()], body)
    }

    pub fn edit_message(&self, message_id: &str, body: &NewMessageBody) -> ApiResult<SimpleQueryResult> {
        let query = [("message_id", message_id.to_string())];
        self.send(Verb::Put, &["messages"], &query, body)
    }

    pub fn delete_message(&self, message_id: &str) -> ApiResult<SimpleQueryResult> {
        let query = [("message_id", message_id.to_string())];
        self.request::<(), _>(Verb::Delete, &["messages"], &query, None)
    }

    pub fn answer_callback(
        &self,
        callback_id: &str,
        answer: &CallbackAnswer,
    ) -> ApiResult<SimpleQueryResult> {
        let query = [("callback_id", callback_id.to_string())];
        self.send(Verb::Post, &["answers"], &query, answer)
    }

    pub fn get_upload_url(&self, kind: UploadType) -> ApiResult<UploadEndpoint> {
        let query = [("type", kind.as_str().to_string())];
        self.request::<(), _>(Verb::Post, &["uploads"], &query, None)
    }
}
