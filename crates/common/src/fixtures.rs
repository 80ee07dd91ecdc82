//! Update builders for tests across the workspace.
#![allow(clippy::expect_used)]

use {
    serde_json::{Value, json},
    teloxide::types::Update,
};

pub const BOT_USERNAME: &str = "switchboard_bot";

#[must_use]
pub fn user(id: i64) -> Value {
    json!({
        "id": id,
        "is_bot": false,
        "first_name": "Alice",
        "username": format!("user{id}"),
    })
}

/// Private chats share the id of the user they are with.
#[must_use]
pub fn private_chat(id: i64) -> Value {
    json!({ "id": id, "type": "private", "first_name": "Alice" })
}

#[must_use]
pub fn group_chat(id: i64) -> Value {
    json!({ "id": id, "type": "group", "title": "Team" })
}

#[must_use]
pub fn supergroup_chat(id: i64) -> Value {
    json!({ "id": id, "type": "supergroup", "title": "Big team" })
}

#[must_use]
pub fn channel_chat(id: i64) -> Value {
    json!({ "id": id, "type": "channel", "title": "News" })
}

/// A bare message object; extend it with extra fields via [`with`].
#[must_use]
pub fn message(chat: Value, from: Option<Value>, text: Option<&str>) -> Value {
    let mut message = json!({
        "message_id": 1,
        "date": 1,
        "chat": chat,
    });
    if let Some(from) = from {
        message["from"] = from;
    }
    if let Some(text) = text {
        message["text"] = Value::String(text.to_owned());
    }
    message
}

/// Merge `extra` fields into a JSON object.
#[must_use]
pub fn with(mut base: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(fields)) = (base.as_object_mut(), extra) {
        target.extend(fields);
    }
    base
}

/// Wrap a payload as an update of the given kind.
#[must_use]
pub fn update(id: u32, kind: &str, payload: Value) -> Update {
    let mut raw = json!({ "update_id": id });
    raw[kind] = payload;
    // `Update` only deserializes its kind correctly from text, not from a `Value`.
    serde_json::from_str(&raw.to_string()).expect("fixture update must deserialize")
}

/// A text message from `user_id` in a private chat with that user.
#[must_use]
pub fn private_text(user_id: i64, text: &str) -> Update {
    update(
        1,
        "message",
        message(private_chat(user_id), Some(user(user_id)), Some(text)),
    )
}

/// A text message from `user_id` in group `chat_id`.
#[must_use]
pub fn group_text(chat_id: i64, user_id: i64, text: &str) -> Update {
    update(
        1,
        "message",
        message(group_chat(chat_id), Some(user(user_id)), Some(text)),
    )
}

#[must_use]
pub fn callback_query(user_id: i64, chat_id: i64, data: &str) -> Update {
    update(
        1,
        "callback_query",
        json!({
            "id": "cb-1",
            "from": user(user_id),
            "chat_instance": "ci-1",
            "data": data,
            "message": message(private_chat(chat_id), None, Some("menu")),
        }),
    )
}

#[must_use]
pub fn inline_query(user_id: i64, query: &str) -> Update {
    update(
        1,
        "inline_query",
        json!({
            "id": "iq-1",
            "from": user(user_id),
            "query": query,
            "offset": "",
        }),
    )
}

#[cfg(test)]
mod tests {
    use {super::*, teloxide::types::UpdateKind};

    #[test]
    fn updates_keep_their_kind() {
        let update = private_text(1, "hi");
        let UpdateKind::Message(message) = &update.kind else {
            panic!("expected a message, got {:?}", update.kind);
        };
        assert_eq!(message.text(), Some("hi"));
        assert_eq!(message.chat.id.0, 1);

        assert!(matches!(
            callback_query(1, 2, "menu:open").kind,
            UpdateKind::CallbackQuery(_)
        ));
        assert!(matches!(inline_query(1, "q").kind, UpdateKind::InlineQuery(_)));
    }
}
