//! Ready-made filters for common update shapes.

use std::{collections::HashSet, sync::LazyLock};

use {
    regex::Regex,
    teloxide::types::{Message, MessageOrigin, UpdateKind},
};

use crate::{
    event::Event,
    filter::{Filter, filter_fn},
};

static COMMAND: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^/([0-9a-zA-Z_]+)(@[0-9a-zA-Z_]{3,})?").ok());

/// `(command, addressee)` when `text` is a bot command. The addressee is the
/// username after `@`, if any.
#[must_use]
pub fn parse_command(text: &str) -> Option<(&str, Option<&str>)> {
    let captures = COMMAND.as_ref()?.captures(text)?;
    let command = captures.get(1)?.as_str();
    let addressee = captures.get(2).map(|m| &m.as_str()[1..]);
    Some((command, addressee))
}

fn message_has(check: fn(&Message) -> bool) -> impl Filter {
    filter_fn(move |event| event.message().is_some_and(check))
}

pub fn any() -> impl Filter {
    filter_fn(|_| true)
}

// ── Update kinds ────────────────────────────────────────────────────────────

pub fn is_message() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::Message(_)))
}

pub fn is_edited_message() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::EditedMessage(_)))
}

pub fn is_channel_post() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::ChannelPost(_)))
}

pub fn is_edited_channel_post() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::EditedChannelPost(_)))
}

pub fn is_inline_query() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::InlineQuery(_)))
}

pub fn is_callback_query() -> impl Filter {
    filter_fn(|event| matches!(event.update.kind, UpdateKind::CallbackQuery(_)))
}

// ── Text and commands ───────────────────────────────────────────────────────

/// Plain text: non-empty and not starting with `/`.
pub fn has_text() -> impl Filter {
    filter_fn(|event| {
        event
            .message()
            .and_then(Message::text)
            .is_some_and(|text| !text.is_empty() && !text.starts_with('/'))
    })
}

fn addressed_to_us(event: &Event, addressee: Option<&str>) -> bool {
    match (addressee, event.bot_username.as_deref()) {
        (None, _) => true,
        (Some(to), Some(us)) => to.eq_ignore_ascii_case(us),
        (Some(_), None) => false,
    }
}

fn command_of(event: &Event) -> Option<&str> {
    if !matches!(event.update.kind, UpdateKind::Message(_)) {
        return None;
    }
    let (command, addressee) = parse_command(event.message()?.text()?)?;
    addressed_to_us(event, addressee).then_some(command)
}

/// Any command addressed to this bot, or to no bot in particular.
pub fn command_any() -> impl Filter {
    filter_fn(|event| command_of(event).is_some())
}

/// `/name`, optionally with arguments or `@this_bot`. A leading `/` in `name`
/// is ignored.
pub fn command(name: &str) -> impl Filter + use<> {
    let name = name.trim_start_matches('/').to_string();
    filter_fn(move |event| command_of(event) == Some(name.as_str()))
}

/// Message text (or caption) matching `pattern`.
pub fn text_regex(pattern: Regex) -> impl Filter {
    filter_fn(move |event| event.text().is_some_and(|text| pattern.is_match(text)))
}

// ── Media ───────────────────────────────────────────────────────────────────

pub fn has_photo() -> impl Filter {
    message_has(|m| m.photo().is_some())
}

pub fn has_video() -> impl Filter {
    message_has(|m| m.video().is_some())
}

pub fn has_audio() -> impl Filter {
    message_has(|m| m.audio().is_some())
}

pub fn has_voice() -> impl Filter {
    message_has(|m| m.voice().is_some())
}

pub fn has_document() -> impl Filter {
    message_has(|m| m.document().is_some())
}

pub fn has_sticker() -> impl Filter {
    message_has(|m| m.sticker().is_some())
}

pub fn has_animation() -> impl Filter {
    message_has(|m| m.animation().is_some())
}

pub fn has_video_note() -> impl Filter {
    message_has(|m| m.video_note().is_some())
}

pub fn has_contact() -> impl Filter {
    message_has(|m| m.contact().is_some())
}

pub fn has_location() -> impl Filter {
    message_has(|m| m.location().is_some())
}

pub fn has_venue() -> impl Filter {
    message_has(|m| m.venue().is_some())
}

pub fn has_poll() -> impl Filter {
    message_has(|m| m.poll().is_some())
}

pub fn has_dice() -> impl Filter {
    message_has(|m| m.dice().is_some())
}

// ── Chats and membership ────────────────────────────────────────────────────

pub fn is_private() -> impl Filter {
    filter_fn(|event| event.chat().is_some_and(|c| c.is_private()))
}

pub fn is_group() -> impl Filter {
    filter_fn(|event| event.chat().is_some_and(|c| c.is_group()))
}

pub fn is_supergroup() -> impl Filter {
    filter_fn(|event| event.chat().is_some_and(|c| c.is_supergroup()))
}

pub fn is_group_or_supergroup() -> impl Filter {
    filter_fn(|event| {
        event
            .chat()
            .is_some_and(|c| c.is_group() || c.is_supergroup())
    })
}

pub fn is_channel() -> impl Filter {
    filter_fn(|event| event.chat().is_some_and(|c| c.is_channel()))
}

pub fn has_new_chat_members() -> impl Filter {
    message_has(|m| m.new_chat_members().is_some_and(|members| !members.is_empty()))
}

pub fn has_left_chat_member() -> impl Filter {
    message_has(|m| m.left_chat_member().is_some())
}

/// Sent by one of `user_ids`.
pub fn from_user(user_ids: impl IntoIterator<Item = u64>) -> impl Filter {
    let ids: HashSet<u64> = user_ids.into_iter().collect();
    filter_fn(move |event| event.user().is_some_and(|u| ids.contains(&u.id.0)))
}

/// In one of `chat_ids`.
pub fn in_chat(chat_ids: impl IntoIterator<Item = i64>) -> impl Filter {
    let ids: HashSet<i64> = chat_ids.into_iter().collect();
    filter_fn(move |event| event.chat().is_some_and(|c| ids.contains(&c.id.0)))
}

// ── Forwards and replies ────────────────────────────────────────────────────

pub fn is_forwarded() -> impl Filter {
    message_has(|m| m.forward_origin().is_some())
}

pub fn is_forwarded_from_user() -> impl Filter {
    message_has(|m| {
        matches!(
            m.forward_origin(),
            Some(MessageOrigin::User { .. } | MessageOrigin::HiddenUser { .. })
        )
    })
}

pub fn is_forwarded_from_chat() -> impl Filter {
    message_has(|m| {
        matches!(
            m.forward_origin(),
            Some(MessageOrigin::Chat { .. } | MessageOrigin::Channel { .. })
        )
    })
}

pub fn is_reply() -> impl Filter {
    message_has(|m| m.reply_to_message().is_some())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use {
        rstest::rstest, serde_json::json, switchboard_common::fixtures,
        teloxide::types::Update, tokio_util::sync::CancellationToken,
    };

    use super::*;

    fn event(update: Update) -> Event {
        Event::new(
            Arc::new(update),
            Some(fixtures::BOT_USERNAME.into()),
            CancellationToken::new(),
        )
    }

    fn private_message(extra: serde_json::Value) -> Event {
        let base = fixtures::message(fixtures::private_chat(5), Some(fixtures::user(5)), None);
        event(fixtures::update(1, "message", fixtures::with(base, extra)))
    }

    #[rstest]
    #[case("/cmd", true)]
    #[case("/cmd@switchboard_bot", true)]
    #[case("/cmd@SWITCHBOARD_BOT", true)]
    #[case("/cmd arg1 arg2", true)]
    #[case("/cmd@switchboard_bot arg1", true)]
    #[case("/cmdx", false)]
    #[case("/cmd@other_bot", false)]
    #[case("cmd", false)]
    #[case("hello /cmd", false)]
    fn command_matching(#[case] text: &str, #[case] expected: bool) {
        let e = event(fixtures::private_text(1, text));
        assert_eq!(command("cmd").matches(&e), expected, "{text}");
        assert_eq!(command("/cmd").matches(&e), expected, "{text}");
    }

    #[test]
    fn command_any_respects_addressee() {
        assert!(command_any().matches(&event(fixtures::private_text(1, "/start"))));
        assert!(!command_any().matches(&event(fixtures::private_text(1, "/start@someone_else"))));
        assert!(!command_any().matches(&event(fixtures::private_text(1, "start"))));
    }

    #[test]
    fn addressed_command_without_known_username_is_rejected() {
        let e = Event::new(
            Arc::new(fixtures::private_text(1, "/cmd@switchboard_bot")),
            None,
            CancellationToken::new(),
        );
        assert!(!command("cmd").matches(&e));
        let plain = Event::new(
            Arc::new(fixtures::private_text(1, "/cmd")),
            None,
            CancellationToken::new(),
        );
        assert!(command("cmd").matches(&plain));
    }

    #[test]
    fn parse_command_splits_addressee() {
        assert_eq!(parse_command("/go@bot_x now"), Some(("go", Some("bot_x"))));
        assert_eq!(parse_command("/go"), Some(("go", None)));
        assert_eq!(parse_command("go"), None);
    }

    #[rstest]
    #[case("hello", true)]
    #[case("/start", false)]
    fn has_text_excludes_commands(#[case] text: &str, #[case] expected: bool) {
        assert_eq!(has_text().matches(&event(fixtures::private_text(1, text))), expected);
    }

    #[test]
    fn kind_filters() {
        let message = event(fixtures::private_text(1, "hi"));
        let callback = event(fixtures::callback_query(1, 1, "yes"));
        let inline = event(fixtures::inline_query(1, "q"));

        assert!(is_message().matches(&message));
        assert!(!is_message().matches(&callback));
        assert!(is_callback_query().matches(&callback));
        assert!(is_inline_query().matches(&inline));
        assert!(!is_edited_message().matches(&message));
        assert!(any().matches(&inline));
    }

    #[test]
    fn chat_type_filters() {
        let private = event(fixtures::private_text(1, "hi"));
        let group = event(fixtures::group_text(-10, 1, "hi"));
        let supergroup = event(fixtures::update(
            1,
            "message",
            fixtures::message(fixtures::supergroup_chat(-100), Some(fixtures::user(1)), Some("hi")),
        ));
        let channel = event(fixtures::update(
            1,
            "channel_post",
            fixtures::message(fixtures::channel_chat(-200), None, Some("news")),
        ));

        assert!(is_private().matches(&private));
        assert!(is_group().matches(&group));
        assert!(!is_supergroup().matches(&group));
        assert!(is_supergroup().matches(&supergroup));
        assert!(is_group_or_supergroup().matches(&group));
        assert!(is_group_or_supergroup().matches(&supergroup));
        assert!(is_channel().matches(&channel));
        assert!(is_channel_post().matches(&channel));
        assert!(!is_private().matches(&channel));
    }

    #[test]
    fn identity_filters() {
        let e = event(fixtures::group_text(-10, 7, "hi"));
        assert!(from_user([7, 8]).matches(&e));
        assert!(!from_user([8]).matches(&e));
        assert!(in_chat([-10]).matches(&e));
        assert!(!in_chat([10]).matches(&e));
    }

    #[test]
    fn media_filters() {
        let photo = private_message(json!({
            "photo": [{
                "file_id": "p1",
                "file_unique_id": "u1",
                "file_size": 10,
                "width": 1,
                "height": 1,
            }],
        }));
        assert!(has_photo().matches(&photo));
        assert!(!has_video().matches(&photo));
        assert!(!has_text().matches(&photo));

        let location = private_message(json!({
            "location": { "latitude": 1.5, "longitude": 2.5 },
        }));
        assert!(has_location().matches(&location));
        assert!(!has_photo().matches(&location));
    }

    #[test]
    fn reply_and_forward_filters() {
        let original =
            fixtures::message(fixtures::private_chat(5), Some(fixtures::user(5)), Some("first"));
        let reply = private_message(json!({ "text": "second", "reply_to_message": original }));
        assert!(is_reply().matches(&reply));
        assert!(!is_forwarded().matches(&reply));

        let forwarded = private_message(json!({
            "text": "fwd",
            "forward_origin": { "type": "user", "date": 0, "sender_user": fixtures::user(9) },
        }));
        assert!(is_forwarded().matches(&forwarded));
        assert!(is_forwarded_from_user().matches(&forwarded));
        assert!(!is_forwarded_from_chat().matches(&forwarded));
    }

    #[test]
    fn text_regex_checks_text() {
        let filter = text_regex(Regex::new(r"^order-\d+$").unwrap());
        assert!(filter.matches(&event(fixtures::private_text(1, "order-42"))));
        assert!(!filter.matches(&event(fixtures::private_text(1, "order-x"))));
        assert!(!filter.matches(&event(fixtures::inline_query(1, "order-42"))));
    }
}
