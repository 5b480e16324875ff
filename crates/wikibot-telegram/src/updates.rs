//! Inbound side: `getUpdates` long polling and the mapping from teloxide
//! updates onto the platform-neutral [`IncomingUpdate`].

use std::time::Duration;

use async_trait::async_trait;
use teloxide::{
    prelude::*,
    types::{AllowedUpdate, Update, UpdateKind as TgUpdateKind},
};
use tracing::debug;

use wikibot_core::{
    domain::{ChatId, UpdateId, UserId},
    errors::Error,
    messaging::{
        port::UpdateSource,
        types::{CallbackEvent, IncomingUpdate, TextMessage, UpdateKind},
    },
    Result,
};

/// Long-poll source. The bot's HTTP client timeout must exceed the poll timeout.
#[derive(Clone)]
pub struct TelegramUpdateSource {
    bot: Bot,
}

impl TelegramUpdateSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl UpdateSource for TelegramUpdateSource {
    async fn get_updates(&self, offset: UpdateId, timeout: Duration) -> Result<Vec<IncomingUpdate>> {
        let offset = i32::try_from(offset.0)
            .map_err(|_| Error::External(format!("update offset out of range: {offset}")))?;
        let timeout = u32::try_from(timeout.as_secs()).unwrap_or(u32::MAX);

        let updates = self
            .bot
            .get_updates()
            .offset(offset)
            .timeout(timeout)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
            .await
            .map_err(|e| Error::External(format!("telegram getUpdates error: {e}")))?;

        debug!(count = updates.len(), offset, "getUpdates returned");
        Ok(updates.into_iter().map(to_incoming).collect())
    }
}

/// Convert one teloxide update. Shapes the bot does not serve become `Unsupported`.
pub fn to_incoming(update: Update) -> IncomingUpdate {
    let update_id = UpdateId(i64::from(update.id));
    let kind = match update.kind {
        TgUpdateKind::Message(msg) => message_kind(&msg),
        TgUpdateKind::CallbackQuery(q) => callback_kind(q),
        other => UpdateKind::Unsupported(unsupported_name(&other).to_string()),
    };
    IncomingUpdate { update_id, kind }
}

fn message_kind(msg: &Message) -> UpdateKind {
    let Some(text) = msg.text() else {
        return UpdateKind::Unsupported("message without text".to_string());
    };
    let Some(from) = msg.from() else {
        return UpdateKind::Unsupported("message without sender".to_string());
    };
    UpdateKind::Text(TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(from.id.0 as i64),
        language_code: from.language_code.clone(),
        text: text.to_string(),
    })
}

fn callback_kind(q: CallbackQuery) -> UpdateKind {
    // Inline-mode presses carry no message; they still need an answer.
    let (Some(data), Some(message)) = (q.data, q.message) else {
        return UpdateKind::DetachedCallback(q.id);
    };
    UpdateKind::Callback(CallbackEvent {
        chat_id: ChatId(message.chat.id.0),
        user_id: UserId(q.from.id.0 as i64),
        language_code: q.from.language_code,
        callback_id: q.id,
        token: data,
    })
}

fn unsupported_name(kind: &TgUpdateKind) -> &'static str {
    match kind {
        TgUpdateKind::EditedMessage(_) => "edited_message",
        TgUpdateKind::ChannelPost(_) => "channel_post",
        TgUpdateKind::EditedChannelPost(_) => "edited_channel_post",
        TgUpdateKind::InlineQuery(_) => "inline_query",
        TgUpdateKind::ChosenInlineResult(_) => "chosen_inline_result",
        TgUpdateKind::Poll(_) => "poll",
        TgUpdateKind::PollAnswer(_) => "poll_answer",
        TgUpdateKind::MyChatMember(_) => "my_chat_member",
        TgUpdateKind::ChatMember(_) => "chat_member",
        TgUpdateKind::Error(_) => "unparsed update",
        _ => "other update",
    }
}
