use crate::domain::{ChatId, UpdateId, UserId};

/// One inbound platform event together with its sequence number.
#[derive(Clone, Debug)]
pub struct IncomingUpdate {
    pub update_id: UpdateId,
    pub kind: UpdateKind,
}

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter.
#[derive(Clone, Debug)]
pub enum UpdateKind {
    Text(TextMessage),
    Callback(CallbackEvent),
    /// A button press without a payload or origin chat, identified by its
    /// callback id. It is acknowledged and otherwise ignored.
    DetachedCallback(String),
    /// Any other update shape; rejected by the dispatcher.
    Unsupported(String),
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub language_code: Option<String>,
    pub text: String,
}

/// A button press carrying a title token as its payload.
#[derive(Clone, Debug)]
pub struct CallbackEvent {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub language_code: Option<String>,
    pub callback_id: String,
    pub token: String,
}

/// Inline keyboard (buttons) attached to a reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub buttons: Vec<InlineButton>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub callback_data: String,
}

impl InlineKeyboard {
    pub fn new(buttons: Vec<InlineButton>) -> Self {
        Self { buttons }
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }

    /// Labels are shortened to `max_label_len` characters; payloads are kept as-is.
    pub fn one_per_row(options: &[(String, String)], max_label_len: usize) -> Self {
        let buttons = options
            .iter()
            .map(|(label, callback_data)| InlineButton {
                label: truncate_label(label, max_label_len),
                callback_data: callback_data.clone(),
            })
            .collect();
        Self { buttons }
    }
}

fn truncate_label(label: &str, max_len: usize) -> String {
    if label.chars().count() > max_len {
        format!("{}...", label.chars().take(max_len).collect::<String>())
    } else {
        label.to_string()
    }
}

/// A fully composed answer to one update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingReply {
    pub chat_id: ChatId,
    /// Telegram HTML.
    pub html: String,
    pub keyboard: InlineKeyboard,
}

/// Limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    /// Largest button payload, in bytes, the platform accepts.
    pub max_callback_data_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_labels_are_truncated_on_char_boundaries() {
        let kb = InlineKeyboard::one_per_row(
            &[
                ("Короткий".to_string(), "t1".to_string()),
                ("Очень длинное название статьи".to_string(), "t2".to_string()),
            ],
            8,
        );
        assert_eq!(kb.buttons[0].label, "Короткий");
        assert_eq!(kb.buttons[1].label, "Очень дл...");
        assert_eq!(kb.buttons[1].callback_data, "t2");
    }
}
