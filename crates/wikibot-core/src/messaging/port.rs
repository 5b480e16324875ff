use std::time::Duration;

use async_trait::async_trait;

use crate::{
    domain::{ChatId, UpdateId},
    messaging::types::{IncomingUpdate, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Outbound half of the chat platform.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<()>;

    async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<()>;
}

/// Inbound half of the chat platform: a long-poll source of updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Block for at most `timeout` waiting for updates with `update_id >= offset`.
    ///
    /// An empty vector means the long poll expired without news.
    async fn get_updates(&self, offset: UpdateId, timeout: Duration) -> Result<Vec<IncomingUpdate>>;
}
