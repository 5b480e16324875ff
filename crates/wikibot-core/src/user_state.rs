use std::{collections::BTreeSet, sync::Arc};

use tracing::info;

use crate::{domain::UserId, store::KvStore, Result};

/// Per-user language preference and bounded reading history.
pub struct UserStateStore {
    store: Arc<dyn KvStore>,
    supported_langs: BTreeSet<String>,
    default_lang: String,
    max_history_size: usize,
}

fn lang_key(user_id: UserId) -> String {
    format!("user:{user_id}:lang")
}

fn history_key(user_id: UserId) -> String {
    format!("user:{user_id}:articles")
}

impl UserStateStore {
    pub fn new(
        store: Arc<dyn KvStore>,
        supported_langs: BTreeSet<String>,
        default_lang: impl Into<String>,
        max_history_size: usize,
    ) -> Self {
        Self {
            store,
            supported_langs,
            default_lang: default_lang.into(),
            max_history_size,
        }
    }

    pub fn supported_langs(&self) -> &BTreeSet<String> {
        &self.supported_langs
    }

    pub fn max_history_size(&self) -> usize {
        self.max_history_size
    }

    /// Stored preference, else the first two characters of the client hint.
    pub async fn get_language(&self, user_id: UserId, fallback_hint: Option<&str>) -> Result<String> {
        if let Some(lang) = self.store.get(&lang_key(user_id)).await? {
            return Ok(lang);
        }
        Ok(fallback_hint
            .map(|hint| hint.trim().chars().take(2).collect::<String>().to_lowercase())
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| self.default_lang.clone()))
    }

    /// Persist `code` if it is supported. Returns `false` for unsupported codes.
    pub async fn set_language(&self, user_id: UserId, code: &str) -> Result<bool> {
        let lang = code.trim().to_lowercase();
        if !self.supported_langs.contains(&lang) {
            return Ok(false);
        }
        self.store.set(&lang_key(user_id), &lang).await?;
        info!(user_id = user_id.0, lang = %lang, "language preference updated");
        Ok(true)
    }

    pub async fn record_read(&self, user_id: UserId, title: &str) -> Result<()> {
        self.store
            .push_front_truncated(&history_key(user_id), title, self.max_history_size)
            .await
    }

    /// Most recent titles first, at most `max_history_size`.
    pub async fn recent_reads(&self, user_id: UserId) -> Result<Vec<String>> {
        self.store
            .list(&history_key(user_id), self.max_history_size)
            .await
    }
}
