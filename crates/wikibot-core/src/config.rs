use std::{
    collections::BTreeSet,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

const DEFAULT_SUPPORTED_LANGS: &str = "de,en,es,fr,it,ja,nl,pl,pt,ru,sv,uk,zh";

/// Typed configuration, loaded from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub poll_timeout: Duration,
    pub poll_grace: Duration,
    pub send_timeout: Duration,
    pub button_label_max_length: usize,

    // Storage
    pub db_path: PathBuf,

    // Languages
    pub supported_langs: BTreeSet<String>,
    pub default_lang: String,

    // Wikipedia
    pub wikipedia_timeout: Duration,
    pub wikipedia_user_agent: String,
    pub summary_sentences: usize,
    pub serialize_lookups: bool,

    // Bounds
    pub max_history_size: usize,
    pub lru_max_size: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let supported_langs = parse_csv_lower(
            env_str("SUPPORTED_LANGS").or_else(|| Some(DEFAULT_SUPPORTED_LANGS.to_string())),
        );
        if supported_langs.is_empty() {
            return Err(Error::Config(
                "SUPPORTED_LANGS must list at least one language".to_string(),
            ));
        }

        let default_lang = env_str("DEFAULT_LANG")
            .and_then(non_empty)
            .map(|s| s.trim().to_lowercase())
            .unwrap_or_else(|| "en".to_string());

        let max_history_size = env_usize("MAX_HISTORY_SIZE").unwrap_or(10);
        if max_history_size == 0 {
            return Err(Error::Config(
                "MAX_HISTORY_SIZE must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            poll_timeout: Duration::from_secs(env_u64("POLL_TIMEOUT_SECS").unwrap_or(300)),
            poll_grace: Duration::from_secs(env_u64("POLL_GRACE_SECS").unwrap_or(10)),
            send_timeout: Duration::from_secs(env_u64("SEND_TIMEOUT_SECS").unwrap_or(10)),
            button_label_max_length: env_usize("BUTTON_LABEL_MAX_LENGTH").unwrap_or(60),
            db_path: env_path("WIKIBOT_DB_PATH").unwrap_or_else(|| PathBuf::from("wikibot.sqlite3")),
            supported_langs: supported_langs.into_iter().collect(),
            default_lang,
            wikipedia_timeout: Duration::from_secs(env_u64("WIKIPEDIA_TIMEOUT_SECS").unwrap_or(10)),
            wikipedia_user_agent: env_str("WIKIPEDIA_USER_AGENT")
                .and_then(non_empty)
                .unwrap_or_else(|| "wikibot/0.1 (telegram bot)".to_string()),
            summary_sentences: env_usize("SUMMARY_SENTENCES").unwrap_or(6).max(1),
            serialize_lookups: env_bool("SERIALIZE_LOOKUPS").unwrap_or(true),
            max_history_size,
            lru_max_size: env_u64("LRU_MAX_SIZE").unwrap_or(1024).max(1),
        })
    }

    /// Whether the store path asks for a throwaway in-memory database.
    pub fn db_in_memory(&self) -> bool {
        self.db_path.as_os_str() == ":memory:"
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() || env::var_os(key).is_some() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_lower(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        telegram_bot_token: "x".to_string(),
        poll_timeout: Duration::from_secs(1),
        poll_grace: Duration::from_secs(1),
        send_timeout: Duration::from_secs(1),
        button_label_max_length: 60,
        db_path: PathBuf::from(":memory:"),
        supported_langs: ["de", "en", "ru"].iter().map(|s| s.to_string()).collect(),
        default_lang: "en".to_string(),
        wikipedia_timeout: Duration::from_secs(1),
        wikipedia_user_agent: "test".to_string(),
        summary_sentences: 6,
        serialize_lookups: true,
        max_history_size: 3,
        lru_max_size: 64,
    }
}
