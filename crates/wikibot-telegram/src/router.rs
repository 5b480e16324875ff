use std::{sync::Arc, time::Duration};

use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use wikibot_core::{
    config::Config,
    dispatch::Dispatcher,
    ingest::IngestionLoop,
    lookup::{cache::LookupCacheConfig, LookupCache},
    messaging::port::MessagingPort,
    registry::TitleRegistry,
    store::{KvStore, SqliteStore},
    user_state::UserStateStore,
};
use wikibot_wikipedia::WikipediaClient;

use crate::{TelegramMessenger, TelegramUpdateSource};

/// Telegram client whose HTTP timeout is `timeout`.
fn bot_with_timeout(token: &str, timeout: Duration) -> anyhow::Result<Bot> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .tcp_nodelay(true)
        .build()?;
    Ok(Bot::with_client(token, client))
}

fn open_store(cfg: &Config) -> anyhow::Result<Arc<dyn KvStore>> {
    let store = if cfg.db_in_memory() {
        warn!("WIKIBOT_DB_PATH is :memory:, nothing will survive a restart");
        SqliteStore::open_in_memory()?
    } else {
        SqliteStore::open(&cfg.db_path)?
    };
    Ok(Arc::new(store))
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    // Long polls hold the request open for `poll_timeout`, so that client gets the grace on top.
    let poll_bot = bot_with_timeout(&cfg.telegram_bot_token, cfg.poll_timeout + cfg.poll_grace)?;
    let send_bot = bot_with_timeout(&cfg.telegram_bot_token, cfg.send_timeout)?;

    match send_bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "wikibot started"),
        Err(e) => warn!(error = %e, "getMe failed; continuing"),
    }
    info!(
        langs = ?cfg.supported_langs,
        default_lang = %cfg.default_lang,
        db = %cfg.db_path.display(),
        "configuration loaded"
    );

    let store = open_store(&cfg)?;
    let registry = Arc::new(TitleRegistry::new(store.clone(), cfg.lru_max_size));
    let users = Arc::new(UserStateStore::new(
        store,
        cfg.supported_langs.clone(),
        cfg.default_lang.clone(),
        cfg.max_history_size,
    ));

    let wikipedia = Arc::new(WikipediaClient::new(
        &cfg.wikipedia_user_agent,
        cfg.wikipedia_timeout,
    )?);
    let lookups = Arc::new(LookupCache::new(
        wikipedia,
        LookupCacheConfig {
            capacity: cfg.lru_max_size,
            summary_sentences: cfg.summary_sentences,
            serialize_calls: cfg.serialize_lookups,
        },
    ));

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(send_bot));
    let dispatcher = Arc::new(Dispatcher::new(
        users,
        registry,
        lookups.clone(),
        messenger,
        cfg.button_label_max_length,
    ));

    let source = Arc::new(TelegramUpdateSource::new(poll_bot));
    let ingest = IngestionLoop::new(source, dispatcher, cfg.poll_timeout);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            info!("shutdown requested");
            cancel.cancel();
        }
    });

    ingest.run(cancel).await;
    info!(stats = %lookups.stats(), "lookup cache totals");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
