use std::sync::Arc;

use wikibot_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), wikibot_core::Error> {
    wikibot_core::logging::init("wikibot")?;

    let cfg = Arc::new(Config::load()?);

    wikibot_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| wikibot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
