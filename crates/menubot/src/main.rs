use std::sync::Arc;

use menubot_core::{config::Config, menu::MenuGraph};

#[tokio::main]
async fn main() -> Result<(), menubot_core::Error> {
    menubot_core::logging::init("menubot")?;

    let cfg = Arc::new(Config::load()?);
    tracing::debug!(config = ?cfg, "configuration");

    // A broken menu file is a startup error, not a runtime surprise.
    let menu = Arc::new(MenuGraph::load(cfg.menu_file.as_deref())?);

    menubot_telegram::router::run_webhook(cfg, menu)
        .await
        .map_err(|e| menubot_core::Error::External(format!("webhook server failed: {e:#}")))?;

    Ok(())
}
