use std::sync::Arc;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use menubot_core::{
    config::Config, menu::MenuGraph, processor::UpdateProcessor, session::SessionStore,
};

use crate::registrar::WebhookRegistrar;
use crate::{build_bot, webhook, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub processor: UpdateProcessor,
    pub registrar: Arc<dyn WebhookRegistrar>,
    pub webhook_secret: Option<String>,
    pub public_url: Option<String>,
    pub started_at: DateTime<Utc>,
}

pub async fn run_webhook(cfg: Arc<Config>, menu: Arc<MenuGraph>) -> anyhow::Result<()> {
    let bot = build_bot(&cfg.telegram_bot_token, cfg.request_timeout)?;
    let telegram = Arc::new(TelegramMessenger::new(bot));

    // Startup info only; a failing getMe does not stop the server.
    match telegram.bot_username().await {
        Ok(name) => tracing::info!(bot = %format!("@{name}"), "menubot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed"),
    }
    tracing::info!(
        menu_states = menu.state_count(),
        session_ttl = ?cfg.session_ttl,
        max_sessions = cfg.max_sessions,
        secret = cfg.webhook_secret.is_some(),
        "configuration loaded"
    );

    if cfg.register_webhook_on_start {
        if let Some(url) = cfg.webhook_url() {
            telegram
                .set_webhook(&url, cfg.webhook_secret.as_deref())
                .await
                .context("registering webhook at startup")?;
            tracing::info!(webhook_url = %url, "webhook registered");
        }
    }

    let sessions = Arc::new(SessionStore::new(cfg.session_policy()));
    let processor = UpdateProcessor::new(menu, sessions, telegram.clone());
    let state = Arc::new(AppState {
        processor,
        registrar: telegram,
        webhook_secret: cfg.webhook_secret.clone(),
        public_url: cfg.public_url.clone(),
        started_at: Utc::now(),
    });

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    serve(&cfg.bind_addr(), state, shutdown).await
}

/// Serve the webhook routes until `shutdown` fires; in-flight requests finish.
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "webhook server listening");

    axum::serve(listener, webhook::routes(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("webhook server failed")?;

    tracing::info!("webhook server stopped");
    Ok(())
}
