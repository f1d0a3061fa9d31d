use async_trait::async_trait;
use teloxide::prelude::*;

use menubot_core::{errors::Error, Result};

use crate::TelegramMessenger;

/// Webhook (de)registration with the Bot API.
#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()>;
    async fn delete_webhook(&self) -> Result<()>;
    async fn bot_username(&self) -> Result<String>;
}

#[async_trait]
impl WebhookRegistrar for TelegramMessenger {
    async fn set_webhook(&self, url: &str, secret_token: Option<&str>) -> Result<()> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid webhook url `{url}`: {e}")))?;
        let bot = self.bot();
        self.with_retry(|| {
            let mut req = bot.set_webhook(url.clone());
            if let Some(secret) = secret_token {
                req = req.secret_token(secret.to_string());
            }
            req
        })
        .await?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        let bot = self.bot();
        self.with_retry(|| bot.delete_webhook()).await?;
        Ok(())
    }

    async fn bot_username(&self) -> Result<String> {
        let bot = self.bot();
        let me = self.with_retry(|| bot.get_me()).await?;
        Ok(me.username().to_string())
    }
}
