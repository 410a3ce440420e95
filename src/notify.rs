use anyhow::{Context, Result};
use reqwest::Client;
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cfg::TelegramCfg;

const SEND_TIMEOUT: Duration = Duration::from_secs(20);

/// Posts messages to one Telegram chat. Delivery is best effort.
pub struct Telegram {
    client: Client,
    // Holds the bot token; never log it.
    endpoint: String,
    chat_id: String,
}

impl Telegram {
    pub fn new(cfg: &TelegramCfg) -> Result<Self> {
        let client = Client::builder()
            .timeout(SEND_TIMEOUT)
            .build()
            .context("failed to build Telegram HTTP client")?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                cfg.api_base.trim_end_matches('/'),
                cfg.token.expose_secret()
            ),
            chat_id: cfg.chat_id.clone(),
        })
    }

    /// Sends `text`. Failures are logged here and go no further.
    pub async fn send(&self, text: &str) {
        match self.try_send(text).await {
            Ok(()) => debug!("Telegram message delivered ({} chars)", text.chars().count()),
            Err(e) => warn!("Telegram send failed: {:#}", e),
        }
    }

    async fn try_send(&self, text: &str) -> Result<()> {
        let form = [
            ("chat_id", self.chat_id.as_str()),
            ("text", text),
            ("disable_web_page_preview", "true"),
        ];

        // Strip the URL so the token cannot leak through the error text.
        self.client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|e| e.without_url())?
            .error_for_status()
            .map_err(|e| e.without_url())?;
        Ok(())
    }
}
