//! Client for the affiliate clients report.
//!
//! Pages are fetched in order by following the envelope's `next` URL. Each
//! page gets a bounded number of attempts; a 401 is never retried.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cfg::ApiCfg;
use crate::transform::{normalize_rows, ClientRow};

const JWT_PREFIX: &str = "JWT ";

#[derive(Debug, Error)]
pub enum FetchError {
    /// Credentials were rejected; retrying cannot help.
    #[error("unauthorized (401) from {url}: check EXNESS_JWT")]
    Unauthorized { url: String },

    #[error("response from {url} is not JSON: {reason}")]
    NotJson { url: String, reason: String },

    #[error("GET {url} failed after {attempts} attempts: {last}")]
    RetriesExhausted { url: String, attempts: u32, last: String },

    #[error("invalid API client setup: {0}")]
    Setup(String),
}

pub struct ApiClient {
    client: Client,
    url: String,
    max_attempts: u32,
    backoff: Duration,
}

impl ApiClient {
    pub fn new(cfg: &ApiCfg) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut auth = HeaderValue::from_str(&authorization(cfg.token.expose_secret()))
            .map_err(|e| FetchError::Setup(format!("EXNESS_JWT is not a valid header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| FetchError::Setup(e.to_string()))?;

        Ok(Self {
            client,
            url: cfg.url.clone(),
            max_attempts: cfg.max_attempts,
            backoff: cfg.backoff,
        })
    }

    /// Fetches every page and returns the rows in request order.
    pub async fn fetch_all_clients(&self) -> Result<Vec<ClientRow>, FetchError> {
        let mut rows = Vec::new();
        let mut next_url = Some(self.url.clone());
        let mut pages = 0;

        while let Some(url) = next_url.take() {
            let payload = self.get_json(&url).await?;
            next_url = next_page(&payload);

            let part = normalize_rows(payload);
            pages += 1;
            debug!(page = pages, rows = part.len(), "Fetched page");
            rows.extend(part);
        }

        info!(pages = pages, rows = rows.len(), "Fetched all client rows");
        Ok(rows)
    }

    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        let mut last = String::new();

        for attempt in 1..=self.max_attempts {
            match self.client.get(url).send().await {
                Ok(resp) => match resp.status() {
                    // The client timeout also covers the body, so a stalled or
                    // cut-off download is retried like any transport error.
                    StatusCode::OK => match resp.text().await {
                        Ok(body) => {
                            return serde_json::from_str(&body).map_err(|e| FetchError::NotJson {
                                url: url.to_string(),
                                reason: e.to_string(),
                            });
                        }
                        Err(e) => last = format!("reading body: {e}"),
                    },
                    StatusCode::UNAUTHORIZED => {
                        return Err(FetchError::Unauthorized { url: url.to_string() });
                    }
                    status => last = format!("status {status}"),
                },
                Err(e) => last = e.to_string(),
            }

            warn!(
                attempt = attempt,
                max_attempts = self.max_attempts,
                error = %last,
                "Request to clients report failed"
            );
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff * attempt).await;
            }
        }

        Err(FetchError::RetriesExhausted {
            url: url.to_string(),
            attempts: self.max_attempts,
            last,
        })
    }
}

/// The report expects `Authorization: JWT <token>`; accept the token with or
/// without the scheme.
pub fn authorization(token: &str) -> String {
    if token.starts_with(JWT_PREFIX) {
        token.to_string()
    } else {
        format!("{JWT_PREFIX}{token}")
    }
}

/// A non-empty string `next` on an object envelope.
fn next_page(payload: &Value) -> Option<String> {
    match payload.get("next") {
        Some(Value::String(url)) if !url.trim().is_empty() => Some(url.trim().to_string()),
        _ => None,
    }
}
