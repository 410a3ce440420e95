use anyhow::{Context, Result};
use google_sheets4::{hyper, hyper_rustls, oauth2, Sheets};
use secrecy::ExposeSecret;
use tracing::info;

use crate::cfg::Credentials;

pub type SheetsHub = Sheets<hyper_rustls::HttpsConnector<hyper::client::HttpConnector>>;

pub async fn create_sheets_hub(credentials: &Credentials) -> Result<SheetsHub> {
    info!("Initializing Google Sheets authentication");

    let key = match credentials {
        Credentials::File(path) => oauth2::read_service_account_key(path)
            .await
            .with_context(|| format!("failed to read service account key {}", path.display()))?,
        Credentials::Inline(json) => oauth2::parse_service_account_key(json.expose_secret())
            .context("GOOGLE_SERVICE_ACCOUNT_JSON is not a valid service account key")?,
    };

    let auth = oauth2::ServiceAccountAuthenticator::builder(key)
        .build()
        .await
        .context("failed to build service account authenticator")?;

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_native_roots()
        .context("failed to load native TLS root certificates")?
        .https_or_http()
        .enable_http1()
        .build();
    let client = hyper::Client::builder().build::<_, hyper::Body>(https);

    Ok(Sheets::new(client, auth))
}
