//! BigQuery Access Tokens
//!
//! Supplies bearer tokens for the BigQuery sink: either a fixed token from
//! configuration or short-lived tokens from the GCE/Cloud Run metadata
//! server, cached until shortly before they expire.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::application::ports::SinkError;
use crate::infrastructure::config::BigQueryCredentials;

/// Path of the default service account token on the metadata server.
const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Source of bearer tokens for BigQuery requests.
pub struct TokenProvider {
    source: TokenSource,
}

enum TokenSource {
    Static(String),
    Metadata {
        client: Client,
        token_url: String,
        cache: Mutex<Option<CachedToken>>,
    },
}

impl TokenProvider {
    /// Build a provider for `credentials`, issuing metadata requests with `client`.
    #[must_use]
    pub fn new(credentials: &BigQueryCredentials, client: Client) -> Self {
        let source = match credentials {
            BigQueryCredentials::AccessToken(token) => TokenSource::Static(token.clone()),
            BigQueryCredentials::MetadataServer { host } => TokenSource::Metadata {
                client,
                token_url: format!("http://{host}{METADATA_TOKEN_PATH}"),
                cache: Mutex::new(None),
            },
        };
        Self { source }
    }

    /// Current bearer token, fetching a fresh one if the cached token is
    /// missing or about to expire.
    ///
    /// # Errors
    ///
    /// Returns `SinkError` if the metadata server cannot be reached or
    /// answers with an error.
    pub async fn token(&self) -> Result<String, SinkError> {
        let (client, token_url, cache) = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Metadata {
                client,
                token_url,
                cache,
            } => (client, token_url, cache),
        };

        let mut guard = cache.lock().await;
        if let Some(cached) = guard.as_ref()
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.token.clone());
        }

        let fetched = fetch_metadata_token(client, token_url).await?;
        let lifetime = Duration::from_secs(fetched.expires_in).saturating_sub(REFRESH_MARGIN);
        tracing::debug!(expires_in = fetched.expires_in, "Fetched BigQuery access token");

        let token = fetched.access_token;
        *guard = Some(CachedToken {
            token: token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token)
    }

    /// Drop any cached token so the next call fetches a new one.
    pub async fn invalidate(&self) {
        if let TokenSource::Metadata { cache, .. } = &self.source {
            cache.lock().await.take();
        }
    }
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            TokenSource::Static(_) => f.write_str("TokenProvider::Static"),
            TokenSource::Metadata { token_url, .. } => f
                .debug_struct("TokenProvider::Metadata")
                .field("token_url", token_url)
                .finish_non_exhaustive(),
        }
    }
}

async fn fetch_metadata_token(client: &Client, token_url: &str) -> Result<MetadataToken, SinkError> {
    let response = client
        .get(token_url)
        .header("Metadata-Flavor", "Google")
        .send()
        .await
        .map_err(|e| SinkError::Network(format!("metadata server: {e}")))?;

    let status = response.status();
    if status != StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        return Err(SinkError::Http {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| SinkError::Network(format!("metadata token response: {e}")))
}
