use anyhow::Context;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::config::CatalogConfig;
use super::dto::{self, ShowPayload};
use super::retry::RetryPolicy;
use crate::model::{Marker, Show, ShowId};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("catalog at {url} still answered {status} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        status: StatusCode,
        attempts: u32,
    },
    #[error("invalid catalog payload from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog request to {url} abandoned on shutdown")]
    Cancelled { url: String },
    #[error("invalid catalog url: {0}")]
    Url(#[from] url::ParseError),
}

/// HTTP client for the remote show catalog. Every call goes through the retry policy and
/// is abandoned, backoff included, once the shutdown token fires.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    cfg: CatalogConfig,
    http: Client,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

impl CatalogClient {
    pub fn new(cfg: CatalogConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("showhub/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("failed to construct catalog HTTP client")?;
        let retry = RetryPolicy::new(cfg.max_retries);
        Ok(Self {
            cfg,
            http,
            retry,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Fetches one show with its cast. A non-success answer means the show is absent.
    #[instrument(skip(self))]
    pub async fn fetch_show(&self, id: ShowId) -> Result<Option<Show>, CatalogError> {
        let url = self.cfg.show_url(id)?;
        let Some(body) = self.get(&url).await? else {
            return Ok(None);
        };
        let payload: ShowPayload = decode_body(&url, &body)?;
        Ok(Some(payload.into_show()))
    }

    /// Fetches the `{id: marker}` map for the whole catalog. A non-success answer or an
    /// empty body yields an empty map.
    #[instrument(skip(self))]
    pub async fn fetch_updates(&self) -> Result<HashMap<ShowId, Marker>, CatalogError> {
        let url = self.cfg.updates_url()?;
        let Some(body) = self.get(&url).await? else {
            return Ok(HashMap::new());
        };
        if body.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let raw: HashMap<i64, Marker> = decode_body(&url, &body)?;
        Ok(raw.into_iter().map(|(id, m)| (ShowId::new(id), m)).collect())
    }

    /// Fetches one page of the catalog index (shows without cast).
    #[instrument(skip(self))]
    pub async fn fetch_index_page(&self, page: i64) -> Result<Vec<Show>, CatalogError> {
        let url = self.cfg.index_url(page)?;
        let Some(body) = self.get(&url).await? else {
            return Ok(Vec::new());
        };
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }
        let payloads: Vec<ShowPayload> = decode_body(&url, &body)?;
        Ok(payloads.into_iter().map(ShowPayload::into_show).collect())
    }

    /// GET with retries. `Ok(None)` for a final non-success, non-transient status.
    async fn get(&self, url: &Url) -> Result<Option<String>, CatalogError> {
        let attempts = self.retry.run(
            |_| {
                let request = self.http.get(url.clone());
                async move {
                    let response = request.send().await?;
                    let status = response.status();
                    let body = response.text().await?;
                    Ok::<_, reqwest::Error>((status, body))
                }
            },
            retry_reason,
        );
        let result = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                debug!(%url, "shutdown requested; abandoning catalog call");
                return Err(CatalogError::Cancelled { url: url.to_string() });
            }
            result = attempts => result,
        };

        match result {
            Ok((status, body)) if status.is_success() => Ok(Some(body)),
            Ok((status, _)) if is_transient_status(status) => Err(CatalogError::RetriesExhausted {
                url: url.to_string(),
                status,
                attempts: self.retry.max_attempts(),
            }),
            Ok((status, _)) => {
                debug!(%url, %status, "catalog answered non-success; treating as absent");
                Ok(None)
            }
            Err(source) => Err(CatalogError::Transport {
                url: url.to_string(),
                source,
            }),
        }
    }
}

fn decode_body<T: DeserializeOwned>(url: &Url, body: &str) -> Result<T, CatalogError> {
    dto::decode(body).map_err(|source| CatalogError::Decode {
        url: url.to_string(),
        source,
    })
}

/// Rate limiting, request timeouts and server-side failures are worth another try.
pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Timeouts, refused or reset connections and bodies cut off mid-stream.
pub fn is_transient_transport(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

fn retry_reason(result: &Result<(StatusCode, String), reqwest::Error>) -> Option<String> {
    match result {
        Ok((status, _)) if is_transient_status(*status) => Some(format!("status {status}")),
        Ok(_) => None,
        Err(err) if is_transient_transport(err) => Some(err.to_string()),
        Err(_) => None,
    }
}
