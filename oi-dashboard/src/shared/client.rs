//! HTTP client for the snapshot history API
//!
//! Two endpoints are consumed:
//! - `GET api/latest?symbol=S` returns the newest snapshot or `null`
//! - `GET api/history?symbol=S&limit=N...` returns snapshots sorted oldest to newest

use super::config::Symbol;
use async_trait::async_trait;
use chrono::NaiveDate;
use derive_more::Constructor;
use oi_history::{HistoryQuery, Snapshot};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Records requested by the quick history fetch
pub const QUICK_FETCH_LIMIT: usize = 25;

/// Records requested by a full history fetch
pub const FULL_FETCH_LIMIT: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while talking to the history API
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP error {status} from {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

/// Quick fetches trim the history to a few records for a fast first paint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Quick,
    Full,
}

/// Parameters of one `/api/history` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Constructor)]
pub struct HistoryRequest {
    pub symbol: Symbol,
    pub query: HistoryQuery,
    pub kind: FetchKind,
}

impl HistoryRequest {
    /// Query string pairs in the order the API documents them
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("symbol", self.symbol.as_str().to_string())];

        match self.kind {
            FetchKind::Quick => {
                pairs.push(("limit", QUICK_FETCH_LIMIT.to_string()));
                pairs.push(("trim", "true".to_string()));
            }
            FetchKind::Full => pairs.push(("limit", FULL_FETCH_LIMIT.to_string())),
        }

        if let Some(date) = self.query.selected_date {
            let date = format_date(date);
            pairs.push(("startDate", date.clone()));
            pairs.push(("endDate", date));
        }

        if let Some(hours) = self.query.time_filter.and_then(|filter| filter.api_hours()) {
            pairs.push(("hours", hours.to_string()));
        }

        pairs
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Source of option-chain snapshots
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Newest snapshot for `symbol`, `None` when the server has none yet
    async fn latest(&self, symbol: Symbol) -> Result<Option<Snapshot>, ClientError>;

    /// Snapshot history, oldest first
    async fn history(&self, request: &HistoryRequest) -> Result<Vec<Snapshot>, ClientError>;
}

/// [`SnapshotSource`] backed by the history API over HTTP
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: Url,
}

impl ApiClient {
    /// `base` must end with `/`; see [`parse_api_url`](super::config::parse_api_url)
    pub fn new(base: Url) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Full URL for `path` below the base with `pairs` appended as the query string
    pub fn endpoint(&self, path: &str, pairs: &[(&'static str, String)]) -> Result<Url, ClientError> {
        let mut url = self.base.join(path)?;
        url.query_pairs_mut()
            .extend_pairs(pairs.iter().map(|(key, value)| (*key, value.as_str())));
        Ok(url)
    }

    async fn get_text(&self, url: Url) -> Result<String, ClientError> {
        debug!(%url, "GET");
        let response = self.http.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl SnapshotSource for ApiClient {
    async fn latest(&self, symbol: Symbol) -> Result<Option<Snapshot>, ClientError> {
        let url = self.endpoint("api/latest", &[("symbol", symbol.as_str().to_string())])?;
        decode_latest(&self.get_text(url).await?)
    }

    async fn history(&self, request: &HistoryRequest) -> Result<Vec<Snapshot>, ClientError> {
        let url = self.endpoint("api/history", &request.query_pairs())?;
        decode_history(&self.get_text(url).await?)
    }
}

/// Decode an `/api/latest` body, where `null` means no data yet
pub fn decode_latest(body: &str) -> Result<Option<Snapshot>, ClientError> {
    Ok(serde_json::from_str(body)?)
}

/// Decode an `/api/history` body
pub fn decode_history(body: &str) -> Result<Vec<Snapshot>, ClientError> {
    Ok(serde_json::from_str(body)?)
}
