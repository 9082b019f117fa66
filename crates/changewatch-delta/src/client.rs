//! Delta feed client for the Microsoft Graph drive API
//!
//! Shares the bearer-token caching shape of the docs client: a read-mostly
//! token slot that the owner refreshes out of band. Requests are never
//! retried here; a failed fetch is reported to the caller, which retries on
//! its own schedule with the unchanged cursor.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::FeedError;
use crate::types::{DeltaEntry, DeltaPage, DeltaResponseBody, SyncCursor};

pub const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Maximum number of `@odata.nextLink` pages followed in one fetch (safety guard).
const MAX_PAGES: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Cap on the server-provided Retry-After we report upwards.
const RETRY_AFTER_CAP: Duration = Duration::from_secs(300);

/// A cursor-based change feed for one remote folder.
///
/// `fetch(None)` returns a full snapshot of the folder; `fetch(Some(c))`
/// returns only what changed since `c`. Both return the cursor to use next.
#[async_trait]
pub trait DeltaFeed: Send + Sync {
    /// Human-readable folder reference, for logs.
    fn folder(&self) -> &str;

    async fn fetch(&self, cursor: Option<&SyncCursor>) -> Result<DeltaPage, FeedError>;
}

/// Graph API client bound to a single tracked folder.
pub struct GraphDeltaClient {
    base_url: String,
    folder: String,
    drive_user: Option<String>,
    http: reqwest::Client,
    token: Arc<RwLock<Option<String>>>,
}

impl GraphDeltaClient {
    /// Create a client for `folder` (a path relative to the drive root).
    ///
    /// With `drive_user` set, the folder is resolved in that user's drive
    /// (`/users/{user}/drive`); otherwise in the signed-in user's (`/me/drive`).
    pub fn new(folder: impl Into<String>, drive_user: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: GRAPH_BASE_URL.to_string(),
            folder: folder.into().trim_matches('/').to_string(),
            drive_user,
            http,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Point the client at a different API root (sovereign clouds, tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Install or replace the bearer token used for every request.
    pub async fn set_access_token(&self, token: impl Into<String>) {
        *self.token.write().await = Some(token.into());
    }

    /// Drop the current token, e.g. after the feed rejected it.
    pub async fn clear_access_token(&self) {
        *self.token.write().await = None;
    }

    async fn access_token(&self) -> Result<String, FeedError> {
        self.token.read().await.clone().ok_or(FeedError::MissingToken)
    }

    fn drive_root(&self) -> String {
        match &self.drive_user {
            Some(user) => format!("{}/users/{user}/drive", self.base_url),
            None => format!("{}/me/drive", self.base_url),
        }
    }

    /// Initial delta URL for the tracked folder (no cursor).
    pub fn delta_url(&self) -> String {
        format!("{}/root:/{}:/delta", self.drive_root(), self.folder)
    }

    fn upload_url(&self, file_name: &str) -> String {
        format!(
            "{}/root:/{}/{}:/content",
            self.drive_root(),
            self.folder,
            file_name
        )
    }

    /// PUT a file into the tracked folder. Single attempt.
    pub async fn upload(&self, file_name: &str, content: Vec<u8>) -> Result<(), FeedError> {
        let token = self.access_token().await?;
        let url = self.upload_url(file_name);
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await?;
        check_status(resp, &url).await.map(|_| ())
    }

    async fn fetch_page(&self, url: &str, token: &str) -> Result<DeltaResponseBody, FeedError> {
        let resp = self.http.get(url).bearer_auth(token).send().await?;
        let resp = check_status(resp, url).await?;
        let text = resp.text().await?;
        serde_json::from_str::<DeltaResponseBody>(&text)
            .map_err(|e| FeedError::malformed(format!("invalid delta body: {e}")))
    }
}

/// Map non-success statuses onto the feed error taxonomy.
async fn check_status(resp: reqwest::Response, url: &str) -> Result<reqwest::Response, FeedError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    match status.as_u16() {
        401 | 403 => Err(FeedError::Unauthorized {
            status: status.as_u16(),
        }),
        404 => Err(FeedError::NotFound {
            resource: url.to_string(),
        }),
        429 => {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            Err(FeedError::RateLimited { retry_after })
        }
        code => {
            let body = resp.text().await.unwrap_or_default();
            Err(FeedError::Status { status: code, body })
        }
    }
}

/// Seconds from a Retry-After header, clamped to `RETRY_AFTER_CAP`.
///
/// Non-finite values are discarded and the rest clamped before conversion;
/// `Duration::from_secs_f64` panics on overflow and on negative input.
fn parse_retry_after(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .map(|secs| {
            if secs <= 0.0 {
                Duration::ZERO
            } else {
                Duration::from_secs_f64(secs.min(RETRY_AFTER_CAP.as_secs_f64()))
            }
        })
}

#[async_trait]
impl DeltaFeed for GraphDeltaClient {
    fn folder(&self) -> &str {
        &self.folder
    }

    async fn fetch(&self, cursor: Option<&SyncCursor>) -> Result<DeltaPage, FeedError> {
        let token = self.access_token().await?;
        let mut url = match cursor {
            Some(c) => c.as_str().to_string(),
            None => self.delta_url(),
        };
        let mut entries: Vec<DeltaEntry> = Vec::new();

        for page in 0..MAX_PAGES {
            let body = self.fetch_page(&url, &token).await?;
            debug!(page, entries = body.value.len(), "delta page received");
            entries.extend(body.value);

            if let Some(delta_link) = body.delta_link {
                return Ok(DeltaPage {
                    entries,
                    next_cursor: SyncCursor::new(delta_link),
                });
            }
            match body.next_link {
                Some(next) => url = next,
                None => {
                    return Err(FeedError::malformed(
                        "response carries neither @odata.nextLink nor @odata.deltaLink",
                    ))
                }
            }
        }

        Err(FeedError::malformed(format!(
            "no @odata.deltaLink after {MAX_PAGES} pages"
        )))
    }
}
