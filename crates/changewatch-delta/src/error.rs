//! Delta feed error taxonomy

use std::time::Duration;

/// Coarse classification the caller uses to decide between retrying on the
/// next tick and asking the operator to re-authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedErrorKind {
    /// Network trouble, throttling, server errors or a malformed payload.
    Transient,
    /// The access token is missing, expired or lacks permission.
    Unauthorized,
    /// The tracked folder (or the cursor's folder) no longer exists.
    NotFound,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("delta feed rejected the access token (status {status})")]
    Unauthorized { status: u16 },

    #[error("no access token available for the delta feed")]
    MissingToken,

    #[error("delta feed resource not found: {resource}")]
    NotFound { resource: String },

    #[error("delta feed rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    #[error("delta feed request failed: status={status}, body={body}")]
    Status { status: u16, body: String },

    #[error("delta feed transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed delta payload: {reason}")]
    Malformed { reason: String },
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    retry_after
        .map(|d| format!(", retry after {}s", d.as_secs()))
        .unwrap_or_default()
}

impl FeedError {
    pub fn kind(&self) -> FeedErrorKind {
        match self {
            Self::Unauthorized { .. } | Self::MissingToken => FeedErrorKind::Unauthorized,
            Self::NotFound { .. } => FeedErrorKind::NotFound,
            Self::RateLimited { .. }
            | Self::Status { .. }
            | Self::Transport(_)
            | Self::Malformed { .. } => FeedErrorKind::Transient,
        }
    }

    /// True when the caller should trigger re-authentication instead of
    /// simply waiting for the next tick.
    pub fn requires_reauth(&self) -> bool {
        self.kind() == FeedErrorKind::Unauthorized
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}
