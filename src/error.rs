//! Error types for the extraction pipeline.
//!
//! Errors are split by blast radius: a `DocumentError` fails one document, a
//! `ProviderError` only advances the provider chain, and a `SinkError` is a
//! batch-level concern handled by the orchestrator. Only a `BatchError`
//! stops a batch.

use std::path::PathBuf;

/// Failure of a single text extraction provider attempt.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("provider returned no text")]
    NoText,

    #[error("{0}")]
    Unknown(String),
}

impl ProviderError {
    /// Short stable label used in logs and failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "auth",
            ProviderError::Quota(_) => "quota",
            ProviderError::MalformedInput(_) => "malformed-input",
            ProviderError::Network(_) => "network",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::NotConfigured(_) => "not-configured",
            ProviderError::NoText => "no-text",
            ProviderError::Unknown(_) => "unknown",
        }
    }

    /// Classify an HTTP status returned by a remote provider.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            401 | 403 => ProviderError::Auth(detail),
            429 => ProviderError::Quota(detail),
            400 | 413 | 415 | 422 => ProviderError::MalformedInput(detail),
            500..=599 => ProviderError::Network(detail),
            _ => ProviderError::Unknown(detail),
        }
    }

    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout_secs)
        } else if err.is_connect() || err.is_request() {
            ProviderError::Network(err.to_string())
        } else if err.is_decode() {
            ProviderError::MalformedInput(format!("unreadable response: {}", err))
        } else {
            ProviderError::Unknown(err.to_string())
        }
    }
}

/// Input error that is fatal for one document but never for the batch.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    #[error("unreadable PDF {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },

    #[error("PDF has no pages: {0}")]
    NoPages(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Page image could not be decoded or processed.
#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("empty page image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

/// Failure delivering records to a destination.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink authorization failed: {0}")]
    Auth(String),

    #[error("sink quota exceeded: {0}")]
    Quota(String),

    #[error("sink API error: {0}")]
    Api(String),

    #[error("sink network error: {0}")]
    Network(String),

    #[error("sink not configured: {0}")]
    NotConfigured(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl SinkError {
    /// Authorization and quota failures are propagated instead of being
    /// reported as a rejected write.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SinkError::Auth(_) | SinkError::Quota(_))
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, truncate(body, 200));
        match status {
            401 | 403 => SinkError::Auth(detail),
            429 => SinkError::Quota(detail),
            _ => SinkError::Api(detail),
        }
    }
}

impl From<reqwest::Error> for SinkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            SinkError::Network(err.to_string())
        } else {
            SinkError::Api(err.to_string())
        }
    }
}

/// Google credentials could not be loaded or exchanged for a token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("cannot load service account key {path}: {reason}")]
    KeyFile { path: PathBuf, reason: String },

    #[error("token request failed: {0}")]
    Token(String),
}

impl From<AuthError> for ProviderError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeyFile { .. } => ProviderError::NotConfigured(err.to_string()),
            AuthError::Token(_) => ProviderError::Auth(err.to_string()),
        }
    }
}

impl From<AuthError> for SinkError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::KeyFile { .. } => SinkError::NotConfigured(err.to_string()),
            AuthError::Token(_) => SinkError::Auth(err.to_string()),
        }
    }
}

/// Failure that stops a whole batch.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("input folder not found: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to list input folder: {0}")]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_provider_kinds() {
        assert_eq!(ProviderError::from_status(401, "").kind(), "auth");
        assert_eq!(ProviderError::from_status(403, "denied").kind(), "auth");
        assert_eq!(ProviderError::from_status(429, "slow down").kind(), "quota");
        assert_eq!(ProviderError::from_status(400, "bad pdf").kind(), "malformed-input");
        assert_eq!(ProviderError::from_status(503, "").kind(), "network");
        assert_eq!(ProviderError::from_status(302, "").kind(), "unknown");
    }

    #[test]
    fn only_auth_and_quota_sink_errors_are_fatal() {
        assert!(SinkError::from_status(401, "").is_fatal());
        assert!(SinkError::from_status(429, "").is_fatal());
        assert!(!SinkError::from_status(500, "").is_fatal());
        assert!(!SinkError::NotConfigured("no token".into()).is_fatal());
    }

    #[test]
    fn token_failures_are_fatal_for_sinks() {
        let err: SinkError = AuthError::Token("invalid_grant".into()).into();
        assert!(err.is_fatal());

        let err: ProviderError = AuthError::KeyFile {
            path: PathBuf::from("key.json"),
            reason: "missing".into(),
        }
        .into();
        assert_eq!(err.kind(), "not-configured");
    }

    #[test]
    fn status_detail_is_truncated() {
        let body = "x".repeat(1000);
        let err = ProviderError::from_status(400, &body);
        assert!(err.to_string().len() < 300);
    }
}
