//! Bearer tokens for Google APIs (Sheets and Document AI).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use gcp_auth::{CustomServiceAccount, TokenProvider};

use crate::error::AuthError;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Where Google credentials come from.
#[derive(Clone, PartialEq, Eq)]
pub enum GoogleCredentials {
    /// Pre-minted OAuth access token, sent as is.
    AccessToken(String),
    /// Service-account key file; tokens are minted and refreshed on demand.
    ServiceAccountFile(PathBuf),
}

impl GoogleCredentials {
    /// An explicit access token wins over a key file.
    pub fn resolve(access_token: Option<String>, key_file: Option<PathBuf>) -> Option<Self> {
        match (access_token, key_file) {
            (Some(token), _) => Some(GoogleCredentials::AccessToken(token)),
            (None, Some(path)) => Some(GoogleCredentials::ServiceAccountFile(path)),
            (None, None) => None,
        }
    }
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoogleCredentials::AccessToken(_) => f.write_str("AccessToken(..)"),
            GoogleCredentials::ServiceAccountFile(path) => {
                f.debug_tuple("ServiceAccountFile").field(path).finish()
            }
        }
    }
}

#[derive(Clone)]
enum TokenSource {
    Static(String),
    ServiceAccount(Arc<CustomServiceAccount>),
}

/// Token source bound to one OAuth scope.
#[derive(Clone)]
pub struct GoogleAuth {
    source: TokenSource,
    scope: &'static str,
}

impl GoogleAuth {
    /// Loads the key file up front so a bad path fails at startup.
    pub fn new(credentials: &GoogleCredentials, scope: &'static str) -> Result<Self, AuthError> {
        let source = match credentials {
            GoogleCredentials::AccessToken(token) => TokenSource::Static(token.clone()),
            GoogleCredentials::ServiceAccountFile(path) => {
                let account = CustomServiceAccount::from_file(path).map_err(|e| AuthError::KeyFile {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
                TokenSource::ServiceAccount(Arc::new(account))
            }
        };
        Ok(Self { source, scope })
    }

    pub async fn bearer(&self) -> Result<String, AuthError> {
        match &self.source {
            TokenSource::Static(token) => Ok(token.clone()),
            TokenSource::ServiceAccount(account) => account
                .token(&[self.scope])
                .await
                .map(|token| token.as_str().to_string())
                .map_err(|e| AuthError::Token(e.to_string())),
        }
    }
}
