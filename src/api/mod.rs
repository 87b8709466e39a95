pub mod mock;
pub mod spotify;

use crate::models::{Credential, PlaybackObservation};

/// Failure of a call to the remote service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server rejected the credential or the request.
    #[error("authorization error: {0}")]
    Auth(String),
    /// Network failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server answered with something we could not parse.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(_) => "auth",
            ApiError::Transport(_) => "transport",
            ApiError::Malformed(_) => "malformed",
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Malformed(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

/// The remote operations the agent depends on.
/// Implementations: spotify::SpotifyClient, mock::MockApi.
#[async_trait::async_trait]
pub trait PlaybackApi: Send + Sync {
    /// Current playback state, or None when the server returned no content.
    async fn current_playback(&self, access_token: &str) -> Result<Option<PlaybackObservation>, ApiError>;

    /// Exchange a refresh token for a new credential. If the server does not
    /// reissue a refresh token, the returned credential carries the old one.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<Credential, ApiError>;

    /// Exchange a one-time authorization code for the first credential pair.
    async fn exchange_authorization_code(&self, code: &str) -> Result<Credential, ApiError>;

    /// URL the user opens in a browser to grant access.
    fn authorization_url(&self, scopes: &[String]) -> Result<url::Url, ApiError>;
}
