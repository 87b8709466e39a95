use super::{ApiError, PlaybackApi};
use crate::config::Config;
use crate::models::{Credential, PlaybackObservation};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use log::{debug, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaybackResponse {
    #[serde(default)]
    is_playing: bool,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    progress_ms: Option<i64>,
    #[serde(default)]
    shuffle_state: bool,
    #[serde(default)]
    item: Option<UriObject>,
    #[serde(default)]
    context: Option<UriObject>,
    #[serde(default)]
    device: Option<DeviceObject>,
}

#[derive(Debug, Deserialize)]
struct UriObject {
    #[serde(default)]
    uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeviceObject {
    #[serde(default)]
    id: Option<String>,
}

/// Spotify Web API client for the playback and token endpoints.
/// Base URLs come from the config so tests can point them at a mock server.
pub struct SpotifyClient {
    client: Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    auth_base: String,
    api_base: String,
}

impl SpotifyClient {
    pub fn new(cfg: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.http_timeout_sec))
            .build()?;
        Ok(Self {
            client,
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            redirect_uri: cfg.redirect_uri.clone(),
            auth_base: cfg.auth_base.trim_end_matches('/').to_string(),
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn basic_auth_header(&self) -> String {
        format!(
            "Basic {}",
            general_purpose::STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret))
        )
    }

    async fn request_token(&self, params: &[(&str, &str)]) -> Result<TokenResponse, ApiError> {
        let url = format!("{}/api/token", self.auth_base);
        let resp = self
            .client
            .post(&url)
            .header(AUTHORIZATION, self.basic_auth_header())
            .form(params)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                ApiError::Transport(format!("token endpoint returned {} - {}", status, body))
            } else {
                ApiError::Auth(format!("token endpoint returned {} - {}", status, body))
            });
        }
        let body = resp.text().await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Malformed(format!("token response: {}", e)))
    }
}

#[async_trait]
impl PlaybackApi for SpotifyClient {
    async fn current_playback(&self, access_token: &str) -> Result<Option<PlaybackObservation>, ApiError> {
        let url = format!("{}/me/player", self.api_base);
        let resp = self
            .client
            .get(&url)
            .header(AUTHORIZATION, format!("Bearer {}", access_token))
            .send()
            .await?;
        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            debug!("Spotify playback returned 204 No Content");
            return Ok(None);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Auth(format!("playback request rejected: {} - {}", status, body)));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Transport(format!("playback request failed: {} - {}", status, body)));
        }
        let body = resp.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let pr: PlaybackResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Malformed(format!("playback response: {}", e)))?;
        Ok(Some(PlaybackObservation {
            is_playing: pr.is_playing,
            item_uri: pr.item.and_then(|i| i.uri),
            timestamp_ms: pr.timestamp,
            progress_ms: pr.progress_ms.unwrap_or(0),
            device_id: pr.device.and_then(|d| d.id).unwrap_or_default(),
            is_shuffling: pr.shuffle_state,
            context_uri: pr.context.and_then(|c| c.uri),
        }))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<Credential, ApiError> {
        let tr = self
            .request_token(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .await?;
        let expires_in = tr.expires_in.unwrap_or_else(|| {
            warn!("Spotify refresh response had no expires_in; assuming 3600");
            3600
        });
        Ok(Credential {
            access_token: tr.access_token,
            refresh_token: tr.refresh_token.unwrap_or_else(|| refresh_token.to_string()),
            expires_in_seconds: expires_in,
        })
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Credential, ApiError> {
        let tr = self
            .request_token(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
            ])
            .await?;
        let refresh_token = tr
            .refresh_token
            .ok_or_else(|| ApiError::Malformed("no refresh_token in code exchange".into()))?;
        Ok(Credential {
            access_token: tr.access_token,
            refresh_token,
            expires_in_seconds: tr.expires_in.unwrap_or(3600),
        })
    }

    fn authorization_url(&self, scopes: &[String]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}/authorize", self.auth_base))
            .map_err(|e| ApiError::Malformed(format!("auth base url: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &scopes.join(" "))
            .append_pair("redirect_uri", &self.redirect_uri);
        Ok(url)
    }
}
