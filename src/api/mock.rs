use super::{ApiError, PlaybackApi};
use crate::models::{Credential, PlaybackObservation};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

/// Scripted stand-in for the remote service, used in tests.
///
/// Each call pops the next queued response for that operation. An empty
/// playback queue answers "no content"; an empty token queue answers with an
/// auth error. Every token passed in is recorded so tests can check which
/// credential was used.
#[derive(Default)]
pub struct MockApi {
    playback: Mutex<VecDeque<Result<Option<PlaybackObservation>, ApiError>>>,
    refreshes: Mutex<VecDeque<Result<Credential, ApiError>>>,
    exchanges: Mutex<VecDeque<Result<Credential, ApiError>>>,
    seen_access_tokens: Mutex<Vec<String>>,
    seen_refresh_tokens: Mutex<Vec<String>>,
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_playback(&self, r: Result<Option<PlaybackObservation>, ApiError>) {
        lock(&self.playback).push_back(r);
    }

    pub fn push_refresh(&self, r: Result<Credential, ApiError>) {
        lock(&self.refreshes).push_back(r);
    }

    pub fn push_exchange(&self, r: Result<Credential, ApiError>) {
        lock(&self.exchanges).push_back(r);
    }

    pub fn seen_access_tokens(&self) -> Vec<String> {
        lock(&self.seen_access_tokens).clone()
    }

    pub fn seen_refresh_tokens(&self) -> Vec<String> {
        lock(&self.seen_refresh_tokens).clone()
    }
}

#[async_trait]
impl PlaybackApi for MockApi {
    async fn current_playback(&self, access_token: &str) -> Result<Option<PlaybackObservation>, ApiError> {
        lock(&self.seen_access_tokens).push(access_token.to_string());
        lock(&self.playback).pop_front().unwrap_or(Ok(None))
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<Credential, ApiError> {
        info!("MockApi: refresh_access_token");
        lock(&self.seen_refresh_tokens).push(refresh_token.to_string());
        lock(&self.refreshes)
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Auth("no scripted refresh".into())))
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Credential, ApiError> {
        info!("MockApi: exchange_authorization_code ({} chars)", code.len());
        lock(&self.exchanges)
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Auth("no scripted exchange".into())))
    }

    fn authorization_url(&self, scopes: &[String]) -> Result<url::Url, ApiError> {
        let mut url = url::Url::parse("https://mock.invalid/authorize")
            .map_err(|e| ApiError::Malformed(e.to_string()))?;
        url.query_pairs_mut().append_pair("scope", &scopes.join(" "));
        Ok(url)
    }
}
