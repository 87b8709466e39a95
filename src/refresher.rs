use crate::api::PlaybackApi;
use crate::credentials::CredentialStore;
use crate::db;
use crate::scheduler::{wait_or_shutdown, Scheduler};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub const PROVIDER: &str = "spotify";

/// Longest wait between refreshes, whatever lifetime the server declares.
pub const MAX_REFRESH_DELAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Delay before the next refresh given the server-declared lifetime.
/// `margin_pct` of 100 waits the full lifetime. Returns None for a
/// non-positive lifetime; the result is clamped to 1s..=MAX_REFRESH_DELAY.
pub fn next_refresh_delay(expires_in_seconds: i64, margin_pct: u8) -> Option<Duration> {
    if expires_in_seconds <= 0 {
        return None;
    }
    let pct = u128::from(margin_pct.clamp(1, 100));
    let secs = (expires_in_seconds as u128) * pct / 100;
    let secs = secs.clamp(1, u128::from(MAX_REFRESH_DELAY.as_secs())) as u64;
    Some(Duration::from_secs(secs))
}

/// Self-rescheduling task that keeps the access token in the credential
/// store valid for the lifetime of the process.
pub struct TokenRefresher {
    api: Arc<dyn PlaybackApi>,
    store: Arc<CredentialStore>,
    scheduler: Arc<dyn Scheduler>,
    retry_delay: Duration,
    margin_pct: u8,
    db_path: Option<PathBuf>,
}

impl TokenRefresher {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        store: Arc<CredentialStore>,
        scheduler: Arc<dyn Scheduler>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            api,
            store,
            scheduler,
            retry_delay,
            margin_pct: 100,
            db_path: None,
        }
    }

    pub fn with_margin_pct(mut self, margin_pct: u8) -> Self {
        self.margin_pct = margin_pct;
        self
    }

    /// Persist every refreshed credential to the database at `path`.
    pub fn with_persistence(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }

    /// Perform one refresh and return how long to wait before the next one.
    /// Never fails: on error the store is left untouched and the retry delay
    /// is returned.
    pub async fn refresh_once(&self) -> Duration {
        let current = match self.store.get().await {
            Some(c) if !c.refresh_token.is_empty() => c,
            _ => {
                warn!("No refresh token available; retrying in {:?}", self.retry_delay);
                return self.retry_delay;
            }
        };

        match self.api.refresh_access_token(&current.refresh_token).await {
            Ok(fresh) if fresh.is_usable() => {
                let delay = match next_refresh_delay(fresh.expires_in_seconds, self.margin_pct) {
                    Some(d) => d,
                    None => {
                        error!(
                            "Refresh returned a non-positive lifetime ({}s); keeping the current token. Trying again in {:?}",
                            fresh.expires_in_seconds, self.retry_delay
                        );
                        return self.retry_delay;
                    }
                };
                if fresh.refresh_token != current.refresh_token {
                    debug!("Server issued a new refresh token");
                }
                self.store.set(fresh.clone()).await;
                info!(
                    "Refreshed access token (expires in {}s); next refresh in {:?}",
                    fresh.expires_in_seconds, delay
                );
                if let Some(path) = &self.db_path {
                    if let Err(e) = persist_credential(path.clone(), fresh).await {
                        warn!("Failed to persist refreshed credential: {:#}", e);
                    }
                }
                delay
            }
            Ok(_) => {
                error!(
                    "Refresh returned an empty access token. Trying again in {:?}",
                    self.retry_delay
                );
                self.retry_delay
            }
            Err(e) => {
                error!(
                    kind = e.kind(),
                    "Couldn't refresh access token: {}. Trying again in {:?}",
                    e,
                    self.retry_delay
                );
                self.retry_delay
            }
        }
    }

    /// Wait `initial_delay`, refresh, and keep rescheduling until shutdown.
    pub async fn run(self, initial_delay: Duration, mut shutdown: watch::Receiver<bool>) {
        info!("Token refresher started; first refresh in {:?}", initial_delay);
        let mut delay = initial_delay;
        while wait_or_shutdown(self.scheduler.as_ref(), delay, &mut shutdown).await {
            delay = self.refresh_once().await;
        }
        info!("Token refresher stopped");
    }
}

async fn persist_credential(path: PathBuf, credential: crate::models::Credential) -> Result<()> {
    tokio::task::spawn_blocking(move || -> Result<()> {
        let conn = rusqlite::Connection::open(path)?;
        db::save_credential(&conn, PROVIDER, &credential)?;
        Ok(())
    })
    .await??;
    Ok(())
}
