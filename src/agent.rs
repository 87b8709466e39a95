use crate::api::spotify::SpotifyClient;
use crate::api::PlaybackApi;
use crate::config::Config;
use crate::credentials::CredentialStore;
use crate::db;
use crate::models::Credential;
use crate::poller::StatePoller;
use crate::refresher::{next_refresh_delay, TokenRefresher, PROVIDER};
use crate::scheduler::{Scheduler, TokioScheduler};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Where startup left us.
#[derive(Debug)]
pub enum Bootstrap {
    /// A credential is available; refresh it after `initial_refresh_delay`.
    Ready {
        credential: Credential,
        initial_refresh_delay: Duration,
    },
    /// Nothing to authorize with. The user must open this URL and come back
    /// with a code.
    NeedsAuthorization(url::Url),
}

/// Resolve the starting credential.
///
/// Precedence: a one-time authorization code, then a credential stored by an
/// earlier run, then tokens from config/environment. A code that fails to
/// exchange (usually one that was already used) falls through to the others
/// and only aborts startup when nothing else is available. A stored or
/// pre-seeded credential has an unknown remaining lifetime, so it is
/// refreshed right away; a freshly exchanged one is refreshed when it expires.
pub async fn bootstrap_credential(
    cfg: &Config,
    api: &dyn PlaybackApi,
    conn: &Connection,
) -> Result<Bootstrap> {
    let mut exchange_error = None;
    if let Some(code) = cfg.access_code.as_deref().filter(|c| !c.trim().is_empty()) {
        match exchange_and_store(api, conn, code.trim()).await {
            Ok(credential) => {
                let delay = next_refresh_delay(credential.expires_in_seconds, cfg.refresh_margin_pct)
                    .unwrap_or_else(|| cfg.refresh_retry());
                return Ok(Bootstrap::Ready {
                    credential,
                    initial_refresh_delay: delay,
                });
            }
            Err(e) => {
                warn!("Configured authorization code was not accepted: {:#}", e);
                exchange_error = Some(e);
            }
        }
    }

    let access = cfg.access_token.clone().unwrap_or_default();
    let refresh = cfg.refresh_token.clone().unwrap_or_default();
    let preseeded = !access.is_empty() || !refresh.is_empty();

    if let Some(stored) = db::load_credential(conn, PROVIDER)? {
        if preseeded {
            warn!("Ignoring configured tokens in favour of the credential stored in {}", cfg.db_path.display());
        }
        info!("Using credential stored in {}", cfg.db_path.display());
        return Ok(Bootstrap::Ready {
            credential: stored,
            initial_refresh_delay: Duration::ZERO,
        });
    }

    if preseeded {
        info!("Using pre-seeded tokens from configuration");
        return Ok(Bootstrap::Ready {
            credential: Credential {
                access_token: access,
                refresh_token: refresh,
                expires_in_seconds: 0,
            },
            initial_refresh_delay: Duration::ZERO,
        });
    }

    if let Some(e) = exchange_error {
        return Err(e);
    }

    let url = api.authorization_url(&cfg.scopes)?;
    Ok(Bootstrap::NeedsAuthorization(url))
}

/// Exchange an authorization code and persist the resulting credential.
pub async fn exchange_and_store(api: &dyn PlaybackApi, conn: &Connection, code: &str) -> Result<Credential> {
    let credential = api
        .exchange_authorization_code(code)
        .await
        .context("couldn't request tokens with the authorization code")?;
    db::save_credential(conn, PROVIDER, &credential)?;
    info!(
        "Received access and refresh tokens; access token expires in {}s",
        credential.expires_in_seconds
    );
    Ok(credential)
}

/// Run the token refresher and the state poller until `shutdown` flips to
/// true. The two tasks share nothing but the credential store.
pub async fn run_tasks(
    cfg: &Config,
    api: Arc<dyn PlaybackApi>,
    scheduler: Arc<dyn Scheduler>,
    credential: Credential,
    initial_refresh_delay: Duration,
    shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let store = Arc::new(CredentialStore::with_credential(credential));

    let refresher = TokenRefresher::new(api.clone(), store.clone(), scheduler.clone(), cfg.refresh_retry())
        .with_margin_pct(cfg.refresh_margin_pct)
        .with_persistence(cfg.db_path.clone());
    let poller = StatePoller::new(api, store, scheduler, cfg.poll_interval(), cfg.db_path.clone());

    let refresh_task = tokio::spawn(refresher.run(initial_refresh_delay, shutdown.clone()));
    let poll_task = tokio::spawn(poller.run(shutdown));

    let (r, p) = tokio::join!(refresh_task, poll_task);
    r.context("token refresher task panicked")?;
    p.context("state poller task panicked")?;
    Ok(())
}

/// Long-running entry point used by the CLI `run` command.
pub async fn run_agent(cfg: &Config) -> Result<()> {
    cfg.validate()?;

    // Without a sink there is nothing to poll for, so schema failures are fatal.
    let conn = db::open_or_create(&cfg.db_path)
        .with_context(|| format!("preparing event log at {}", cfg.db_path.display()))?;
    info!("Event log ready at {}", cfg.db_path.display());

    let api: Arc<dyn PlaybackApi> = Arc::new(SpotifyClient::new(cfg)?);
    let (credential, initial_delay) = match bootstrap_credential(cfg, api.as_ref(), &conn).await? {
        Bootstrap::Ready {
            credential,
            initial_refresh_delay,
        } => (credential, initial_refresh_delay),
        Bootstrap::NeedsAuthorization(url) => {
            println!("You need to get an access code. Open the following webpage: {}", url);
            return Ok(());
        }
    };
    drop(conn);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested; finishing in-flight work");
                let _ = tx.send(true);
            }
            // Dropping the sender leaves both tasks running until the process is killed.
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    run_tasks(cfg, api, Arc::new(TokioScheduler), credential, initial_delay, rx).await
}
