use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    // One-time authorization code and optional pre-seeded tokens
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,

    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    // Timing
    #[serde(default = "default_poll_interval")]
    pub poll_interval_sec: u64,
    #[serde(default = "default_refresh_retry")]
    pub refresh_retry_sec: u64,
    /// Percentage of the server-declared token lifetime to wait before
    /// refreshing. 100 waits the full lifetime.
    #[serde(default = "default_refresh_margin_pct")]
    pub refresh_margin_pct: u8,
    #[serde(default = "default_http_timeout")]
    pub http_timeout_sec: u64,

    #[serde(default = "default_auth_base")]
    pub auth_base: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_redirect_uri() -> String { "http://127.0.0.1:8888/".into() }
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playback-history")
        .join("playback-history.db")
}
fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playback-history")
        .join("logs")
}
fn default_poll_interval() -> u64 { 60 }
fn default_refresh_retry() -> u64 { 10 }
fn default_refresh_margin_pct() -> u8 { 100 }
fn default_http_timeout() -> u64 { 10 }
fn default_auth_base() -> String { "https://accounts.spotify.com".into() }
fn default_api_base() -> String { "https://api.spotify.com/v1".into() }

fn default_scopes() -> Vec<String> {
    vec![
        "user-read-recently-played",
        "user-read-playback-state",
        "user-read-currently-playing",
        "playlist-read-private",
        "playlist-read-collaborative",
        "user-library-read",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            access_code: None,
            access_token: None,
            refresh_token: None,
            db_path: default_db_path(),
            log_dir: default_log_dir(),
            poll_interval_sec: default_poll_interval(),
            refresh_retry_sec: default_refresh_retry(),
            refresh_margin_pct: default_refresh_margin_pct(),
            http_timeout_sec: default_http_timeout(),
            auth_base: default_auth_base(),
            api_base: default_api_base(),
            scopes: default_scopes(),
        }
    }
}

impl Config {
    pub fn from_path(path: &std::path::Path) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        let mut cfg: Config = toml::from_str(&s)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Build a config from defaults and `SPOTIFY_*` environment variables only.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// Overlay non-empty `SPOTIFY_*` environment variables on top of the
    /// values loaded from file.
    pub fn apply_env_overrides(&mut self) {
        fn var(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.trim().is_empty())
        }
        if let Some(v) = var("SPOTIFY_CLIENT_ID") { self.client_id = v; }
        if let Some(v) = var("SPOTIFY_CLIENT_SECRET") { self.client_secret = v; }
        if let Some(v) = var("SPOTIFY_REDIRECT_URI") { self.redirect_uri = v; }
        if let Some(v) = var("SPOTIFY_ACCESS_CODE") { self.access_code = Some(v); }
        if let Some(v) = var("SPOTIFY_ACCESS_TOKEN") { self.access_token = Some(v); }
        if let Some(v) = var("SPOTIFY_REFRESH_TOKEN") { self.refresh_token = Some(v); }
    }

    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(anyhow!("client_id is not set"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(anyhow!("client_secret is not set"));
        }
        if self.poll_interval_sec == 0 {
            return Err(anyhow!("poll_interval_sec must be greater than zero"));
        }
        if self.refresh_retry_sec == 0 {
            return Err(anyhow!("refresh_retry_sec must be greater than zero"));
        }
        if !(1..=100).contains(&self.refresh_margin_pct) {
            return Err(anyhow!(
                "refresh_margin_pct must be between 1 and 100, got {}",
                self.refresh_margin_pct
            ));
        }
        url::Url::parse(&self.redirect_uri)
            .map_err(|e| anyhow!("invalid redirect_uri {}: {}", self.redirect_uri, e))?;
        Ok(())
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poll_interval_sec)
    }

    pub fn refresh_retry(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_retry_sec)
    }
}
