use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use playback_history_agent as lib;
use lib::api::spotify::SpotifyClient;
use lib::api::PlaybackApi;
use lib::config::Config;
use std::path::{Path, PathBuf};
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "playback-history-agent", version)]
struct Cli {
    /// Path to config TOML. SPOTIFY_* environment variables override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent (long-running): refresh tokens and log playback
    Run,
    /// Print the authorization URL and exit
    AuthUrl,
    /// Exchange a one-time authorization code and store the tokens
    Authorize {
        /// The `code` query parameter from the redirect URL
        #[arg(long)]
        code: String,
    },
    /// Validate config and exit
    ConfigValidate,
    /// Print the most recently logged events
    Events {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(p) = explicit {
        return Config::from_path(p).with_context(|| format!("loading config from {}", p.display()));
    }
    let etc_path = Path::new("/etc/playback-history/config.toml");
    if etc_path.exists() {
        Config::from_path(etc_path).with_context(|| format!("loading config from {}", etc_path.display()))
    } else {
        Ok(Config::from_env())
    }
}

fn init_logging(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "playback-history.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer().with_ansi(false).with_writer(non_blocking);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer);

    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    if let Commands::ConfigValidate = cli.command {
        match cfg.validate() {
            Ok(()) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let _guard = init_logging(&cfg)?;

    match cli.command {
        Commands::Run => {
            lib::agent::run_agent(&cfg).await.context("running agent")?;
        }
        Commands::AuthUrl => {
            let client = SpotifyClient::new(&cfg)?;
            println!("Open the following webpage: {}", client.authorization_url(&cfg.scopes)?);
        }
        Commands::Authorize { code } => {
            cfg.validate()?;
            let client = SpotifyClient::new(&cfg)?;
            let conn = lib::db::open_or_create(&cfg.db_path)?;
            lib::agent::exchange_and_store(&client, &conn, code.trim()).await?;
            println!("Saved tokens to {}. You can now start the agent with `run`.", cfg.db_path.display());
        }
        Commands::Events { limit } => {
            let conn = lib::db::open_or_create(&cfg.db_path)?;
            let total = lib::db::count_events(&conn)?;
            println!("{} event(s) logged; showing up to {}:", total, limit);
            for ev in lib::db::recent_events(&conn, limit)? {
                let at = Utc
                    .timestamp_millis_opt(ev.play_time_ms)
                    .single()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| ev.play_time_ms.to_string());
                println!(
                    "- {} | at {} | progress {}ms | device {} | shuffle {} | context {}",
                    ev.song_uri, at, ev.progress_ms, ev.device, ev.is_shuffling, ev.context_uri
                );
            }
        }
        // Handled before logging setup.
        Commands::ConfigValidate => {}
    }

    Ok(())
}
