use crate::models::{Credential, PlaybackEvent};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }
    }
    let conn = Connection::open(path)
        .with_context(|| format!("opening database {}", path.display()))?;
    ensure_schema(&conn)?;
    Ok(conn)
}

/// Create the event log and credential tables if they do not exist yet.
/// Safe to call on every startup.
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA).context("creating schema")?;
    Ok(())
}

/// Append one playback event. Every field is bound as a parameter.
pub fn append_event(conn: &Connection, event: &PlaybackEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO tracks (songUri, playTime, progress, device, isShuffling, contextUri) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.song_uri,
            event.play_time_ms,
            event.progress_ms,
            event.device,
            event.is_shuffling,
            event.context_uri
        ],
    )?;
    Ok(())
}

pub fn count_events(conn: &Connection) -> Result<i64> {
    let n = conn.query_row("SELECT COUNT(*) FROM tracks", [], |r| r.get(0))?;
    Ok(n)
}

/// Most recent events first, ordered by insertion.
pub fn recent_events(conn: &Connection, limit: usize) -> Result<Vec<PlaybackEvent>> {
    let mut stmt = conn.prepare(
        "SELECT songUri, playTime, progress, device, isShuffling, contextUri FROM tracks ORDER BY rowid DESC LIMIT ?1",
    )?;
    let rows = stmt.query_map(params![limit as i64], |r| {
        Ok(PlaybackEvent {
            song_uri: r.get(0)?,
            play_time_ms: r.get(1)?,
            progress_ms: r.get(2)?,
            device: r.get(3)?,
            is_shuffling: r.get(4)?,
            context_uri: r.get::<_, Option<String>>(5)?.unwrap_or_default(),
        })
    })?;
    let mut v = Vec::new();
    for r in rows {
        v.push(r?);
    }
    Ok(v)
}

/// Save the credential for a provider, replacing any previous one.
pub fn save_credential(conn: &Connection, provider: &str, credential: &Credential) -> Result<()> {
    let json_blob = serde_json::to_string(credential)?;
    conn.execute(
        "INSERT INTO credentials (provider, token_json, last_refreshed) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(provider) DO UPDATE SET token_json = excluded.token_json, last_refreshed = strftime('%s','now')",
        params![provider, json_blob],
    )?;
    Ok(())
}

pub fn load_credential(conn: &Connection, provider: &str) -> Result<Option<Credential>> {
    let mut stmt = conn.prepare("SELECT token_json FROM credentials WHERE provider = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![provider], |r| r.get::<_, String>(0))
        .optional()?;
    match row {
        Some(s) => {
            let cred: Credential = serde_json::from_str(&s)
                .with_context(|| format!("parsing stored credential for {}", provider))?;
            Ok(Some(cred))
        }
        None => Ok(None),
    }
}
