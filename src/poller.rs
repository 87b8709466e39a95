use crate::api::PlaybackApi;
use crate::credentials::CredentialStore;
use crate::db;
use crate::models::{PlaybackEvent, PlaybackObservation, PollOutcome};
use crate::scheduler::{wait_or_shutdown, Scheduler};
use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Decide what a playback response means for the event log.
pub fn classify(observation: Option<PlaybackObservation>) -> PollOutcome {
    let obs = match observation {
        None => return PollOutcome::NoChange,
        Some(o) => o,
    };
    if !obs.is_playing {
        return PollOutcome::NotPlaying;
    }
    let song_uri = match obs.item_uri {
        // Playing without an item (e.g. an ad break) has nothing to record.
        None => return PollOutcome::NotPlaying,
        Some(uri) => uri,
    };
    if song_uri.trim().is_empty() {
        return PollOutcome::Unrecognized("playing item has an empty uri".into());
    }
    PollOutcome::Playing(PlaybackEvent {
        song_uri,
        play_time_ms: obs.timestamp_ms,
        progress_ms: obs.progress_ms,
        device: obs.device_id,
        is_shuffling: obs.is_shuffling,
        context_uri: obs.context_uri.unwrap_or_default(),
    })
}

/// Fixed-delay task that records what is currently playing.
pub struct StatePoller {
    api: Arc<dyn PlaybackApi>,
    store: Arc<CredentialStore>,
    scheduler: Arc<dyn Scheduler>,
    interval: Duration,
    db_path: PathBuf,
}

impl StatePoller {
    pub fn new(
        api: Arc<dyn PlaybackApi>,
        store: Arc<CredentialStore>,
        scheduler: Arc<dyn Scheduler>,
        interval: Duration,
        db_path: PathBuf,
    ) -> Self {
        Self {
            api,
            store,
            scheduler,
            interval,
            db_path,
        }
    }

    /// One poll: query, classify and append on "playing".
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let token = self
            .store
            .access_token()
            .await
            .ok_or_else(|| anyhow!("no access token available yet"))?;
        let observation = self
            .api
            .current_playback(&token)
            .await
            .context("querying current playback")?;

        let outcome = classify(observation);
        match &outcome {
            PollOutcome::NoChange => debug!("No playback data, result probably didn't change"),
            PollOutcome::NotPlaying => debug!("Not playing"),
            PollOutcome::Unrecognized(reason) => {
                warn!("Unrecognized playback response, skipping: {}", reason)
            }
            PollOutcome::Playing(event) => {
                let db_path = self.db_path.clone();
                let ev = event.clone();
                tokio::task::spawn_blocking(move || -> Result<()> {
                    let conn = rusqlite::Connection::open(db_path)?;
                    db::append_event(&conn, &ev)?;
                    Ok(())
                })
                .await?
                .context("appending playback event")?;
                info!(
                    song = %event.song_uri,
                    context = %event.context_uri,
                    "Recorded playing track"
                );
            }
        }
        Ok(outcome)
    }

    /// A poll that never fails; errors are logged and the outcome dropped.
    pub async fn tick(&self) -> Option<PollOutcome> {
        match self.poll_once().await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!("Poll failed: {:#}", e);
                None
            }
        }
    }

    /// Poll immediately, then again `interval` after each poll completes,
    /// until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("State poller started (interval: {:?})", self.interval);
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.tick().await;
            if !wait_or_shutdown(self.scheduler.as_ref(), self.interval, &mut shutdown).await {
                break;
            }
        }
        info!("State poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> PlaybackObservation {
        PlaybackObservation {
            is_playing: true,
            item_uri: Some("spotify:track:abc".into()),
            timestamp_ms: 1000,
            progress_ms: 1500,
            device_id: "dev1".into(),
            is_shuffling: true,
            context_uri: Some("spotify:playlist:xyz".into()),
        }
    }

    #[test]
    fn absent_is_no_change() {
        assert_eq!(classify(None), PollOutcome::NoChange);
    }

    #[test]
    fn paused_is_not_playing() {
        let obs = PlaybackObservation { is_playing: false, ..playing() };
        assert_eq!(classify(Some(obs)), PollOutcome::NotPlaying);
    }

    #[test]
    fn playing_without_item_is_not_playing() {
        let obs = PlaybackObservation { item_uri: None, ..playing() };
        assert_eq!(classify(Some(obs)), PollOutcome::NotPlaying);
    }

    #[test]
    fn empty_item_uri_is_unrecognized() {
        let obs = PlaybackObservation { item_uri: Some("  ".into()), ..playing() };
        assert!(matches!(classify(Some(obs)), PollOutcome::Unrecognized(_)));
    }

    #[test]
    fn playing_copies_fields_verbatim() {
        let expected = PlaybackEvent {
            song_uri: "spotify:track:abc".into(),
            play_time_ms: 1000,
            progress_ms: 1500,
            device: "dev1".into(),
            is_shuffling: true,
            context_uri: "spotify:playlist:xyz".into(),
        };
        assert_eq!(classify(Some(playing())), PollOutcome::Playing(expected));
    }

    #[test]
    fn missing_context_becomes_empty_string() {
        let obs = PlaybackObservation { context_uri: None, ..playing() };
        match classify(Some(obs)) {
            PollOutcome::Playing(ev) => assert_eq!(ev.context_uri, ""),
            other => panic!("expected Playing, got {:?}", other),
        }
    }
}
