#![allow(dead_code)]

use playback_history_agent::models::{Credential, PlaybackObservation};
use playback_history_agent::scheduler::Scheduler;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

/// Scheduler that records every requested delay, sleeps only a millisecond,
/// and optionally signals shutdown after a fixed number of sleeps.
pub struct RecordingScheduler {
    delays: Mutex<Vec<Duration>>,
    stop_after: Option<usize>,
    shutdown: Option<watch::Sender<bool>>,
}

impl RecordingScheduler {
    pub fn unbounded() -> Self {
        Self { delays: Mutex::new(Vec::new()), stop_after: None, shutdown: None }
    }

    pub fn stopping_after(n: usize, shutdown: watch::Sender<bool>) -> Self {
        Self { delays: Mutex::new(Vec::new()), stop_after: Some(n), shutdown: Some(shutdown) }
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Scheduler for RecordingScheduler {
    async fn sleep(&self, delay: Duration) {
        let count = {
            let mut d = self.delays.lock().unwrap();
            d.push(delay);
            d.len()
        };
        if let (Some(limit), Some(tx)) = (self.stop_after, &self.shutdown) {
            if count >= limit {
                let _ = tx.send(true);
            }
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn credential(access: &str, refresh: &str, expires_in: i64) -> Credential {
    Credential {
        access_token: access.into(),
        refresh_token: refresh.into(),
        expires_in_seconds: expires_in,
    }
}

pub fn playing_observation() -> PlaybackObservation {
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
