use serde::{Deserialize, Serialize};

/// OAuth2 credential pair plus the lifetime the server declared for the
/// access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_seconds: i64,
}

impl Credential {
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
    }
}

/// Snapshot of what the remote account reports as currently playing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackObservation {
    pub is_playing: bool,
    /// None when the server reports playback without an item (ads, some
    /// podcast states).
    pub item_uri: Option<String>,
    pub timestamp_ms: i64,
    pub progress_ms: i64,
    pub device_id: String,
    pub is_shuffling: bool,
    pub context_uri: Option<String>,
}

/// One persisted row of the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackEvent {
    pub song_uri: String,
    pub play_time_ms: i64,
    pub progress_ms: i64,
    pub device: String,
    pub is_shuffling: bool,
    pub context_uri: String,
}

/// Result of classifying a single poll response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Server returned nothing; usually unchanged since the last call.
    NoChange,
    NotPlaying,
    Playing(PlaybackEvent),
    /// A response shape the classifier does not know how to record.
    Unrecognized(String),
}
