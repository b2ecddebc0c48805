use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque catalog identity of a track.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// A playable track, already normalized by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    pub duration_secs: u64,
    pub stream_uri: String,
    pub artwork_uri: Option<String>,
    pub permalink_url: Option<String>,
    pub genre: Option<String>,
}

impl Track {
    /// `m:ss`, or `h:mm:ss` for long mixes
    pub fn duration_label(&self) -> String {
        let hours = self.duration_secs / 3600;
        let minutes = (self.duration_secs % 3600) / 60;
        let seconds = self.duration_secs % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{}:{:02}", minutes, seconds)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl PlayerState {
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Stopped => "stopped",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Reported asynchronously by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// The stream was fetched and audio is coming out.
    Started(TrackId),
    /// The track played to the end.
    Finished(TrackId),
    /// Fetching or decoding failed.
    Failed(TrackId, String),
}

/// The transport interface of an audio backend 🎵
///
/// Every call returns as soon as the command is handed over; progress is
/// reported through [`EngineEvent`]s.
pub trait PlayerTrait: Send + Sync {
    fn play(&self, track: &TrackId, stream_uri: &str) -> Result<()>;
    fn pause(&self) -> Result<()>;
    fn resume(&self) -> Result<()>;
    fn stop(&self) -> Result<()>;
}
