use thiserror::Error;

use crate::app::config::ConfigError;
use crate::player::TrackId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a REPL command can fail with. None of these end the session.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("playback failed for track {track}: {cause}")]
    Playback { track: TrackId, cause: String },

    #[error("no results for {0}")]
    NoResults(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("library storage: {0}")]
    Storage(#[from] std::io::Error),

    #[error("library file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("the player controller has shut down")]
    ControllerGone,
}
