//! Track metadata lookups.
//!
//! [`Catalog`] is the seam between the player and SoundCloud: everything
//! behind it speaks raw API JSON, everything in front of it sees normalized
//! [`Track`]s.

pub mod client_id;
pub mod soundcloud;

use futures::future::BoxFuture;

use crate::error::Result;
use crate::player::{Track, TrackId};

pub use soundcloud::SoundCloudClient;

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub tracks: Vec<Track>,
    /// Opaque cursor for [`Catalog::next_page`].
    pub next_href: Option<String>,
}

pub trait Catalog: Send + Sync {
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxFuture<'a, Result<SearchPage>>;

    fn next_page<'a>(&'a self, href: &'a str) -> BoxFuture<'a, Result<SearchPage>>;

    fn track<'a>(&'a self, id: &'a TrackId) -> BoxFuture<'a, Result<Track>>;

    /// Batch lookup. Results follow the order of `ids`; unknown or
    /// unplayable ids are left out.
    fn tracks<'a>(&'a self, ids: &'a [TrackId]) -> BoxFuture<'a, Result<Vec<Track>>>;

    /// Resolves a soundcloud.com track URL.
    fn resolve<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Track>>;

    fn related<'a>(&'a self, id: &'a TrackId, limit: usize) -> BoxFuture<'a, Result<Vec<Track>>>;
}

/// A user-typed reference to a single track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRef {
    Id(TrackId),
    Url(String),
}

impl TrackRef {
    /// Numeric ids and soundcloud.com URLs; anything else is not a track
    /// reference (and is usually a search query).
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            return Some(Self::Id(TrackId::from(input)));
        }

        let rest = input
            .strip_prefix("https://")
            .or_else(|| input.strip_prefix("http://"))?;
        let host = rest.split('/').next().unwrap_or_default();
        let is_soundcloud = host == "soundcloud.com" || host.ends_with(".soundcloud.com");
        let has_path = rest.len() > host.len() + 1;

        (is_soundcloud && has_path).then(|| Self::Url(input.to_string()))
    }

    pub async fn lookup(&self, catalog: &dyn Catalog) -> Result<Track> {
        match self {
            Self::Id(id) => catalog.track(id).await,
            Self::Url(url) => catalog.resolve(url).await,
        }
    }
}
