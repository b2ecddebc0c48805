//! SoundCloud api-v2 client.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{Catalog, SearchPage};
use crate::error::{Error, Result};
use crate::player::{Track, TrackId};

const API_URL: &str = "https://api-v2.soundcloud.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// api-v2 refuses longer `ids=` lists.
const MAX_IDS_PER_REQUEST: usize = 50;

#[derive(Debug, Deserialize)]
struct RawCollection {
    #[serde(default)]
    collection: Vec<RawTrack>,
    next_href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: u64,
    kind: Option<String>,
    title: Option<String>,
    /// milliseconds
    #[serde(default)]
    duration: u64,
    artwork_url: Option<String>,
    permalink_url: Option<String>,
    genre: Option<String>,
    user: Option<RawUser>,
    publisher_metadata: Option<RawPublisher>,
    media: Option<RawMedia>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    username: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPublisher {
    artist: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMedia {
    #[serde(default)]
    transcodings: Vec<RawTranscoding>,
}

#[derive(Debug, Deserialize)]
struct RawTranscoding {
    url: String,
    format: RawFormat,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    protocol: String,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn with_client_id(url: &str, client_id: &str) -> String {
    if url.contains("client_id=") {
        return url.to_string();
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}client_id={}", url, separator, client_id)
}

/// Turns a raw track into a [`Track`]. Tracks that cannot be downloaded in
/// one piece (HLS only, or snipped previews without media) yield `None`.
fn into_track(raw: RawTrack, client_id: &str) -> Option<Track> {
    let progressive = raw
        .media
        .as_ref()?
        .transcodings
        .iter()
        .find(|t| t.format.protocol == "progressive")?;
    let stream_uri = with_client_id(&progressive.url, client_id);

    let (username, avatar) = match raw.user {
        Some(user) => (non_empty(user.username), non_empty(user.avatar_url)),
        None => (None, None),
    };
    let artist = raw
        .publisher_metadata
        .and_then(|p| non_empty(p.artist))
        .or(username)
        .unwrap_or_else(|| "Unknown artist".to_string());
    let artwork_uri = non_empty(raw.artwork_url)
        .or(avatar)
        .map(|url| url.replace("-large", "-t500x500"));

    Some(Track {
        id: TrackId::from(raw.id),
        title: non_empty(raw.title).unwrap_or_else(|| "Untitled".to_string()),
        artist,
        duration_secs: raw.duration / 1000,
        stream_uri,
        artwork_uri,
        permalink_url: raw.permalink_url,
        genre: non_empty(raw.genre),
    })
}

fn check_status(status: StatusCode, what: &str) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else if status == StatusCode::NOT_FOUND {
        Err(Error::NotFound(what.to_string()))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        Err(Error::CatalogUnavailable(format!(
            "SoundCloud rejected the client id (HTTP {}); it may have expired, remove the cached client_id file and restart",
            status.as_u16()
        )))
    } else {
        Err(Error::CatalogUnavailable(format!(
            "SoundCloud answered HTTP {} for {}",
            status.as_u16(),
            what
        )))
    }
}

pub struct SoundCloudClient {
    http: Client,
    client_id: String,
}

impl SoundCloudClient {
    pub fn new(http: Client, client_id: impl Into<String>) -> Self {
        Self {
            http,
            client_id: client_id.into(),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        what: &str,
    ) -> Result<T> {
        let url = with_client_id(url, &self.client_id);
        debug!(%url, "GET");

        let response = self
            .http
            .get(&url)
            .query(query)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Error::CatalogUnavailable(e.to_string()))?;
        check_status(response.status(), what)?;

        response
            .json::<T>()
            .await
            .map_err(|e| Error::CatalogUnavailable(format!("unexpected response for {}: {}", what, e)))
    }

    fn into_page(&self, raw: RawCollection) -> SearchPage {
        SearchPage {
            tracks: self.normalize(raw.collection),
            next_href: raw.next_href,
        }
    }

    fn normalize(&self, raw: Vec<RawTrack>) -> Vec<Track> {
        let total = raw.len();
        let tracks: Vec<Track> = raw
            .into_iter()
            .filter_map(|t| into_track(t, &self.client_id))
            .collect();
        if tracks.len() < total {
            debug!(dropped = total - tracks.len(), "Dropped tracks without a progressive stream");
        }
        tracks
    }

    async fn search_tracks(&self, query: &str, limit: usize) -> Result<SearchPage> {
        let raw: RawCollection = self
            .get_json(
                &format!("{}/search/tracks", API_URL),
                &[
                    ("q", query.to_string()),
                    ("limit", limit.to_string()),
                    ("app_locale", "en".to_string()),
                ],
                &format!("search \"{}\"", query),
            )
            .await?;
        Ok(self.into_page(raw))
    }

    async fn fetch_page(&self, href: &str) -> Result<SearchPage> {
        let raw: RawCollection = self.get_json(href, &[], "next page").await?;
        Ok(self.into_page(raw))
    }

    async fn fetch_tracks(&self, ids: &[TrackId]) -> Result<Vec<Track>> {
        let mut found: HashMap<TrackId, Track> = HashMap::new();
        for chunk in ids.chunks(MAX_IDS_PER_REQUEST) {
            let joined = chunk.iter().map(TrackId::as_str).collect::<Vec<_>>().join(",");
            let raw: Vec<RawTrack> = self
                .get_json(
                    &format!("{}/tracks", API_URL),
                    &[("ids", joined)],
                    "tracks",
                )
                .await?;
            for track in self.normalize(raw) {
                found.insert(track.id.clone(), track);
            }
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    async fn fetch_track(&self, id: &TrackId) -> Result<Track> {
        self.fetch_tracks(std::slice::from_ref(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("track {}", id)))
    }

    async fn resolve_url(&self, url: &str) -> Result<Track> {
        let raw: RawTrack = self
            .get_json(
                &format!("{}/resolve", API_URL),
                &[("url", url.to_string())],
                url,
            )
            .await?;

        if raw.kind.as_deref().is_some_and(|kind| kind != "track") {
            return Err(Error::NotFound(format!("{} is not a track", url)));
        }
        into_track(raw, &self.client_id)
            .ok_or_else(|| Error::NotFound(format!("a playable stream for {}", url)))
    }

    async fn fetch_related(&self, id: &TrackId, limit: usize) -> Result<Vec<Track>> {
        let raw: RawCollection = self
            .get_json(
                &format!("{}/tracks/{}/related", API_URL, id),
                &[("limit", limit.to_string())],
                &format!("related tracks of {}", id),
            )
            .await
            .inspect_err(|e| warn!(track = %id, error = %e, "Related lookup failed"))?;
        Ok(self.normalize(raw.collection))
    }
}

impl Catalog for SoundCloudClient {
    fn search<'a>(&'a self, query: &'a str, limit: usize) -> BoxFuture<'a, Result<SearchPage>> {
        self.search_tracks(query, limit).boxed()
    }

    fn next_page<'a>(&'a self, href: &'a str) -> BoxFuture<'a, Result<SearchPage>> {
        self.fetch_page(href).boxed()
    }

    fn track<'a>(&'a self, id: &'a TrackId) -> BoxFuture<'a, Result<Track>> {
        self.fetch_track(id).boxed()
    }

    fn tracks<'a>(&'a self, ids: &'a [TrackId]) -> BoxFuture<'a, Result<Vec<Track>>> {
        self.fetch_tracks(ids).boxed()
    }

    fn resolve<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Track>> {
        self.resolve_url(url).boxed()
    }

    fn related<'a>(&'a self, id: &'a TrackId, limit: usize) -> BoxFuture<'a, Result<Vec<Track>>> {
        self.fetch_related(id, limit).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLIENT_ID: &str = "abcdefghijklmnopqrstuvwxyz012345";

    fn raw(json: &str) -> RawTrack {
        serde_json::from_str(json).unwrap()
    }

    const FULL: &str = r#"{
        "id": 1234,
        "kind": "track",
        "title": "Midnight Drive",
        "duration": 245123,
        "artwork_url": "https://i1.sndcdn.com/artworks-000-abc-large.jpg",
        "permalink_url": "https://soundcloud.com/neon/midnight-drive",
        "genre": "Synthwave",
        "user": {"username": "neon_uploads", "avatar_url": "https://i1.sndcdn.com/avatars-1-large.jpg"},
        "publisher_metadata": {"artist": "Neon Nights"},
        "media": {"transcodings": [
            {"url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:1234/x/stream/hls", "format": {"protocol": "hls", "mime_type": "audio/mpeg"}},
            {"url": "https://api-v2.soundcloud.com/media/soundcloud:tracks:1234/x/stream/progressive", "format": {"protocol": "progressive", "mime_type": "audio/mpeg"}}
        ]}
    }"#;

    #[test]
    fn test_normalizes_full_track() {
        let track = into_track(raw(FULL), CLIENT_ID).unwrap();

        assert_eq!(track.id, TrackId::from("1234"));
        assert_eq!(track.title, "Midnight Drive");
        assert_eq!(track.artist, "Neon Nights");
        assert_eq!(track.duration_secs, 245);
        assert_eq!(
            track.stream_uri,
            format!(
                "https://api-v2.soundcloud.com/media/soundcloud:tracks:1234/x/stream/progressive?client_id={}",
                CLIENT_ID
            )
        );
        assert_eq!(
            track.artwork_uri.as_deref(),
            Some("https://i1.sndcdn.com/artworks-000-abc-t500x500.jpg")
        );
        assert_eq!(track.genre.as_deref(), Some("Synthwave"));
    }

    #[test]
    fn test_artist_and_artwork_fall_back_to_uploader() {
        let json = r#"{
            "id": 7,
            "title": "Demo",
            "artwork_url": null,
            "user": {"username": "bedroom_producer", "avatar_url": "https://i1.sndcdn.com/avatars-9-large.jpg"},
            "publisher_metadata": {"artist": ""},
            "media": {"transcodings": [{"url": "https://x.invalid/p", "format": {"protocol": "progressive"}}]}
        }"#;
        let track = into_track(raw(json), CLIENT_ID).unwrap();

        assert_eq!(track.artist, "bedroom_producer");
        assert_eq!(
            track.artwork_uri.as_deref(),
            Some("https://i1.sndcdn.com/avatars-9-t500x500.jpg")
        );
        assert_eq!(track.duration_secs, 0);
    }

    #[test]
    fn test_hls_only_tracks_are_dropped() {
        let json = r#"{
            "id": 8,
            "title": "Stream only",
            "media": {"transcodings": [{"url": "https://x.invalid/h", "format": {"protocol": "hls"}}]}
        }"#;
        assert!(into_track(raw(json), CLIENT_ID).is_none());
        assert!(into_track(raw(r#"{"id": 9, "kind": "track"}"#), CLIENT_ID).is_none());
    }

    #[test]
    fn test_collection_keeps_next_href() {
        let json = format!(
            r#"{{"collection": [{}], "next_href": "https://api-v2.soundcloud.com/search/tracks?offset=10"}}"#,
            FULL
        );
        let raw: RawCollection = serde_json::from_str(&json).unwrap();
        let client = SoundCloudClient::new(Client::new(), CLIENT_ID);
        let page = client.into_page(raw);

        assert_eq!(page.tracks.len(), 1);
        assert_eq!(
            page.next_href.as_deref(),
            Some("https://api-v2.soundcloud.com/search/tracks?offset=10")
        );
    }

    #[test]
    fn test_with_client_id() {
        assert_eq!(with_client_id("https://a/b", "id"), "https://a/b?client_id=id");
        assert_eq!(with_client_id("https://a/b?x=1", "id"), "https://a/b?x=1&client_id=id");
        assert_eq!(
            with_client_id("https://a/b?client_id=old", "id"),
            "https://a/b?client_id=old"
        );
    }

    #[test]
    fn test_status_mapping() {
        assert!(check_status(StatusCode::OK, "x").is_ok());
        assert!(matches!(
            check_status(StatusCode::NOT_FOUND, "track 1"),
            Err(Error::NotFound(what)) if what == "track 1"
        ));
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            match check_status(status, "x") {
                Err(Error::CatalogUnavailable(msg)) => assert!(msg.contains("client id")),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(matches!(
            check_status(StatusCode::BAD_GATEWAY, "x"),
            Err(Error::CatalogUnavailable(_))
        ));
    }
}
