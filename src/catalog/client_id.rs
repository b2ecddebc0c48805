//! Finding a public client id for api-v2.
//!
//! Order: configured value, then the cache file, then a scrape of the
//! soundcloud.com web app bundles. A scraped id is written to the cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, warn};

const SITE_URL: &str = "https://soundcloud.com";
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(15);

/// Cached ids shorter than this are treated as garbage.
const MIN_CACHED_LEN: usize = 21;

/// The `client_id` file in the config directory.
pub struct ClientIdCache {
    path: PathBuf,
}

impl ClientIdCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<String> {
        let raw = fs::read_to_string(&self.path).ok()?;
        let id = raw.trim();
        if id.len() < MIN_CACHED_LEN {
            warn!(path = %self.path.display(), "Ignoring malformed cached client id");
            return None;
        }
        Some(id.to_string())
    }

    pub fn store(&self, id: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, id)
    }
}

/// Script bundles referenced by the soundcloud.com front page.
pub fn script_sources(html: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r#"<script[^>]*\ssrc="([^"]+)""#) else {
        return Vec::new();
    };
    re.captures_iter(html)
        .map(|cap| cap[1].to_string())
        .filter(|src| src.contains("sndcdn.com"))
        .collect()
}

pub fn extract_client_id(script: &str) -> Option<String> {
    let re = Regex::new(r#"client_id[:=]"([a-zA-Z0-9]{32})""#).ok()?;
    re.captures(script).map(|cap| cap[1].to_string())
}

/// Scrapes soundcloud.com for a client id. The app bundle is usually one of
/// the last scripts on the page, so they are tried back to front.
pub async fn discover(http: &Client) -> Result<String> {
    info!("Discovering a public client id");
    let html = http
        .get(SITE_URL)
        .timeout(SCRAPE_TIMEOUT)
        .send()
        .await
        .context("could not reach soundcloud.com")?
        .error_for_status()?
        .text()
        .await?;

    for src in script_sources(&html).iter().rev() {
        debug!(script = %src, "Scanning script");
        let response = match http.get(src).timeout(SCRAPE_TIMEOUT).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(script = %src, status = %response.status(), "Skipping script");
                continue;
            }
            Err(e) => {
                warn!(script = %src, error = %e, "Could not fetch script");
                continue;
            }
        };
        let Ok(body) = response.text().await else {
            continue;
        };
        if let Some(id) = extract_client_id(&body) {
            info!("Found a client id");
            return Ok(id);
        }
    }

    bail!("no client id found in the soundcloud.com scripts")
}

/// Resolves the client id for this session.
pub async fn obtain(configured: Option<&str>, cache: &ClientIdCache, http: &Client) -> Result<String> {
    if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        debug!("Using configured client id");
        return Ok(id.to_string());
    }
    if let Some(id) = cache.load() {
        debug!(path = %cache.path().display(), "Using cached client id");
        return Ok(id);
    }

    let id = discover(http)
        .await
        .context("could not obtain a client id; set one with --client-id or `config set client_id`")?;
    if let Err(e) = cache.store(&id) {
        warn!(error = %e, "Could not cache the client id");
    }
    Ok(id)
}
