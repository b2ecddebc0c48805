//! Favorites and named playlists, kept in `library.json`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::player::TrackId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct LibraryData {
    #[serde(default)]
    favorites: Vec<TrackId>,
    #[serde(default)]
    playlists: BTreeMap<String, Vec<TrackId>>,
}

/// Playlists store track ids only; tracks are looked up again on load.
#[derive(Debug)]
pub struct Library {
    path: PathBuf,
    data: LibraryData,
}

impl Library {
    /// Opens the store. A missing file is an empty library; a file that does
    /// not parse is an error so it never gets overwritten.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => LibraryData::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            playlists = data.playlists.len(),
            favorites = data.favorites.len(),
            "Library opened"
        );
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Applies `change` and writes the file; the change is undone when the
    /// write fails.
    fn update<T>(&mut self, change: impl FnOnce(&mut LibraryData) -> T) -> Result<T> {
        let before = self.data.clone();
        let out = change(&mut self.data);
        if let Err(e) = self.persist() {
            self.data = before;
            return Err(e);
        }
        Ok(out)
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, encode(&self.data)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Creates or overwrites `name`. Returns whether it already existed.
    pub fn save_playlist(&mut self, name: &str, ids: Vec<TrackId>) -> Result<bool> {
        let count = ids.len();
        let replaced = self.update(|data| data.playlists.insert(name.to_string(), ids).is_some())?;
        info!(playlist = name, tracks = count, replaced, "Playlist saved");
        Ok(replaced)
    }

    pub fn playlist(&self, name: &str) -> Result<&[TrackId]> {
        self.data
            .playlists
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::NotFound(format!("playlist \"{}\"", name)))
    }

    /// Names and lengths, sorted by name.
    pub fn playlists(&self) -> Vec<(&str, usize)> {
        self.data
            .playlists
            .iter()
            .map(|(name, ids)| (name.as_str(), ids.len()))
            .collect()
    }

    pub fn delete_playlist(&mut self, name: &str) -> Result<()> {
        if !self.data.playlists.contains_key(name) {
            return Err(Error::NotFound(format!("playlist \"{}\"", name)));
        }
        self.update(|data| data.playlists.remove(name))?;
        info!(playlist = name, "Playlist deleted");
        Ok(())
    }

    /// Returns false when `id` was already a favorite.
    pub fn add_favorite(&mut self, id: &TrackId) -> Result<bool> {
        if self.is_favorite(id) {
            return Ok(false);
        }
        self.update(|data| data.favorites.push(id.clone()))?;
        Ok(true)
    }

    /// Returns false when `id` was not a favorite.
    pub fn remove_favorite(&mut self, id: &TrackId) -> Result<bool> {
        if !self.is_favorite(id) {
            return Ok(false);
        }
        self.update(|data| data.favorites.retain(|f| f != id))?;
        Ok(true)
    }

    pub fn favorites(&self) -> &[TrackId] {
        &self.data.favorites
    }

    pub fn is_favorite(&self, id: &TrackId) -> bool {
        self.data.favorites.contains(id)
    }
}

/// Failing to write the library is a storage problem, not a corrupt file.
fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(data).map_err(|e| Error::Storage(io::Error::other(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn ids(raw: &[&str]) -> Vec<TrackId> {
        raw.iter().map(|id| TrackId::from(*id)).collect()
    }

    #[test]
    fn test_encode_failure_is_a_storage_error() {
        // JSON object keys must be strings
        let unencodable: BTreeMap<(u8, u8), u8> = BTreeMap::from([((1, 2), 3)]);

        let err = encode(&unencodable).unwrap_err();

        assert!(matches!(err, Error::Storage(_)));
        assert!(!err.to_string().contains("corrupt"));
    }

    #[test]
    fn test_missing_file_is_empty_library() {
        let dir = tempdir().unwrap();
        let library = Library::open(dir.path().join("library.json")).unwrap();

        assert!(library.favorites().is_empty());
        assert!(library.playlists().is_empty());
        assert!(!library.path().exists());
    }

    #[test]
    fn test_playlists_persist_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");

        let mut library = Library::open(&path).unwrap();
        assert!(!library.save_playlist("night drive", ids(&["3", "1", "2"])).unwrap());
        assert!(!library.save_playlist("focus", ids(&["9"])).unwrap());
        assert!(library.save_playlist("focus", ids(&["9", "9"])).unwrap());

        let reopened = Library::open(&path).unwrap();
        assert_eq!(reopened.playlist("night drive").unwrap(), ids(&["3", "1", "2"]).as_slice());
        assert_eq!(reopened.playlists(), vec![("focus", 2), ("night drive", 3)]);
    }

    #[test]
    fn test_unknown_playlist() {
        let dir = tempdir().unwrap();
        let mut library = Library::open(dir.path().join("library.json")).unwrap();

        assert!(matches!(library.playlist("nope"), Err(Error::NotFound(_))));
        assert!(matches!(library.delete_playlist("nope"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_playlist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");
        let mut library = Library::open(&path).unwrap();
        library.save_playlist("old", ids(&["1"])).unwrap();

        library.delete_playlist("old").unwrap();

        assert!(Library::open(&path).unwrap().playlists().is_empty());
    }

    #[test]
    fn test_favorites_have_no_duplicates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");
        let mut library = Library::open(&path).unwrap();
        let a = TrackId::from("a");
        let b = TrackId::from("b");

        assert!(library.add_favorite(&a).unwrap());
        assert!(library.add_favorite(&b).unwrap());
        assert!(!library.add_favorite(&a).unwrap());
        assert_eq!(library.favorites(), ids(&["a", "b"]).as_slice());

        assert!(library.remove_favorite(&a).unwrap());
        assert!(!library.remove_favorite(&a).unwrap());
        assert_eq!(Library::open(&path).unwrap().favorites(), ids(&["b"]).as_slice());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("library.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Library::open(&path), Err(Error::Corrupt(_))));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let dir = tempdir().unwrap();
        // A directory where the file should be makes every write fail
        let path = dir.path().join("library.json");
        fs::create_dir(&path).unwrap();
        let mut library = Library {
            path,
            data: LibraryData::default(),
        };

        assert!(library.add_favorite(&TrackId::from("x")).is_err());
        assert!(library.favorites().is_empty());
    }
}
