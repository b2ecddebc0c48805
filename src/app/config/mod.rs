use std::fs;
use std::io;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{info, warn};

pub mod user;

pub use user::{StationConfig, UserConfig, KEYS};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown config key `{0}`; `config` lists the known keys")]
    UnknownKey(String),

    #[error("invalid value `{value}` for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("could not read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("could not parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("could not write {}: {source}", path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error("could not serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Where everything scplay keeps on disk lives.
#[derive(Debug, Clone)]
pub struct AppConfig {
    dir: PathBuf,
}

impl AppConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `dirs::config_dir()/scplay` unless overridden.
    pub fn locate(override_dir: Option<PathBuf>) -> Self {
        let dir = override_dir.unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scplay")
        });
        Self::new(dir)
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join("config.toml")
    }

    pub fn library_path(&self) -> PathBuf {
        self.dir.join("library.json")
    }

    pub fn client_id_path(&self) -> PathBuf {
        self.dir.join("client_id")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.dir.join("logs")
    }

    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        fs::create_dir_all(&self.dir).map_err(|source| ConfigError::Write {
            path: self.dir.clone(),
            source,
        })
    }

    /// Loads `config.toml`, writing the defaults when it does not exist yet.
    /// A file that does not parse is reported as [`ConfigError::Parse`] and
    /// left untouched.
    pub fn load(&self) -> Result<UserConfig, ConfigError> {
        let path = self.config_path();

        if !path.exists() {
            let config = UserConfig::default();
            match self.save(&config) {
                Ok(()) => info!(path = %path.display(), "Wrote default config"),
                Err(e) => warn!(error = %e, "Could not write default config"),
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: UserConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;

        let reset = config.sanitize();
        if !reset.is_empty() {
            warn!(keys = ?reset, "Config contained out-of-range values");
        }
        Ok(config)
    }

    pub fn save(&self, config: &UserConfig) -> Result<(), ConfigError> {
        self.ensure_dir()?;
        let path = self.config_path();
        let content = toml::to_string_pretty(config)?;
        fs::write(&path, content).map_err(|source| ConfigError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let app_config = AppConfig::new(dir.path().join("scplay"));

        let config = app_config.load().unwrap();

        assert_eq!(config, UserConfig::default());
        assert!(app_config.config_path().exists());
    }

    #[test]
    fn test_set_then_save_round_trips() {
        let dir = tempdir().unwrap();
        let app_config = AppConfig::new(dir.path());
        let mut config = app_config.load().unwrap();

        assert!(config.set("ascii_art_width", "5").is_err());
        assert_eq!(config.ascii_art_width, 60);

        config.set("ascii_art_width", "60").unwrap();
        config.set("station.batch_size", "20").unwrap();
        config.set("client_id", "abcDEF123").unwrap();
        app_config.save(&config).unwrap();

        assert_eq!(app_config.load().unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults_for_the_rest() {
        let dir = tempdir().unwrap();
        let app_config = AppConfig::new(dir.path());
        fs::write(
            app_config.config_path(),
            "theme_color = \"green\"\n\n[station]\nbatch_size = 5\n",
        )
        .unwrap();

        let config = app_config.load().unwrap();

        assert_eq!(config.theme_color, "green");
        assert_eq!(config.station.batch_size, 5);
        assert_eq!(config.station.low_water_mark, 2);
        assert_eq!(config.ascii_art_width, 60);
    }

    #[test]
    fn test_unparseable_file_is_reported_and_kept() {
        let dir = tempdir().unwrap();
        let app_config = AppConfig::new(dir.path());
        fs::write(app_config.config_path(), "ascii_art_width = [").unwrap();

        let err = app_config.load().unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert_eq!(
            fs::read_to_string(app_config.config_path()).unwrap(),
            "ascii_art_width = ["
        );
    }

    #[test]
    fn test_paths_live_in_config_dir() {
        let app_config = AppConfig::locate(Some(PathBuf::from("/tmp/scplay-test")));
        assert_eq!(app_config.library_path(), Path::new("/tmp/scplay-test/library.json"));
        assert_eq!(app_config.client_id_path(), Path::new("/tmp/scplay-test/client_id"));
        assert_eq!(app_config.log_dir(), Path::new("/tmp/scplay-test/logs"));
    }
}
