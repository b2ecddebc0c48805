use std::fmt::Display;
use std::str::FromStr;

use crossterm::style::Color;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::ConfigError;
use crate::player::StationPolicy;

/// Every key `config get/set` understands, in display order.
pub const KEYS: &[&str] = &[
    "client_id",
    "ascii_art_width",
    "ascii_enabled",
    "theme_color",
    "search_limit",
    "station.low_water_mark",
    "station.batch_size",
];

const ART_WIDTH: (u32, u32) = (40, 100);
const SEARCH_LIMIT: (usize, usize) = (1, 50);
const LOW_WATER_MARK: (usize, usize) = (1, 10);
const BATCH_SIZE: (usize, usize) = (1, 50);

/// User-editable settings, stored in `config.toml`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default = "default_art_width")]
    pub ascii_art_width: u32,
    #[serde(default = "default_true")]
    pub ascii_enabled: bool,
    #[serde(default = "default_theme_color")]
    pub theme_color: String,
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default)]
    pub station: StationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationConfig {
    #[serde(default = "default_low_water_mark")]
    pub low_water_mark: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_art_width() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

fn default_theme_color() -> String {
    "cyan".to_string()
}

fn default_search_limit() -> usize {
    10
}

fn default_low_water_mark() -> usize {
    2
}

fn default_batch_size() -> usize {
    10
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            low_water_mark: default_low_water_mark(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            ascii_art_width: default_art_width(),
            ascii_enabled: true,
            theme_color: default_theme_color(),
            search_limit: default_search_limit(),
            station: StationConfig::default(),
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_ranged<T>(key: &str, value: &str, (min, max): (T, T)) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let parsed: T = value
        .trim()
        .parse()
        .map_err(|_| invalid(key, value, "expected a whole number"))?;
    if parsed < min || parsed > max {
        return Err(invalid(key, value, format!("must be between {} and {}", min, max)));
    }
    Ok(parsed)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(key, value, "expected true or false")),
    }
}

fn parse_color(key: &str, value: &str) -> Result<String, ConfigError> {
    let name = value.trim().to_ascii_lowercase();
    Color::try_from(name.as_str())
        .map(|_| name.clone())
        .map_err(|_| invalid(key, value, "not a terminal color name (try cyan, magenta, dark_green...)"))
}

impl UserConfig {
    pub fn get(&self, key: &str) -> Result<String, ConfigError> {
        let value = match key {
            "client_id" => self.client_id.clone().unwrap_or_else(|| "(auto)".to_string()),
            "ascii_art_width" => self.ascii_art_width.to_string(),
            "ascii_enabled" => self.ascii_enabled.to_string(),
            "theme_color" => self.theme_color.clone(),
            "search_limit" => self.search_limit.to_string(),
            "station.low_water_mark" => self.station.low_water_mark.to_string(),
            "station.batch_size" => self.station.batch_size.to_string(),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        };
        Ok(value)
    }

    /// Validates `value` and stores it. On error nothing changes.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "client_id" => {
                let value = value.trim();
                self.client_id = match value {
                    "" | "none" | "auto" => None,
                    id if id.chars().all(|c| c.is_ascii_alphanumeric()) => Some(id.to_string()),
                    _ => return Err(invalid(key, value, "expected letters and digits only")),
                };
            }
            "ascii_art_width" => self.ascii_art_width = parse_ranged(key, value, ART_WIDTH)?,
            "ascii_enabled" => self.ascii_enabled = parse_bool(key, value)?,
            "theme_color" => self.theme_color = parse_color(key, value)?,
            "search_limit" => self.search_limit = parse_ranged(key, value, SEARCH_LIMIT)?,
            "station.low_water_mark" => {
                self.station.low_water_mark = parse_ranged(key, value, LOW_WATER_MARK)?
            }
            "station.batch_size" => self.station.batch_size = parse_ranged(key, value, BATCH_SIZE)?,
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        KEYS.iter()
            .filter_map(|key| self.get(key).ok().map(|value| (*key, value)))
            .collect()
    }

    /// Resets hand-edited values that are out of range. Returns the keys
    /// that were reset.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let defaults = Self::default();
        let mut reset = Vec::new();

        for key in KEYS {
            let Ok(current) = self.get(key) else { continue };
            if *key == "client_id" {
                continue;
            }
            let mut probe = defaults.clone();
            if let Err(e) = probe.set(key, &current) {
                warn!(error = %e, "Resetting config value to its default");
                let default = defaults.get(key).unwrap_or_default();
                if self.set(key, &default).is_ok() {
                    reset.push(*key);
                }
            }
        }
        reset
    }

    pub fn theme(&self) -> Color {
        Color::try_from(self.theme_color.as_str()).unwrap_or(Color::Cyan)
    }

    pub fn station_policy(&self) -> StationPolicy {
        StationPolicy {
            low_water_mark: self.station.low_water_mark,
            batch_size: self.station.batch_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_art_width_range() {
        let mut config = UserConfig::default();

        let err = config.set("ascii_art_width", "5").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
        assert_eq!(config.ascii_art_width, 60);

        for ok in ["40", "75", "100"] {
            config.set("ascii_art_width", ok).unwrap();
            assert_eq!(config.get("ascii_art_width").unwrap(), ok);
        }
        assert!(config.set("ascii_art_width", "101").is_err());
        assert!(config.set("ascii_art_width", "wide").is_err());
        assert_eq!(config.ascii_art_width, 100);
    }

    #[test]
    fn test_bool_and_color_values() {
        let mut config = UserConfig::default();
        config.set("ascii_enabled", "off").unwrap();
        assert!(!config.ascii_enabled);
        assert!(config.set("ascii_enabled", "maybe").is_err());

        config.set("theme_color", "Magenta").unwrap();
        assert_eq!(config.theme_color, "magenta");
        assert_eq!(config.theme(), Color::Magenta);
        assert!(config.set("theme_color", "octarine").is_err());
        assert_eq!(config.theme_color, "magenta");
    }

    #[test]
    fn test_station_keys_feed_policy() {
        let mut config = UserConfig::default();
        config.set("station.low_water_mark", "4").unwrap();
        config.set("station.batch_size", "25").unwrap();
        assert!(config.set("station.batch_size", "0").is_err());

        let policy = config.station_policy();
        assert_eq!(policy.low_water_mark, 4);
        assert_eq!(policy.batch_size, 25);
    }

    #[test]
    fn test_client_id_can_be_cleared() {
        let mut config = UserConfig::default();
        config.set("client_id", "abc123").unwrap();
        assert_eq!(config.client_id.as_deref(), Some("abc123"));
        assert!(config.set("client_id", "no spaces please").is_err());

        config.set("client_id", "auto").unwrap();
        assert_eq!(config.client_id, None);
        assert_eq!(config.get("client_id").unwrap(), "(auto)");
    }

    #[test]
    fn test_unknown_key() {
        let mut config = UserConfig::default();
        assert!(matches!(config.get("volume"), Err(ConfigError::UnknownKey(_))));
        assert!(matches!(config.set("volume", "3"), Err(ConfigError::UnknownKey(_))));
    }

    #[test]
    fn test_sanitize_resets_out_of_range_values() {
        let mut config = UserConfig {
            ascii_art_width: 7,
            search_limit: 500,
            ..Default::default()
        };
        config.theme_color = "octarine".to_string();

        let reset = config.sanitize();

        assert_eq!(reset, vec!["ascii_art_width", "theme_color", "search_limit"]);
        assert_eq!(config, UserConfig::default());
    }

    #[test]
    fn test_entries_cover_every_key() {
        let entries = UserConfig::default().entries();
        let keys: Vec<_> = entries.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, KEYS);
    }
}
