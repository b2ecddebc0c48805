use std::path::PathBuf;

use clap::Parser;

/// scplay - SoundCloud in your terminal, with an endless station mode 🎵
#[derive(Parser, Debug)]
#[command(name = "scplay", version, about)]
pub struct Args {
    /// Directory for config.toml, library.json, the client id cache and logs
    #[arg(long, value_name = "PATH")]
    pub config_dir: Option<PathBuf>,

    /// Use this API client id for this session instead of discovering one
    #[arg(long, value_name = "ID")]
    pub client_id: Option<String>,

    /// Do not render album art this session
    #[arg(long)]
    pub no_art: bool,

    /// Log filter, e.g. `debug` or `scplay=trace` (default: $RUST_LOG or info)
    #[arg(long, value_name = "FILTER")]
    pub log_level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["scplay"]).unwrap();
        assert!(args.config_dir.is_none());
        assert!(args.client_id.is_none());
        assert!(!args.no_art);
        assert!(args.log_level.is_none());
    }

    #[test]
    fn test_all_flags() {
        let args = Args::try_parse_from([
            "scplay",
            "--config-dir",
            "/tmp/sc",
            "--client-id",
            "abc",
            "--no-art",
            "--log-level",
            "debug",
        ])
        .unwrap();

        assert_eq!(args.config_dir, Some(PathBuf::from("/tmp/sc")));
        assert_eq!(args.client_id.as_deref(), Some("abc"));
        assert!(args.no_art);
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        assert!(Args::try_parse_from(["scplay", "--mini"]).is_err());
    }
}
