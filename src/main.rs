use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::style::Stylize;
use human_panic::setup_panic;
use tokio::runtime::Handle;
use tracing::{error, info, warn};

use scplay::app::cli::Args;
use scplay::app::config::{AppConfig, ConfigError, UserConfig};
use scplay::app::library::Library;
use scplay::app::App;
use scplay::artwork::ArtworkRenderer;
use scplay::catalog::client_id::{self, ClientIdCache};
use scplay::catalog::{Catalog, SoundCloudClient};
use scplay::logging;
use scplay::player::{controller, PlayQueue, RodioEngine};

const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) scplay/",
    env!("CARGO_PKG_VERSION")
);

#[tokio::main]
async fn main() -> ExitCode {
    setup_panic!();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = format!("{:#}", e), "Startup failed");
            eprintln!("{} {:#}", "scplay:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let app_config = AppConfig::locate(args.config_dir.clone());
    app_config
        .ensure_dir()
        .context("the config directory is not usable")?;
    let _log_guard = logging::init_logging(&app_config.log_dir(), args.log_level.as_deref())?;

    let config = match app_config.load() {
        Ok(config) => config,
        Err(e @ ConfigError::Parse { .. }) => {
            warn!(error = %e, "Using default settings");
            eprintln!("{} {}; using defaults for this session", "warning:".yellow().bold(), e);
            UserConfig::default()
        }
        Err(e) => return Err(e).context("could not load settings"),
    };
    let library = Library::open(app_config.library_path()).context("could not open the library")?;

    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .context("could not build the HTTP client")?;

    let cache = ClientIdCache::new(app_config.client_id_path());
    let configured = args.client_id.as_deref().or(config.client_id.as_deref());
    let client_id = client_id::obtain(configured, &cache, &http).await?;
    let catalog: Arc<dyn Catalog> = Arc::new(SoundCloudClient::new(http.clone(), client_id));

    let (handle, inbox) = controller::channel();
    let engine = RodioEngine::spawn(http.clone(), Handle::current(), handle.engine_sink())?;
    let queue = PlayQueue::new(Arc::new(engine), config.station_policy());
    let notices = controller::spawn(queue, catalog.clone(), inbox);
    info!("Player ready");

    let app = App::new(
        handle,
        catalog,
        library,
        app_config,
        config,
        ArtworkRenderer::new(http),
        !args.no_art,
    );
    app.run(notices).await
}
