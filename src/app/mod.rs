//! The interactive shell.

pub mod cli;
pub mod commands;
pub mod config;
pub mod library;
pub mod render;

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use crossterm::cursor::MoveToColumn;
use crossterm::style::Stylize;
use crossterm::terminal::{Clear, ClearType};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::artwork::ArtworkRenderer;
use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::player::{Advance, Notice, PlayTarget, PlayerState, QueueHandle, Seed, Track};
use commands::{Command, ConfigAction, StationSeed, Target};
use config::{AppConfig, UserConfig};
use library::Library;

/// What a command asks the shell to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Lines(Vec<String>),
    Exit,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Self::Lines(vec![text.into()])
    }
}

struct LastSearch {
    next_href: Option<String>,
}

pub struct App {
    handle: QueueHandle,
    catalog: Arc<dyn Catalog>,
    library: Library,
    app_config: AppConfig,
    pub config: UserConfig,
    artwork: ArtworkRenderer,
    /// `--no-art` turns art off for the session regardless of config
    art_allowed: bool,
    last_search: Option<LastSearch>,
}

impl App {
    pub fn new(
        handle: QueueHandle,
        catalog: Arc<dyn Catalog>,
        library: Library,
        app_config: AppConfig,
        config: UserConfig,
        artwork: ArtworkRenderer,
        art_allowed: bool,
    ) -> Self {
        Self {
            handle,
            catalog,
            library,
            app_config,
            config,
            artwork,
            art_allowed,
            last_search: None,
        }
    }

    fn art_enabled(&self) -> bool {
        self.art_allowed && self.config.ascii_enabled
    }

    /// Reads commands until `exit` or end of input, printing notices from
    /// the player as they arrive.
    pub async fn run(mut self, mut notices: mpsc::UnboundedReceiver<Notice>) -> anyhow::Result<()> {
        let mut input = spawn_line_reader(io::BufReader::new(io::stdin()));
        let mut out = io::stdout();

        println!("{}", "scplay - SoundCloud in your terminal".with(self.config.theme()).bold());
        println!("{}", render::hint_line("Type `help` for commands."));
        self.prompt(&mut out)?;

        loop {
            tokio::select! {
                line = input.recv() => {
                    let Some(line) = line else {
                        println!();
                        break;
                    };
                    if self.handle_line(&line).await {
                        break;
                    }
                    self.prompt(&mut out)?;
                }
                Some(notice) = notices.recv() => {
                    crossterm::execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
                    println!("{}", render::notice_line(&notice, self.config.theme()));
                    self.prompt(&mut out)?;
                }
                _ = tokio::signal::ctrl_c() => {
                    println!();
                    println!("{}", render::hint_line("Type `exit` to quit."));
                    self.prompt(&mut out)?;
                }
            }
        }

        if let Err(e) = self.handle.stop().await {
            warn!(error = %e, "Could not stop playback on exit");
        }
        println!("Goodbye!");
        Ok(())
    }

    fn prompt(&self, out: &mut io::Stdout) -> io::Result<()> {
        print!("{} ", "scplay>".with(self.config.theme()).bold());
        out.flush()
    }

    /// Returns true when the shell should exit.
    async fn handle_line(&mut self, line: &str) -> bool {
        let command = match commands::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return false,
            Err(e) => {
                println!("{}", render::error_line(&e));
                return false;
            }
        };

        info!(?command, "Command");
        match self.execute(command).await {
            Ok(Reply::Exit) => true,
            Ok(Reply::Lines(lines)) => {
                for line in lines {
                    println!("{}", line);
                }
                false
            }
            Err(e) => {
                warn!(error = %e, "Command failed");
                println!("{}", render::error_line(&e));
                false
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Reply> {
        let theme = self.config.theme();

        match command {
            Command::Search(query) => {
                let page = self.catalog.search(&query, self.config.search_limit).await?;
                if page.tracks.is_empty() {
                    return Err(Error::NoResults(format!("\"{}\"", query)));
                }
                let mut lines = render::search_lines(&page.tracks, theme);
                if page.next_href.is_some() {
                    lines.push(render::hint_line("`more` shows the next page."));
                }
                self.last_search = Some(LastSearch {
                    next_href: page.next_href,
                });
                Ok(Reply::Lines(lines))
            }

            Command::More => {
                let Some(href) = self.last_search.as_ref().and_then(|s| s.next_href.clone()) else {
                    return Ok(Reply::line(render::hint_line("No more results.")));
                };
                let page = self.catalog.next_page(&href).await?;
                let mut lines = render::search_lines(&page.tracks, theme);
                if page.next_href.is_some() {
                    lines.push(render::hint_line("`more` shows the next page."));
                }
                self.last_search = Some(LastSearch {
                    next_href: page.next_href,
                });
                Ok(Reply::Lines(lines))
            }

            Command::Play(None) => {
                let snapshot = self.handle.snapshot().await?;
                match snapshot.state {
                    PlayerState::Paused => {
                        self.handle.resume().await?;
                        Ok(Reply::line("Resumed."))
                    }
                    PlayerState::Stopped if !snapshot.tracks.is_empty() => {
                        let track = self.handle.play(PlayTarget::Index(0)).await?;
                        Ok(Reply::line(format!("Starting the queue with \"{}\".", track.title)))
                    }
                    PlayerState::Stopped => Ok(Reply::line(render::hint_line("The queue is empty."))),
                    _ => Ok(Reply::line(render::hint_line("Already playing."))),
                }
            }

            Command::Play(Some(Target::Position(index))) => {
                let track = self.handle.play(PlayTarget::Index(index)).await?;
                Ok(Reply::line(format!("Loading \"{}\"…", track.title)))
            }

            Command::Play(Some(Target::Track(reference))) => {
                let track = reference.lookup(self.catalog.as_ref()).await?;
                let track = self.handle.play(PlayTarget::Track(track)).await?;
                Ok(Reply::line(format!("Loading \"{}\"…", track.title)))
            }

            Command::Pause => Ok(Reply::line(match self.handle.pause().await? {
                PlayerState::Paused => "Paused.".to_string(),
                PlayerState::Loading => "Pausing once the track starts.".to_string(),
                _ => render::hint_line("Nothing is playing."),
            })),

            Command::Resume => Ok(Reply::line(match self.handle.resume().await? {
                PlayerState::Playing => "Resumed.".to_string(),
                PlayerState::Loading => "Playing once the track starts.".to_string(),
                _ => render::hint_line("Nothing is paused."),
            })),

            Command::Stop => {
                self.handle.stop().await?;
                Ok(Reply::line("Stopped."))
            }

            Command::Next => Ok(Reply::line(match self.handle.next().await? {
                Advance::Moved(track) => format!("⏭ {}", track.title),
                Advance::AwaitingRefill => "Finding more tracks for the station…".to_string(),
                Advance::Ended => render::hint_line("End of queue."),
                Advance::Idle => render::hint_line("Nothing is playing."),
            })),

            Command::Prev => Ok(Reply::line(match self.handle.prev().await? {
                Some(track) => format!("⏮ {}", track.title),
                None => render::hint_line("Already at the start of the queue."),
            })),

            Command::Queue(None) => {
                let snapshot = self.handle.snapshot().await?;
                Ok(Reply::Lines(render::queue_lines(&snapshot, theme)))
            }

            Command::Queue(Some(reference)) => {
                let was_station = self.handle.snapshot().await?.is_station_active();
                let track = reference.lookup(self.catalog.as_ref()).await?;
                let title = track.title.clone();
                let index = self.handle.enqueue(track).await?;

                let mut lines = vec![format!("Added #{}: {}", index + 1, title)];
                if was_station {
                    lines.push(render::hint_line("Station mode ended."));
                }
                Ok(Reply::Lines(lines))
            }

            Command::Station(seed) => self.start_station(seed).await,

            Command::Info(position) => {
                let track = self.track_at(position).await?;
                let mut lines = render::info_lines(&track, self.library.is_favorite(&track.id), theme);
                if self.art_enabled() {
                    if let Some(url) = &track.artwork_uri {
                        match self.artwork.render_url(url, self.config.ascii_art_width).await {
                            Ok(art) => lines.extend(art),
                            Err(e) => {
                                debug!(error = %e, "Artwork unavailable");
                                lines.push(render::hint_line("(album art unavailable)"));
                            }
                        }
                    }
                }
                Ok(Reply::Lines(lines))
            }

            Command::Status => {
                let snapshot = self.handle.snapshot().await?;
                Ok(Reply::line(render::status_line(&snapshot, theme)))
            }

            Command::Clear => {
                self.handle.clear().await?;
                Ok(Reply::line("Queue cleared."))
            }

            Command::Fave(position) => {
                let track = self.track_at(position).await?;
                Ok(Reply::line(if self.library.add_favorite(&track.id)? {
                    format!("★ Added \"{}\" to favorites.", track.title)
                } else {
                    render::hint_line(&format!("\"{}\" is already a favorite.", track.title))
                }))
            }

            Command::Unfave(position) => {
                let track = self.track_at(position).await?;
                Ok(Reply::line(if self.library.remove_favorite(&track.id)? {
                    format!("Removed \"{}\" from favorites.", track.title)
                } else {
                    render::hint_line(&format!("\"{}\" was not a favorite.", track.title))
                }))
            }

            Command::Faves => {
                let ids = self.library.favorites().to_vec();
                if ids.is_empty() {
                    return Ok(Reply::line(render::hint_line("No favorites yet. `fave` adds the current track.")));
                }
                let tracks = self.catalog.tracks(&ids).await?;
                let mut lines = render::search_lines(&tracks, theme);
                if tracks.len() < ids.len() {
                    lines.push(render::hint_line(&format!(
                        "{} favorite(s) are no longer available.",
                        ids.len() - tracks.len()
                    )));
                }
                Ok(Reply::Lines(lines))
            }

            Command::Save(name) => {
                let snapshot = self.handle.snapshot().await?;
                if snapshot.tracks.is_empty() {
                    return Ok(Reply::line(render::hint_line("The queue is empty; nothing to save.")));
                }
                let ids = snapshot.tracks.iter().map(|t| t.id.clone()).collect();
                let replaced = self.library.save_playlist(&name, ids)?;
                Ok(Reply::line(format!(
                    "Saved {} tracks to \"{}\"{}.",
                    snapshot.tracks.len(),
                    name,
                    if replaced { " (replaced)" } else { "" }
                )))
            }

            Command::Load(name) => {
                let ids = self.library.playlist(&name)?.to_vec();
                let tracks = self.catalog.tracks(&ids).await?;
                if tracks.is_empty() {
                    return Err(Error::NoResults(format!("playlist \"{}\"", name)));
                }
                let skipped = ids.len() - tracks.len();
                let count = self.handle.load(tracks).await?;

                let mut lines = vec![format!("Loaded {} tracks from \"{}\".", count, name)];
                if skipped > 0 {
                    lines.push(render::hint_line(&format!("{} track(s) are no longer available.", skipped)));
                }
                Ok(Reply::Lines(lines))
            }

            Command::Delete(name) => {
                self.library.delete_playlist(&name)?;
                Ok(Reply::line(format!("Deleted \"{}\".", name)))
            }

            Command::Playlists => {
                let entries: Vec<(&str, String)> = self
                    .library
                    .playlists()
                    .into_iter()
                    .map(|(name, count)| (name, format!("{} tracks", count)))
                    .collect();
                if entries.is_empty() {
                    return Ok(Reply::line(render::hint_line("No playlists yet. `save <name>` stores the queue.")));
                }
                Ok(Reply::Lines(render::key_value_lines(&entries, theme)))
            }

            Command::Config(action) => self.configure(action),

            Command::Help => Ok(Reply::Lines(render::help_lines(theme))),

            Command::Exit => Ok(Reply::Exit),
        }
    }

    async fn start_station(&mut self, seed: StationSeed) -> Result<Reply> {
        let limit = self.config.station_policy().query_limit();

        let (seed, tracks) = match seed {
            StationSeed::Query(query) => {
                let page = self.catalog.search(&query, limit).await?;
                (Seed::Query(query), page.tracks)
            }
            StationSeed::Track(reference) => {
                let first = reference.lookup(self.catalog.as_ref()).await?;
                let related = match self.catalog.related(&first.id, limit).await {
                    Ok(related) => related,
                    Err(e) => {
                        warn!(track = %first.id, error = %e, "No related tracks for the station seed");
                        Vec::new()
                    }
                };
                let seed = Seed::Track(first.id.clone());
                (seed, std::iter::once(first).chain(related).collect())
            }
        };

        let label = seed.to_string();
        let count = self.handle.start_station(seed, tracks).await?;
        Ok(Reply::line(format!("📻 Station {} started with {} tracks.", label, count)))
    }

    fn configure(&mut self, action: ConfigAction) -> Result<Reply> {
        let theme = self.config.theme();
        match action {
            ConfigAction::List => Ok(Reply::Lines(render::key_value_lines(&self.config.entries(), theme))),
            ConfigAction::Get(key) => Ok(Reply::line(format!("{} = {}", key, self.config.get(&key)?))),
            ConfigAction::Set(key, value) => {
                let mut updated = self.config.clone();
                updated.set(&key, &value)?;
                self.app_config.save(&updated)?;
                self.config = updated;

                if key.starts_with("station.") {
                    self.handle.set_policy(self.config.station_policy())?;
                }
                let mut lines = vec![format!("{} = {}", key, self.config.get(&key)?)];
                if key == "client_id" {
                    lines.push(render::hint_line("The new client id is used from the next start."));
                }
                Ok(Reply::Lines(lines))
            }
        }
    }

    /// `#n` from the queue, or the current track.
    async fn track_at(&self, position: Option<usize>) -> Result<Track> {
        let snapshot = self.handle.snapshot().await?;
        match position {
            Some(index) => snapshot.track_at(index).cloned(),
            None => snapshot
                .current_track()
                .cloned()
                .ok_or_else(|| Error::NotFound("current track".to_string())),
        }
    }
}

/// Blocking input lives on its own thread so it never holds up shutdown.
/// The channel closes at end of input or on a read error.
fn spawn_line_reader<R>(input: R) -> mpsc::UnboundedReceiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let spawned = thread::Builder::new().name("scplay-stdin".to_string()).spawn(move || {
        for line in input.lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    if let Err(e) = spawned {
        // Dropping the sender ends the session as if input had closed
        warn!(error = %e, "Could not start the input thread");
    }
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_line_reader_forwards_lines_until_end_of_input() {
        let mut lines = spawn_line_reader(Cursor::new("search lofi\n\nexit\n"));

        assert_eq!(lines.recv().await.as_deref(), Some("search lofi"));
        assert_eq!(lines.recv().await.as_deref(), Some(""));
        assert_eq!(lines.recv().await.as_deref(), Some("exit"));
        assert_eq!(lines.recv().await, None);
    }

    #[tokio::test]
    async fn test_line_reader_stops_on_invalid_input() {
        let mut lines = spawn_line_reader(Cursor::new(b"ok\n\xff\xfe\nlater\n".to_vec()));

        assert_eq!(lines.recv().await.as_deref(), Some("ok"));
        assert_eq!(lines.recv().await, None);
    }
}
