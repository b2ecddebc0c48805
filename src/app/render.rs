//! Text output for the REPL: tables, notices and status lines.

use std::fmt::Display;

use crossterm::style::{Color, Stylize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::commands::COMMANDS;
use crate::player::{Notice, PlayerState, Snapshot, Track};

const TITLE_WIDTH: usize = 42;
const ARTIST_WIDTH: usize = 24;
const ID_WIDTH: usize = 12;

/// Truncates to `width` display columns (with an ellipsis) and pads.
pub fn fit(text: &str, width: usize) -> String {
    let text = text.replace(['\n', '\t'], " ");
    if text.width() <= width {
        let padding = width - text.width();
        return format!("{}{}", text, " ".repeat(padding));
    }

    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    used += 1;
    out.push_str(&" ".repeat(width.saturating_sub(used)));
    out
}

pub fn error_line(err: &dyn Display) -> String {
    format!("{} {}", "error:".red().bold(), err)
}

pub fn hint_line(text: &str) -> String {
    text.dark_grey().to_string()
}

fn track_columns(track: &Track) -> String {
    format!(
        "{}  {}  {:>8}",
        fit(&track.title, TITLE_WIDTH),
        fit(&track.artist, ARTIST_WIDTH),
        track.duration_label()
    )
}

fn header(first: &str, first_width: usize, theme: Color) -> String {
    format!(
        "{}  {}  {}  {:>8}",
        fit(first, first_width),
        fit("Title", TITLE_WIDTH),
        fit("Artist", ARTIST_WIDTH),
        "Length"
    )
    .with(theme)
    .bold()
    .to_string()
}

/// Search results, identified by catalog id.
pub fn search_lines(tracks: &[Track], theme: Color) -> Vec<String> {
    let mut lines = vec![header("ID", ID_WIDTH, theme)];
    lines.extend(
        tracks
            .iter()
            .map(|track| format!("{}  {}", fit(track.id.as_str(), ID_WIDTH), track_columns(track))),
    );
    lines
}

pub fn queue_lines(snapshot: &Snapshot, theme: Color) -> Vec<String> {
    if snapshot.tracks.is_empty() {
        return vec![hint_line("Queue is empty.")];
    }

    let mut lines = Vec::with_capacity(snapshot.tracks.len() + 2);
    if let Some(seed) = &snapshot.station {
        let refilling = if snapshot.refilling { " (finding more…)" } else { "" };
        lines.push(format!("📻 Station: {}{}", seed, refilling).with(theme).to_string());
    }
    lines.push(header("  #", 6, theme));

    for (index, track) in snapshot.tracks.iter().enumerate() {
        let is_current = !snapshot.awaiting_refill && snapshot.position == Some(index);
        let marker = if is_current { "▶" } else { " " };
        let row = format!("{} {}  {}", marker, fit(&format!("#{}", index + 1), 4), track_columns(track));
        lines.push(if is_current {
            row.green().bold().to_string()
        } else {
            row
        });
    }
    lines
}

pub fn status_line(snapshot: &Snapshot, theme: Color) -> String {
    let Some(track) = snapshot.current_track() else {
        return if snapshot.is_station_active() && snapshot.state == PlayerState::Loading {
            "Finding more tracks for the station…".to_string()
        } else {
            hint_line("Nothing playing.")
        };
    };

    let icon = match snapshot.state {
        PlayerState::Playing => "▶",
        PlayerState::Paused => "⏸",
        PlayerState::Loading => "…",
        PlayerState::Stopped => "■",
    };
    let position = snapshot
        .position
        .map(|p| format!(" [{}/{}]", p + 1, snapshot.tracks.len()))
        .unwrap_or_default();
    let station = snapshot
        .station
        .as_ref()
        .map(|seed| format!("  📻 {}", seed))
        .unwrap_or_default();

    format!(
        "{} {} {} {} ({}, {}){}{}",
        icon,
        track.title.as_str().with(theme).bold(),
        "by".dark_grey(),
        track.artist,
        track.duration_label(),
        snapshot.state,
        position,
        station
    )
}

pub fn notice_line(notice: &Notice, theme: Color) -> String {
    match notice {
        Notice::NowPlaying(track) => format!(
            "{} {} {} {}",
            "♪ Now playing:".with(theme).bold(),
            track.title,
            "by".dark_grey(),
            track.artist
        ),
        Notice::Retrying(track) => format!("{} retrying \"{}\"…", "⚠".yellow(), track.title),
        Notice::PlaybackFailed { track, cause } => format!(
            "{} could not play \"{}\": {}",
            "✗".red().bold(),
            track.title,
            cause
        ),
        Notice::StationExtended { added } => {
            hint_line(&format!("📻 Station added {} track{}.", added, if *added == 1 { "" } else { "s" }))
        }
        Notice::StationStalled => format!(
            "{} The station ran out of new tracks; it stops after the queue.",
            "⚠".yellow()
        ),
        Notice::QueueEnded => hint_line("End of queue."),
        Notice::Halted { reason } => error_line(reason),
    }
}

pub fn info_lines(track: &Track, is_favorite: bool, theme: Color) -> Vec<String> {
    let mut lines = vec![
        format!("{}{}", track.title.as_str().with(theme).bold(), if is_favorite { " ★" } else { "" }),
        format!("{:<10}{}", "Artist", track.artist),
        format!("{:<10}{}", "Length", track.duration_label()),
        format!("{:<10}{}", "ID", track.id),
    ];
    if let Some(genre) = &track.genre {
        lines.push(format!("{:<10}{}", "Genre", genre));
    }
    if let Some(url) = &track.permalink_url {
        lines.push(format!("{:<10}{}", "URL", url));
    }
    lines
}

pub fn help_lines(theme: Color) -> Vec<String> {
    let width = COMMANDS.iter().map(|(usage, _)| usage.width()).max().unwrap_or(0);
    let mut lines = vec!["Commands".with(theme).bold().to_string()];
    lines.extend(
        COMMANDS
            .iter()
            .map(|(usage, description)| format!("  {}  {}", fit(usage, width).with(theme), description)),
    );
    lines.push(hint_line("  #n is a 1-based queue position. Quote arguments with spaces: save \"road trip\""));
    lines
}

pub fn key_value_lines(entries: &[(&str, String)], theme: Color) -> Vec<String> {
    let width = entries.iter().map(|(key, _)| key.width()).max().unwrap_or(0);
    entries
        .iter()
        .map(|(key, value)| format!("  {}  {}", fit(key, width).with(theme), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{Seed, TrackId};

    fn track(id: &str, title: &str) -> Track {
        Track {
            id: TrackId::from(id),
            title: title.to_string(),
            artist: "Artist".to_string(),
            duration_secs: 61,
            stream_uri: String::new(),
            artwork_uri: None,
            permalink_url: None,
            genre: None,
        }
    }

    #[test]
    fn test_fit_pads_and_truncates() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdef", 5), "abcd…");
        assert_eq!(fit("abcde", 5), "abcde");
        assert_eq!(fit("", 2), "  ");
    }

    #[test]
    fn test_fit_counts_wide_characters() {
        // Each ideograph takes two columns
        let fitted = fit("東京の夜", 5);
        assert_eq!(fitted.width(), 5);
        assert!(fitted.ends_with('…'));
        assert_eq!(fit("東京", 6).width(), 6);
    }

    #[test]
    fn test_queue_marks_current_track() {
        let snapshot = Snapshot {
            tracks: vec![track("1", "First"), track("2", "Second")],
            position: Some(1),
            state: PlayerState::Playing,
            station: Some(Seed::Query("lofi".into())),
            refilling: false,
            awaiting_refill: false,
        };

        let lines = queue_lines(&snapshot, Color::Cyan);

        assert!(lines[0].contains("Station: \"lofi\""));
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains("▶"));
        assert!(lines[3].contains("#2"));
        assert!(!lines[2].contains("▶"));
    }

    #[test]
    fn test_waiting_station_shows_no_current_track() {
        let snapshot = Snapshot {
            tracks: vec![track("1", "First")],
            position: Some(0),
            state: PlayerState::Loading,
            station: Some(Seed::Query("lofi".into())),
            refilling: true,
            awaiting_refill: true,
        };

        assert!(status_line(&snapshot, Color::Cyan).contains("Finding more tracks"));
        let lines = queue_lines(&snapshot, Color::Cyan);
        assert!(lines.iter().all(|line| !line.contains("▶")));
    }

    #[test]
    fn test_status_without_track() {
        let snapshot = Snapshot {
            tracks: Vec::new(),
            position: None,
            state: PlayerState::Stopped,
            station: None,
            refilling: false,
            awaiting_refill: false,
        };
        assert!(status_line(&snapshot, Color::Cyan).contains("Nothing playing"));
    }

    #[test]
    fn test_help_lists_every_command() {
        let lines = help_lines(Color::Cyan);
        assert_eq!(lines.len(), COMMANDS.len() + 2);
    }
}
