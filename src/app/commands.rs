//! REPL command parsing.

use fuzzy_matcher::{skim::SkimMatcherV2, FuzzyMatcher};
use thiserror::Error;

use crate::catalog::TrackRef;

/// Usage line and description for `help`, in display order.
pub const COMMANDS: &[(&str, &str)] = &[
    ("search <query>", "Search SoundCloud for tracks"),
    ("more", "Show the next page of the last search"),
    ("play [#n|id|url]", "Play a queue position or a track; no argument resumes"),
    ("pause", "Pause playback"),
    ("resume", "Resume playback"),
    ("stop", "Stop playback and leave station mode"),
    ("next, n", "Skip to the next track"),
    ("prev, p", "Go back one track"),
    ("queue [id|url]", "Add a track to the queue; no argument shows the queue"),
    ("station <query|id|url>", "Start an endless station from a search or a track"),
    ("info [#n]", "Show track details and album art"),
    ("status", "Show what is playing"),
    ("clear", "Stop and empty the queue"),
    ("fave [#n]", "Add the current (or #n) track to favorites"),
    ("unfave [#n]", "Remove the current (or #n) track from favorites"),
    ("faves", "List favorites"),
    ("save <name>", "Save the queue as a playlist"),
    ("load <name>", "Replace the queue with a playlist and play it"),
    ("delete <name>", "Delete a playlist"),
    ("playlists", "List saved playlists"),
    ("config [get <key> | set <key> <value>]", "Show or change settings"),
    ("help", "Show this help"),
    ("exit, quit, q", "Leave scplay"),
];

/// Every word that starts a command, aliases included.
const NAMES: &[&str] = &[
    "search", "more", "play", "pause", "resume", "stop", "next", "n", "prev", "p", "queue",
    "station", "info", "status", "clear", "fave", "unfave", "faves", "save", "load", "delete",
    "playlists", "config", "help", "exit", "quit", "q",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// 0-based queue index
    Position(usize),
    Track(TrackRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationSeed {
    Track(TrackRef),
    Query(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    List,
    Get(String),
    Set(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Search(String),
    More,
    Play(Option<Target>),
    Pause,
    Resume,
    Stop,
    Next,
    Prev,
    Queue(Option<TrackRef>),
    Station(StationSeed),
    Info(Option<usize>),
    Status,
    Clear,
    Fave(Option<usize>),
    Unfave(Option<usize>),
    Faves,
    Save(String),
    Load(String),
    Delete(String),
    Playlists,
    Config(ConfigAction),
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command `{command}`{}", did_you_mean(.suggestion))]
    Unknown {
        command: String,
        suggestion: Option<&'static str>,
    },

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("`{0}` is not a queue position (positions look like #1)")]
    BadPosition(String),
}

fn did_you_mean(suggestion: &Option<&'static str>) -> String {
    suggestion
        .map(|s| format!("; did you mean `{}`?", s))
        .unwrap_or_default()
}

/// Splits on whitespace; double quotes group words.
pub fn split_args(line: &str) -> Result<Vec<String>, ParseError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_token = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_quotes {
        return Err(ParseError::UnterminatedQuote);
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

/// Edits (swaps included) a typo may be away from a suggested command.
const MAX_TYPO_DISTANCE: usize = 2;

/// Closest known command name, if any is close enough. Fuzzy subsequence
/// matches win; swapped or mistyped letters fall back to edit distance.
pub fn suggest(input: &str) -> Option<&'static str> {
    let matcher = SkimMatcherV2::default();
    let names = NAMES.iter().copied().filter(|name| name.len() > 1);

    names
        .clone()
        .filter_map(|name| matcher.fuzzy_match(name, input).map(|score| (score, name)))
        .max_by_key(|(score, _)| *score)
        .map(|(_, name)| name)
        .or_else(|| {
            names
                .map(|name| (strsim::damerau_levenshtein(name, input), name))
                .filter(|(distance, _)| *distance <= MAX_TYPO_DISTANCE)
                .min_by_key(|(distance, _)| *distance)
                .map(|(_, name)| name)
        })
}

fn parse_position(arg: &str) -> Result<usize, ParseError> {
    arg.strip_prefix('#')
        .and_then(|n| n.parse::<usize>().ok())
        .filter(|n| *n >= 1)
        .map(|n| n - 1)
        .ok_or_else(|| ParseError::BadPosition(arg.to_string()))
}

fn optional_position(args: &[String], usage: &'static str) -> Result<Option<usize>, ParseError> {
    match args {
        [] => Ok(None),
        [arg] => parse_position(arg).map(Some),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn required_text(args: &[String], usage: &'static str) -> Result<String, ParseError> {
    let text = args.join(" ");
    if text.trim().is_empty() {
        return Err(ParseError::Usage(usage));
    }
    Ok(text.trim().to_string())
}

fn no_args(command: Command, args: &[String], usage: &'static str) -> Result<Command, ParseError> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::Usage(usage))
    }
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
    let words = split_args(line)?;
    let Some((name, args)) = words.split_first() else {
        return Ok(None);
    };

    let command = match name.to_lowercase().as_str() {
        "search" => Command::Search(required_text(args, "search <query>")?),
        "more" => no_args(Command::More, args, "more")?,
        "play" => match args {
            [] => Command::Play(None),
            [arg] if arg.starts_with('#') => Command::Play(Some(Target::Position(parse_position(arg)?))),
            [arg] => Command::Play(Some(Target::Track(
                TrackRef::parse(arg).ok_or(ParseError::Usage("play [#n|id|url]"))?,
            ))),
            _ => return Err(ParseError::Usage("play [#n|id|url]")),
        },
        "pause" => no_args(Command::Pause, args, "pause")?,
        "resume" => no_args(Command::Resume, args, "resume")?,
        "stop" => no_args(Command::Stop, args, "stop")?,
        "next" | "n" => no_args(Command::Next, args, "next")?,
        "prev" | "p" => no_args(Command::Prev, args, "prev")?,
        "queue" => match args {
            [] => Command::Queue(None),
            [arg] => Command::Queue(Some(
                TrackRef::parse(arg).ok_or(ParseError::Usage("queue [id|url]"))?,
            )),
            _ => return Err(ParseError::Usage("queue [id|url]")),
        },
        "station" => {
            let text = required_text(args, "station <query|id|url>")?;
            match TrackRef::parse(&text) {
                Some(reference) => Command::Station(StationSeed::Track(reference)),
                None => Command::Station(StationSeed::Query(text)),
            }
        }
        "info" => Command::Info(optional_position(args, "info [#n]")?),
        "status" => no_args(Command::Status, args, "status")?,
        "clear" => no_args(Command::Clear, args, "clear")?,
        "fave" => Command::Fave(optional_position(args, "fave [#n]")?),
        "unfave" => Command::Unfave(optional_position(args, "unfave [#n]")?),
        "faves" => no_args(Command::Faves, args, "faves")?,
        "save" => Command::Save(required_text(args, "save <name>")?),
        "load" => Command::Load(required_text(args, "load <name>")?),
        "delete" => Command::Delete(required_text(args, "delete <name>")?),
        "playlists" => no_args(Command::Playlists, args, "playlists")?,
        "config" => Command::Config(match args {
            [] => ConfigAction::List,
            [get, key] if get == "get" => ConfigAction::Get(key.clone()),
            [set, key, value @ ..] if set == "set" && !value.is_empty() => {
                ConfigAction::Set(key.clone(), value.join(" "))
            }
            _ => return Err(ParseError::Usage("config [get <key> | set <key> <value>]")),
        }),
        "help" | "?" => Command::Help,
        "exit" | "quit" | "q" => Command::Exit,
        other => {
            return Err(ParseError::Unknown {
                command: other.to_string(),
                suggestion: suggest(other),
            })
        }
    };

    Ok(Some(command))
}
