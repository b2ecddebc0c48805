//! Station mode: seeds, refill policy and the no-repeat bookkeeping.

use std::collections::HashSet;
use std::fmt;

use super::traits::{Track, TrackId};

/// What a station is derived from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seed {
    /// Free text, answered with a catalog search.
    Query(String),
    /// A track, answered with its related tracks.
    Track(TrackId),
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(query) => write!(f, "\"{}\"", query),
            Self::Track(id) => write!(f, "track {}", id),
        }
    }
}

/// Tunables for station refills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationPolicy {
    /// Refill once fewer than this many tracks remain after the current one.
    pub low_water_mark: usize,
    /// Upper bound on tracks appended per refill.
    pub batch_size: usize,
}

impl Default for StationPolicy {
    fn default() -> Self {
        Self {
            low_water_mark: 2,
            batch_size: 10,
        }
    }
}

impl StationPolicy {
    pub fn needs_refill(&self, remaining: usize) -> bool {
        remaining < self.low_water_mark
    }

    /// How many candidates to ask the catalog for; filtering eats some.
    pub fn query_limit(&self) -> usize {
        self.batch_size.saturating_mul(2).max(10)
    }
}

#[derive(Debug, Clone)]
pub struct StationState {
    seed: Seed,
    surfaced: HashSet<TrackId>,
    stalled_on: Option<Seed>,
}

impl StationState {
    pub fn new(seed: Seed) -> Self {
        Self {
            seed,
            surfaced: HashSet::new(),
            stalled_on: None,
        }
    }

    pub fn seed(&self) -> &Seed {
        &self.seed
    }

    /// The station drifts with listening: the last played track wins over
    /// the original seed.
    pub fn refill_seed(&self, last_played: Option<&TrackId>) -> Seed {
        match last_played {
            Some(id) => Seed::Track(id.clone()),
            None => self.seed.clone(),
        }
    }

    pub fn is_stalled_on(&self, seed: &Seed) -> bool {
        self.stalled_on.as_ref() == Some(seed)
    }

    pub fn stall(&mut self, seed: Seed) {
        self.stalled_on = Some(seed);
    }

    /// Keeps candidates that were never surfaced and are not queued, up to
    /// `cap`, and remembers them as surfaced.
    pub fn admit(&mut self, candidates: Vec<Track>, queued: &[Track], cap: usize) -> Vec<Track> {
        let in_queue: HashSet<&TrackId> = queued.iter().map(|t| &t.id).collect();
        let mut admitted = Vec::new();

        for track in candidates {
            if admitted.len() >= cap {
                break;
            }
            if in_queue.contains(&track.id) || self.surfaced.contains(&track.id) {
                continue;
            }
            self.surfaced.insert(track.id.clone());
            admitted.push(track);
        }

        if !admitted.is_empty() {
            self.stalled_on = None;
        }
        admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str) -> Track {
        Track {
            id: TrackId::from(id),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            duration_secs: 200,
            stream_uri: format!("https://example.invalid/{}", id),
            artwork_uri: None,
            permalink_url: None,
            genre: None,
        }
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_admit_skips_queued_and_surfaced() {
        let mut station = StationState::new(Seed::Query("synthwave".into()));
        let queued = vec![track("a")];

        let first = station.admit(vec![track("a"), track("b"), track("c")], &queued, 10);
        assert_eq!(ids(&first), vec!["b", "c"]);

        // "b" was surfaced already even though it is not queued here
        let second = station.admit(vec![track("b"), track("d")], &[], 10);
        assert_eq!(ids(&second), vec!["d"]);
        let third = station.admit(vec![track("c"), track("e")], &[], 10);
        assert_eq!(ids(&third), vec!["e"]);
    }

    #[test]
    fn test_admit_drops_duplicates_within_batch() {
        let mut station = StationState::new(Seed::Query("x".into()));
        let admitted = station.admit(vec![track("a"), track("a"), track("b")], &[], 10);
        assert_eq!(ids(&admitted), vec!["a", "b"]);
    }

    #[test]
    fn test_admit_respects_cap() {
        for cap in [1, 2, 5] {
            let mut station = StationState::new(Seed::Query("x".into()));
            let candidates: Vec<Track> = (0..8).map(|i| track(&i.to_string())).collect();
            let admitted = station.admit(candidates, &[], cap);
            assert_eq!(admitted.len(), cap);
        }
    }

    #[test]
    fn test_refill_seed_prefers_last_played() {
        let station = StationState::new(Seed::Query("lofi".into()));
        assert_eq!(station.refill_seed(None), Seed::Query("lofi".into()));

        let last = TrackId::from("77");
        assert_eq!(station.refill_seed(Some(&last)), Seed::Track(last.clone()));
    }

    #[test]
    fn test_stall_is_cleared_by_new_tracks() {
        let mut station = StationState::new(Seed::Query("x".into()));
        let seed = Seed::Track(TrackId::from("1"));
        station.stall(seed.clone());
        assert!(station.is_stalled_on(&seed));
        assert!(!station.is_stalled_on(&Seed::Track(TrackId::from("2"))));

        station.admit(vec![track("9")], &[], 10);
        assert!(!station.is_stalled_on(&seed));
    }

    #[test]
    fn test_policy_low_water_mark() {
        let policy = StationPolicy {
            low_water_mark: 2,
            batch_size: 10,
        };
        assert!(policy.needs_refill(0));
        assert!(policy.needs_refill(1));
        assert!(!policy.needs_refill(2));
        assert_eq!(policy.query_limit(), 20);
    }
}
