//! The playback queue and station state machine.
//!
//! `PlayQueue` is synchronous and has exactly one owner, the controller task.
//! It drives the engine directly and leaves two kinds of output behind for
//! its owner: [`Notice`]s for the user and at most one [`RefillRequest`] to
//! run against the catalog. Refill results come back through
//! [`PlayQueue::apply_refill`] and are ignored unless their generation is
//! still current.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::station::{Seed, StationPolicy, StationState};
use super::traits::{EngineEvent, PlayerState, PlayerTrait, Track, TrackId};
use crate::error::{Error, Result};

/// Initial attempt plus one retry.
const MAX_PLAY_ATTEMPTS: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub enum PlayTarget {
    /// 0-based queue index
    Index(usize),
    Track(Track),
}

/// Outcome of a `next()`.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Moved(Track),
    /// End of a station queue; playback resumes when the refill lands.
    AwaitingRefill,
    Ended,
    /// Nothing was current.
    Idle,
}

/// Things the user should hear about that did not come from a command reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying(Track),
    Retrying(Track),
    PlaybackFailed { track: Track, cause: String },
    StationExtended { added: usize },
    StationStalled,
    QueueEnded,
    Halted { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefillRequest {
    pub generation: u64,
    /// What the catalog is asked about.
    pub seed: Seed,
    /// The listening-derived seed that triggered this refill.
    pub drift: Seed,
}

impl RefillRequest {
    pub fn is_fallback(&self) -> bool {
        self.seed != self.drift
    }
}

/// Read-only copy of the queue for display.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tracks: Vec<Track>,
    pub position: Option<usize>,
    pub state: PlayerState,
    pub station: Option<Seed>,
    pub refilling: bool,
    /// The station queue ran out and playback waits for the refill; the
    /// track at `position` has already finished.
    pub awaiting_refill: bool,
}

impl Snapshot {
    pub fn current_track(&self) -> Option<&Track> {
        if self.awaiting_refill {
            return None;
        }
        self.position.and_then(|i| self.tracks.get(i))
    }

    pub fn is_station_active(&self) -> bool {
        self.station.is_some()
    }

    pub fn track_at(&self, index: usize) -> Result<&Track> {
        self.tracks
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("queue position {}", index + 1)))
    }
}

pub struct PlayQueue {
    engine: Arc<dyn PlayerTrait>,
    policy: StationPolicy,
    tracks: Vec<Track>,
    position: Option<usize>,
    state: PlayerState,
    station: Option<StationState>,
    generation: u64,
    /// Play attempts for the current position
    attempts: u8,
    last_played: Option<TrackId>,
    refill_in_flight: bool,
    awaiting_refill: bool,
    /// `pause` arrived while the stream was still loading
    pause_requested: bool,
    pending_refill: Option<RefillRequest>,
    notices: Vec<Notice>,
}

impl PlayQueue {
    pub fn new(engine: Arc<dyn PlayerTrait>, policy: StationPolicy) -> Self {
        Self {
            engine,
            policy,
            tracks: Vec::new(),
            position: None,
            state: PlayerState::Stopped,
            station: None,
            generation: 0,
            attempts: 0,
            last_played: None,
            refill_in_flight: false,
            awaiting_refill: false,
            pause_requested: false,
            pending_refill: None,
            notices: Vec::new(),
        }
    }

    pub fn policy(&self) -> StationPolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: StationPolicy) {
        debug!(?policy, "Station policy updated");
        self.policy = policy;
    }

    pub fn playback_state(&self) -> PlayerState {
        self.state
    }

    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.position.and_then(|i| self.tracks.get(i))
    }

    pub fn is_station_active(&self) -> bool {
        self.station.is_some()
    }

    pub fn queue_snapshot(&self) -> Snapshot {
        Snapshot {
            tracks: self.tracks.clone(),
            position: self.position,
            state: self.state,
            station: self.station.as_ref().map(|s| s.seed().clone()),
            refilling: self.refill_in_flight,
            awaiting_refill: self.awaiting_refill,
        }
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn take_refill_request(&mut self) -> Option<RefillRequest> {
        self.pending_refill.take()
    }

    // --- Commands ---

    /// Appends a track. Starts it right away when nothing is playing.
    /// Queueing by hand takes the queue out of station mode.
    pub fn enqueue(&mut self, track: Track) -> Result<usize> {
        let was_waiting = self.awaiting_refill;
        if self.station.take().is_some() {
            info!("Manual enqueue ends station mode");
            self.invalidate();
        }

        self.tracks.push(track);
        let index = self.tracks.len() - 1;

        if self.state == PlayerState::Stopped || was_waiting {
            self.start(index)?;
        }
        Ok(index)
    }

    pub fn play(&mut self, target: PlayTarget) -> Result<Track> {
        let index = match target {
            PlayTarget::Index(index) if index < self.tracks.len() => index,
            PlayTarget::Index(index) => {
                return Err(Error::NotFound(format!("queue position {}", index + 1)))
            }
            PlayTarget::Track(track) => match self.tracks.iter().position(|t| t.id == track.id) {
                Some(existing) => existing,
                None => {
                    let at = self.position.map_or(self.tracks.len(), |p| p + 1);
                    self.tracks.insert(at, track);
                    at
                }
            },
        };

        self.start(index)?;
        Ok(self.tracks[index].clone())
    }

    /// While a track is loading the pause is remembered and applied as soon
    /// as the engine reports the start.
    pub fn pause(&mut self) -> Result<PlayerState> {
        match self.state {
            PlayerState::Playing => {
                self.engine.pause().map_err(|e| self.engine_error(e))?;
                self.state = PlayerState::Paused;
            }
            PlayerState::Loading => self.pause_requested = true,
            PlayerState::Paused | PlayerState::Stopped => {}
        }
        Ok(self.state)
    }

    pub fn resume(&mut self) -> Result<PlayerState> {
        match self.state {
            PlayerState::Paused => {
                self.engine.resume().map_err(|e| self.engine_error(e))?;
                self.state = PlayerState::Playing;
            }
            PlayerState::Loading => self.pause_requested = false,
            PlayerState::Playing | PlayerState::Stopped => {}
        }
        Ok(self.state)
    }


    pub fn next(&mut self) -> Result<Advance> {
        let Some(index) = self.position else {
            return Ok(Advance::Idle);
        };

        if index + 1 < self.tracks.len() {
            self.start(index + 1)?;
            return Ok(Advance::Moved(self.tracks[index + 1].clone()));
        }

        if self.station.is_some() {
            if let Err(e) = self.engine.stop() {
                warn!(error = %e, "Engine stop failed");
            }
            self.state = PlayerState::Loading;
            self.awaiting_refill = true;
            if self.maybe_request_refill() {
                return Ok(Advance::AwaitingRefill);
            }
            self.awaiting_refill = false;
            self.notices.push(Notice::StationStalled);
        }

        self.finish_queue();
        Ok(Advance::Ended)
    }

    pub fn prev(&mut self) -> Result<Option<Track>> {
        match self.position {
            Some(index) if index > 0 => {
                self.start(index - 1)?;
                Ok(self.current_track().cloned())
            }
            _ => Ok(None),
        }
    }

    /// Stops playback and leaves station mode. The queue itself is kept.
    pub fn stop(&mut self) {
        if let Err(e) = self.engine.stop() {
            warn!(error = %e, "Engine stop failed");
        }
        self.halt();
        if self.station.take().is_some() {
            info!("Station stopped");
        }
        self.invalidate();
    }

    pub fn clear(&mut self) {
        self.stop();
        self.tracks.clear();
    }

    /// Replaces the queue with a fresh station built from `candidates`, the
    /// answer to the initial catalog query for `seed`.
    pub fn start_station(&mut self, seed: Seed, candidates: Vec<Track>) -> Result<usize> {
        if candidates.is_empty() {
            return Err(Error::NoResults(seed.to_string()));
        }

        self.stop();
        self.last_played = None;

        let mut station = StationState::new(seed);
        self.tracks = station.admit(candidates, &[], self.policy.batch_size.max(1));
        info!(seed = %station.seed(), tracks = self.tracks.len(), "Station started");
        self.station = Some(station);

        self.start(0)?;
        Ok(self.tracks.len())
    }

    /// Replaces the queue wholesale (playlist load).
    pub fn load(&mut self, tracks: Vec<Track>) -> Result<usize> {
        self.stop();
        self.tracks = tracks;
        if !self.tracks.is_empty() {
            self.start(0)?;
        }
        Ok(self.tracks.len())
    }

    // --- Engine events ---

    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Started(id) => self.on_track_started(&id),
            EngineEvent::Finished(id) => self.on_track_finished(&id),
            EngineEvent::Failed(id, cause) => self.on_track_failed(&id, cause),
        }
    }

    pub fn on_track_started(&mut self, id: &TrackId) {
        if !self.is_current(id) || self.state != PlayerState::Loading {
            debug!(track = %id, "Ignoring start of a track that is no longer current");
            return;
        }

        self.state = PlayerState::Playing;
        if std::mem::take(&mut self.pause_requested) {
            match self.engine.pause() {
                Ok(()) => self.state = PlayerState::Paused,
                Err(e) => warn!(track = %id, error = %e, "Could not apply the requested pause"),
            }
        }
        self.last_played = Some(id.clone());
        if let Some(track) = self.current_track().cloned() {
            info!(track = %track.id, title = %track.title, "Now playing");
            self.notices.push(Notice::NowPlaying(track));
        }
        self.maybe_request_refill();
    }

    pub fn on_track_finished(&mut self, id: &TrackId) {
        if !self.is_current(id)
            || !matches!(self.state, PlayerState::Playing | PlayerState::Paused)
        {
            debug!(track = %id, "Ignoring finish of a track that is no longer current");
            return;
        }

        debug!(track = %id, "Track finished");
        self.advance_after_event();
    }

    pub fn on_track_failed(&mut self, id: &TrackId, cause: String) {
        if !self.is_current(id) || !self.state.is_active() {
            debug!(track = %id, "Ignoring failure of a track that is no longer current");
            return;
        }
        let Some(track) = self.current_track().cloned() else {
            return;
        };

        if self.attempts < MAX_PLAY_ATTEMPTS {
            warn!(track = %id, cause = %cause, "Playback failed, retrying");
            self.notices.push(Notice::Retrying(track));
            if let Err(e) = self.launch() {
                self.notices.push(Notice::Halted {
                    reason: e.to_string(),
                });
            }
            return;
        }

        warn!(track = %id, cause = %cause, attempts = self.attempts, "Playback failed again, skipping");
        self.notices.push(Notice::PlaybackFailed { track, cause });
        self.advance_after_event();
    }

    // --- Station refills ---

    /// Applies the catalog's answer to `request`. Returns whether the queue
    /// changed or a follow-up query was issued.
    pub fn apply_refill(&mut self, request: RefillRequest, result: Result<Vec<Track>>) -> bool {
        if request.generation != self.generation {
            debug!(
                stale = request.generation,
                current = self.generation,
                "Dropping stale refill"
            );
            return false;
        }
        self.refill_in_flight = false;

        let candidates = match result {
            Ok(tracks) => tracks,
            Err(e) => {
                warn!(seed = %request.seed, error = %e, "Refill query failed, treating it as empty");
                Vec::new()
            }
        };

        let Some(station) = self.station.as_mut() else {
            return false;
        };
        let added = station.admit(candidates, &self.tracks, self.policy.batch_size);

        if added.is_empty() {
            let original = station.seed().clone();
            if !request.is_fallback() && request.drift != original {
                info!(seed = %original, "Refill came back empty, retrying with the original seed");
                self.issue_refill(original, request.drift);
                return true;
            }

            warn!(seed = %request.drift, "Station ran out of new tracks");
            station.stall(request.drift);
            if self.awaiting_refill {
                self.notices.push(Notice::StationStalled);
                self.finish_queue();
            }
            return false;
        }

        let count = added.len();
        self.tracks.extend(added);
        info!(added = count, seed = %request.seed, "Station extended");
        self.notices.push(Notice::StationExtended { added: count });

        if self.awaiting_refill {
            let next = self.position.map_or(0, |p| p + 1);
            if let Err(e) = self.start(next) {
                self.notices.push(Notice::Halted {
                    reason: e.to_string(),
                });
            }
        }
        true
    }

    fn maybe_request_refill(&mut self) -> bool {
        if self.refill_in_flight {
            return self.station.is_some();
        }
        let Some(station) = &self.station else {
            return false;
        };
        if !self.awaiting_refill && !self.policy.needs_refill(self.remaining()) {
            return false;
        }

        let drift = station.refill_seed(self.last_played.as_ref());
        if station.is_stalled_on(&drift) {
            debug!(seed = %drift, "Station is stalled on this seed, not refilling");
            return false;
        }

        self.issue_refill(drift.clone(), drift);
        true
    }

    fn issue_refill(&mut self, seed: Seed, drift: Seed) {
        debug!(seed = %seed, generation = self.generation, "Requesting station refill");
        self.refill_in_flight = true;
        self.pending_refill = Some(RefillRequest {
            generation: self.generation,
            seed,
            drift,
        });
    }

    // --- Internals ---

    fn remaining(&self) -> usize {
        match self.position {
            Some(p) => self.tracks.len().saturating_sub(p + 1),
            None => self.tracks.len(),
        }
    }

    fn is_current(&self, id: &TrackId) -> bool {
        self.current_track().is_some_and(|t| &t.id == id)
    }

    fn start(&mut self, index: usize) -> Result<()> {
        self.position = Some(index);
        self.attempts = 0;
        self.launch()
    }

    fn launch(&mut self) -> Result<()> {
        let Some(track) = self.current_track().cloned() else {
            return Ok(());
        };

        self.attempts += 1;
        self.state = PlayerState::Loading;
        self.awaiting_refill = false;
        debug!(track = %track.id, attempt = self.attempts, "Loading track");

        if let Err(e) = self.engine.play(&track.id, &track.stream_uri) {
            warn!(track = %track.id, error = %e, "Engine rejected play command");
            self.halt();
            return Err(Error::Playback {
                track: track.id,
                cause: format!("{:#}", e),
            });
        }
        Ok(())
    }

    fn advance_after_event(&mut self) {
        if let Err(e) = self.next() {
            self.notices.push(Notice::Halted {
                reason: e.to_string(),
            });
        }
    }

    /// Stops at the end of the queue. A station only gets here once it has
    /// stalled, so station mode ends too.
    fn finish_queue(&mut self) {
        if let Err(e) = self.engine.stop() {
            warn!(error = %e, "Engine stop failed");
        }
        self.halt();
        if self.station.take().is_some() {
            info!("Station ended with the queue");
            self.invalidate();
        }
        info!("Reached the end of the queue");
        self.notices.push(Notice::QueueEnded);
    }

    fn halt(&mut self) {
        self.position = None;
        self.state = PlayerState::Stopped;
        self.attempts = 0;
        self.awaiting_refill = false;
        self.pause_requested = false;
    }

    /// Outstanding refills belong to the old generation from here on.
    fn invalidate(&mut self) {
        self.generation += 1;
        self.refill_in_flight = false;
        self.pending_refill = None;
        self.awaiting_refill = false;
    }

    fn engine_error(&self, e: anyhow::Error) -> Error {
        Error::Playback {
            track: self
                .current_track()
                .map(|t| t.id.clone())
                .unwrap_or_else(|| TrackId::from("-")),
            cause: format!("{:#}", e),
        }
    }
}
