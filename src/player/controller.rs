//! The single writer around [`PlayQueue`].
//!
//! User commands, engine events and refill results all travel through one
//! unbounded channel and are applied in arrival order by one task, so a user
//! `next` and an engine `Finished` can never interleave inside the queue.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::queue::{Advance, Notice, PlayQueue, PlayTarget, RefillRequest, Snapshot};
use super::station::{Seed, StationPolicy};
use super::traits::{EngineEvent, PlayerState, Track};
use crate::catalog::Catalog;
use crate::error::{Error, Result};

type Reply<T> = oneshot::Sender<Result<T>>;

enum Message {
    Enqueue(Track, Reply<usize>),
    Play(PlayTarget, Reply<Track>),
    Pause(Reply<PlayerState>),
    Resume(Reply<PlayerState>),
    Next(Reply<Advance>),
    Prev(Reply<Option<Track>>),
    Stop(Reply<()>),
    Clear(Reply<()>),
    StartStation(Seed, Vec<Track>, Reply<usize>),
    Load(Vec<Track>, Reply<usize>),
    SetPolicy(StationPolicy),
    Snapshot(oneshot::Sender<Snapshot>),
    Engine(EngineEvent),
    Refill(RefillRequest, Result<Vec<Track>>),
}

/// Cloneable front door to the controller task.
#[derive(Clone)]
pub struct QueueHandle {
    tx: mpsc::UnboundedSender<Message>,
}

/// The receiving side, handed to [`spawn`].
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Message>,
    weak: mpsc::WeakUnboundedSender<Message>,
}

/// Creates the controller channel. It exists before the task so the engine
/// can be wired to [`QueueHandle::engine_sink`] before the queue is built.
pub fn channel() -> (QueueHandle, Inbox) {
    let (tx, rx) = mpsc::unbounded_channel();
    let weak = tx.downgrade();
    (QueueHandle { tx }, Inbox { rx, weak })
}

/// Starts the controller task. It runs until every [`QueueHandle`] is
/// dropped, then stops the engine.
pub fn spawn(
    queue: PlayQueue,
    catalog: Arc<dyn Catalog>,
    inbox: Inbox,
) -> mpsc::UnboundedReceiver<Notice> {
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let controller = Controller {
        queue,
        catalog,
        weak: inbox.weak,
        notices: notice_tx,
    };
    tokio::spawn(controller.run(inbox.rx));
    notice_rx
}

impl QueueHandle {
    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Message) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).map_err(|_| Error::ControllerGone)?;
        rx.await.map_err(|_| Error::ControllerGone)?
    }

    pub async fn enqueue(&self, track: Track) -> Result<usize> {
        self.request(|r| Message::Enqueue(track, r)).await
    }

    pub async fn play(&self, target: PlayTarget) -> Result<Track> {
        self.request(|r| Message::Play(target, r)).await
    }

    pub async fn pause(&self) -> Result<PlayerState> {
        self.request(Message::Pause).await
    }

    pub async fn resume(&self) -> Result<PlayerState> {
        self.request(Message::Resume).await
    }

    pub async fn next(&self) -> Result<Advance> {
        self.request(Message::Next).await
    }

    pub async fn prev(&self) -> Result<Option<Track>> {
        self.request(Message::Prev).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(Message::Stop).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.request(Message::Clear).await
    }

    pub async fn start_station(&self, seed: Seed, tracks: Vec<Track>) -> Result<usize> {
        self.request(|r| Message::StartStation(seed, tracks, r)).await
    }

    pub async fn load(&self, tracks: Vec<Track>) -> Result<usize> {
        self.request(|r| Message::Load(tracks, r)).await
    }

    pub fn set_policy(&self, policy: StationPolicy) -> Result<()> {
        self.tx
            .send(Message::SetPolicy(policy))
            .map_err(|_| Error::ControllerGone)
    }

    pub async fn snapshot(&self) -> Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Snapshot(reply))
            .map_err(|_| Error::ControllerGone)?;
        rx.await.map_err(|_| Error::ControllerGone)
    }

    /// Feeds an engine event into the queue.
    pub fn engine_event(&self, event: EngineEvent) -> Result<()> {
        self.tx
            .send(Message::Engine(event))
            .map_err(|_| Error::ControllerGone)
    }

    /// Event callback for a playback engine. Holds only a weak sender so a
    /// running engine does not keep the controller alive.
    pub fn engine_sink(&self) -> impl Fn(EngineEvent) + Send + Sync + 'static {
        let weak = self.tx.downgrade();
        move |event| {
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(Message::Engine(event));
            }
        }
    }
}

struct Controller {
    queue: PlayQueue,
    catalog: Arc<dyn Catalog>,
    weak: mpsc::WeakUnboundedSender<Message>,
    notices: mpsc::UnboundedSender<Notice>,
}

impl Controller {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Message>) {
        debug!("Controller started");
        while let Some(message) = rx.recv().await {
            self.handle(message);
            self.flush();
        }
        info!("All queue handles dropped, stopping playback");
        self.queue.stop();
    }

    fn handle(&mut self, message: Message) {
        // A dropped reply receiver means the caller went away; nothing to do.
        match message {
            Message::Enqueue(track, reply) => {
                info!(track = %track.id, "Enqueue");
                let _ = reply.send(self.queue.enqueue(track));
            }
            Message::Play(target, reply) => {
                let _ = reply.send(self.queue.play(target));
            }
            Message::Pause(reply) => {
                let _ = reply.send(self.queue.pause());
            }
            Message::Resume(reply) => {
                let _ = reply.send(self.queue.resume());
            }
            Message::Next(reply) => {
                let _ = reply.send(self.queue.next());
            }
            Message::Prev(reply) => {
                let _ = reply.send(self.queue.prev());
            }
            Message::Stop(reply) => {
                self.queue.stop();
                let _ = reply.send(Ok(()));
            }
            Message::Clear(reply) => {
                self.queue.clear();
                let _ = reply.send(Ok(()));
            }
            Message::StartStation(seed, tracks, reply) => {
                let _ = reply.send(self.queue.start_station(seed, tracks));
            }
            Message::Load(tracks, reply) => {
                let _ = reply.send(self.queue.load(tracks));
            }
            Message::SetPolicy(policy) => self.queue.set_policy(policy),
            Message::Snapshot(reply) => {
                let _ = reply.send(self.queue.queue_snapshot());
            }
            Message::Engine(event) => {
                debug!(?event, "Engine event");
                self.queue.handle_event(event);
            }
            Message::Refill(request, result) => {
                self.queue.apply_refill(request, result);
            }
        }
    }

    /// Publishes notices and launches the refill the last message asked for.
    fn flush(&mut self) {
        for notice in self.queue.take_notices() {
            let _ = self.notices.send(notice);
        }
        if let Some(request) = self.queue.take_refill_request() {
            self.spawn_refill(request);
        }
    }

    fn spawn_refill(&self, request: RefillRequest) {
        let catalog = self.catalog.clone();
        let weak = self.weak.clone();
        let limit = self.queue.policy().query_limit();

        tokio::spawn(async move {
            let result = match &request.seed {
                Seed::Track(id) => catalog.related(id, limit).await,
                Seed::Query(query) => catalog.search(query, limit).await.map(|page| page.tracks),
            };
            if let Some(tx) = weak.upgrade() {
                let _ = tx.send(Message::Refill(request, result));
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SearchPage;
    use crate::player::traits::{PlayerTrait, TrackId};
    use futures::future::{BoxFuture, FutureExt};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct SilentEngine {
        plays: Mutex<Vec<TrackId>>,
    }

    impl PlayerTrait for SilentEngine {
        fn play(&self, track: &TrackId, _stream_uri: &str) -> anyhow::Result<()> {
            self.plays.lock().unwrap().push(track.clone());
            Ok(())
        }
        fn pause(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn resume(&self) -> anyhow::Result<()> {
            Ok(())
        }
        fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    /// Answers every related query with the same tracks.
    struct FixedCatalog {
        related: Vec<Track>,
    }

    impl Catalog for FixedCatalog {
        fn search<'a>(&'a self, _query: &'a str, _limit: usize) -> BoxFuture<'a, Result<SearchPage>> {
            async { Ok(SearchPage::default()) }.boxed()
        }
        fn next_page<'a>(&'a self, _href: &'a str) -> BoxFuture<'a, Result<SearchPage>> {
            async { Ok(SearchPage::default()) }.boxed()
        }
        fn track<'a>(&'a self, id: &'a TrackId) -> BoxFuture<'a, Result<Track>> {
            async move { Err(Error::NotFound(format!("track {}", id))) }.boxed()
        }
        fn tracks<'a>(&'a self, _ids: &'a [TrackId]) -> BoxFuture<'a, Result<Vec<Track>>> {
            async { Ok(Vec::new()) }.boxed()
        }
        fn resolve<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Track>> {
            async move { Err(Error::NotFound(url.to_string())) }.boxed()
        }
        fn related<'a>(&'a self, _id: &'a TrackId, _limit: usize) -> BoxFuture<'a, Result<Vec<Track>>> {
            let tracks = self.related.clone();
            async move { Ok(tracks) }.boxed()
        }
    }

    fn track(id: &str) -> Track {
        Track {
            id: TrackId::from(id),
            title: format!("Track {}", id),
            artist: "Artist".to_string(),
            duration_secs: 120,
            stream_uri: format!("https://example.invalid/{}", id),
            artwork_uri: None,
            permalink_url: None,
            genre: None,
        }
    }

    fn start(related: Vec<Track>) -> (QueueHandle, mpsc::UnboundedReceiver<Notice>, Arc<SilentEngine>) {
        let engine = Arc::new(SilentEngine::default());
        let (handle, inbox) = channel();
        let queue = PlayQueue::new(engine.clone(), StationPolicy::default());
        let notices = spawn(queue, Arc::new(FixedCatalog { related }), inbox);
        (handle, notices, engine)
    }

    async fn wait_for(notices: &mut mpsc::UnboundedReceiver<Notice>, wanted: impl Fn(&Notice) -> bool) -> Notice {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                match notices.recv().await {
                    Some(notice) if wanted(&notice) => return notice,
                    Some(_) => continue,
                    None => panic!("notice channel closed"),
                }
            }
        })
        .await
        .expect("notice did not arrive in time")
    }

    #[tokio::test]
    async fn test_commands_are_applied_in_order() {
        let (handle, _notices, engine) = start(Vec::new());

        handle.enqueue(track("a")).await.unwrap();
        handle.enqueue(track("b")).await.unwrap();
        handle.next().await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.position, Some(1));
        assert_eq!(snapshot.tracks.len(), 2);
        assert_eq!(
            *engine.plays.lock().unwrap(),
            vec![TrackId::from("a"), TrackId::from("b")]
        );
    }

    #[tokio::test]
    async fn test_engine_sink_drives_queue() {
        let (handle, mut notices, _engine) = start(Vec::new());
        let sink = handle.engine_sink();

        handle.enqueue(track("a")).await.unwrap();
        sink(EngineEvent::Started(TrackId::from("a")));

        let notice = wait_for(&mut notices, |n| matches!(n, Notice::NowPlaying(_))).await;
        assert_eq!(notice, Notice::NowPlaying(track("a")));
        assert_eq!(handle.snapshot().await.unwrap().state, PlayerState::Playing);
    }

    #[tokio::test]
    async fn test_refill_runs_in_background() {
        let (handle, mut notices, _engine) = start(vec![track("r1"), track("r2")]);

        handle
            .start_station(Seed::Query("x".into()), vec![track("s1")])
            .await
            .unwrap();
        handle.engine_event(EngineEvent::Started(TrackId::from("s1"))).unwrap();

        wait_for(&mut notices, |n| matches!(n, Notice::StationExtended { .. })).await;
        let snapshot = handle.snapshot().await.unwrap();
        let ids: Vec<_> = snapshot.tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "r1", "r2"]);
        assert!(snapshot.is_station_active());
    }

    #[tokio::test]
    async fn test_errors_reach_the_caller() {
        let (handle, _notices, _engine) = start(Vec::new());

        let err = handle.play(PlayTarget::Index(4)).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let err = handle
            .start_station(Seed::Query("void".into()), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResults(_)));
    }
}
