//! rodio playback on a dedicated audio thread.
//!
//! `OutputStream` is not `Send`, so the thread opens the device and keeps it.
//! Downloads run on the tokio runtime and hand their bytes to the thread.
//! Every `play`/`stop` takes a new load ticket; a download that finishes
//! under an old ticket is thrown away.

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use reqwest::header::CONTENT_TYPE;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
use serde::Deserialize;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::traits::{EngineEvent, PlayerTrait, TrackId};

/// How often the audio thread checks whether the sink ran dry.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

enum Command {
    Load {
        ticket: u64,
        track: TrackId,
        bytes: Vec<u8>,
    },
    Fail {
        ticket: u64,
        track: TrackId,
        cause: String,
    },
    Pause,
    Resume,
    Stop,
}

pub struct RodioEngine {
    commands: mpsc::Sender<Command>,
    http: reqwest::Client,
    runtime: Handle,
    ticket: Arc<AtomicU64>,
}

impl RodioEngine {
    /// Opens the default output device on a new thread. Fails when there is
    /// no usable device.
    pub fn spawn<F>(http: reqwest::Client, runtime: Handle, on_event: F) -> Result<Self>
    where
        F: Fn(EngineEvent) + Send + 'static,
    {
        let (commands, inbox) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let ticket = Arc::new(AtomicU64::new(0));
        let thread_ticket = ticket.clone();

        thread::Builder::new()
            .name("scplay-audio".to_string())
            .spawn(move || {
                let (_stream, output) = match OutputStream::try_default() {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                audio_loop(&output, inbox, &thread_ticket, on_event);
                debug!("Audio thread exiting");
            })
            .context("could not start the audio thread")?;

        ready_rx
            .recv()
            .context("audio thread exited during startup")?
            .map_err(|e| anyhow!("missing audio engine: {}", e))?;
        info!("Audio output opened");

        Ok(Self {
            commands,
            http,
            runtime,
            ticket,
        })
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| anyhow!("audio thread is not running"))
    }
}

impl PlayerTrait for RodioEngine {
    fn play(&self, track: &TrackId, stream_uri: &str) -> Result<()> {
        let ticket = self.ticket.fetch_add(1, Ordering::SeqCst) + 1;
        self.send(Command::Stop)?;

        let http = self.http.clone();
        let commands = self.commands.clone();
        let current = self.ticket.clone();
        let track = track.clone();
        let uri = stream_uri.to_string();

        self.runtime.spawn(async move {
            debug!(track = %track, ticket, "Downloading stream");
            let result = fetch_media(&http, &uri).await;
            if current.load(Ordering::SeqCst) != ticket {
                debug!(track = %track, "Discarding superseded download");
                return;
            }
            let command = match result {
                Ok(bytes) => Command::Load { ticket, track, bytes },
                Err(e) => Command::Fail {
                    ticket,
                    track,
                    cause: format!("{:#}", e),
                },
            };
            let _ = commands.send(command);
        });
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    fn resume(&self) -> Result<()> {
        self.send(Command::Resume)
    }

    fn stop(&self) -> Result<()> {
        self.ticket.fetch_add(1, Ordering::SeqCst);
        self.send(Command::Stop)
    }
}

fn audio_loop<F>(output: &OutputStreamHandle, inbox: mpsc::Receiver<Command>, ticket: &AtomicU64, on_event: F)
where
    F: Fn(EngineEvent),
{
    // A fresh sink per track; a stopped rodio sink stays stopped.
    let mut sink: Option<Sink> = None;
    let mut playing: Option<TrackId> = None;

    loop {
        match inbox.recv_timeout(POLL_INTERVAL) {
            Ok(Command::Load {
                ticket: loaded,
                track,
                bytes,
            }) => {
                if loaded != ticket.load(Ordering::SeqCst) {
                    continue;
                }
                sink = None;
                playing = None;
                match start_sink(output, bytes) {
                    Ok(started) => {
                        sink = Some(started);
                        on_event(EngineEvent::Started(track.clone()));
                        playing = Some(track);
                    }
                    Err(e) => {
                        warn!(track = %track, error = %e, "Could not decode stream");
                        on_event(EngineEvent::Failed(track, format!("{:#}", e)));
                    }
                }
            }
            Ok(Command::Fail {
                ticket: failed,
                track,
                cause,
            }) => {
                if failed == ticket.load(Ordering::SeqCst) {
                    warn!(track = %track, cause = %cause, "Stream download failed");
                    on_event(EngineEvent::Failed(track, cause));
                }
            }
            Ok(Command::Pause) => {
                if let Some(sink) = &sink {
                    sink.pause();
                }
            }
            Ok(Command::Resume) => {
                if let Some(sink) = &sink {
                    sink.play();
                }
            }
            Ok(Command::Stop) => {
                sink = None;
                playing = None;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if sink.as_ref().is_some_and(Sink::empty) {
            sink = None;
            if let Some(track) = playing.take() {
                on_event(EngineEvent::Finished(track));
            }
        }
    }
}

fn start_sink(output: &OutputStreamHandle, bytes: Vec<u8>) -> Result<Sink> {
    let source = Decoder::new(Cursor::new(bytes)).context("unsupported audio data")?;
    let sink = Sink::try_new(output).map_err(|e| {
        error!(error = %e, "Could not open a sink");
        anyhow!("could not open a sink: {}", e)
    })?;
    sink.append(source);
    Ok(sink)
}

/// Where SoundCloud's stream endpoints point to.
#[derive(Debug, Deserialize)]
struct MediaLocation {
    url: String,
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| value.contains("json"))
}

/// Downloads a whole stream. A JSON `{url}` answer is followed once.
async fn fetch_media(http: &reqwest::Client, uri: &str) -> Result<Vec<u8>> {
    let response = http
        .get(uri)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .context("stream request failed")?
        .error_for_status()
        .context("stream request was rejected")?;

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());
    if !is_json(content_type) {
        return Ok(response.bytes().await.context("stream download failed")?.to_vec());
    }

    let location: MediaLocation = response
        .json()
        .await
        .context("unexpected stream resolution response")?;
    let bytes = http
        .get(&location.url)
        .timeout(DOWNLOAD_TIMEOUT)
        .send()
        .await
        .context("media request failed")?
        .error_for_status()
        .context("media request was rejected")?
        .bytes()
        .await
        .context("media download failed")?;
    Ok(bytes.to_vec())
}
