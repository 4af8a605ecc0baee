//! Viewer facade: the interface a presentation layer drives
//!
//! Holds the event library for one footage root and at most one open
//! playback session at a time.

use crate::catalog::{ScanError, ScanSummary};
use crate::config::ViewerConfig;
use crate::decode::DecoderBackend;
use crate::engine::{DecodeDispatcher, EngineError, FrameSlot, PlaybackSession, PlaybackState, Player};
use crate::event::{EventId, EventSummary};
use crate::library::EventLibrary;
use crate::segment::{CameraRole, Category};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub struct Viewer {
    root: PathBuf,
    config: ViewerConfig,
    library: EventLibrary,
    backend: Arc<dyn DecoderBackend>,
    dispatcher: Arc<dyn DecodeDispatcher>,
    player: Option<Player>,
}

impl Viewer {
    /// Scans `root` and prepares to play its events
    pub fn new(
        root: impl Into<PathBuf>,
        config: ViewerConfig,
        backend: Arc<dyn DecoderBackend>,
        dispatcher: Arc<dyn DecodeDispatcher>,
    ) -> Result<Self, ScanError> {
        let root = root.into();
        let library = EventLibrary::scan(&root, &config)?;
        Ok(Self {
            root,
            config,
            library,
            backend,
            dispatcher,
            player: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn library(&self) -> &EventLibrary {
        &self.library
    }

    /// Rebuilds the library from disk. An open session keeps playing the
    /// event it was opened with.
    pub fn refresh(&mut self) -> Result<&ScanSummary, ScanError> {
        self.library = EventLibrary::scan(&self.root, &self.config)?;
        Ok(self.library.summary())
    }

    /// Events newest first, optionally limited to one category
    pub fn list_events(&self, filter: Option<Category>) -> Vec<EventSummary> {
        self.library.list(filter)
    }

    /// Opens `id` for playback, closing any session already open.
    ///
    /// Probing the event's files happens on the blocking pool.
    pub async fn open_event(&mut self, id: &EventId) -> Result<(), EngineError> {
        let event = self
            .library
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEvent(id.clone()))?;
        self.close().await;

        let backend = Arc::clone(&self.backend);
        let dispatcher = Arc::clone(&self.dispatcher);
        let policy = self.config.timeline.clone();
        let playback = self.config.playback.clone();
        let session = tokio::task::spawn_blocking(move || {
            PlaybackSession::open(event, backend, dispatcher, &policy, &playback)
        })
        .await
        .map_err(|e| EngineError::Fatal(format!("session open task failed: {}", e)))??;

        info!(event = %id, "Event opened");
        self.player = Some(Player::spawn(session, self.config.playback.tick_interval()));
        Ok(())
    }

    fn player(&self) -> Result<&Player, EngineError> {
        self.player.as_ref().ok_or(EngineError::SessionClosed)
    }

    pub async fn play(&self) -> Result<(), EngineError> {
        self.player()?.play().await
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.player()?.pause().await
    }

    pub async fn seek(&self, t: f64) -> Result<(), EngineError> {
        self.player()?.seek(t).await
    }

    pub async fn set_speed(&self, speed: f64) -> Result<(), EngineError> {
        self.player()?.set_speed(speed).await
    }

    pub async fn set_looping(&self, looping: bool) -> Result<(), EngineError> {
        self.player()?.set_looping(looping).await
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.player()?.stop().await
    }

    /// Current picture for `role`, or the placeholder when nothing is open
    pub async fn poll_frame(&self, role: CameraRole) -> FrameSlot {
        match &self.player {
            Some(player) => player.poll_frame(role).await,
            None => FrameSlot::NoFrame,
        }
    }

    pub async fn current_state(&self) -> Option<PlaybackState> {
        match &self.player {
            Some(player) => Some(player.current_state().await),
            None => None,
        }
    }

    /// Closes the open session, if any, releasing its decoders
    pub async fn close(&mut self) {
        if let Some(player) = self.player.take() {
            player.close().await;
        }
    }
}
