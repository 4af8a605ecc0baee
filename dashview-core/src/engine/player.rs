//! Async driver that ticks a session on a fixed interval

use super::camera::FrameSlot;
use super::session::{PlaybackSession, PlaybackState};
use super::EngineError;
use crate::segment::CameraRole;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Runs a [`PlaybackSession`] on the tokio runtime.
///
/// Commands and ticks take the same lock, so a command issued between two
/// ticks is fully applied before the next tick resolves frames.
pub struct Player {
    session: Arc<Mutex<PlaybackSession>>,
    ticker: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Player {
    /// Starts the tick task. Must be called from within a tokio runtime.
    pub fn spawn(session: PlaybackSession, tick_interval: Duration) -> Self {
        let session = Arc::new(Mutex::new(session));
        let shutdown = CancellationToken::new();
        let ticker = tokio::spawn(run_ticks(
            Arc::clone(&session),
            tick_interval,
            shutdown.clone(),
        ));
        Self {
            session,
            ticker,
            shutdown,
        }
    }

    pub async fn play(&self) -> Result<(), EngineError> {
        self.session.lock().await.play()
    }

    pub async fn pause(&self) -> Result<(), EngineError> {
        self.session.lock().await.pause()
    }

    pub async fn seek(&self, t: f64) -> Result<(), EngineError> {
        self.session.lock().await.seek(t)
    }

    pub async fn set_speed(&self, speed: f64) -> Result<(), EngineError> {
        self.session.lock().await.set_speed(speed)
    }

    pub async fn set_looping(&self, looping: bool) -> Result<(), EngineError> {
        self.session.lock().await.set_looping(looping)
    }

    pub async fn stop(&self) -> Result<(), EngineError> {
        self.session.lock().await.stop()
    }

    pub async fn poll_frame(&self, role: CameraRole) -> FrameSlot {
        self.session.lock().await.poll_frame(role)
    }

    pub async fn current_state(&self) -> PlaybackState {
        self.session.lock().await.state()
    }

    pub async fn is_closed(&self) -> bool {
        self.session.lock().await.is_closed()
    }

    /// Cameras present in the session's event
    pub async fn cameras(&self) -> Vec<CameraRole> {
        self.session.lock().await.cameras().collect()
    }

    /// Stops ticking, closes the session and waits for running decodes to
    /// hand back their files
    pub async fn close(&self) {
        self.shutdown.cancel();
        let outstanding = self.session.lock().await.close_pending();
        for ticket in outstanding {
            // Dropping the outcome drops the handle it carries
            drop(ticket.wait().await);
        }
    }

    /// Whether the tick task has exited
    pub fn is_finished(&self) -> bool {
        self.ticker.is_finished()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_ticks(session: Arc<Mutex<PlaybackSession>>, tick_interval: Duration, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let mut session = session.lock().await;
                match session.tick(Instant::now().into_std()) {
                    Ok(()) => {}
                    Err(EngineError::SessionClosed) => break,
                    Err(e) => {
                        error!(event = %session.event_id(), "Tick loop stopped: {}", e);
                        break;
                    }
                }
            }
        }
    }
    debug!("Tick loop exited");
}
