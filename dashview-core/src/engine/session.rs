//! Playback session: the virtual clock and its camera streams

use super::camera::{CameraStream, FrameSlot};
use super::dispatch::{DecodeDispatcher, DecodeTicket};
use super::{EngineError, OpenError};
use crate::config::{PlaybackConfig, TimelinePolicy};
use crate::decode::DecoderBackend;
use crate::event::{Event, EventId};
use crate::segment::CameraRole;
use crate::timeline::{Cursor, VirtualTimeline};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Transport state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlayState::Stopped => "stopped",
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
        })
    }
}

/// Snapshot of a session's clock and transport
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaybackState {
    pub virtual_clock: f64,
    pub total_duration: f64,
    pub play_state: PlayState,
    pub speed: f64,
    pub looping: bool,
}

impl PlaybackState {
    /// `"mm:ss / mm:ss"` position label
    pub fn label(&self) -> String {
        format!(
            "{} / {}",
            format_clock(self.virtual_clock),
            format_clock(self.total_duration)
        )
    }
}

/// Formats seconds as `mm:ss`, or `h:mm:ss` from one hour up
pub fn format_clock(secs: f64) -> String {
    let total = if secs.is_finite() { secs.max(0.0) as u64 } else { 0 };
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// One opened event under playback.
///
/// The session is advanced by [`tick`](Self::tick) and mutated by the
/// command methods; callers serialize both. Decode handles are owned by the
/// camera streams and released on [`close`](Self::close) or drop.
pub struct PlaybackSession {
    event_id: EventId,
    timeline: VirtualTimeline,
    cameras: BTreeMap<CameraRole, CameraStream>,
    backend: Arc<dyn DecoderBackend>,
    dispatcher: Arc<dyn DecodeDispatcher>,
    clock: f64,
    play_state: PlayState,
    speed: f64,
    min_speed: f64,
    max_speed: f64,
    looping: bool,
    /// Bumped on every reposition so in-flight decodes can be recognized as stale
    epoch: u64,
    last_tick: Option<Instant>,
    cancel: CancellationToken,
    closed: bool,
}

impl PlaybackSession {
    /// Opens `event` for playback.
    ///
    /// Every segment is probed first so the timeline is laid out with real
    /// durations. Segments that fail to probe stay on the timeline with the
    /// nominal duration and play back as placeholders.
    pub fn open(
        event: Event,
        backend: Arc<dyn DecoderBackend>,
        dispatcher: Arc<dyn DecodeDispatcher>,
        policy: &TimelinePolicy,
        playback: &PlaybackConfig,
    ) -> Result<Self, OpenError> {
        let mut decodable = 0;
        for segment in event.segments() {
            if segment.is_resolved() {
                decodable += 1;
                continue;
            }
            match backend.probe(segment.path()) {
                Ok(info) => {
                    segment.resolve(info);
                    decodable += 1;
                }
                Err(e) => warn!(event = %event.id(), "Probe failed: {}", e),
            }
        }
        if decodable == 0 {
            return Err(OpenError::NoDecodableSegments(event.id().clone()));
        }

        let timeline = VirtualTimeline::build(&event, policy);
        let cameras = event
            .tracks()
            .iter()
            .filter(|(role, segments)| **role != CameraRole::Unknown && !segments.is_empty())
            .map(|(role, segments)| (*role, CameraStream::new(*role, segments.clone())))
            .collect::<BTreeMap<_, _>>();

        info!(
            event = %event.id(),
            cameras = cameras.len(),
            duration = timeline.total_duration(),
            "Playback session opened"
        );

        Ok(Self {
            event_id: event.id().clone(),
            timeline,
            cameras,
            backend,
            dispatcher,
            clock: 0.0,
            play_state: PlayState::Stopped,
            speed: playback.default_speed,
            min_speed: playback.min_speed,
            max_speed: playback.max_speed,
            looping: playback.looping,
            epoch: 0,
            last_tick: None,
            cancel: CancellationToken::new(),
            closed: false,
        })
    }

    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn timeline(&self) -> &VirtualTimeline {
        &self.timeline
    }

    /// Cameras with at least one segment, in grid order
    pub fn cameras(&self) -> impl Iterator<Item = CameraRole> + '_ {
        self.cameras.keys().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.closed {
            Err(EngineError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn reposition(&mut self, t: f64) {
        self.clock = t;
        self.epoch += 1;
    }

    /// Starts or resumes playback. From the end of the event it restarts at 0.
    pub fn play(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.play_state == PlayState::Stopped && self.clock >= self.timeline.total_duration() {
            self.reposition(0.0);
        }
        if self.play_state != PlayState::Playing {
            info!(event = %self.event_id, at = self.clock, "Playing");
        }
        self.play_state = PlayState::Playing;
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        match self.play_state {
            PlayState::Playing => {
                info!(event = %self.event_id, at = self.clock, "Paused");
                self.play_state = PlayState::Paused;
                Ok(())
            }
            PlayState::Paused => Ok(()),
            PlayState::Stopped => Err(EngineError::InvalidState {
                op: "pause",
                state: PlayState::Stopped,
            }),
        }
    }

    /// Moves the clock to `t`, clamped to the event. Every camera redecodes
    /// at the new position before presenting another frame.
    pub fn seek(&mut self, t: f64) -> Result<(), EngineError> {
        self.ensure_open()?;
        if self.play_state == PlayState::Stopped {
            return Err(EngineError::InvalidState {
                op: "seek",
                state: PlayState::Stopped,
            });
        }
        let target = if t.is_nan() {
            0.0
        } else {
            t.clamp(0.0, self.timeline.total_duration())
        };
        self.reposition(target);
        Ok(())
    }

    pub fn set_speed(&mut self, speed: f64) -> Result<(), EngineError> {
        self.ensure_open()?;
        if !(self.min_speed..=self.max_speed).contains(&speed) {
            return Err(EngineError::InvalidSpeed {
                speed,
                min: self.min_speed,
                max: self.max_speed,
            });
        }
        self.speed = speed;
        Ok(())
    }

    pub fn set_looping(&mut self, looping: bool) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.looping = looping;
        Ok(())
    }

    /// Rewinds to the start and stops, keeping decode handles open
    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.play_state = PlayState::Stopped;
        self.reposition(0.0);
        Ok(())
    }

    /// Advances the clock to `now` and brings every camera up to date.
    ///
    /// A fatal error closes the session before it is returned.
    pub fn tick(&mut self, now: Instant) -> Result<(), EngineError> {
        self.ensure_open()?;
        self.advance(now);
        if let Err(e) = self.resolve_frames() {
            error!(event = %self.event_id, "Closing session: {}", e);
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn advance(&mut self, now: Instant) {
        if self.play_state != PlayState::Playing {
            self.last_tick = None;
            return;
        }
        let Some(last) = self.last_tick.replace(now) else {
            return;
        };

        let total = self.timeline.total_duration();
        let before = self.clock;
        let after = before + now.saturating_duration_since(last).as_secs_f64() * self.speed;

        // Crossing the end, or moving on from a clock parked there by a seek
        if after >= total && (before < total || after > before) {
            if self.looping {
                info!(event = %self.event_id, "Looping to start");
                self.reposition(0.0);
            } else {
                info!(event = %self.event_id, "End of event");
                self.clock = total;
                self.play_state = PlayState::Stopped;
                self.last_tick = None;
            }
        } else {
            self.clock = after.min(total);
        }
    }

    fn resolve_frames(&mut self) -> Result<(), EngineError> {
        let clock = self.clock;
        let epoch = self.epoch;
        for (role, camera) in self.cameras.iter_mut() {
            camera.harvest(epoch)?;
            match self.timeline.cursor(*role, clock) {
                Cursor::NoFrame => camera.show_placeholder(),
                Cursor::At { segment_index, offset } => {
                    camera.request(
                        segment_index,
                        offset,
                        epoch,
                        &self.backend,
                        self.dispatcher.as_ref(),
                        &self.cancel,
                    )?;
                    // Inline dispatch has already finished
                    camera.harvest(epoch)?;
                }
            }
        }
        Ok(())
    }

    /// Current picture for `role`; cameras absent from the event always
    /// yield the placeholder
    pub fn poll_frame(&self, role: CameraRole) -> FrameSlot {
        self.cameras
            .get(&role)
            .map_or(FrameSlot::NoFrame, |camera| camera.slot().clone())
    }

    pub fn state(&self) -> PlaybackState {
        PlaybackState {
            virtual_clock: self.clock,
            total_duration: self.timeline.total_duration(),
            play_state: self.play_state,
            speed: self.speed,
            looping: self.looping,
        }
    }

    /// Cancels in-flight decodes, then releases every decode handle.
    /// Closing twice is a no-op.
    ///
    /// Decodes already running on a worker finish with their handle; use
    /// [`close_pending`](Self::close_pending) to wait for them.
    pub fn close(&mut self) {
        drop(self.close_pending());
    }

    /// Closes the session and returns the tickets of decodes still running.
    /// Each job holds its file open until its ticket resolves.
    pub fn close_pending(&mut self) -> Vec<DecodeTicket> {
        if self.closed {
            return Vec::new();
        }
        self.cancel.cancel();
        let outstanding: Vec<_> = self.cameras.values_mut().filter_map(|c| c.release()).collect();
        self.play_state = PlayState::Stopped;
        self.closed = true;
        info!(
            event = %self.event_id,
            outstanding = outstanding.len(),
            "Playback session closed"
        );
        outstanding
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}
