//! Synchronized playback engine
//!
//! A [`PlaybackSession`] owns the virtual clock and one decode stream per
//! camera and is advanced by explicit ticks. A [`Player`] drives a session
//! from a tokio task and serializes commands against those ticks.

mod camera;
mod dispatch;
mod player;
mod session;

pub use camera::{plan_handle_swap, FrameSlot, HandleSwap};
pub use dispatch::{
    BlockingPool, DecodeDispatcher, DecodeJob, DecodeOutcome, DecodeTicket, InlineDispatcher, TicketState,
};
pub use player::Player;
pub use session::{format_clock, PlayState, PlaybackSession, PlaybackState};

use crate::event::EventId;

/// Errors raised by playback commands
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("speed {speed} outside supported range {min}..={max}")]
    InvalidSpeed { speed: f64, min: f64, max: f64 },

    #[error("cannot {op} while {state}")]
    InvalidState { op: &'static str, state: PlayState },

    #[error("playback session is closed")]
    SessionClosed,

    #[error("unknown event: {0}")]
    UnknownEvent(EventId),

    #[error(transparent)]
    Open(#[from] OpenError),

    /// Internal state could not be trusted; the session has been closed
    #[error("playback halted: {0}")]
    Fatal(String),
}

/// Reasons an event cannot be opened for playback
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OpenError {
    #[error("event {0} has no decodable segments")]
    NoDecodableSegments(EventId),
}
