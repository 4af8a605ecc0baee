//! Per-camera decode stream

use super::dispatch::{DecodeDispatcher, DecodeJob, DecodeTicket, TicketState};
use super::EngineError;
use crate::decode::{DecodeError, DecoderBackend, Frame, SegmentReader};
use crate::segment::{CameraRole, SegmentDescriptor};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const FALLBACK_FRAME_INTERVAL: f64 = 1.0 / 30.0;

/// What a camera currently presents
#[derive(Debug, Clone)]
pub enum FrameSlot {
    Image(Arc<Frame>),
    /// Placeholder: no recorded frame at the current position
    NoFrame,
}

impl FrameSlot {
    pub fn frame(&self) -> Option<&Frame> {
        match self {
            FrameSlot::Image(frame) => Some(frame.as_ref()),
            FrameSlot::NoFrame => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, FrameSlot::Image(_))
    }
}

/// Decode handle change needed to present a frame from `target`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleSwap {
    /// The open handle is already on the target segment
    Reuse,
    /// No handle is open
    Open,
    /// Close the handle on `from` and open the target
    Swap { from: usize },
}

/// Decides how to move a camera's decode handle onto segment `target`
pub fn plan_handle_swap(open_segment: Option<usize>, target: usize) -> HandleSwap {
    match open_segment {
        None => HandleSwap::Open,
        Some(current) if current == target => HandleSwap::Reuse,
        Some(from) => HandleSwap::Swap { from },
    }
}

struct Pending {
    segment_index: usize,
    ticket: DecodeTicket,
}

/// Last frame request that produced the frame on screen
#[derive(Debug, Clone, Copy)]
struct Shown {
    segment_index: usize,
    requested: f64,
    pts: f64,
    epoch: u64,
}

pub(crate) struct CameraStream {
    role: CameraRole,
    track: Vec<Arc<SegmentDescriptor>>,
    reader: Option<Box<dyn SegmentReader>>,
    /// Segment the decode handle is on, whether held here or lent to a job
    open_segment: Option<usize>,
    pending: Option<Pending>,
    failed_segment: Option<usize>,
    shown: Option<Shown>,
    slot: FrameSlot,
}

impl CameraStream {
    pub(crate) fn new(role: CameraRole, track: Vec<Arc<SegmentDescriptor>>) -> Self {
        Self {
            role,
            track,
            reader: None,
            open_segment: None,
            pending: None,
            failed_segment: None,
            shown: None,
            slot: FrameSlot::NoFrame,
        }
    }

    pub(crate) fn slot(&self) -> &FrameSlot {
        &self.slot
    }

    /// Collects a finished decode, if any. Results issued under an older
    /// epoch hand back their handle but never reach the slot.
    pub(crate) fn harvest(&mut self, epoch: u64) -> Result<(), EngineError> {
        let Some(pending) = self.pending.as_mut() else {
            return Ok(());
        };
        let outcome = match pending.ticket.poll() {
            TicketState::Pending => return Ok(()),
            TicketState::Ready(outcome) => outcome,
            TicketState::Lost => {
                let segment_index = pending.segment_index;
                self.pending = None;
                self.open_segment = None;
                self.fail(segment_index, &DecodeError::WorkerLost);
                return Ok(());
            }
        };
        self.pending = None;

        if outcome.segment_index >= self.track.len() {
            return Err(EngineError::Fatal(format!(
                "{} camera decoded segment {} of a {}-segment track",
                self.role,
                outcome.segment_index,
                self.track.len()
            )));
        }

        self.open_segment = outcome.reader.as_ref().map(|_| outcome.segment_index);
        self.reader = outcome.reader;

        if outcome.epoch != epoch {
            debug!(camera = %self.role, stale = outcome.epoch, current = epoch, "Discarding stale frame");
            return Ok(());
        }

        match outcome.result {
            Ok(frame) => {
                if let Some(shown) = self.shown.as_mut() {
                    shown.pts = frame.pts;
                }
                self.slot = FrameSlot::Image(Arc::new(frame));
            }
            Err(DecodeError::Cancelled) => {
                self.shown = None;
            }
            Err(e) => {
                // A handle that failed mid-decode is not trusted again
                self.reader = None;
                self.open_segment = None;
                self.fail(outcome.segment_index, &e);
            }
        }
        Ok(())
    }

    /// Presents whatever belongs at (`segment_index`, `offset`), starting a
    /// decode when the frame on screen is not the nearest one.
    pub(crate) fn request(
        &mut self,
        segment_index: usize,
        offset: f64,
        epoch: u64,
        backend: &Arc<dyn DecoderBackend>,
        dispatcher: &dyn DecodeDispatcher,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let Some(segment) = self.track.get(segment_index).cloned() else {
            return Err(EngineError::Fatal(format!(
                "{} camera has no segment {}",
                self.role, segment_index
            )));
        };

        match self.failed_segment {
            Some(failed) if failed == segment_index => {
                self.show_placeholder();
                return Ok(());
            }
            Some(_) => {
                debug!(camera = %self.role, segment = segment_index, "Resuming after failed segment");
                self.failed_segment = None;
            }
            None => {}
        }

        // At most one decode in flight; until it lands the last frame stays up
        if self.pending.is_some() || !self.needs_frame(segment_index, offset, epoch, &segment) {
            return Ok(());
        }

        let reader = match plan_handle_swap(self.open_segment, segment_index) {
            HandleSwap::Reuse => self.reader.take(),
            HandleSwap::Open => None,
            HandleSwap::Swap { from } => {
                debug!(camera = %self.role, from, to = segment_index, "Swapping decode handle");
                self.reader = None;
                None
            }
        };

        let job = DecodeJob {
            role: self.role,
            segment_index,
            segment,
            offset,
            epoch,
            reader,
            backend: Arc::clone(backend),
            cancel: cancel.clone(),
        };
        self.pending = Some(Pending {
            segment_index,
            ticket: dispatcher.dispatch(job),
        });
        self.open_segment = Some(segment_index);
        self.shown = Some(Shown {
            segment_index,
            requested: offset,
            pts: f64::NAN,
            epoch,
        });
        Ok(())
    }

    fn needs_frame(&self, segment_index: usize, offset: f64, epoch: u64, segment: &SegmentDescriptor) -> bool {
        let Some(shown) = self.shown else {
            return true;
        };
        if shown.segment_index != segment_index || shown.epoch != epoch || !self.slot.is_image() {
            return true;
        }
        let half_frame = segment.media().map_or(FALLBACK_FRAME_INTERVAL, |m| m.frame_interval()) / 2.0;
        // Past the last frame of a file the decoder keeps answering with the
        // same picture, so the requested offset matters as much as its pts.
        (offset - shown.pts).abs() > half_frame && (offset - shown.requested).abs() > half_frame
    }

    pub(crate) fn show_placeholder(&mut self) {
        self.slot = FrameSlot::NoFrame;
        if self.pending.is_none() {
            self.shown = None;
        }
    }

    fn fail(&mut self, segment_index: usize, error: &DecodeError) {
        warn!(camera = %self.role, segment = segment_index, "Showing placeholder: {}", error);
        self.failed_segment = Some(segment_index);
        self.shown = None;
        self.slot = FrameSlot::NoFrame;
    }

    /// Drops the decode handle held here. A request still in flight is
    /// handed back, since its job keeps the handle until it finishes.
    pub(crate) fn release(&mut self) -> Option<DecodeTicket> {
        self.reader = None;
        self.open_segment = None;
        self.shown = None;
        self.slot = FrameSlot::NoFrame;
        self.pending.take().map(|pending| pending.ticket)
    }
}
