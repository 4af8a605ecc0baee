//! Virtual timelines: per-camera segment layouts on one shared time axis
//!
//! Virtual time 0 is the start of the event. Every camera track is laid out
//! against that origin, so a camera whose first segment starts later than the
//! event begins with dead time, and gaps between segments become padding
//! during which the camera has no frame.

use crate::config::{OverlapPolicy, TimelinePolicy};
use crate::event::Event;
use crate::segment::CameraRole;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// One stretch of virtual time backed by a single segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineEntry {
    /// Index of the segment within its camera track
    pub segment_index: usize,
    /// Virtual start time in seconds
    pub start: f64,
    /// Virtual end time in seconds (exclusive, except at the end of the track)
    pub end: f64,
    /// Position inside the segment file that `start` maps to
    pub source_offset: f64,
}

impl TimelineEntry {
    /// Creates a new timeline entry
    pub fn new(segment_index: usize, start: f64, end: f64, source_offset: f64) -> Self {
        Self {
            segment_index,
            start,
            end,
            source_offset,
        }
    }

    /// Checks if this entry covers the given virtual time
    pub fn is_active(&self, t: f64) -> bool {
        t >= self.start && t < self.end
    }
}

/// A stretch of a camera track with no recorded frames
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Discontinuity {
    pub role: CameraRole,
    /// Segment preceding the gap; `None` for dead time before the first one
    pub after_segment: Option<usize>,
    pub virtual_start: f64,
    pub length: f64,
}

/// Where a camera is at a given virtual time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cursor {
    At { segment_index: usize, offset: f64 },
    NoFrame,
}

/// Layout of one camera's segments in virtual time
#[derive(Debug, Clone, Default)]
pub struct TrackTimeline {
    entries: Vec<TimelineEntry>,
}

impl TrackTimeline {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Virtual time at which the last segment ends
    pub fn end(&self) -> f64 {
        self.entries.last().map_or(0.0, |e| e.end)
    }

    /// Maps virtual time to a segment and an offset within it.
    ///
    /// Entries are disjoint and sorted, so this is a binary search over start
    /// times. The very end of the track still maps to the last segment so the
    /// final frame stays visible when the clock is parked there.
    pub fn cursor(&self, t: f64) -> Cursor {
        if t.is_nan() || t < 0.0 {
            return Cursor::NoFrame;
        }
        let idx = self.entries.partition_point(|e| e.start <= t);
        let Some(entry) = idx.checked_sub(1).map(|i| &self.entries[i]) else {
            return Cursor::NoFrame;
        };

        let is_last = idx == self.entries.len();
        if entry.is_active(t) || (is_last && t == entry.end) {
            Cursor::At {
                segment_index: entry.segment_index,
                offset: entry.source_offset + (t - entry.start),
            }
        } else {
            Cursor::NoFrame
        }
    }
}

/// Per-event timeline answering `cursor(role, t)` for every camera
#[derive(Debug, Clone, Default)]
pub struct VirtualTimeline {
    tracks: BTreeMap<CameraRole, TrackTimeline>,
    total_duration: f64,
    discontinuities: Vec<Discontinuity>,
}

impl VirtualTimeline {
    /// Lays out every camera track of `event`.
    ///
    /// Unresolved segments are assumed to last `policy.nominal_segment_secs`.
    pub fn build(event: &Event, policy: &TimelinePolicy) -> Self {
        let mut tracks = BTreeMap::new();
        let mut discontinuities = Vec::new();

        for role in CameraRole::KNOWN {
            let track = build_track(event, role, policy, &mut discontinuities);
            tracks.insert(role, track);
        }

        let total_duration = tracks.values().map(TrackTimeline::end).fold(0.0, f64::max);
        for gap in &discontinuities {
            warn!(
                event = %event.id(),
                camera = %gap.role,
                at = gap.virtual_start,
                length = gap.length,
                "Discontinuity in camera track"
            );
        }

        Self {
            tracks,
            total_duration,
            discontinuities,
        }
    }

    /// Cameras absent from the event always yield `NoFrame`
    pub fn cursor(&self, role: CameraRole, t: f64) -> Cursor {
        self.tracks.get(&role).map_or(Cursor::NoFrame, |track| track.cursor(t))
    }

    pub fn track(&self, role: CameraRole) -> Option<&TrackTimeline> {
        self.tracks.get(&role)
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub fn discontinuities(&self) -> &[Discontinuity] {
        &self.discontinuities
    }
}

fn build_track(
    event: &Event,
    role: CameraRole,
    policy: &TimelinePolicy,
    discontinuities: &mut Vec<Discontinuity>,
) -> TrackTimeline {
    let tolerance = policy.discontinuity_tolerance_secs;
    let mut entries: Vec<TimelineEntry> = Vec::new();
    // Virtual end of the laid-out track so far
    let mut cursor = 0.0;
    // Event-relative wall time at which the previous segment ends
    let mut prev_end: Option<f64> = None;

    for (index, seg) in event.track(role).iter().enumerate() {
        let start = (seg.start() - event.start()).num_milliseconds() as f64 / 1000.0;
        let duration = seg.duration_or(policy.nominal_segment_secs);
        if duration <= 0.0 {
            debug!("Skipping empty segment {:?}", seg.path());
            continue;
        }

        let gap = start - prev_end.unwrap_or(0.0);
        let mut source_offset = 0.0;

        if prev_end.is_none() {
            // Lead-in before this camera's first segment keeps it aligned
            // with the other cameras.
            if gap > tolerance {
                discontinuities.push(Discontinuity {
                    role,
                    after_segment: None,
                    virtual_start: 0.0,
                    length: gap,
                });
            }
            cursor = gap.max(0.0);
        } else if gap > tolerance {
            discontinuities.push(Discontinuity {
                role,
                after_segment: entries.last().map(|e| e.segment_index),
                virtual_start: cursor,
                length: gap,
            });
            cursor += gap;
        } else if gap < -tolerance && policy.overlap == OverlapPolicy::EarlierWins {
            source_offset = -gap;
            if source_offset >= duration {
                debug!("Segment {:?} fully covered by its predecessor", seg.path());
                prev_end = Some(latest_end(prev_end, start + duration));
                continue;
            }
        }

        let entry = TimelineEntry::new(index, cursor, cursor + duration - source_offset, source_offset);
        cursor = entry.end;
        prev_end = Some(latest_end(prev_end, start + duration));
        entries.push(entry);
    }

    TrackTimeline { entries }
}

fn latest_end(prev_end: Option<f64>, end: f64) -> f64 {
    prev_end.map_or(end, |prev| prev.max(end))
}
