//! Events: grouped, same-category recording sessions across cameras

use crate::segment::{CameraRole, Category, SegmentDescriptor, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of an event, derived from its category and start time so that
/// rescanning an unchanged directory yields the same ids
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct EventId(String);

impl EventId {
    pub fn new(category: Category, start: NaiveDateTime) -> Self {
        Self(format!("{}-{}", category.as_str(), start.format(TIMESTAMP_FORMAT)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for EventId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// A logically continuous recording session.
///
/// Membership is fixed once built; a rescan produces fresh events. The end
/// time follows the segments' media info, so it uses the nominal duration
/// until a playback session has probed the files and real durations after.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    category: Category,
    start: NaiveDateTime,
    /// Stands in for unresolved segment durations
    nominal_secs: f64,
    tracks: BTreeMap<CameraRole, Vec<Arc<SegmentDescriptor>>>,
}

impl Event {
    /// Builds an event from per-camera tracks that are already in
    /// chronological order. `nominal_secs` stands in for unresolved durations.
    ///
    /// Returns `None` when no track holds a segment.
    pub fn from_tracks(
        category: Category,
        tracks: BTreeMap<CameraRole, Vec<Arc<SegmentDescriptor>>>,
        nominal_secs: f64,
    ) -> Option<Self> {
        let segments = || tracks.values().flatten();
        let start = segments().map(|s| s.start()).min()?;

        Some(Self {
            id: EventId::new(category, start),
            category,
            start,
            nominal_secs,
            tracks,
        })
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    /// Latest segment end, using resolved durations where known
    pub fn end(&self) -> NaiveDateTime {
        self.segments()
            .map(|s| s.end_or(self.nominal_secs))
            .max()
            .unwrap_or(self.start)
    }

    /// Wall-clock span from the first segment's start to the last segment's end
    pub fn duration_secs(&self) -> f64 {
        (self.end() - self.start).num_milliseconds() as f64 / 1000.0
    }

    pub fn tracks(&self) -> &BTreeMap<CameraRole, Vec<Arc<SegmentDescriptor>>> {
        &self.tracks
    }

    /// Segments recorded by `role`, in chronological order; empty if the
    /// camera is absent from this event
    pub fn track(&self, role: CameraRole) -> &[Arc<SegmentDescriptor>] {
        self.tracks.get(&role).map_or(&[], Vec::as_slice)
    }

    /// Cameras with at least one segment
    pub fn roles(&self) -> impl Iterator<Item = CameraRole> + '_ {
        self.tracks
            .iter()
            .filter(|(_, segs)| !segs.is_empty())
            .map(|(role, _)| *role)
    }

    pub fn segments(&self) -> impl Iterator<Item = &Arc<SegmentDescriptor>> {
        self.tracks.values().flatten()
    }

    pub fn segment_count(&self) -> usize {
        self.tracks.values().map(Vec::len).sum()
    }

    pub fn summary(&self) -> EventSummary {
        EventSummary {
            id: self.id.clone(),
            category: self.category,
            start: self.start,
            end: self.end(),
            duration_secs: self.duration_secs(),
            cameras: self.roles().collect(),
            segment_count: self.segment_count(),
        }
    }
}

/// Lightweight description of an event for listing. `end` and
/// `duration_secs` are nominal until the event's files have been probed.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EventSummary {
    pub id: EventId,
    pub category: Category,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub duration_secs: f64,
    pub cameras: Vec<CameraRole>,
    pub segment_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{at, segment};

    #[test]
    fn test_event_bounds_and_summary() {
        let mut tracks = BTreeMap::new();
        tracks.insert(
            CameraRole::Front,
            vec![
                segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", Some(60.0)),
                segment(Category::Saved, CameraRole::Front, "2024-03-01_10-01-00", Some(30.0)),
            ],
        );
        tracks.insert(
            CameraRole::Back,
            vec![segment(Category::Saved, CameraRole::Back, "2024-03-01_09-59-30", None)],
        );
        tracks.insert(CameraRole::LeftRepeater, Vec::new());

        let event = Event::from_tracks(Category::Saved, tracks, 60.0).unwrap();
        assert_eq!(event.start(), at("2024-03-01_09-59-30"));
        assert_eq!(event.end(), at("2024-03-01_10-01-30"));
        assert_eq!(event.duration_secs(), 120.0);
        assert_eq!(event.id().as_str(), "saved-2024-03-01_09-59-30");

        let summary = event.summary();
        assert_eq!(summary.cameras, vec![CameraRole::Front, CameraRole::Back]);
        assert_eq!(summary.segment_count, 3);
        assert!(event.track(CameraRole::RightRepeater).is_empty());
        assert!(event.track(CameraRole::LeftRepeater).is_empty());
    }

    #[test]
    fn test_end_follows_probed_durations() {
        let short = segment(Category::Recent, CameraRole::Front, "2024-03-01_10-01-00", None);
        let mut tracks = BTreeMap::new();
        tracks.insert(
            CameraRole::Front,
            vec![
                segment(Category::Recent, CameraRole::Front, "2024-03-01_10-00-00", Some(60.0)),
                Arc::clone(&short),
            ],
        );
        let event = Event::from_tracks(Category::Recent, tracks, 60.0).unwrap();
        assert_eq!(event.summary().duration_secs, 120.0);

        short.resolve(crate::testing::media(42.5));
        assert_eq!(event.end(), at("2024-03-01_10-01-00") + chrono::TimeDelta::milliseconds(42_500));
        assert_eq!(event.summary().duration_secs, 102.5);
    }

    #[test]
    fn test_empty_tracks_build_nothing() {
        assert!(Event::from_tracks(Category::Recent, BTreeMap::new(), 60.0).is_none());
    }
}
