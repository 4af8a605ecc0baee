//! Event grouper: clusters cataloged segments into events by time gap

use crate::config::GroupingPolicy;
use crate::event::Event;
use crate::segment::{CameraRole, Category, SegmentDescriptor};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Chronological order used everywhere segments are sorted; identical start
/// times fall back to the path so duplicates are kept in a stable order
pub fn chronological(a: &Arc<SegmentDescriptor>, b: &Arc<SegmentDescriptor>) -> Ordering {
    a.start()
        .cmp(&b.start())
        .then_with(|| a.path().cmp(b.path()))
}

/// Groups segments into events, most recent first.
///
/// Each category is walked independently in start-time order; a segment whose
/// start is more than `policy.event_gap_secs` after the latest start already in
/// the open event closes that event and opens a new one. Every input segment
/// ends up in exactly one track of exactly one event.
pub fn group_segments(
    segments: Vec<Arc<SegmentDescriptor>>,
    policy: &GroupingPolicy,
    nominal_secs: f64,
) -> Vec<Event> {
    let mut by_category: BTreeMap<Category, Vec<Arc<SegmentDescriptor>>> = BTreeMap::new();
    for seg in segments {
        by_category.entry(seg.category()).or_default().push(seg);
    }

    let gap = policy.gap();
    let mut events = Vec::new();

    for (category, mut segs) in by_category {
        segs.sort_by(chronological);

        let mut open: BTreeMap<CameraRole, Vec<Arc<SegmentDescriptor>>> = BTreeMap::new();
        let mut latest = None;

        for seg in segs {
            if let Some(latest) = latest {
                if seg.start() - latest > gap {
                    events.extend(Event::from_tracks(category, std::mem::take(&mut open), nominal_secs));
                }
            }
            latest = Some(seg.start());
            open.entry(seg.role()).or_default().push(seg);
        }
        events.extend(Event::from_tracks(category, open, nominal_secs));
    }

    events.sort_by(|a, b| {
        b.start()
            .cmp(&a.start())
            .then_with(|| a.category().cmp(&b.category()))
    });

    debug!("Grouped segments into {} events", events.len());
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::segment;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn group(segments: Vec<Arc<SegmentDescriptor>>) -> Vec<Event> {
        group_segments(segments, &GroupingPolicy::default(), 60.0)
    }

    #[test]
    fn test_contiguous_segments_form_one_event() {
        let events = group(vec![
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-02-00", None),
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Saved, CameraRole::Back, "2024-03-01_10-00-00", None),
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-01-00", None),
        ]);

        assert_eq!(events.len(), 1);
        let front = events[0].track(CameraRole::Front);
        assert_eq!(front.len(), 3);
        assert!(front.windows(2).all(|w| w[0].start() <= w[1].start()));
        assert_eq!(events[0].track(CameraRole::Back).len(), 1);
    }

    #[test]
    fn test_gap_over_threshold_splits_events() {
        let events = group(vec![
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-20-00", None),
        ]);

        assert_eq!(events.len(), 2);
        // Most recent first
        assert_eq!(events[0].id().as_str(), "saved-2024-03-01_10-20-00");
        assert_eq!(events[1].id().as_str(), "saved-2024-03-01_10-00-00");
    }

    #[test]
    fn test_huge_gap_keeps_one_event() {
        let policy = GroupingPolicy {
            event_gap_secs: u64::MAX / 2,
        };
        let events = group_segments(
            vec![
                segment(Category::Saved, CameraRole::Front, "2020-01-01_00-00-00", None),
                segment(Category::Saved, CameraRole::Front, "2024-03-01_10-20-00", None),
            ],
            &policy,
            60.0,
        );
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_gap_measured_from_latest_start() {
        // Each step is 10 minutes, so the chain never breaks even though the
        // ends are 30 minutes apart.
        let events = group(vec![
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-10-00", None),
            segment(Category::Recent, CameraRole::Back, "2024-03-01_10-20-00", None),
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-30-00", None),
        ]);
        assert_eq!(events.len(), 1);

        let exact = group(vec![
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-15-00", None),
        ]);
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn test_categories_never_mix() {
        let events = group(vec![
            segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Sentry, CameraRole::Front, "2024-03-01_10-00-00", None),
            segment(Category::Recent, CameraRole::Front, "2024-03-01_10-01-00", None),
        ]);

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].category(), Category::Recent);
        for event in &events {
            assert!(event.segments().all(|s| s.category() == event.category()));
        }
    }

    #[test]
    fn test_duplicates_are_kept_in_path_order() {
        let a = Arc::new(SegmentDescriptor::new(
            Category::Saved,
            CameraRole::Front,
            crate::testing::at("2024-03-01_10-00-00"),
            PathBuf::from("/footage/b/2024-03-01_10-00-00-front.mp4"),
        ));
        let b = Arc::new(SegmentDescriptor::new(
            Category::Saved,
            CameraRole::Front,
            crate::testing::at("2024-03-01_10-00-00"),
            PathBuf::from("/footage/a/2024-03-01_10-00-00-front.mp4"),
        ));

        let events = group(vec![a, b]);
        let front = events[0].track(CameraRole::Front);
        assert_eq!(front.len(), 2);
        assert!(front[0].path() < front[1].path());
    }

    #[test]
    fn test_grouping_is_a_partition() {
        let mut segments = Vec::new();
        let stamps = [
            "2024-03-01_08-00-00",
            "2024-03-01_08-01-00",
            "2024-03-01_08-30-00",
            "2024-03-01_09-00-00",
            "2024-03-01_09-01-00",
            "2024-03-02_00-00-00",
        ];
        for category in Category::ALL {
            for stamp in stamps {
                for role in CameraRole::KNOWN {
                    segments.push(segment(category, role, stamp, None));
                }
            }
        }
        let input: HashSet<PathBuf> = segments.iter().map(|s| s.path().to_path_buf()).collect();

        let events = group(segments);
        let mut seen = HashSet::new();
        for event in &events {
            for (role, track) in event.tracks() {
                for seg in track {
                    assert_eq!(seg.role(), *role);
                    assert!(seen.insert(seg.path().to_path_buf()), "segment grouped twice");
                }
            }
        }
        assert_eq!(seen, input);
        assert_eq!(events.len(), 3 * 4);
        assert!(events.windows(2).all(|w| w[0].start() >= w[1].start()));
    }

    #[test]
    fn test_grouping_is_idempotent() {
        let build = || {
            vec![
                segment(Category::Saved, CameraRole::Back, "2024-03-01_10-00-00", None),
                segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", None),
                segment(Category::Sentry, CameraRole::Front, "2024-03-01_11-00-00", None),
                segment(Category::Saved, CameraRole::Front, "2024-03-01_12-00-00", None),
            ]
        };
        let ids = |events: Vec<Event>| {
            events
                .iter()
                .map(|e| (e.id().clone(), e.segment_count()))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(group(build())), ids(group(build())));
    }
}
