//! Event library: the grouped, presentation-ordered result of one scan

use crate::catalog::{self, Catalog, ScanError, ScanSummary};
use crate::config::ViewerConfig;
use crate::event::{Event, EventId, EventSummary};
use crate::grouper::group_segments;
use crate::segment::Category;
use std::path::Path;
use tracing::info;

/// Events discovered under one footage root, most recent first
#[derive(Debug, Clone, Default)]
pub struct EventLibrary {
    events: Vec<Event>,
    summary: ScanSummary,
}

impl EventLibrary {
    /// Scans `root` and groups what it finds
    pub fn scan(root: &Path, config: &ViewerConfig) -> Result<Self, ScanError> {
        let catalog = catalog::scan(root, &config.catalog)?;
        Ok(Self::from_catalog(catalog, config))
    }

    pub fn from_catalog(catalog: Catalog, config: &ViewerConfig) -> Self {
        let (segments, summary) = catalog.into_parts();
        let events = group_segments(segments, &config.grouping, config.timeline.nominal_segment_secs);
        info!(
            events = events.len(),
            ignored = summary.ignored.len(),
            "Event library built"
        );
        Self { events, summary }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Summaries in presentation order, optionally restricted to one category
    pub fn list(&self, filter: Option<Category>) -> Vec<EventSummary> {
        self.events
            .iter()
            .filter(|e| filter.map_or(true, |c| e.category() == c))
            .map(Event::summary)
            .collect()
    }

    pub fn get(&self, id: &EventId) -> Option<&Event> {
        self.events.iter().find(|e| e.id() == id)
    }

    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn footage() -> TempDir {
        let dir = TempDir::new().unwrap();
        for rel in [
            "SavedClips/2024-03-01_10-00-00-front.mp4",
            "SavedClips/2024-03-01_10-01-00-front.mp4",
            "SavedClips/2024-03-01_10-00-00-back.mp4",
            "SavedClips/2024-03-01_11-00-00-front.mp4",
            "RecentClips/2024-03-02_07-00-00-front.mp4",
            "SentryClips/2024-03-01_12-00-00/2024-03-01_11-59-00-left_repeater.mp4",
            "SentryClips/2024-03-01_12-00-00/2024-03-01_11-59-00-bogus.mp4",
        ] {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, b"").unwrap();
        }
        dir
    }

    #[test]
    fn test_scan_and_list() {
        let dir = footage();
        let library = EventLibrary::scan(dir.path(), &ViewerConfig::default()).unwrap();

        let all = library.list(None);
        assert_eq!(all.len(), 4);
        assert_eq!(all[0].category, Category::Recent);
        assert_eq!(all[0].id.as_str(), "recent-2024-03-02_07-00-00");

        let saved = library.list(Some(Category::Saved));
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].segment_count, 3);

        assert_eq!(library.summary().ignored.len(), 1);
    }

    #[test]
    fn test_lookup_by_id() {
        let dir = footage();
        let library = EventLibrary::scan(dir.path(), &ViewerConfig::default()).unwrap();

        let id = EventId::from("sentry-2024-03-01_11-59-00");
        let event = library.get(&id).unwrap();
        assert_eq!(event.category(), Category::Sentry);
        assert!(library.get(&EventId::from("saved-1999-01-01_00-00-00")).is_none());
    }

    #[test]
    fn test_rescan_yields_identical_events() {
        let dir = footage();
        let config = ViewerConfig::default();
        let first = EventLibrary::scan(dir.path(), &config).unwrap();
        let second = EventLibrary::scan(dir.path(), &config).unwrap();
        assert_eq!(first.list(None), second.list(None));
    }
}
