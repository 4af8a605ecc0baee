//! Segment catalog: turns a footage root into a flat set of segment descriptors
//!
//! Only paths and names are inspected; no file content is read here.

use crate::config::CatalogConfig;
use crate::segment::{parse_segment_name, Category, SegmentDescriptor, SkipReason};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Failure to use the footage root at all
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("footage root not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("footage root is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot read footage root {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A video file that was seen but not cataloged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Non-fatal findings collected alongside a successful scan
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub root: PathBuf,
    /// Number of segments cataloged per category
    pub per_category: BTreeMap<Category, usize>,
    pub ignored: Vec<IgnoredFile>,
    /// Category folders absent from the root
    pub missing_folders: Vec<Category>,
}

impl ScanSummary {
    pub fn recognized(&self) -> usize {
        self.per_category.values().sum()
    }
}

/// Result of scanning one footage root
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    segments: Vec<Arc<SegmentDescriptor>>,
    summary: ScanSummary,
}

impl Catalog {
    pub fn segments(&self) -> &[Arc<SegmentDescriptor>] {
        &self.segments
    }

    pub fn summary(&self) -> &ScanSummary {
        &self.summary
    }

    pub fn into_parts(self) -> (Vec<Arc<SegmentDescriptor>>, ScanSummary) {
        (self.segments, self.summary)
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Scans `<root>/{SavedClips,SentryClips,RecentClips}` for clips.
///
/// Unparseable clip names are recorded in the summary rather than failing the
/// scan. Only an unusable root is an error.
pub fn scan(root: &Path, config: &CatalogConfig) -> Result<Catalog, ScanError> {
    let metadata = std::fs::metadata(root).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ScanError::RootNotFound(root.to_path_buf())
        } else {
            ScanError::Unreadable {
                path: root.to_path_buf(),
                source,
            }
        }
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }
    std::fs::read_dir(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut segments = Vec::new();
    let mut summary = ScanSummary {
        root: root.to_path_buf(),
        ..Default::default()
    };

    for category in Category::ALL {
        let dir = root.join(category.folder_name());
        if !dir.is_dir() {
            debug!("Category folder missing: {:?}", dir);
            summary.missing_folders.push(category);
            continue;
        }

        let before = segments.len();
        scan_category(&dir, category, config, &mut segments, &mut summary.ignored);
        let found = segments.len() - before;
        summary.per_category.insert(category, found);
        debug!("Cataloged {} {} segments from {:?}", found, category, dir);
    }

    info!(
        root = %root.display(),
        segments = segments.len(),
        ignored = summary.ignored.len(),
        "Footage scan complete"
    );

    Ok(Catalog { segments, summary })
}

fn scan_category(
    dir: &Path,
    category: Category,
    config: &CatalogConfig,
    segments: &mut Vec<Arc<SegmentDescriptor>>,
    ignored: &mut Vec<IgnoredFile>,
) {
    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {:?}: {}", dir, e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let is_video = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| config.is_video_extension(e));
        if !is_video {
            continue;
        }

        let outcome = if entry.depth() != category.clip_depth() {
            Err(SkipReason::UnexpectedLocation)
        } else {
            match entry.file_name().to_str() {
                Some(name) => parse_segment_name(name),
                None => Err(SkipReason::BadName),
            }
        };

        match outcome {
            Ok(name) => segments.push(Arc::new(SegmentDescriptor::new(
                category,
                name.role,
                name.start,
                path.to_path_buf(),
            ))),
            Err(reason) => {
                debug!("Ignoring {:?}: {}", path, reason);
                ignored.push(IgnoredFile {
                    path: path.to_path_buf(),
                    reason,
                });
            }
        }
    }
}
