//! Segment descriptors parsed from dashcam file names
//!
//! A segment is one fixed-length recording from one camera. Its identity
//! (category, camera, start time, path) comes purely from where the file sits
//! and what it is called; media attributes are resolved later, on first decode.

use chrono::NaiveDateTime;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

/// `strftime` layout of the timestamp prefix in segment file names
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Length of a formatted timestamp, e.g. `2024-03-01_18-22-05`
const TIMESTAMP_LEN: usize = 19;

/// Which top-level folder a segment was recorded into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Category {
    Saved,
    Sentry,
    Recent,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Saved, Category::Sentry, Category::Recent];

    /// Name of the folder under the footage root holding this category
    pub fn folder_name(self) -> &'static str {
        match self {
            Category::Saved => "SavedClips",
            Category::Sentry => "SentryClips",
            Category::Recent => "RecentClips",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Saved => "saved",
            Category::Sentry => "sentry",
            Category::Recent => "recent",
        }
    }

    /// Directory depth below the category folder at which clips live.
    /// Sentry clips sit inside a per-event subfolder.
    pub fn clip_depth(self) -> usize {
        match self {
            Category::Sentry => 2,
            Category::Saved | Category::Recent => 1,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category: {0} (expected saved, sentry or recent)")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "saved" | "savedclips" => Ok(Category::Saved),
            "sentry" | "sentryclips" => Ok(Category::Sentry),
            "recent" | "recentclips" => Ok(Category::Recent),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

/// Camera angle a segment was recorded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum CameraRole {
    Front,
    Back,
    LeftRepeater,
    RightRepeater,
    Unknown,
}

impl CameraRole {
    /// The four recognized angles, in display order
    pub const KNOWN: [CameraRole; 4] = [
        CameraRole::Front,
        CameraRole::Back,
        CameraRole::LeftRepeater,
        CameraRole::RightRepeater,
    ];

    /// Maps a file-name token to a role; anything unrecognized is `Unknown`
    pub fn from_token(token: &str) -> Self {
        match token {
            "front" => CameraRole::Front,
            "back" => CameraRole::Back,
            "left_repeater" => CameraRole::LeftRepeater,
            "right_repeater" => CameraRole::RightRepeater,
            _ => CameraRole::Unknown,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            CameraRole::Front => "front",
            CameraRole::Back => "back",
            CameraRole::LeftRepeater => "left_repeater",
            CameraRole::RightRepeater => "right_repeater",
            CameraRole::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CameraRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Why a file under the footage root was not turned into a segment
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("file name does not follow <timestamp>-<camera>.<ext>")]
    BadName,

    #[error("unparseable timestamp '{0}'")]
    BadTimestamp(String),

    #[error("unrecognized camera '{0}'")]
    UnrecognizedRole(String),

    #[error("clip is not at the expected folder depth")]
    UnexpectedLocation,
}

/// Identity fields decoded from a segment file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentName {
    pub start: NaiveDateTime,
    pub role: CameraRole,
}

/// Parses `YYYY-MM-DD_HH-MM-SS-<role>.<ext>`
pub fn parse_segment_name(file_name: &str) -> Result<SegmentName, SkipReason> {
    let (stem, _ext) = file_name.rsplit_once('.').ok_or(SkipReason::BadName)?;
    if stem.len() <= TIMESTAMP_LEN + 1 || !stem.is_char_boundary(TIMESTAMP_LEN) {
        return Err(SkipReason::BadName);
    }

    let (timestamp, rest) = stem.split_at(TIMESTAMP_LEN);
    let token = rest.strip_prefix('-').ok_or(SkipReason::BadName)?;

    let start = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
        .map_err(|_| SkipReason::BadTimestamp(timestamp.to_string()))?;

    match CameraRole::from_token(token) {
        CameraRole::Unknown => Err(SkipReason::UnrecognizedRole(token.to_string())),
        role => Ok(SegmentName { start, role }),
    }
}

/// Media attributes probed from the file itself
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub frame_rate: f64,
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
}

impl MediaInfo {
    /// Seconds between consecutive frames
    pub fn frame_interval(&self) -> f64 {
        if self.frame_rate > 0.0 {
            1.0 / self.frame_rate
        } else {
            1.0 / 30.0
        }
    }
}

/// One physical video file for one camera.
///
/// Identity fields are fixed at catalog time. Media fields start unresolved
/// and are filled in exactly once, the first time the file is opened.
#[derive(Debug)]
pub struct SegmentDescriptor {
    category: Category,
    role: CameraRole,
    start: NaiveDateTime,
    path: PathBuf,
    media: OnceLock<MediaInfo>,
}

impl SegmentDescriptor {
    pub fn new(category: Category, role: CameraRole, start: NaiveDateTime, path: PathBuf) -> Self {
        Self {
            category,
            role,
            start,
            path,
            media: OnceLock::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn role(&self) -> CameraRole {
        self.role
    }

    /// Start time taken from the file name (1 second precision)
    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn media(&self) -> Option<&MediaInfo> {
        self.media.get()
    }

    pub fn is_resolved(&self) -> bool {
        self.media.get().is_some()
    }

    /// Records probed media info. The first resolution wins; later calls
    /// return the already stored value.
    pub fn resolve(&self, info: MediaInfo) -> &MediaInfo {
        self.media.get_or_init(|| info)
    }

    /// Resolved duration, or `nominal` while the file has not been probed
    pub fn duration_or(&self, nominal: f64) -> f64 {
        self.media().map_or(nominal, |m| m.duration_secs)
    }

    /// Absolute end time using the resolved or nominal duration
    pub fn end_or(&self, nominal: f64) -> NaiveDateTime {
        let millis = (self.duration_or(nominal) * 1000.0).round() as i64;
        self.start + chrono::Duration::milliseconds(millis.max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn test_parse_valid_names() {
        let name = parse_segment_name("2024-03-01_10-00-00-front.mp4").unwrap();
        assert_eq!(name.start, at(10, 0, 0));
        assert_eq!(name.role, CameraRole::Front);

        let name = parse_segment_name("2024-03-01_23-59-59-right_repeater.mp4").unwrap();
        assert_eq!(name.start, at(23, 59, 59));
        assert_eq!(name.role, CameraRole::RightRepeater);

        let name = parse_segment_name("2024-03-01_10-00-00-left_repeater.MP4").unwrap();
        assert_eq!(name.role, CameraRole::LeftRepeater);
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        assert!(matches!(
            parse_segment_name("2024-13-01_10-00-00-front.mp4"),
            Err(SkipReason::BadTimestamp(_))
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_role() {
        assert_eq!(
            parse_segment_name("2024-03-01_10-00-00-left_pillar.mp4"),
            Err(SkipReason::UnrecognizedRole("left_pillar".to_string()))
        );
    }

    #[test]
    fn test_parse_rejects_malformed_names() {
        assert_eq!(parse_segment_name("thumb.png"), Err(SkipReason::BadName));
        assert_eq!(parse_segment_name("no_extension"), Err(SkipReason::BadName));
        assert_eq!(
            parse_segment_name("2024-03-01_10-00-00front.mp4"),
            Err(SkipReason::BadName)
        );
        assert_eq!(parse_segment_name("2024-03-01_10-00-00-.mp4"), Err(SkipReason::BadName));
        assert_eq!(parse_segment_name("ééééééééééééééééééé-front.mp4"), Err(SkipReason::BadName));
    }

    #[test]
    fn test_descriptor_resolves_once() {
        let seg = SegmentDescriptor::new(
            Category::Saved,
            CameraRole::Front,
            at(10, 0, 0),
            PathBuf::from("/footage/a.mp4"),
        );
        assert!(!seg.is_resolved());
        assert_eq!(seg.duration_or(60.0), 60.0);
        assert_eq!(seg.end_or(60.0), at(10, 1, 0));

        let info = MediaInfo {
            duration_secs: 59.5,
            frame_rate: 36.0,
            frame_count: 2142,
            width: 1280,
            height: 960,
        };
        seg.resolve(info.clone());
        seg.resolve(MediaInfo {
            duration_secs: 10.0,
            ..info.clone()
        });

        assert_eq!(seg.media(), Some(&info));
        assert_eq!(seg.duration_or(60.0), 59.5);
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("SentryClips".parse::<Category>().unwrap(), Category::Sentry);
        assert!("dashcam".parse::<Category>().is_err());
    }
}
