//! Policy constants and runtime configuration

use std::time::Duration;

/// Upper bound on simultaneously decoded camera angles
pub const MAX_CAMERAS: usize = 4;

/// Largest accepted event gap: one year
pub const MAX_EVENT_GAP_SECS: u64 = 365 * 24 * 60 * 60;

/// Top-level configuration for scanning and playback
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ViewerConfig {
    pub catalog: CatalogConfig,
    pub grouping: GroupingPolicy,
    pub timeline: TimelinePolicy,
    pub playback: PlaybackConfig,
}

impl ViewerConfig {
    /// Loads a configuration from a JSON file; missing fields keep their defaults
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: &std::path::Path) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects combinations the engine cannot honor
    pub fn validate(&self) -> crate::Result<()> {
        let p = &self.playback;
        if !(p.min_speed > 0.0 && p.min_speed <= p.default_speed && p.default_speed <= p.max_speed) {
            return Err(crate::Error::InvalidConfig(format!(
                "speed range must satisfy 0 < min ({}) <= default ({}) <= max ({})",
                p.min_speed, p.default_speed, p.max_speed
            )));
        }
        if self.timeline.nominal_segment_secs <= 0.0 {
            return Err(crate::Error::InvalidConfig(
                "nominal segment duration must be positive".into(),
            ));
        }
        if self.timeline.discontinuity_tolerance_secs < 0.0 {
            return Err(crate::Error::InvalidConfig(
                "discontinuity tolerance cannot be negative".into(),
            ));
        }
        if self.grouping.event_gap_secs > MAX_EVENT_GAP_SECS {
            return Err(crate::Error::InvalidConfig(format!(
                "event gap of {}s exceeds the maximum of {}s",
                self.grouping.event_gap_secs, MAX_EVENT_GAP_SECS
            )));
        }
        if self.catalog.extensions.is_empty() {
            return Err(crate::Error::InvalidConfig(
                "at least one video extension is required".into(),
            ));
        }
        Ok(())
    }
}

/// Which files the catalog treats as clips
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CatalogConfig {
    /// Lower-case file extensions recognized as video segments
    pub extensions: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["mp4".to_string()],
        }
    }
}

impl CatalogConfig {
    pub fn is_video_extension(&self, ext: &str) -> bool {
        self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext))
    }
}

/// Time-gap rule used to split a category's segments into events
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GroupingPolicy {
    /// A start-time gap larger than this opens a new event
    pub event_gap_secs: u64,
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self { event_gap_secs: 15 * 60 }
    }
}

impl GroupingPolicy {
    /// The event gap as a time delta, saturating when it does not fit
    pub fn gap(&self) -> chrono::TimeDelta {
        i64::try_from(self.event_gap_secs)
            .ok()
            .and_then(chrono::TimeDelta::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

/// How a later segment is placed when it overlaps the previous one in a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum OverlapPolicy {
    /// The earlier segment covers the overlap; the later one starts where the
    /// earlier one ends, skipping its already-covered head
    #[default]
    EarlierWins,
    /// Every segment plays in full, back to back
    Sequential,
}

/// Rules for stitching a camera track into virtual time
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TimelinePolicy {
    /// Gaps up to this size are absorbed as encoder rounding
    pub discontinuity_tolerance_secs: f64,
    /// Duration assumed for segments whose media info is not resolved
    pub nominal_segment_secs: f64,
    pub overlap: OverlapPolicy,
}

impl Default for TimelinePolicy {
    fn default() -> Self {
        Self {
            discontinuity_tolerance_secs: 2.0,
            nominal_segment_secs: 60.0,
            overlap: OverlapPolicy::EarlierWins,
        }
    }
}

/// Playback engine tuning
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PlaybackConfig {
    /// Wall-clock interval between engine ticks
    pub tick_interval_ms: u64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub default_speed: f64,
    /// Restart from the beginning when the end of an event is reached
    pub looping: bool,
    /// Maximum number of concurrently running decode jobs
    pub decode_workers: usize,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1,
            min_speed: 0.5,
            max_speed: 3.0,
            default_speed: 1.0,
            looping: false,
            decode_workers: num_cpus::get().clamp(1, MAX_CAMERAS),
        }
    }
}

impl PlaybackConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grouping.event_gap_secs, 900);
        assert_eq!(config.timeline.discontinuity_tolerance_secs, 2.0);
        assert!(config.playback.decode_workers >= 1);
        assert!(config.playback.decode_workers <= MAX_CAMERAS);
    }

    #[test]
    fn test_rejects_inverted_speed_range() {
        let mut config = ViewerConfig::default();
        config.playback.min_speed = 2.0;
        config.playback.max_speed = 1.0;
        assert!(matches!(config.validate(), Err(crate::Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_oversized_event_gap() {
        let mut config = ViewerConfig::default();
        config.grouping.event_gap_secs = MAX_EVENT_GAP_SECS;
        assert!(config.validate().is_ok());
        config.grouping.event_gap_secs = u64::MAX / 2;
        assert!(matches!(config.validate(), Err(crate::Error::InvalidConfig(_))));
    }

    #[test]
    fn test_event_gap_saturates() {
        let policy = GroupingPolicy { event_gap_secs: 900 };
        assert_eq!(policy.gap(), chrono::TimeDelta::minutes(15));
        for secs in [u64::MAX, u64::MAX / 2, i64::MAX as u64 / 1000 + 1] {
            let policy = GroupingPolicy { event_gap_secs: secs };
            assert_eq!(policy.gap(), chrono::TimeDelta::MAX);
        }
    }

    #[test]
    fn test_extension_match_ignores_case() {
        let catalog = CatalogConfig::default();
        assert!(catalog.is_video_extension("MP4"));
        assert!(!catalog.is_video_extension("json"));
    }

    #[test]
    fn test_tick_interval_never_zero() {
        let playback = PlaybackConfig {
            tick_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(playback.tick_interval(), Duration::from_millis(1));
    }
}
