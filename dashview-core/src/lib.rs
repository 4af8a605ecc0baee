//! Dashview Core Library
//!
//! This library discovers per-camera dashcam segments on disk, groups them
//! into recording events, stitches each camera's segments into a virtual
//! timeline and drives synchronized multi-camera playback against one shared
//! clock.

pub mod catalog;
pub mod config;
pub mod decode;
pub mod engine;
pub mod event;
pub mod grouper;
pub mod library;
pub mod segment;
pub mod timeline;
pub mod viewer;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{Catalog, IgnoredFile, ScanError, ScanSummary};
pub use config::{CatalogConfig, GroupingPolicy, OverlapPolicy, PlaybackConfig, TimelinePolicy, ViewerConfig};
pub use decode::{DecodeError, DecoderBackend, Frame, SegmentReader};
pub use engine::{
    format_clock, BlockingPool, DecodeDispatcher, EngineError, FrameSlot, InlineDispatcher, OpenError,
    PlayState, PlaybackSession, PlaybackState, Player,
};
pub use event::{Event, EventId, EventSummary};
pub use library::EventLibrary;
pub use segment::{CameraRole, Category, MediaInfo, SegmentDescriptor, SkipReason};
pub use timeline::{Cursor, Discontinuity, TimelineEntry, VirtualTimeline};
pub use viewer::Viewer;

/// Result type for dashview-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dashview-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "serde")]
    #[error("Config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
