//! Dashview Decoder Library
//!
//! FFmpeg-backed implementation of the playback engine's decoder seam, and a
//! compositor that tiles camera frames into a single grid image.

pub mod backend;
pub mod grid_compositor;
pub mod segment_reader;

pub use backend::FfmpegBackend;
pub use grid_compositor::GridCompositor;
pub use segment_reader::FfmpegSegmentReader;

/// Result type for dashview-decoder operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dashview-decoder operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Decoded frame has unexpected layout")]
    InvalidFrame,

    #[error("Video contains no frames")]
    NoFrames,
}
