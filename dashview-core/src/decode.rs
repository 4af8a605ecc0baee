//! Decoder seam between the playback engine and a concrete video backend

use crate::segment::MediaInfo;
use image::RgbaImage;
use std::path::{Path, PathBuf};

/// A decoded picture and its presentation time within its segment
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    /// Seconds from the start of the segment file
    pub pts: f64,
}

/// Failure to produce a frame for one camera
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("failed to open {}: {reason}", .path.display())]
    Open { path: PathBuf, reason: String },

    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("decode cancelled")]
    Cancelled,

    #[error("decode worker exited without a result")]
    WorkerLost,
}

/// An open, exclusively owned decode handle on one segment file
pub trait SegmentReader: Send {
    fn path(&self) -> &Path;

    /// Media attributes probed when the file was opened
    fn media_info(&self) -> &MediaInfo;

    /// Decodes the frame whose presentation time is nearest `offset` seconds
    fn frame_at(&mut self, offset: f64) -> Result<Frame, DecodeError>;
}

/// Opens segment files for decoding
pub trait DecoderBackend: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn SegmentReader>, DecodeError>;

    /// Reads media attributes without keeping the file open
    fn probe(&self, path: &Path) -> Result<MediaInfo, DecodeError> {
        Ok(self.open(path)?.media_info().clone())
    }
}
