//! FFmpeg implementation of the core decoder backend

use crate::segment_reader::{self, FfmpegSegmentReader};
use dashview_core::{DecodeError, DecoderBackend, MediaInfo, SegmentReader};
use std::path::Path;
use tracing::warn;

/// Opens segment files with FFmpeg
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegBackend;

impl FfmpegBackend {
    pub fn new() -> Self {
        Self
    }
}

fn open_error(path: &Path, e: crate::Error) -> DecodeError {
    warn!("Cannot open {:?}: {}", path, e);
    DecodeError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl DecoderBackend for FfmpegBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn SegmentReader>, DecodeError> {
        FfmpegSegmentReader::open(path)
            .map(|reader| Box::new(reader) as Box<dyn SegmentReader>)
            .map_err(|e| open_error(path, e))
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo, DecodeError> {
        segment_reader::probe(path).map_err(|e| open_error(path, e))
    }
}
