//! Random-access frame reading from one segment file using FFmpeg

use crate::{Error, Result};
use dashview_core::{DecodeError, Frame, MediaInfo, SegmentReader};
use ffmpeg_next as ffmpeg;
use image::RgbaImage;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::debug;

/// Forward distance beyond which seeking beats decoding through
const SEEK_THRESHOLD_SECS: f64 = 2.0;

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

/// Initialize FFmpeg (once per process)
pub(crate) fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT.get_or_init(ffmpeg::init).clone().map_err(Error::Ffmpeg)
}

/// Reads media attributes without setting up a decoder for frames
pub fn probe(path: &Path) -> Result<MediaInfo> {
    init_ffmpeg()?;
    let input = ffmpeg::format::input(&path)?;
    let stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or(Error::NoVideoStream)?;
    let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
    let decoder = context.decoder().video()?;
    Ok(media_info(&input, &stream, decoder.width(), decoder.height()))
}

fn media_info(
    input: &ffmpeg::format::context::Input,
    stream: &ffmpeg::format::stream::Stream,
    width: u32,
    height: u32,
) -> MediaInfo {
    let time_base = f64::from(stream.time_base());
    let duration_secs = if stream.duration() > 0 {
        stream.duration() as f64 * time_base
    } else {
        // Fallback to container duration
        input.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)
    };

    let avg = stream.avg_frame_rate();
    let rate = if avg.numerator() > 0 && avg.denominator() > 0 {
        f64::from(avg)
    } else {
        f64::from(stream.rate())
    };
    let frame_rate = if rate.is_finite() && rate > 0.0 { rate } else { 30.0 };

    let frame_count = if stream.frames() > 0 {
        stream.frames() as u64
    } else {
        (duration_secs * frame_rate).round() as u64
    };

    MediaInfo {
        duration_secs,
        frame_rate,
        frame_count,
        width,
        height,
    }
}

/// Decoded frame not yet converted to RGBA
struct RawFrame {
    pts: f64,
    video: ffmpeg::frame::Video,
}

/// Segment reader that seeks and decodes with FFmpeg.
///
/// Sequential requests decode forward from the last frame; requests behind
/// it, or far ahead of it, seek to the nearest preceding keyframe first.
pub struct FfmpegSegmentReader {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    time_base: f64,
    start_secs: f64,
    media: MediaInfo,
    /// Frame at or just before the last requested offset
    current: Option<RawFrame>,
    /// Frame decoded past the last requested offset
    queued: Option<RawFrame>,
    converted: Option<Frame>,
    eof: bool,
}

impl FfmpegSegmentReader {
    /// Opens a segment file
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path)?;

        // Find the video stream
        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(Error::NoVideoStream)?;
        let video_stream_index = video_stream.index();
        let time_base = f64::from(video_stream.time_base());
        let start_secs = if video_stream.start_time() > 0 {
            video_stream.start_time() as f64 * time_base
        } else {
            0.0
        };

        let context = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())?;
        let decoder = context.decoder().video()?;
        let media = media_info(&input, &video_stream, decoder.width(), decoder.height());

        debug!(
            "Opened {:?}: {}x{} @ {:.2} fps, {:.2}s",
            path, media.width, media.height, media.frame_rate, media.duration_secs
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            video_stream_index,
            decoder,
            time_base,
            start_secs,
            media,
            current: None,
            queued: None,
            converted: None,
            eof: false,
        })
    }

    /// Decodes the frame nearest `offset` seconds into the file
    pub fn read_frame_at(&mut self, offset: f64) -> Result<Frame> {
        let target = offset.clamp(0.0, self.media.duration_secs.max(0.0));
        let half_frame = self.media.frame_interval() / 2.0;

        let anchor = self.current.as_ref().or(self.queued.as_ref()).map(|f| f.pts);
        let must_seek = match anchor {
            None => !self.eof && target > SEEK_THRESHOLD_SECS,
            Some(pts) => target + half_frame < pts || target > pts + SEEK_THRESHOLD_SECS,
        };
        if must_seek {
            self.seek(target)?;
        }

        loop {
            let next = match self.queued.take() {
                Some(next) => next,
                None => match self.decode_next()? {
                    Some(next) => next,
                    // End of file: the current frame is the last one
                    None => break,
                },
            };
            if next.pts <= target + half_frame || self.current.is_none() {
                let overshoot = next.pts > target + half_frame;
                self.current = Some(next);
                if overshoot {
                    break;
                }
            } else {
                self.queued = Some(next);
                break;
            }
        }

        self.present()
    }

    fn seek(&mut self, target: f64) -> Result<()> {
        let ts = ((target + self.start_secs) * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;
        self.input.seek(ts, ..=ts)?;
        self.decoder.flush();
        self.current = None;
        self.queued = None;
        self.eof = false;
        Ok(())
    }

    fn decode_next(&mut self) -> Result<Option<RawFrame>> {
        loop {
            let mut decoded = ffmpeg::frame::Video::empty();
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let ts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                let pts = ts as f64 * self.time_base - self.start_secs;
                return Ok(Some(RawFrame { pts, video: decoded }));
            }
            if self.eof {
                return Ok(None);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() == self.video_stream_index {
                    self.decoder.send_packet(&packet)?;
                    fed = true;
                    break;
                }
            }
            if !fed {
                // Flush decoder
                self.decoder.send_eof()?;
                self.eof = true;
            }
        }
    }

    fn present(&mut self) -> Result<Frame> {
        let raw = self
            .current
            .as_ref()
            .or(self.queued.as_ref())
            .ok_or(Error::NoFrames)?;

        if let Some(frame) = self.converted.as_ref().filter(|f| f.pts == raw.pts.max(0.0)) {
            return Ok(frame.clone());
        }
        let frame = Frame {
            image: to_rgba(&raw.video)?,
            pts: raw.pts.max(0.0),
        };
        self.converted = Some(frame.clone());
        Ok(frame)
    }
}

/// Converts a decoded frame to a tightly packed RGBA image
fn to_rgba(decoded: &ffmpeg::frame::Video) -> Result<RgbaImage> {
    let mut scaler = ffmpeg::software::scaling::Context::get(
        decoded.format(),
        decoded.width(),
        decoded.height(),
        ffmpeg::format::Pixel::RGBA,
        decoded.width(),
        decoded.height(),
        ffmpeg::software::scaling::Flags::BILINEAR,
    )?;
    let mut rgba = ffmpeg::frame::Video::empty();
    scaler.run(decoded, &mut rgba)?;

    let (width, height) = (rgba.width(), rgba.height());
    let row = width as usize * 4;
    let stride = rgba.stride(0);
    let data = rgba.data(0);
    if stride < row || data.len() < stride * height as usize {
        return Err(Error::InvalidFrame);
    }

    let mut pixels = Vec::with_capacity(row * height as usize);
    for line in data.chunks(stride).take(height as usize) {
        pixels.extend_from_slice(&line[..row]);
    }
    RgbaImage::from_raw(width, height, pixels).ok_or(Error::InvalidFrame)
}

impl SegmentReader for FfmpegSegmentReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media
    }

    fn frame_at(&mut self, offset: f64) -> std::result::Result<Frame, DecodeError> {
        self.read_frame_at(offset).map_err(|e| DecodeError::Decode {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}
