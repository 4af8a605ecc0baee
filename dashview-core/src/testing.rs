//! Test fixtures: descriptor builders and an in-memory decoder backend

use crate::decode::{DecodeError, DecoderBackend, Frame, SegmentReader};
use crate::engine::{DecodeDispatcher, DecodeJob, DecodeOutcome, DecodeTicket};
use crate::segment::{CameraRole, Category, MediaInfo, SegmentDescriptor, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;
use image::{Rgba, RgbaImage};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

pub const FAKE_FPS: f64 = 30.0;

pub fn at(stamp: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).unwrap()
}

pub fn segment_path(category: Category, role: CameraRole, stamp: &str) -> PathBuf {
    PathBuf::from(format!("/footage/{}/{}-{}.mp4", category.folder_name(), stamp, role.token()))
}

/// Descriptor at `stamp`; `duration` pre-resolves its media info
pub fn segment(
    category: Category,
    role: CameraRole,
    stamp: &str,
    duration: Option<f64>,
) -> Arc<SegmentDescriptor> {
    let seg = SegmentDescriptor::new(category, role, at(stamp), segment_path(category, role, stamp));
    if let Some(duration) = duration {
        seg.resolve(media(duration));
    }
    Arc::new(seg)
}

pub fn media(duration: f64) -> MediaInfo {
    MediaInfo {
        duration_secs: duration,
        frame_rate: FAKE_FPS,
        frame_count: (duration * FAKE_FPS).round() as u64,
        width: 4,
        height: 4,
    }
}

/// Decoder backend that serves solid-color frames without touching disk
#[derive(Default)]
pub struct FakeBackend {
    durations: Mutex<HashMap<PathBuf, f64>>,
    failing_open: Mutex<HashSet<PathBuf>>,
    failing_decode: Mutex<HashSet<PathBuf>>,
    decode_delay: Mutex<Option<Duration>>,
    opened: AtomicUsize,
    live_readers: Arc<AtomicUsize>,
    live_paths: Arc<Mutex<HashMap<PathBuf, usize>>>,
    concurrent_opens: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_duration(&self, path: &Path, secs: f64) {
        self.durations.lock().unwrap().insert(path.to_path_buf(), secs);
    }

    pub fn fail_open(&self, path: &Path) {
        self.failing_open.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn fail_decode(&self, path: &Path) {
        self.failing_decode.lock().unwrap().insert(path.to_path_buf());
    }

    /// Makes every decode block for `delay`
    pub fn set_decode_delay(&self, delay: Duration) {
        *self.decode_delay.lock().unwrap() = Some(delay);
    }

    /// Opens of a file that already had a live reader
    pub fn concurrent_opens(&self) -> usize {
        self.concurrent_opens.load(Ordering::SeqCst)
    }

    /// Number of readers opened so far
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of readers currently alive
    pub fn live_readers(&self) -> usize {
        self.live_readers.load(Ordering::SeqCst)
    }
}

impl DecoderBackend for FakeBackend {
    fn open(&self, path: &Path) -> Result<Box<dyn SegmentReader>, DecodeError> {
        if self.failing_open.lock().unwrap().contains(path) {
            return Err(DecodeError::Open {
                path: path.to_path_buf(),
                reason: "corrupt header".into(),
            });
        }
        let duration = self
            .durations
            .lock()
            .unwrap()
            .get(path)
            .copied()
            .unwrap_or(60.0);
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.live_readers.fetch_add(1, Ordering::SeqCst);
        {
            let mut live_paths = self.live_paths.lock().unwrap();
            let count = live_paths.entry(path.to_path_buf()).or_default();
            if *count > 0 {
                self.concurrent_opens.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }

        Ok(Box::new(FakeReader {
            path: path.to_path_buf(),
            media: media(duration),
            fail: self.failing_decode.lock().unwrap().contains(path),
            delay: *self.decode_delay.lock().unwrap(),
            live: Arc::clone(&self.live_readers),
            live_paths: Arc::clone(&self.live_paths),
        }))
    }
}

struct FakeReader {
    path: PathBuf,
    media: MediaInfo,
    fail: bool,
    delay: Option<Duration>,
    live: Arc<AtomicUsize>,
    live_paths: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl SegmentReader for FakeReader {
    fn path(&self) -> &Path {
        &self.path
    }

    fn media_info(&self) -> &MediaInfo {
        &self.media
    }

    fn frame_at(&mut self, offset: f64) -> Result<Frame, DecodeError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail {
            return Err(DecodeError::Decode {
                path: self.path.clone(),
                reason: "bad packet".into(),
            });
        }
        let last = (self.media.frame_count.max(1) - 1) as f64;
        let index = (offset * FAKE_FPS).round().clamp(0.0, last);
        Ok(Frame {
            image: RgbaImage::from_pixel(4, 4, Rgba([index as u8, 0, 0, 255])),
            pts: index / FAKE_FPS,
        })
    }
}

impl Drop for FakeReader {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        if let Some(count) = self.live_paths.lock().unwrap().get_mut(&self.path) {
            *count -= 1;
        }
    }
}

/// Dispatcher that holds jobs until told to run them
#[derive(Default)]
pub struct DeferredDispatcher {
    queue: Mutex<Vec<(DecodeJob, oneshot::Sender<DecodeOutcome>)>>,
}

impl DeferredDispatcher {
    pub fn complete_all(&self) {
        let jobs = std::mem::take(&mut *self.queue.lock().unwrap());
        for (job, tx) in jobs {
            let _ = tx.send(job.run());
        }
    }
}

impl DecodeDispatcher for DeferredDispatcher {
    fn dispatch(&self, job: DecodeJob) -> DecodeTicket {
        let (tx, ticket) = DecodeTicket::channel();
        self.queue.lock().unwrap().push((job, tx));
        ticket
    }
}
