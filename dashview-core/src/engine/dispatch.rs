//! Decode dispatch: runs decode jobs off the tick loop
//!
//! A job carries the camera's decode handle with it and hands it back in the
//! outcome, so each handle has exactly one owner at any time.

use crate::decode::{DecodeError, DecoderBackend, Frame, SegmentReader};
use crate::segment::{CameraRole, SegmentDescriptor};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A request to decode one frame for one camera
pub struct DecodeJob {
    pub role: CameraRole,
    pub segment_index: usize,
    pub segment: Arc<SegmentDescriptor>,
    /// Seconds into the segment file
    pub offset: f64,
    /// Seek generation the request was issued under
    pub epoch: u64,
    /// Handle from the previous decode, reused if it is on the same file
    pub reader: Option<Box<dyn SegmentReader>>,
    pub backend: Arc<dyn DecoderBackend>,
    pub cancel: CancellationToken,
}

/// What came back from a decode job
pub struct DecodeOutcome {
    pub role: CameraRole,
    pub segment_index: usize,
    pub epoch: u64,
    pub reader: Option<Box<dyn SegmentReader>>,
    pub result: Result<Frame, DecodeError>,
}

impl DecodeJob {
    /// Performs the decode on the calling thread
    pub fn run(self) -> DecodeOutcome {
        let DecodeJob {
            role,
            segment_index,
            segment,
            offset,
            epoch,
            reader,
            backend,
            cancel,
        } = self;

        let finish = |reader, result| DecodeOutcome {
            role,
            segment_index,
            epoch,
            reader,
            result,
        };

        if cancel.is_cancelled() {
            return finish(reader, Err(DecodeError::Cancelled));
        }

        let mut reader = match reader {
            Some(reader) if reader.path() == segment.path() => reader,
            _ => match backend.open(segment.path()) {
                Ok(reader) => reader,
                Err(e) => return finish(None, Err(e)),
            },
        };
        segment.resolve(reader.media_info().clone());

        if cancel.is_cancelled() {
            return finish(Some(reader), Err(DecodeError::Cancelled));
        }
        let result = reader.frame_at(offset);
        finish(Some(reader), result)
    }
}

/// Receiving end of a dispatched job
pub struct DecodeTicket {
    rx: oneshot::Receiver<DecodeOutcome>,
}

/// Non-blocking view of a ticket
pub enum TicketState {
    Pending,
    Ready(DecodeOutcome),
    /// The worker went away without answering
    Lost,
}

impl DecodeTicket {
    pub fn channel() -> (oneshot::Sender<DecodeOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    pub fn poll(&mut self) -> TicketState {
        match self.rx.try_recv() {
            Ok(outcome) => TicketState::Ready(outcome),
            Err(TryRecvError::Empty) => TicketState::Pending,
            Err(TryRecvError::Closed) => TicketState::Lost,
        }
    }

    /// Waits until the worker answers or goes away. Either way the job's
    /// decode handle is no longer held by the worker once this returns.
    pub async fn wait(self) -> Option<DecodeOutcome> {
        self.rx.await.ok()
    }
}

/// Strategy for running decode jobs
pub trait DecodeDispatcher: Send + Sync {
    fn dispatch(&self, job: DecodeJob) -> DecodeTicket;
}

/// Runs each job immediately on the caller's thread
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineDispatcher;

impl DecodeDispatcher for InlineDispatcher {
    fn dispatch(&self, job: DecodeJob) -> DecodeTicket {
        let (tx, ticket) = DecodeTicket::channel();
        let _ = tx.send(job.run());
        ticket
    }
}

/// Runs jobs on tokio's blocking thread pool, at most `workers` at a time
pub struct BlockingPool {
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl BlockingPool {
    pub fn new(handle: Handle, workers: usize) -> Self {
        Self {
            handle,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Uses the runtime the caller is running in, if any
    pub fn from_current(workers: usize) -> Option<Self> {
        Handle::try_current().ok().map(|handle| Self::new(handle, workers))
    }
}

impl DecodeDispatcher for BlockingPool {
    fn dispatch(&self, job: DecodeJob) -> DecodeTicket {
        let (tx, ticket) = DecodeTicket::channel();
        let permits = Arc::clone(&self.permits);

        self.handle.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            let role = job.role;
            match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(outcome) => {
                    if tx.send(outcome).is_err() {
                        debug!(camera = %role, "Dropping decode result for a closed session");
                    }
                }
                Err(e) => warn!(camera = %role, "Decode worker failed: {}", e),
            }
        });

        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::Category;
    use crate::testing::{segment, FakeBackend};

    fn job(backend: Arc<FakeBackend>, offset: f64) -> DecodeJob {
        DecodeJob {
            role: CameraRole::Front,
            segment_index: 0,
            segment: segment(Category::Saved, CameraRole::Front, "2024-03-01_10-00-00", None),
            offset,
            epoch: 3,
            reader: None,
            backend,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_job_opens_and_resolves_segment() {
        let backend = FakeBackend::new();
        let job = job(backend.clone(), 2.0);
        let segment = Arc::clone(&job.segment);
        let outcome = job.run();

        assert_eq!(outcome.epoch, 3);
        assert!(outcome.reader.is_some());
        assert_eq!(outcome.result.unwrap().pts, 2.0);
        assert!(segment.is_resolved());
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_job_reuses_matching_reader() {
        let backend = FakeBackend::new();
        let first = job(backend.clone(), 1.0).run();

        let mut second = job(backend.clone(), 1.5);
        second.reader = first.reader;
        let outcome = second.run();

        assert!(outcome.result.is_ok());
        assert_eq!(backend.opened(), 1);
    }

    #[test]
    fn test_cancelled_job_does_not_decode() {
        let backend = FakeBackend::new();
        let job = job(backend.clone(), 1.0);
        job.cancel.cancel();
        let outcome = job.run();

        assert_eq!(outcome.result.unwrap_err(), DecodeError::Cancelled);
        assert_eq!(backend.opened(), 0);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let backend = FakeBackend::new();
        let job = job(backend.clone(), 1.0);
        backend.fail_open(job.segment.path());
        let outcome = job.run();

        assert!(matches!(outcome.result, Err(DecodeError::Open { .. })));
        assert!(outcome.reader.is_none());
    }

    #[test]
    fn test_inline_dispatch_is_ready_immediately() {
        let backend = FakeBackend::new();
        let mut ticket = InlineDispatcher.dispatch(job(backend, 0.5));
        assert!(matches!(ticket.poll(), TicketState::Ready(_)));
    }

    #[tokio::test]
    async fn test_blocking_pool_delivers_outcome() {
        let pool = BlockingPool::from_current(2).unwrap();
        let backend = FakeBackend::new();
        let mut ticket = pool.dispatch(job(backend, 0.5));

        let outcome = loop {
            match ticket.poll() {
                TicketState::Ready(outcome) => break outcome,
                TicketState::Pending => tokio::time::sleep(std::time::Duration::from_millis(1)).await,
                TicketState::Lost => panic!("worker lost"),
            }
        };
        assert!(outcome.result.is_ok());
    }
}
