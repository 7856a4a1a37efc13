use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
    mpsc::{Receiver, RecvTimeoutError, SyncSender, TrySendError},
};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{backend::MediaBackend, session::Session};

/// Queue depth used by [`StreamTask::start`] when none is given.
pub const DEFAULT_QUEUE_BOUND: usize = 8;
/// Log "queue full" at most every N drops.
const DROP_LOG_INTERVAL: u64 = 120;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

enum MediaCmd {
    Video { rgba: Bytes, pts_ms: i64 },
    Audio { pcm: Vec<f32>, samples: usize, pts_ms: i64 },
}

/// What the worker did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskReport {
    pub video_sent: u64,
    pub audio_sent: u64,
    pub failed: u64,
}

/// Owns the sending side of a session on a blocking worker so producers never
/// wait on the encoder or the network. Items that do not fit in the queue are
/// dropped.
pub struct StreamTask {
    cancel: CancellationToken,
    tx: SyncSender<MediaCmd>,
    handle: JoinHandle<TaskReport>,
    queue_dropped: Arc<AtomicU64>,
}

impl StreamTask {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn start<B: MediaBackend>(session: Arc<Session<B>>, queue_bound: usize) -> Self {
        let cancel = CancellationToken::new();
        let (tx, rx) = std::sync::mpsc::sync_channel::<MediaCmd>(queue_bound.max(1));
        let handle_cancel = cancel.clone();
        let handle =
            tokio::task::spawn_blocking(move || Self::worker_loop(session, handle_cancel, rx));
        log::info!("stream task started, queue bound {}", queue_bound.max(1));
        Self {
            cancel,
            tx,
            handle,
            queue_dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queues one RGBA picture. False only when the worker is gone.
    pub fn push_video(&self, rgba: Bytes, pts_ms: i64) -> bool {
        self.push(MediaCmd::Video { rgba, pts_ms })
    }

    /// Queues one block of interleaved samples. False only when the worker is gone.
    pub fn push_audio(&self, pcm: Vec<f32>, samples: usize, pts_ms: i64) -> bool {
        self.push(MediaCmd::Audio {
            pcm,
            samples,
            pts_ms,
        })
    }

    fn push(&self, cmd: MediaCmd) -> bool {
        match self.tx.try_send(cmd) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.queue_dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped % DROP_LOG_INTERVAL == 1 {
                    log::debug!("stream queue full, dropped {} items", dropped);
                }
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Items rejected because the queue was full.
    pub fn queue_dropped(&self) -> u64 {
        self.queue_dropped.load(Ordering::Relaxed)
    }

    pub fn queue_dropped_counter(&self) -> Arc<AtomicU64> {
        self.queue_dropped.clone()
    }

    /// Stops the worker without draining the queue.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Sends everything still queued, then waits for the worker.
    pub async fn finish(self) -> anyhow::Result<TaskReport> {
        let Self { tx, handle, .. } = self;
        drop(tx);
        let report = handle.await?;
        log::info!("stream task finished: {:?}", report);
        Ok(report)
    }

    fn worker_loop<B: MediaBackend>(
        session: Arc<Session<B>>,
        cancel: CancellationToken,
        rx: Receiver<MediaCmd>,
    ) -> TaskReport {
        let mut report = TaskReport::default();
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match rx.recv_timeout(POLL_INTERVAL) {
                Ok(MediaCmd::Video { rgba, pts_ms }) => {
                    match session.send_video_frame(&rgba, pts_ms) {
                        Ok(()) => report.video_sent += 1,
                        Err(_) => report.failed += 1,
                    }
                }
                Ok(MediaCmd::Audio {
                    pcm,
                    samples,
                    pts_ms,
                }) => match session.send_audio(&pcm, samples, pts_ms) {
                    Ok(()) => report.audio_sent += 1,
                    Err(_) => report.failed += 1,
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        report
    }
}
