use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-session counters. Monotonic between resets; reset only by
/// `initialize` and `cleanup`.
#[derive(Debug, Default)]
pub struct Stats {
    bytes_sent: AtomicU64,
    frames_sent: AtomicU64,
    dropped_frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub bytes_sent: u64,
    pub frames_sent: u64,
    pub dropped_frames: u64,
}

impl Stats {
    pub(crate) fn add_bytes(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_dropped(&self) {
        self.dropped_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        self.bytes_sent.store(0, Ordering::Relaxed);
        self.frames_sent.store(0, Ordering::Relaxed);
        self.dropped_frames.store(0, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_sent: self.bytes_sent(),
            frames_sent: self.frames_sent(),
            dropped_frames: self.dropped_frames(),
        }
    }
}
