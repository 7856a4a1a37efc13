use crate::{
    backend::{MuxOutput, VideoEncode},
    error::{BackendResultExt, BridgeError, ErrorKind, Result},
    stats::Stats,
    timebase::{MILLIS, rescale},
};

use super::{drain, drain_to_end};

pub(crate) struct VideoPipeline<V> {
    encoder: V,
    frame_len: usize,
    last_pts: Option<i64>,
}

impl<V: VideoEncode> VideoPipeline<V> {
    pub(crate) fn new(encoder: V, frame_len: usize) -> Self {
        Self {
            encoder,
            frame_len,
            last_pts: None,
        }
    }

    /// Converts, encodes and muxes one RGBA picture. A failed write counts the
    /// frame as dropped and leaves the rest of its packets in the encoder.
    pub(crate) fn send<O: MuxOutput>(
        &mut self,
        output: &mut O,
        stats: &Stats,
        rgba: &[u8],
        pts_ms: i64,
    ) -> Result<()> {
        if rgba.len() != self.frame_len {
            return Err(BridgeError::invalid_params(format!(
                "send_video: frame is {} bytes, expected {}",
                rgba.len(),
                self.frame_len
            )));
        }
        self.encoder
            .convert(rgba)
            .or_kind(ErrorKind::EncodeFailed, "convert frame")?;

        let pts = self.next_pts(pts_ms);
        self.encoder
            .send_frame(pts)
            .or_kind(ErrorKind::EncodeFailed, "send frame")?;
        self.drain(output, stats)?;
        stats.frame_sent();
        Ok(())
    }

    /// Signals end of stream and writes everything the encoder still holds.
    /// Each packet that fails to write counts as one dropped frame.
    pub(crate) fn flush<O: MuxOutput>(&mut self, output: &mut O, stats: &Stats) -> Result<()> {
        self.encoder
            .send_eof()
            .or_kind(ErrorKind::EncodeFailed, "flush video encoder")?;
        let written = drain_to_end(&mut self.encoder, output, stats, || stats.frame_dropped())?;
        log::debug!("video encoder flushed, {} packets", written);
        Ok(())
    }

    fn drain<O: MuxOutput>(&mut self, output: &mut O, stats: &Stats) -> Result<usize> {
        drain(&mut self.encoder, output, stats).inspect_err(|e| {
            if e.kind() == ErrorKind::SendFailed {
                stats.frame_dropped();
            }
        })
    }

    // Millisecond jitter can collapse two frames onto one codec tick.
    fn next_pts(&mut self, pts_ms: i64) -> i64 {
        let mut pts = rescale(pts_ms, MILLIS, self.encoder.time_base());
        if let Some(last) = self.last_pts {
            if pts <= last {
                log::debug!("video pts {} not after {}, bumped", pts, last);
                pts = last.saturating_add(1);
            }
        }
        self.last_pts = Some(pts);
        pts
    }
}
