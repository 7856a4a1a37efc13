use crate::{
    backend::{AudioEncode, MuxOutput},
    error::{BackendResultExt, BridgeError, ErrorKind, Result},
    stats::Stats,
    timebase::{MILLIS, Rational, rescale},
};

use super::{drain, drain_to_end, fifo::SampleFifo, keep_first};

/// Resample, buffer to whole encoder frames, encode, mux. Only present when the
/// audio encoder opened at connect time.
pub(crate) struct AudioPipeline<A> {
    encoder: A,
    input_channels: usize,
    fifo: SampleFifo,
}

impl<A: AudioEncode> AudioPipeline<A> {
    pub(crate) fn new(encoder: A, input_channels: usize) -> Self {
        let fifo = SampleFifo::new(encoder.channels(), encoder.frame_size());
        Self {
            encoder,
            input_channels,
            fifo,
        }
    }

    pub(crate) fn send<O: MuxOutput>(
        &mut self,
        output: &mut O,
        stats: &Stats,
        pcm: &[f32],
        samples: usize,
        pts_ms: i64,
    ) -> Result<()> {
        let needed = samples.checked_mul(self.input_channels);
        match needed {
            Some(needed) if samples > 0 && pcm.len() >= needed => {}
            _ => {
                return Err(BridgeError::invalid_params(format!(
                    "send_audio: {} samples x {} channels does not fit {} values",
                    samples,
                    self.input_channels,
                    pcm.len()
                )));
            }
        }
        let pcm = &pcm[..samples * self.input_channels];

        let planes = self
            .encoder
            .resample(pcm, samples)
            .or_kind(ErrorKind::EncodeFailed, "resample audio")?;
        let rate = Rational::new(1, self.encoder.sample_rate() as i32);
        self.fifo.push(planes, Some(rescale(pts_ms, MILLIS, rate)));

        while let Some((frame, pts)) = self.fifo.pop() {
            self.encode(output, stats, &frame, pts)?;
        }
        Ok(())
    }

    /// Drains the resampler and the buffered tail, padded to a whole frame,
    /// then flushes the encoder. A failed write loses that packet only; the
    /// first failure is reported once everything is out.
    pub(crate) fn flush<O: MuxOutput>(&mut self, output: &mut O, stats: &Stats) -> Result<()> {
        let tail = self
            .encoder
            .flush_resampler()
            .or_kind(ErrorKind::EncodeFailed, "flush resampler")?;
        self.fifo.push(tail, None);
        let mut frames = Vec::new();
        while let Some(frame) = self.fifo.pop() {
            frames.push(frame);
        }
        frames.extend(self.fifo.pop_padded());

        let mut first = None;
        let mut written = 0;
        for (frame, pts) in frames {
            self.submit(&frame, pts)?;
            let drained = drain_to_end(&mut self.encoder, output, stats, || {});
            written += keep_first(&mut first, drained);
        }
        self.encoder
            .send_eof()
            .or_kind(ErrorKind::EncodeFailed, "flush audio encoder")?;
        let drained = drain_to_end(&mut self.encoder, output, stats, || {});
        written += keep_first(&mut first, drained);
        log::debug!("audio encoder flushed, {} packets", written);
        first.map_or(Ok(()), Err)
    }

    fn encode<O: MuxOutput>(
        &mut self,
        output: &mut O,
        stats: &Stats,
        frame: &[Vec<f32>],
        pts: i64,
    ) -> Result<()> {
        self.submit(frame, pts)?;
        drain(&mut self.encoder, output, stats)?;
        Ok(())
    }

    fn submit(&mut self, frame: &[Vec<f32>], pts: i64) -> Result<()> {
        // fifo pts are samples at the encoder rate
        let pts = rescale(
            pts,
            Rational::new(1, self.encoder.sample_rate() as i32),
            self.encoder.time_base(),
        );
        self.encoder
            .send_frame(frame, pts)
            .or_kind(ErrorKind::EncodeFailed, "send audio frame")
    }
}
