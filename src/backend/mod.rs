//! Boundary between the session core and the codec/container library.
//!
//! Every collaborator call returns `anyhow::Result`; the session decides which
//! [`ErrorKind`](crate::ErrorKind) a failure maps to from the stage it happened in.

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;
#[cfg(test)]
pub(crate) mod mock;

use crate::{
    config::{ConnectOptions, SessionConfig},
    packet::{EncodedPacket, StreamKind},
    timebase::Rational,
};

/// Factory for the per-connection resources. A backend is kept for the whole
/// life of a session; outputs and encoders are created fresh on every connect.
pub trait MediaBackend: Send + 'static {
    type Output: MuxOutput;
    type Video: VideoEncode;
    type Audio: AudioEncode;

    fn open_output(&self, url: &str, options: &ConnectOptions) -> anyhow::Result<Self::Output>;

    /// Opens the video encoder and registers its stream on `output`.
    fn open_video(
        &self,
        config: &SessionConfig,
        output: &mut Self::Output,
    ) -> anyhow::Result<Self::Video>;

    /// Opens the audio encoder and registers its stream on `output`. Must not
    /// leave a stream behind when it fails.
    fn open_audio(
        &self,
        config: &SessionConfig,
        output: &mut Self::Output,
    ) -> anyhow::Result<Self::Audio>;
}

/// Container plus transport for one push target.
pub trait MuxOutput: Send {
    /// True when the transport has to be opened explicitly before the header.
    fn requires_open(&self) -> bool;

    fn open(&mut self) -> anyhow::Result<()>;

    fn write_header(&mut self, options: &[(&str, &str)]) -> anyhow::Result<()>;

    /// Timebase of the stream carrying `kind`. Containers may replace the
    /// requested timebase while writing the header.
    fn time_base(&self, kind: StreamKind) -> Option<Rational>;

    /// `packet` timestamps must be in [`MuxOutput::time_base`] of its stream.
    fn write_interleaved(&mut self, packet: EncodedPacket) -> anyhow::Result<()>;

    fn write_trailer(&mut self) -> anyhow::Result<()>;

    fn close(&mut self) -> anyhow::Result<()>;
}

/// Surface shared by both encoders.
pub trait Encode: Send {
    fn time_base(&self) -> Rational;

    fn send_eof(&mut self) -> anyhow::Result<()>;

    /// `Ok(None)` once the encoder needs more input or is fully drained.
    /// Packet timestamps are in [`Encode::time_base`].
    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>>;
}

pub trait VideoEncode: Encode {
    /// Converts an RGBA picture into the encoder's picture buffer.
    fn convert(&mut self, rgba: &[u8]) -> anyhow::Result<()>;

    /// Submits the last converted picture.
    fn send_frame(&mut self, pts: i64) -> anyhow::Result<()>;
}

pub trait AudioEncode: Encode {
    /// Encoder sample rate; the rate resampled planes come out at.
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> usize;

    /// Samples per channel the encoder takes in one frame.
    fn frame_size(&self) -> usize;

    /// Interleaved float input to one plane per channel at the encoder rate.
    fn resample(&mut self, pcm: &[f32], samples: usize) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Samples still held back by the resampler.
    fn flush_resampler(&mut self) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Submits exactly [`AudioEncode::frame_size`] samples per plane.
    fn send_frame(&mut self, planes: &[Vec<f32>], pts: i64) -> anyhow::Result<()>;
}
