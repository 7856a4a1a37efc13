use ffmpeg_push::{
    Dictionary,
    encoder::{AudioEncoder, AudioSettings, VideoEncoder, VideoSettings},
    frame::AllocError as FrameAllocError,
    output::AvOutput,
    packet::RawPacket,
};

use super::{AudioEncode, Encode, MediaBackend, MuxOutput, VideoEncode};
use crate::{
    config::{ConnectOptions, SessionConfig},
    error::AllocError,
    packet::{EncodedPacket, StreamKind},
    timebase::Rational,
};

const PRESET: &str = "ultrafast";
const TUNE: &str = "zerolatency";
const PROFILE: &str = "main";

fn to_rational(r: ffmpeg_push::Rational) -> Rational {
    Rational::new(r.numerator(), r.denominator())
}

/// Re-tags frame allocation failures so the session reports them as such.
fn classify(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<FrameAllocError>() {
        Some(alloc) => AllocError(alloc.0.clone()).into(),
        None => err,
    }
}

fn encoded(kind: StreamKind, raw: RawPacket) -> EncodedPacket {
    EncodedPacket {
        kind,
        data: raw.data(),
        pts: raw.pts(),
        dts: raw.dts(),
        duration: raw.duration(),
        is_key: raw.is_key(),
    }
}

/// H.264 + AAC into FLV through libavcodec/libavformat.
#[derive(Debug, Clone, Default)]
pub struct FfmpegBackend {
    video_codec: Option<String>,
    audio_codec: Option<String>,
}

impl FfmpegBackend {
    /// Initializes FFmpeg once per process; later calls are no-ops.
    pub fn new() -> anyhow::Result<Self> {
        ffmpeg_push::init()?;
        Ok(Self::default())
    }

    /// Encoder by name, e.g. `libx264` or `h264_nvenc`, instead of the default H.264 one.
    pub fn with_video_codec(mut self, name: impl Into<String>) -> Self {
        self.video_codec = Some(name.into());
        self
    }

    pub fn with_audio_codec(mut self, name: impl Into<String>) -> Self {
        self.audio_codec = Some(name.into());
        self
    }

    fn video_settings(&self, config: &SessionConfig) -> anyhow::Result<VideoSettings> {
        Ok(VideoSettings {
            width: config.width,
            height: config.height,
            fps: config.fps,
            bit_rate: usize::try_from(config.video_bitrate())?,
            gop: u32::try_from(config.gop_frames())?,
            codec: self.video_codec.clone(),
            preset: PRESET.to_string(),
            tune: TUNE.to_string(),
            profile: PROFILE.to_string(),
        })
    }

    fn audio_settings(&self, config: &SessionConfig) -> anyhow::Result<AudioSettings> {
        Ok(AudioSettings {
            sample_rate: config.audio_sample_rate(),
            channels: u16::try_from(config.audio_channels())?,
            bit_rate: usize::try_from(config.audio_bitrate())?,
            codec: self.audio_codec.clone(),
        })
    }
}

impl MediaBackend for FfmpegBackend {
    type Output = FfmpegOutput;
    type Video = FfmpegVideo;
    type Audio = FfmpegAudio;

    fn open_output(&self, url: &str, options: &ConnectOptions) -> anyhow::Result<FfmpegOutput> {
        let inner = AvOutput::new(url, &options.format)?;
        Ok(FfmpegOutput {
            inner,
            video_index: None,
            audio_index: None,
            io_timeout_ms: options.io_timeout_ms,
        })
    }

    fn open_video(
        &self,
        config: &SessionConfig,
        output: &mut FfmpegOutput,
    ) -> anyhow::Result<FfmpegVideo> {
        let settings = self.video_settings(config)?;
        let encoder = VideoEncoder::new(&mut output.inner, &settings).map_err(classify)?;
        output.video_index = Some(encoder.stream_index());
        Ok(FfmpegVideo(encoder))
    }

    fn open_audio(
        &self,
        config: &SessionConfig,
        output: &mut FfmpegOutput,
    ) -> anyhow::Result<FfmpegAudio> {
        let settings = self.audio_settings(config)?;
        let encoder = AudioEncoder::new(&mut output.inner, &settings).map_err(classify)?;
        output.audio_index = Some(encoder.stream_index());
        Ok(FfmpegAudio(encoder))
    }
}

pub struct FfmpegOutput {
    inner: AvOutput,
    video_index: Option<usize>,
    audio_index: Option<usize>,
    io_timeout_ms: Option<u64>,
}

impl FfmpegOutput {
    fn index(&self, kind: StreamKind) -> Option<usize> {
        match kind {
            StreamKind::Video => self.video_index,
            StreamKind::Audio => self.audio_index,
        }
    }
}

impl MuxOutput for FfmpegOutput {
    fn requires_open(&self) -> bool {
        self.inner.needs_io()
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let mut options = Dictionary::new();
        if let Some(ms) = self.io_timeout_ms {
            // microseconds
            options.set("rw_timeout", &(ms * 1000).to_string());
        }
        self.inner.open_io(options)?;
        log::info!("transport open: {}", self.inner.url());
        Ok(())
    }

    fn write_header(&mut self, options: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut dict = Dictionary::new();
        for (key, value) in options {
            dict.set(key, value);
        }
        self.inner.write_header(dict)
    }

    fn time_base(&self, kind: StreamKind) -> Option<Rational> {
        let index = self.index(kind)?;
        self.inner.stream_time_base(index).ok().map(to_rational)
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> anyhow::Result<()> {
        let index = self
            .index(packet.kind)
            .ok_or(anyhow::anyhow!("no {} stream", packet.kind))?;
        let time_base = self.inner.stream_time_base(index)?;
        let raw = RawPacket::from_data(
            &packet.data,
            packet.pts,
            packet.dts,
            packet.duration,
            packet.is_key,
            time_base,
        );
        self.inner.write_packet(index, raw)
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        self.inner.finish()
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.inner.close()
    }
}

pub struct FfmpegVideo(VideoEncoder);

impl Encode for FfmpegVideo {
    fn time_base(&self) -> Rational {
        to_rational(self.0.time_base())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.0.send_eof()
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        Ok(self
            .0
            .receive_packet()?
            .map(|raw| encoded(StreamKind::Video, raw)))
    }
}

impl VideoEncode for FfmpegVideo {
    fn convert(&mut self, rgba: &[u8]) -> anyhow::Result<()> {
        self.0.load_rgba(rgba).map_err(classify)
    }

    fn send_frame(&mut self, pts: i64) -> anyhow::Result<()> {
        self.0.send_frame(pts)
    }
}

pub struct FfmpegAudio(AudioEncoder);

impl Encode for FfmpegAudio {
    fn time_base(&self) -> Rational {
        to_rational(self.0.time_base())
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        self.0.send_eof()
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        Ok(self
            .0
            .receive_packet()?
            .map(|raw| encoded(StreamKind::Audio, raw)))
    }
}

impl AudioEncode for FfmpegAudio {
    fn sample_rate(&self) -> u32 {
        self.0.rate()
    }

    fn channels(&self) -> usize {
        self.0.channels()
    }

    fn frame_size(&self) -> usize {
        self.0.frame_size()
    }

    fn resample(&mut self, pcm: &[f32], samples: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        self.0.resample(pcm, samples)
    }

    fn flush_resampler(&mut self) -> anyhow::Result<Vec<Vec<f32>>> {
        self.0.flush_resampler()
    }

    fn send_frame(&mut self, planes: &[Vec<f32>], pts: i64) -> anyhow::Result<()> {
        self.0.send_planar(planes, pts).map_err(classify)
    }
}
