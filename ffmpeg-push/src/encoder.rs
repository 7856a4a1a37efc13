use ffmpeg_next::{
    Dictionary, Rational, codec,
    format::{Pixel, Sample, sample::Type},
    frame,
};

use crate::{
    frame::{alloc_audio_frame, alloc_video_frame, channel_layout, make_writable, write_planar_f32},
    output::AvOutput,
    packet::RawPacket,
    resampler::Resampler,
    scaler::Scaler,
};

/// AAC's fixed frame length, used when the codec reports a variable frame size.
const DEFAULT_AUDIO_FRAME_SIZE: usize = 1024;

pub enum EncoderType {
    Video(codec::encoder::Video),
    Audio(codec::encoder::Audio),
}

impl EncoderType {
    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        match self {
            EncoderType::Video(encoder) => encoder.send_eof()?,
            EncoderType::Audio(encoder) => encoder.send_eof()?,
        }
        Ok(())
    }

    /// `Ok(None)` once the encoder needs more input or is fully drained.
    pub fn encoder_receive_packet(
        &mut self,
        time_base: Rational,
    ) -> anyhow::Result<Option<RawPacket>> {
        let mut packet = codec::packet::Packet::empty();
        let encode_result = match self {
            EncoderType::Video(encoder) => encoder.receive_packet(&mut packet),
            EncoderType::Audio(encoder) => encoder.receive_packet(&mut packet),
        };

        match encode_result {
            Ok(()) => Ok(Some(RawPacket::from((packet, time_base)))),
            Err(ffmpeg_next::Error::Other { errno })
                if errno == ffmpeg_next::util::error::EAGAIN =>
            {
                Ok(None)
            }
            Err(ffmpeg_next::Error::Eof) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VideoSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    // bps
    pub bit_rate: usize,
    // frames between keyframes
    pub gop: u32,
    // None = default H.264 encoder
    pub codec: Option<String>,
    pub preset: String,
    pub tune: String,
    pub profile: String,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            bit_rate: 2_000_000,
            gop: 60,
            codec: None,
            preset: "ultrafast".to_string(),
            tune: "zerolatency".to_string(),
            profile: "main".to_string(),
        }
    }
}

fn find_codec(name: Option<&str>, id: codec::Id) -> anyhow::Result<ffmpeg_next::Codec> {
    match name {
        Some(name) => ffmpeg_next::encoder::find_by_name(name)
            .ok_or(anyhow::anyhow!("codec not found: {}", name)),
        None => ffmpeg_next::encoder::find(id).ok_or(anyhow::anyhow!("no encoder for {:?}", id)),
    }
}

/// H.264 encoder fed from RGBA pictures; owns its scaler and the picture it encodes from.
pub struct VideoEncoder {
    inner: EncoderType,
    time_base: Rational,
    stream_index: usize,
    scaler: Scaler,
    frame: frame::Video,
}

impl VideoEncoder {
    /// Opens the encoder and registers its stream on `output`.
    pub fn new(output: &mut AvOutput, settings: &VideoSettings) -> anyhow::Result<Self> {
        let codec = find_codec(settings.codec.as_deref(), codec::Id::H264)?;
        let mut encoder = codec::Context::new_with_codec(codec).encoder().video()?;
        encoder.set_width(settings.width);
        encoder.set_height(settings.height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(Rational::new(1, settings.fps as i32));
        encoder.set_frame_rate(Some(Rational::new(settings.fps as i32, 1)));
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_gop(settings.gop);
        encoder.set_max_b_frames(0);
        if output.global_header() {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut opts = Dictionary::new();
        opts.set("preset", &settings.preset);
        opts.set("tune", &settings.tune);
        opts.set("profile", &settings.profile);
        let encoder = encoder.open_with(opts)?;

        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        let scaler = Scaler::new(settings.width, settings.height, Pixel::YUV420P)?;
        let frame = alloc_video_frame(Pixel::YUV420P, settings.width, settings.height)?;
        // last fallible step, so a failed open never leaves a stream behind
        let stream_index = output.add_stream(codec, &encoder, time_base)?;

        log::info!(
            "video encoder opened: {} {}x{}@{} {}bps gop {}",
            codec.name(),
            settings.width,
            settings.height,
            settings.fps,
            settings.bit_rate,
            settings.gop
        );
        Ok(Self {
            inner: EncoderType::Video(encoder),
            time_base,
            stream_index,
            scaler,
            frame,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Converts an RGBA picture into the encoder's YUV420P picture.
    pub fn load_rgba(&mut self, rgba: &[u8]) -> anyhow::Result<()> {
        make_writable(&mut self.frame)?;
        self.scaler.run(rgba, &mut self.frame)
    }

    /// Submits the last loaded picture; `pts` is in the encoder timebase.
    pub fn send_frame(&mut self, pts: i64) -> anyhow::Result<()> {
        self.frame.set_pts(Some(pts));
        match &mut self.inner {
            EncoderType::Video(encoder) => encoder.send_frame(&self.frame)?,
            EncoderType::Audio(_) => anyhow::bail!("invalid frame type"),
        }
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()
    }

    pub fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        self.inner.encoder_receive_packet(self.time_base)
    }
}

unsafe impl Send for VideoEncoder {}

#[derive(Debug, Clone)]
pub struct AudioSettings {
    // rate of the samples handed to the encoder pipeline
    pub sample_rate: u32,
    pub channels: u16,
    // bps
    pub bit_rate: usize,
    // None = default AAC encoder
    pub codec: Option<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: 2,
            bit_rate: 128_000,
            codec: None,
        }
    }
}

/// Picks `wanted` if the codec accepts it, otherwise the nearest rate it lists.
fn supported_rate(codec: ffmpeg_next::Codec, wanted: u32) -> u32 {
    let rates: Vec<i32> = match codec.audio().ok().and_then(|a| a.rates()) {
        Some(rates) => rates.collect(),
        None => return wanted,
    };
    if rates.is_empty() || rates.contains(&(wanted as i32)) {
        return wanted;
    }
    rates
        .into_iter()
        .min_by_key(|rate| (*rate as i64 - wanted as i64).abs())
        .map(|rate| rate as u32)
        .unwrap_or(wanted)
}

/// AAC encoder fed from interleaved float samples through its own resampler.
pub struct AudioEncoder {
    inner: EncoderType,
    time_base: Rational,
    stream_index: usize,
    rate: u32,
    channels: usize,
    frame_size: usize,
    resampler: Resampler,
    frame: frame::Audio,
}

impl AudioEncoder {
    pub fn new(output: &mut AvOutput, settings: &AudioSettings) -> anyhow::Result<Self> {
        let codec = find_codec(settings.codec.as_deref(), codec::Id::AAC)?;
        let layout = channel_layout(settings.channels)?;
        let rate = supported_rate(codec, settings.sample_rate);

        let mut encoder = codec::Context::new_with_codec(codec).encoder().audio()?;
        encoder.set_rate(rate as i32);
        encoder.set_channel_layout(layout);
        encoder.set_format(Sample::F32(Type::Planar));
        encoder.set_bit_rate(settings.bit_rate);
        encoder.set_time_base(Rational::new(1, rate as i32));
        if output.global_header() {
            encoder.set_flags(codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder.open_with(Dictionary::new())?;

        let frame_size = match encoder.frame_size() as usize {
            0 => DEFAULT_AUDIO_FRAME_SIZE,
            n => n,
        };
        let time_base: Rational = unsafe { (*encoder.0.as_ptr()).time_base.into() };
        let resampler = Resampler::new(settings.channels, layout, settings.sample_rate, rate)?;
        let frame = alloc_audio_frame(Sample::F32(Type::Planar), frame_size, layout, rate)?;
        let stream_index = output.add_stream(codec, &encoder, time_base)?;

        log::info!(
            "audio encoder opened: {} {}Hz x{} {}bps frame_size {}",
            codec.name(),
            rate,
            settings.channels,
            settings.bit_rate,
            frame_size
        );
        Ok(Self {
            inner: EncoderType::Audio(encoder),
            time_base,
            stream_index,
            rate,
            channels: settings.channels as usize,
            frame_size,
            resampler,
            frame,
        })
    }

    pub fn time_base(&self) -> Rational {
        self.time_base
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn resample(&mut self, pcm: &[f32], samples: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        self.resampler.run(pcm, samples)
    }

    pub fn flush_resampler(&mut self) -> anyhow::Result<Vec<Vec<f32>>> {
        self.resampler.flush()
    }

    /// Submits exactly one encoder frame of planar samples; `pts` is in the encoder timebase.
    pub fn send_planar(&mut self, planes: &[Vec<f32>], pts: i64) -> anyhow::Result<()> {
        make_writable(&mut self.frame)?;
        write_planar_f32(&mut self.frame, planes)?;
        self.frame.set_pts(Some(pts));
        match &mut self.inner {
            EncoderType::Audio(encoder) => encoder.send_frame(&self.frame)?,
            EncoderType::Video(_) => anyhow::bail!("invalid frame type"),
        }
        Ok(())
    }

    pub fn send_eof(&mut self) -> anyhow::Result<()> {
        self.inner.send_eof()
    }

    pub fn receive_packet(&mut self) -> anyhow::Result<Option<RawPacket>> {
        self.inner.encoder_receive_packet(self.time_base)
    }
}

unsafe impl Send for AudioEncoder {}
