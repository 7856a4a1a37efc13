use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;

use super::{AudioEncode, Encode, MediaBackend, MuxOutput, VideoEncode};
use crate::{
    config::{ConnectOptions, SessionConfig},
    error::AllocError,
    packet::{EncodedPacket, StreamKind},
    timebase::{MILLIS, Rational},
};

pub(crate) const VIDEO_PACKET_SIZE: usize = 100;
pub(crate) const AUDIO_PACKET_SIZE: usize = 20;

/// Failure switches, shape knobs and everything the mock saw.
pub(crate) struct MockState {
    pub fail_output: bool,
    pub fail_video: bool,
    pub fail_video_alloc: bool,
    pub fail_audio: bool,
    pub fail_open: bool,
    pub fail_header: bool,
    pub fail_trailer: bool,
    pub fail_convert: bool,
    pub fail_video_send: bool,
    pub fail_audio_send: bool,
    /// The next N interleaved writes fail.
    pub fail_writes: usize,
    pub requires_open: bool,
    pub packets_per_frame: usize,
    /// Frames the video encoder holds back before emitting.
    pub video_delay: usize,
    pub audio_frame_size: usize,

    pub urls: Vec<String>,
    pub header_options: Vec<(String, String)>,
    pub written: Vec<EncodedPacket>,
    pub converted: usize,
    pub video_frames: Vec<i64>,
    pub audio_frames: Vec<(usize, i64)>,
    pub trailers: usize,
    pub opens: usize,
    pub closes: usize,
    pub outputs_created: usize,
    pub video_created: usize,
    pub audio_created: usize,
    pub live_outputs: usize,
    pub live_video: usize,
    pub live_audio: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            fail_output: false,
            fail_video: false,
            fail_video_alloc: false,
            fail_audio: false,
            fail_open: false,
            fail_header: false,
            fail_trailer: false,
            fail_convert: false,
            fail_video_send: false,
            fail_audio_send: false,
            fail_writes: 0,
            requires_open: true,
            packets_per_frame: 1,
            video_delay: 0,
            audio_frame_size: 1024,
            urls: Vec::new(),
            header_options: Vec::new(),
            written: Vec::new(),
            converted: 0,
            video_frames: Vec::new(),
            audio_frames: Vec::new(),
            trailers: 0,
            opens: 0,
            closes: 0,
            outputs_created: 0,
            video_created: 0,
            audio_created: 0,
            live_outputs: 0,
            live_video: 0,
            live_audio: 0,
        }
    }
}

impl MockState {
    pub fn written_of(&self, kind: StreamKind) -> Vec<&EncodedPacket> {
        self.written.iter().filter(|p| p.kind == kind).collect()
    }
}

pub(crate) type Shared = Arc<Mutex<MockState>>;

fn lock(state: &Shared) -> MutexGuard<'_, MockState> {
    state.lock().unwrap()
}

#[derive(Default)]
pub(crate) struct MockBackend {
    state: Shared,
}

impl MockBackend {
    pub fn state(&self) -> Shared {
        self.state.clone()
    }
}

impl MediaBackend for MockBackend {
    type Output = MockOutput;
    type Video = MockVideo;
    type Audio = MockAudio;

    fn open_output(&self, url: &str, options: &ConnectOptions) -> anyhow::Result<MockOutput> {
        let mut state = lock(&self.state);
        state.urls.push(url.to_string());
        if state.fail_output {
            anyhow::bail!("unknown format {}", options.format);
        }
        state.outputs_created += 1;
        state.live_outputs += 1;
        Ok(MockOutput {
            state: self.state.clone(),
            header_written: false,
        })
    }

    fn open_video(&self, config: &SessionConfig, _: &mut MockOutput) -> anyhow::Result<MockVideo> {
        let mut state = lock(&self.state);
        if state.fail_video_alloc {
            return Err(AllocError("video frame".to_string()).into());
        }
        if state.fail_video {
            anyhow::bail!("no h264 encoder");
        }
        state.video_created += 1;
        state.live_video += 1;
        Ok(MockVideo {
            state: self.state.clone(),
            time_base: Rational::new(1, config.fps as i32),
            gop: config.gop_frames().max(1) as usize,
            frames: 0,
            pending: VecDeque::new(),
            ready: VecDeque::new(),
        })
    }

    fn open_audio(&self, config: &SessionConfig, _: &mut MockOutput) -> anyhow::Result<MockAudio> {
        let mut state = lock(&self.state);
        if state.fail_audio {
            anyhow::bail!("no aac encoder");
        }
        state.audio_created += 1;
        state.live_audio += 1;
        Ok(MockAudio {
            state: self.state.clone(),
            rate: config.audio_sample_rate(),
            channels: config.audio_channels() as usize,
            frame_size: state.audio_frame_size,
            ready: VecDeque::new(),
        })
    }
}

pub(crate) struct MockOutput {
    state: Shared,
    header_written: bool,
}

impl MuxOutput for MockOutput {
    fn requires_open(&self) -> bool {
        lock(&self.state).requires_open
    }

    fn open(&mut self) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_open {
            anyhow::bail!("connection refused");
        }
        state.opens += 1;
        Ok(())
    }

    fn write_header(&mut self, options: &[(&str, &str)]) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_header {
            anyhow::bail!("handshake failed");
        }
        state.header_options = options
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.header_written = true;
        Ok(())
    }

    fn time_base(&self, _: StreamKind) -> Option<Rational> {
        self.header_written.then_some(MILLIS)
    }

    fn write_interleaved(&mut self, packet: EncodedPacket) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if !self.header_written {
            anyhow::bail!("write before header");
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            anyhow::bail!("broken pipe");
        }
        state.written.push(packet);
        Ok(())
    }

    fn write_trailer(&mut self) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_trailer {
            anyhow::bail!("broken pipe");
        }
        state.trailers += 1;
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        lock(&self.state).closes += 1;
        Ok(())
    }
}

impl Drop for MockOutput {
    fn drop(&mut self) {
        lock(&self.state).live_outputs -= 1;
    }
}

pub(crate) struct MockVideo {
    state: Shared,
    time_base: Rational,
    gop: usize,
    frames: usize,
    pending: VecDeque<(i64, bool)>,
    ready: VecDeque<EncodedPacket>,
}

impl MockVideo {
    fn emit(&mut self, pts: i64, is_key: bool, count: usize) {
        for _ in 0..count {
            self.ready.push_back(EncodedPacket {
                kind: StreamKind::Video,
                data: Bytes::from(vec![0u8; VIDEO_PACKET_SIZE]),
                pts: Some(pts),
                dts: Some(pts),
                duration: 1,
                is_key,
            });
        }
    }
}

impl Encode for MockVideo {
    fn time_base(&self) -> Rational {
        self.time_base
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        let count = lock(&self.state).packets_per_frame;
        while let Some((pts, is_key)) = self.pending.pop_front() {
            self.emit(pts, is_key, count);
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        Ok(self.ready.pop_front())
    }
}

impl VideoEncode for MockVideo {
    fn convert(&mut self, _: &[u8]) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_convert {
            anyhow::bail!("scale failed");
        }
        state.converted += 1;
        Ok(())
    }

    fn send_frame(&mut self, pts: i64) -> anyhow::Result<()> {
        let (delay, count) = {
            let mut state = lock(&self.state);
            if state.fail_video_send {
                anyhow::bail!("encoder rejected frame");
            }
            state.video_frames.push(pts);
            (state.video_delay, state.packets_per_frame)
        };
        let is_key = self.frames % self.gop == 0;
        self.frames += 1;
        self.pending.push_back((pts, is_key));
        while self.pending.len() > delay {
            if let Some((pts, is_key)) = self.pending.pop_front() {
                self.emit(pts, is_key, count);
            }
        }
        Ok(())
    }
}

impl Drop for MockVideo {
    fn drop(&mut self) {
        lock(&self.state).live_video -= 1;
    }
}

pub(crate) struct MockAudio {
    state: Shared,
    rate: u32,
    channels: usize,
    frame_size: usize,
    ready: VecDeque<EncodedPacket>,
}

impl Encode for MockAudio {
    fn time_base(&self) -> Rational {
        Rational::new(1, self.rate as i32)
    }

    fn send_eof(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn receive_packet(&mut self) -> anyhow::Result<Option<EncodedPacket>> {
        Ok(self.ready.pop_front())
    }
}

impl AudioEncode for MockAudio {
    fn sample_rate(&self) -> u32 {
        self.rate
    }

    fn channels(&self) -> usize {
        self.channels
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn resample(&mut self, pcm: &[f32], samples: usize) -> anyhow::Result<Vec<Vec<f32>>> {
        let mut planes = vec![Vec::with_capacity(samples); self.channels];
        for frame in pcm.chunks(self.channels).take(samples) {
            for (plane, sample) in planes.iter_mut().zip(frame) {
                plane.push(*sample);
            }
        }
        Ok(planes)
    }

    fn flush_resampler(&mut self) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(vec![Vec::new(); self.channels])
    }

    fn send_frame(&mut self, planes: &[Vec<f32>], pts: i64) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        if state.fail_audio_send {
            anyhow::bail!("encoder rejected samples");
        }
        if planes.len() != self.channels || planes.iter().any(|p| p.len() != self.frame_size) {
            anyhow::bail!("partial audio frame");
        }
        state.audio_frames.push((planes[0].len(), pts));
        self.ready.push_back(EncodedPacket {
            kind: StreamKind::Audio,
            data: Bytes::from(vec![0u8; AUDIO_PACKET_SIZE]),
            pts: Some(pts),
            dts: Some(pts),
            duration: self.frame_size as i64,
            is_key: true,
        });
        Ok(())
    }
}

impl Drop for MockAudio {
    fn drop(&mut self) {
        lock(&self.state).live_audio -= 1;
    }
}
