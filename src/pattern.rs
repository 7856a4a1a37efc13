use bytes::Bytes;

const BARS: [[u8; 4]; 8] = [
    [255, 255, 255, 255],
    [255, 255, 0, 255],
    [0, 255, 255, 255],
    [0, 255, 0, 255],
    [255, 0, 255, 255],
    [255, 0, 0, 255],
    [0, 0, 255, 255],
    [0, 0, 0, 255],
];

/// Vertical color bars that scroll one bar width every second at `fps`.
pub(crate) struct TestPattern {
    width: usize,
    height: usize,
    fps: u64,
    frame: u64,
}

impl TestPattern {
    pub(crate) fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width: width as usize,
            height: height as usize,
            fps: fps.max(1) as u64,
            frame: 0,
        }
    }

    pub(crate) fn next_frame(&mut self) -> Bytes {
        let bar_width = (self.width / BARS.len()).max(1);
        let shift = (self.frame * bar_width as u64 / self.fps) as usize;
        let mut row = Vec::with_capacity(self.width * 4);
        for x in 0..self.width {
            let bar = ((x + shift) / bar_width) % BARS.len();
            row.extend_from_slice(&BARS[bar]);
        }
        let mut rgba = Vec::with_capacity(row.len() * self.height);
        for _ in 0..self.height {
            rgba.extend_from_slice(&row);
        }
        self.frame += 1;
        Bytes::from(rgba)
    }
}

/// Interleaved sine tone.
pub(crate) struct Tone {
    rate: u32,
    channels: usize,
    step: f64,
    phase: f64,
}

impl Tone {
    pub(crate) fn new(rate: u32, channels: u32, frequency: f64) -> Self {
        Self {
            rate,
            channels: channels as usize,
            step: std::f64::consts::TAU * frequency / rate as f64,
            phase: 0.0,
        }
    }

    pub(crate) fn rate(&self) -> u32 {
        self.rate
    }

    pub(crate) fn next_block(&mut self, samples: usize) -> Vec<f32> {
        let mut pcm = Vec::with_capacity(samples * self.channels);
        for _ in 0..samples {
            let value = (self.phase.sin() * 0.2) as f32;
            pcm.extend(std::iter::repeat(value).take(self.channels));
            self.phase = (self.phase + self.step) % std::f64::consts::TAU;
        }
        pcm
    }
}
