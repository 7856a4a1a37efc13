use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

pub const DEFAULT_KEYFRAME_INTERVAL_SEC: u32 = 2;
pub const DEFAULT_AUDIO_SAMPLE_RATE: u32 = 44100;
pub const DEFAULT_AUDIO_CHANNELS: u32 = 2;
pub const DEFAULT_AUDIO_BITRATE_KBPS: u32 = 128;

/// Session parameters. Frozen from `initialize` until the next re-initialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub bitrate_kbps: u32,
    #[serde(default = "default_keyframe_interval")]
    pub keyframe_interval_sec: u32,
    // None = DEFAULT_AUDIO_SAMPLE_RATE
    #[serde(default)]
    pub audio_sample_rate: Option<u32>,
    // None = DEFAULT_AUDIO_CHANNELS
    #[serde(default)]
    pub audio_channels: Option<u32>,
    // None = DEFAULT_AUDIO_BITRATE_KBPS
    #[serde(default)]
    pub audio_bitrate_kbps: Option<u32>,
}

fn default_keyframe_interval() -> u32 {
    DEFAULT_KEYFRAME_INTERVAL_SEC
}

impl SessionConfig {
    pub fn new(width: u32, height: u32, fps: u32, bitrate_kbps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate_kbps,
            keyframe_interval_sec: DEFAULT_KEYFRAME_INTERVAL_SEC,
            audio_sample_rate: None,
            audio_channels: None,
            audio_bitrate_kbps: None,
        }
    }

    pub fn with_keyframe_interval(mut self, seconds: u32) -> Self {
        self.keyframe_interval_sec = seconds;
        self
    }

    pub fn with_audio(mut self, sample_rate: u32, channels: u32, bitrate_kbps: u32) -> Self {
        self.audio_sample_rate = Some(sample_rate);
        self.audio_channels = Some(channels);
        self.audio_bitrate_kbps = Some(bitrate_kbps);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::invalid_params(format!("config json: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::invalid_params(format!("read config {}: {}", path.display(), e))
        })?;
        Self::from_json(&text)
    }

    /// Every present field must be strictly positive and the frame size must be addressable.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("width", self.width),
            ("height", self.height),
            ("fps", self.fps),
            ("bitrate_kbps", self.bitrate_kbps),
            ("keyframe_interval_sec", self.keyframe_interval_sec),
        ];
        let optional = [
            ("audio_sample_rate", self.audio_sample_rate),
            ("audio_channels", self.audio_channels),
            ("audio_bitrate_kbps", self.audio_bitrate_kbps),
        ];
        for (name, value) in required {
            if value == 0 {
                return Err(BridgeError::invalid_params(format!(
                    "invalid {}: must be > 0 ({}x{} @ {}fps, {}kbps)",
                    name, self.width, self.height, self.fps, self.bitrate_kbps
                )));
            }
        }
        for (name, value) in optional {
            if value == Some(0) {
                return Err(BridgeError::invalid_params(format!(
                    "invalid {}: must be > 0",
                    name
                )));
            }
        }
        let frame_len = (self.width as u64) * (self.height as u64) * 4;
        if usize::try_from(frame_len).is_err() || i32::try_from(self.gop_frames()).is_err() {
            return Err(BridgeError::invalid_params(format!(
                "frame geometry too large: {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Exact RGBA byte length of one input picture.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    /// Frames between forced keyframes.
    pub fn gop_frames(&self) -> u64 {
        self.fps as u64 * self.keyframe_interval_sec as u64
    }

    pub fn video_bitrate(&self) -> u64 {
        self.bitrate_kbps as u64 * 1000
    }

    pub fn audio_sample_rate(&self) -> u32 {
        self.audio_sample_rate.unwrap_or(DEFAULT_AUDIO_SAMPLE_RATE)
    }

    pub fn audio_channels(&self) -> u32 {
        self.audio_channels.unwrap_or(DEFAULT_AUDIO_CHANNELS)
    }

    pub fn audio_bitrate(&self) -> u64 {
        self.audio_bitrate_kbps.unwrap_or(DEFAULT_AUDIO_BITRATE_KBPS) as u64 * 1000
    }
}

/// Transport-side knobs, passed to `Session::with_options`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Container short name handed to the muxer.
    #[serde(default = "default_format")]
    pub format: String,
    /// Upper bound for one blocking network read or write.
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}

fn default_format() -> String {
    "flv".to_string()
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            format: default_format(),
            io_timeout_ms: None,
        }
    }
}
