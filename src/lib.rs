//! Live push bridge: raw RGBA pictures and float PCM in, H.264/AAC over
//! RTMP (FLV) out.
//!
//! A [`Session`] is driven through
//! `initialize -> connect -> start_streaming -> send_* -> stop_streaming -> disconnect -> cleanup`.
//! The codec and container work sits behind the [`backend`] traits; the
//! `ffmpeg` feature provides the FFmpeg implementation and the C ABI in [`ffi`].

pub mod backend;
pub mod config;
pub mod error;
#[cfg(feature = "ffmpeg")]
pub mod ffi;
pub mod packet;
mod pipeline;
pub mod session;
pub mod state;
pub mod stats;
pub mod task;
pub mod timebase;

pub use config::{ConnectOptions, SessionConfig};
pub use error::{BridgeError, ErrorKind, Result};
pub use session::Session;
pub use state::SessionState;
pub use stats::StatsSnapshot;
pub use task::{StreamTask, TaskReport};

#[cfg(feature = "ffmpeg")]
pub use backend::ffmpeg::FfmpegBackend;

/// Session driven by the FFmpeg backend.
#[cfg(feature = "ffmpeg")]
pub type FfmpegSession = Session<FfmpegBackend>;

/// Name of the encoding backend compiled in.
pub fn build_info() -> &'static str {
    if cfg!(feature = "ffmpeg") {
        "ffmpeg-bridge"
    } else {
        "no-backend"
    }
}
