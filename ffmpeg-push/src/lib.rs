#![allow(dead_code)]

use ffmpeg_next::util::log::Level;

pub use ffmpeg_next::{Dictionary, Rational};

/// Registers FFmpeg components and applies the FFmpeg log level from
/// `RTMP_BRIDGE_FFMPEG_LOG`. Safe to call more than once.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::util::log::set_level(log_level_from_env());
    Ok(())
}

fn log_level_from_env() -> Level {
    match std::env::var("RTMP_BRIDGE_FFMPEG_LOG") {
        Ok(value) => parse_log_level(&value),
        Err(_) => Level::Error,
    }
}

fn parse_log_level(raw: &str) -> Level {
    match raw.trim().to_ascii_lowercase().as_str() {
        "quiet" => Level::Quiet,
        "panic" => Level::Panic,
        "fatal" => Level::Fatal,
        "warning" | "warn" => Level::Warning,
        "info" => Level::Info,
        "verbose" => Level::Verbose,
        "debug" => Level::Debug,
        "trace" => Level::Trace,
        _ => Level::Error,
    }
}

pub mod encoder;
pub mod frame;
pub mod output;
pub mod packet;
pub mod resampler;
pub mod scaler;
