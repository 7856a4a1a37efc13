use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use rtmp_bridge::{ConnectOptions, FfmpegBackend, Session, SessionConfig, StreamTask, task};
use tokio_util::sync::CancellationToken;

mod api;
mod pattern;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(5);
const TONE_HZ: f64 = 440.0;

/// Push a generated test pattern and tone to an RTMP endpoint.
#[derive(Parser)]
#[command(name = "rtmp-bridge", version)]
struct Args {
    /// Target, e.g. rtmp://localhost/live/test
    #[arg(short, long)]
    url: String,

    /// JSON session config; the flags below override its fields
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long)]
    bitrate_kbps: Option<u32>,

    /// Seconds between keyframes
    #[arg(long)]
    keyframe_interval: Option<u32>,

    #[arg(long)]
    sample_rate: Option<u32>,

    #[arg(long)]
    channels: Option<u32>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(short, long)]
    duration: Option<u64>,

    /// Serve live stats as JSON on this address
    #[arg(long)]
    stats_addr: Option<SocketAddr>,

    /// Frames and audio blocks queued before new ones are dropped
    #[arg(long, default_value_t = task::DEFAULT_QUEUE_BOUND)]
    queue: usize,

    /// Container format
    #[arg(long, default_value = "flv")]
    format: String,

    /// Network read/write timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Encoder name instead of the default H.264 encoder
    #[arg(long)]
    video_codec: Option<String>,
}

fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .filter_module("rtmp_bridge", log::LevelFilter::Debug)
        .filter_module("ffmpeg_push", log::LevelFilter::Debug)
        .init();
}

fn build_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_file(path)?,
        None => SessionConfig::new(1280, 720, 30, 2500),
    };
    if let Some(width) = args.width {
        config.width = width;
    }
    if let Some(height) = args.height {
        config.height = height;
    }
    if let Some(fps) = args.fps {
        config.fps = fps;
    }
    if let Some(bitrate) = args.bitrate_kbps {
        config.bitrate_kbps = bitrate;
    }
    if let Some(seconds) = args.keyframe_interval {
        config.keyframe_interval_sec = seconds;
    }
    if args.sample_rate.is_some() {
        config.audio_sample_rate = args.sample_rate;
    }
    if args.channels.is_some() {
        config.audio_channels = args.channels;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    let config = build_config(&args)?;

    let mut backend = FfmpegBackend::new()?;
    if let Some(codec) = &args.video_codec {
        backend = backend.with_video_codec(codec);
    }
    let options = ConnectOptions {
        format: args.format.clone(),
        io_timeout_ms: args.timeout_ms,
    };
    let session = Arc::new(Session::with_options(backend, options));
    session.initialize(config.clone())?;
    session.connect(&args.url)?;
    session.start_streaming()?;

    let cancel = CancellationToken::new();
    let task = StreamTask::start(session.clone(), args.queue);
    if let Some(addr) = args.stats_addr {
        let state = api::ApiState {
            session: session.clone(),
            queue_dropped: task.queue_dropped_counter(),
        };
        api::start_api_server(addr, state, cancel.clone());
    }

    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("ctrl-c received, stopping");
            ctrl_c_cancel.cancel();
        }
    });
    if let Some(seconds) = args.duration {
        let duration_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            duration_cancel.cancel();
        });
    }

    let mut pattern = pattern::TestPattern::new(config.width, config.height, config.fps);
    let mut tone = pattern::Tone::new(
        config.audio_sample_rate(),
        config.audio_channels(),
        TONE_HZ,
    );
    let mut frames = tokio::time::interval(Duration::from_secs_f64(1.0 / config.fps as f64));
    let mut stats_log = tokio::time::interval(STATS_LOG_INTERVAL);
    let started = Instant::now();
    let mut samples_pushed: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            },
            _ = frames.tick() => {
                let elapsed = started.elapsed();
                let pts_ms = elapsed.as_millis() as i64;
                if !task.push_video(pattern.next_frame(), pts_ms) {
                    log::error!("stream task stopped unexpectedly");
                    break;
                }

                // audio catches up to the wall clock in whole blocks
                let due = (elapsed.as_secs_f64() * tone.rate() as f64) as u64;
                let samples = due.saturating_sub(samples_pushed) as usize;
                if samples > 0 {
                    let pts_ms = (samples_pushed * 1000 / tone.rate() as u64) as i64;
                    task.push_audio(tone.next_block(samples), samples, pts_ms);
                    samples_pushed += samples as u64;
                }
            },
            _ = stats_log.tick() => {
                let stats = session.stats();
                log::info!(
                    "stats: {} frames, {} bytes, {} dropped, {} queue drops",
                    stats.frames_sent,
                    stats.bytes_sent,
                    stats.dropped_frames,
                    task.queue_dropped()
                );
            },
        }
    }

    cancel.cancel();
    let report = task.finish().await?;
    if let Err(e) = session.disconnect() {
        log::warn!("disconnect: {}", e);
    }
    let stats = session.stats();
    log::info!(
        "done: {} video, {} audio, {} failed sends; {} bytes sent",
        report.video_sent,
        report.audio_sent,
        report.failed,
        stats.bytes_sent
    );
    session.cleanup()?;
    Ok(())
}
