use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::{
    backend::{MediaBackend, MuxOutput},
    config::{ConnectOptions, SessionConfig},
    error::{BackendResultExt, BridgeError, ErrorKind, Result},
    pipeline::{AudioPipeline, VideoPipeline},
    state::{SessionState, StateCell},
    stats::{Stats, StatsSnapshot},
};

/// Header option that keeps FLV from seeking back to patch duration/filesize,
/// which a live transport cannot do.
const HEADER_OPTIONS: &[(&str, &str)] = &[("flvflags", "no_duration_filesize")];

/// Resources that exist only between connect and disconnect.
struct Connection<B: MediaBackend> {
    output: B::Output,
    video: VideoPipeline<B::Video>,
    audio: Option<AudioPipeline<B::Audio>>,
}

struct Core<B: MediaBackend> {
    backend: B,
    options: ConnectOptions,
    config: Option<SessionConfig>,
    connection: Option<Connection<B>>,
}

/// What introspection reads. Held only for field copies, never across I/O.
#[derive(Default)]
struct Meta {
    last_error: String,
    config: Option<SessionConfig>,
    started_at: Option<Instant>,
    audio_enabled: bool,
}

/// One push session: config, encoders and connection behind a single lock.
///
/// Every operation holds the lock for its whole body, so calls from several
/// threads run one at a time. State, statistics and the last error live outside
/// that lock and can be read while a send is blocked on the network.
pub struct Session<B: MediaBackend> {
    core: Mutex<Core<B>>,
    state: StateCell,
    stats: Stats,
    meta: Mutex<Meta>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn keep_first(first: &mut Option<BridgeError>, result: Result<()>) {
    if let Err(e) = result {
        log::warn!("teardown: {}", e);
        first.get_or_insert(e);
    }
}

impl<B: MediaBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self::with_options(backend, ConnectOptions::default())
    }

    pub fn with_options(backend: B, options: ConnectOptions) -> Self {
        Self {
            core: Mutex::new(Core {
                backend,
                options,
                config: None,
                connection: None,
            }),
            state: StateCell::new(),
            stats: Stats::default(),
            meta: Mutex::new(Meta::default()),
        }
    }

    /// Validates `config` and makes it the session config. Tears down any
    /// existing connection first, so it is safe from every state.
    pub fn initialize(&self, config: SessionConfig) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.initialize_locked(&mut core, config);
        self.record("initialize", result)
    }

    fn initialize_locked(&self, core: &mut Core<B>, config: SessionConfig) -> Result<()> {
        config.validate()?;
        if let Some(connection) = core.connection.take() {
            log::info!("initialize: replacing the open connection");
            if let Err(e) = Self::teardown(connection, &self.stats) {
                log::warn!("initialize: previous session did not close cleanly: {}", e);
            }
        }
        log::info!(
            "session initialized: {}x{}@{} {}kbps keyint {}s audio {}Hz x{}",
            config.width,
            config.height,
            config.fps,
            config.bitrate_kbps,
            config.keyframe_interval_sec,
            config.audio_sample_rate(),
            config.audio_channels()
        );
        core.config = Some(config.clone());
        self.stats.reset();
        {
            let mut meta = lock(&self.meta);
            meta.last_error.clear();
            meta.config = Some(config);
            meta.started_at = None;
            meta.audio_enabled = false;
        }
        self.state.set(SessionState::Initialized);
        Ok(())
    }

    /// Opens the container for `url`, the encoders and the transport, and
    /// writes the header. Nothing is kept when any mandatory step fails.
    pub fn connect(&self, url: &str) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.connect_locked(&mut core, url);
        self.record("connect", result)
    }

    fn connect_locked(&self, core: &mut Core<B>, url: &str) -> Result<()> {
        self.state
            .get()
            .require(&[SessionState::Initialized], "connect")?;
        if url.is_empty() {
            return Err(BridgeError::invalid_params("connect: empty url"));
        }
        let config = core
            .config
            .clone()
            .ok_or_else(|| BridgeError::not_connected("connect: not initialized"))?;

        let connection = Self::open_connection(&core.backend, &core.options, &config, url)?;
        let audio_enabled = connection.audio.is_some();
        core.connection = Some(connection);
        {
            let mut meta = lock(&self.meta);
            meta.started_at = Some(Instant::now());
            meta.audio_enabled = audio_enabled;
        }
        self.state.set(SessionState::Connected);
        log::info!("connected to {} (audio: {})", url, audio_enabled);
        Ok(())
    }

    fn open_connection(
        backend: &B,
        options: &ConnectOptions,
        config: &SessionConfig,
        url: &str,
    ) -> Result<Connection<B>> {
        let mut output = backend
            .open_output(url, options)
            .or_kind(ErrorKind::InitFailed, "open output")?;
        let video = backend
            .open_video(config, &mut output)
            .or_kind(ErrorKind::InitFailed, "open video encoder")?;
        let audio = match backend.open_audio(config, &mut output) {
            Ok(encoder) => Some(AudioPipeline::new(
                encoder,
                config.audio_channels() as usize,
            )),
            Err(e) => {
                log::warn!("audio disabled, streaming video only: {:#}", e);
                None
            }
        };

        if output.requires_open() {
            output
                .open()
                .or_kind(ErrorKind::ConnectFailed, "open transport")?;
        }
        if let Err(e) = output.write_header(HEADER_OPTIONS) {
            if let Err(close_err) = output.close() {
                log::warn!("close after failed header: {:#}", close_err);
            }
            return Err(BridgeError::from_backend(
                ErrorKind::ConnectFailed,
                "write header",
                e,
            ));
        }

        Ok(Connection {
            output,
            video: VideoPipeline::new(video, config.frame_len()),
            audio,
        })
    }

    pub fn start_streaming(&self) -> Result<()> {
        let _core = lock(&self.core);
        let result = self
            .state
            .get()
            .require(&[SessionState::Connected], "start_streaming")
            .map(|()| {
                lock(&self.meta).started_at = Some(Instant::now());
                self.state.set(SessionState::Streaming);
                log::info!("streaming started");
            });
        self.record("start_streaming", result)
    }

    /// Back to Connected; encoders and connection stay open.
    pub fn stop_streaming(&self) -> Result<()> {
        let _core = lock(&self.core);
        let result = self
            .state
            .get()
            .require(&[SessionState::Streaming], "stop_streaming")
            .map(|()| {
                self.state.set(SessionState::Connected);
                log::info!("streaming stopped");
            });
        self.record("stop_streaming", result)
    }

    /// Encodes one RGBA picture of exactly `width * height * 4` bytes.
    /// `pts_ms` is in milliseconds.
    pub fn send_video_frame(&self, rgba: &[u8], pts_ms: i64) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.send_video_locked(&mut core, rgba, pts_ms);
        self.record("send_video_frame", result)
    }

    fn send_video_locked(&self, core: &mut Core<B>, rgba: &[u8], pts_ms: i64) -> Result<()> {
        self.state
            .get()
            .require(&[SessionState::Streaming], "send_video_frame")?;
        let Some(Connection { output, video, .. }) = core.connection.as_mut() else {
            return Err(BridgeError::not_connected("send_video_frame: no connection"));
        };
        video.send(output, &self.stats, rgba, pts_ms)
    }

    /// Encodes interleaved float samples, `samples` per channel. Needs a
    /// connection; succeeds without doing anything while paused or when the
    /// connection has no audio stream.
    pub fn send_audio(&self, pcm: &[f32], samples: usize, pts_ms: i64) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.send_audio_locked(&mut core, pcm, samples, pts_ms);
        self.record("send_audio", result)
    }

    fn send_audio_locked(
        &self,
        core: &mut Core<B>,
        pcm: &[f32],
        samples: usize,
        pts_ms: i64,
    ) -> Result<()> {
        let state = self.state.get();
        state.require(
            &[SessionState::Connected, SessionState::Streaming],
            "send_audio",
        )?;
        if state != SessionState::Streaming {
            return Ok(());
        }
        let Some(Connection { output, audio, .. }) = core.connection.as_mut() else {
            return Err(BridgeError::not_connected("send_audio: no connection"));
        };
        let Some(audio) = audio.as_mut() else {
            return Ok(());
        };
        audio.send(output, &self.stats, pcm, samples, pts_ms)
    }

    /// Flushes both encoders, writes the trailer and releases the connection.
    /// Always ends in Initialized; reports the first teardown failure.
    pub fn disconnect(&self) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.disconnect_locked(&mut core);
        self.record("disconnect", result)
    }

    fn disconnect_locked(&self, core: &mut Core<B>) -> Result<()> {
        self.state.get().require(
            &[SessionState::Connected, SessionState::Streaming],
            "disconnect",
        )?;
        let result = match core.connection.take() {
            Some(connection) => Self::teardown(connection, &self.stats),
            None => Ok(()),
        };
        {
            let mut meta = lock(&self.meta);
            meta.started_at = None;
            meta.audio_enabled = false;
        }
        self.state.set(SessionState::Initialized);
        log::info!("disconnected, {} bytes sent", self.stats.bytes_sent());
        result
    }

    fn teardown(connection: Connection<B>, stats: &Stats) -> Result<()> {
        let Connection {
            mut output,
            mut video,
            mut audio,
        } = connection;
        let mut first = None;

        keep_first(&mut first, video.flush(&mut output, stats));
        if let Some(audio) = audio.as_mut() {
            keep_first(&mut first, audio.flush(&mut output, stats));
        }
        keep_first(
            &mut first,
            output
                .write_trailer()
                .or_kind(ErrorKind::SendFailed, "write trailer"),
        );
        if output.requires_open() {
            keep_first(
                &mut first,
                output
                    .close()
                    .or_kind(ErrorKind::SendFailed, "close transport"),
            );
        }

        drop(audio);
        drop(video);
        drop(output);
        first.map_or(Ok(()), Err)
    }

    /// Disconnects if needed and forgets the config. Ends in Idle.
    pub fn cleanup(&self) -> Result<()> {
        let mut core = lock(&self.core);
        let result = self.cleanup_locked(&mut core);
        self.record("cleanup", result)
    }

    fn cleanup_locked(&self, core: &mut Core<B>) -> Result<()> {
        self.state.get().require(
            &[
                SessionState::Initialized,
                SessionState::Connected,
                SessionState::Streaming,
            ],
            "cleanup",
        )?;
        let result = match core.connection.take() {
            Some(connection) => Self::teardown(connection, &self.stats),
            None => Ok(()),
        };
        core.config = None;
        self.stats.reset();
        {
            let mut meta = lock(&self.meta);
            meta.config = None;
            meta.started_at = None;
            meta.audio_enabled = false;
        }
        self.state.set(SessionState::Idle);
        log::info!("session cleaned up");
        result
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// Detail of the most recent failure; empty after a successful initialize.
    pub fn last_error(&self) -> String {
        lock(&self.meta).last_error.clone()
    }

    pub fn bytes_sent(&self) -> u64 {
        self.stats.bytes_sent()
    }

    pub fn frames_sent(&self) -> u64 {
        self.stats.frames_sent()
    }

    pub fn dropped_frames(&self) -> u64 {
        self.stats.dropped_frames()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn audio_enabled(&self) -> bool {
        lock(&self.meta).audio_enabled
    }

    pub fn config(&self) -> Option<SessionConfig> {
        lock(&self.meta).config.clone()
    }

    /// Time since the last connect or start, while connected.
    pub fn uptime(&self) -> Option<Duration> {
        lock(&self.meta).started_at.map(|t| t.elapsed())
    }

    pub(crate) fn record<T>(&self, op: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::error!("{} failed: {}", op, e);
            lock(&self.meta).last_error = e.to_string();
        }
        result
    }
}

impl<B: MediaBackend> Drop for Session<B> {
    fn drop(&mut self) {
        let core = self
            .core
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(connection) = core.connection.take() {
            if let Err(e) = Self::teardown(connection, &self.stats) {
                log::warn!("session dropped while connected: {}", e);
            }
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
