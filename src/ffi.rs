//! C ABI for host engines that load the bridge as a shared library.
//!
//! Each session lives behind an opaque handle from [`rtmp_session_create`].
//! Functions return `0` on success or a negative code from [`ErrorKind::code`].

use std::ffi::{CStr, CString, c_char, c_int};
use std::sync::Mutex;

use crate::{
    FfmpegBackend, FfmpegSession, Session,
    config::SessionConfig,
    error::{BridgeError, ErrorKind, Result},
};

pub const RTMP_SUCCESS: c_int = 0;

const BUILD_INFO: &CStr = c"ffmpeg-bridge";

/// Mirrors the session config; optional fields use their default when `<= 0`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RtmpConfig {
    pub width: c_int,
    pub height: c_int,
    pub fps: c_int,
    pub bitrate_kbps: c_int,
    pub keyframe_interval: c_int,
    pub audio_sample_rate: c_int,
    pub audio_channels: c_int,
    pub audio_bitrate_kbps: c_int,
}

impl RtmpConfig {
    fn to_config(self) -> Result<SessionConfig> {
        let required = |name: &str, value: c_int| {
            u32::try_from(value)
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    BridgeError::invalid_params(format!(
                        "invalid video parameters: {} = {} ({}x{} @ {}fps, {}kbps)",
                        name, value, self.width, self.height, self.fps, self.bitrate_kbps
                    ))
                })
        };
        let optional = |value: c_int| u32::try_from(value).ok().filter(|v| *v > 0);

        let mut config = SessionConfig::new(
            required("width", self.width)?,
            required("height", self.height)?,
            required("fps", self.fps)?,
            required("bitrate_kbps", self.bitrate_kbps)?,
        );
        if let Some(seconds) = optional(self.keyframe_interval) {
            config.keyframe_interval_sec = seconds;
        }
        config.audio_sample_rate = optional(self.audio_sample_rate);
        config.audio_channels = optional(self.audio_channels);
        config.audio_bitrate_kbps = optional(self.audio_bitrate_kbps);
        Ok(config)
    }
}

pub struct BridgeHandle {
    session: FfmpegSession,
    // backs the pointer handed out by rtmp_get_error
    error: Mutex<CString>,
}

fn code(result: Result<()>) -> c_int {
    match result {
        Ok(()) => RTMP_SUCCESS,
        Err(e) => e.code(),
    }
}

fn clamp_int(value: u64) -> c_int {
    c_int::try_from(value).unwrap_or(c_int::MAX)
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
unsafe fn session<'a>(handle: *const BridgeHandle) -> Option<&'a FfmpegSession> {
    unsafe { handle.as_ref() }.map(|h| &h.session)
}

/// Returns null when FFmpeg cannot be initialized.
#[no_mangle]
pub extern "C" fn rtmp_session_create() -> *mut BridgeHandle {
    match FfmpegBackend::new() {
        Ok(backend) => Box::into_raw(Box::new(BridgeHandle {
            session: Session::new(backend),
            error: Mutex::new(CString::default()),
        })),
        Err(e) => {
            log::error!("rtmp_session_create: {:#}", e);
            std::ptr::null_mut()
        }
    }
}

/// Tears down whatever the session still holds and frees the handle.
///
/// # Safety
/// `handle` must be null or come from [`rtmp_session_create`], and must not be
/// used afterwards.
#[no_mangle]
pub unsafe extern "C" fn rtmp_session_destroy(handle: *mut BridgeHandle) {
    if !handle.is_null() {
        drop(unsafe { Box::from_raw(handle) });
    }
}

/// # Safety
/// `handle` as for [`rtmp_session_destroy`]; `config` null or valid.
#[no_mangle]
pub unsafe extern "C" fn rtmp_init(handle: *mut BridgeHandle, config: *const RtmpConfig) -> c_int {
    let Some(session) = (unsafe { session(handle) }) else {
        return ErrorKind::InvalidParams.code();
    };
    let Some(config) = (unsafe { config.as_ref() }) else {
        return code(session.record(
            "rtmp_init",
            Err(BridgeError::invalid_params("config is null")),
        ));
    };
    let result = config.to_config();
    code(
        session
            .record("rtmp_init", result)
            .and_then(|config| session.initialize(config)),
    )
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn rtmp_init_simple(
    handle: *mut BridgeHandle,
    width: c_int,
    height: c_int,
    fps: c_int,
    bitrate_kbps: c_int,
    keyframe_interval: c_int,
    audio_sample_rate: c_int,
    audio_channels: c_int,
    audio_bitrate_kbps: c_int,
) -> c_int {
    let config = RtmpConfig {
        width,
        height,
        fps,
        bitrate_kbps,
        keyframe_interval,
        audio_sample_rate,
        audio_channels,
        audio_bitrate_kbps,
    };
    unsafe { rtmp_init(handle, &config) }
}

/// # Safety
/// `handle` as above; `url` null or a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn rtmp_connect(handle: *mut BridgeHandle, url: *const c_char) -> c_int {
    let Some(session) = (unsafe { session(handle) }) else {
        return ErrorKind::InvalidParams.code();
    };
    if url.is_null() {
        return code(session.record(
            "rtmp_connect",
            Err(BridgeError::invalid_params("url is null")),
        ));
    }
    let url = unsafe { CStr::from_ptr(url) }.to_string_lossy();
    code(session.connect(&url))
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_start_streaming(handle: *mut BridgeHandle) -> c_int {
    match unsafe { session(handle) } {
        Some(session) => code(session.start_streaming()),
        None => ErrorKind::InvalidParams.code(),
    }
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_stop_streaming(handle: *mut BridgeHandle) -> c_int {
    match unsafe { session(handle) } {
        Some(session) => code(session.stop_streaming()),
        None => ErrorKind::InvalidParams.code(),
    }
}

/// # Safety
/// `rgba` must be null or point to `data_size` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn rtmp_send_video_frame(
    handle: *mut BridgeHandle,
    rgba: *const u8,
    data_size: c_int,
    pts: i64,
) -> c_int {
    let Some(session) = (unsafe { session(handle) }) else {
        return ErrorKind::InvalidParams.code();
    };
    let Ok(len) = usize::try_from(data_size) else {
        return code(session.record(
            "rtmp_send_video_frame",
            Err(BridgeError::invalid_params(format!("data_size {}", data_size))),
        ));
    };
    let data = if rgba.is_null() {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(rgba, len) }
    };
    code(session.send_video_frame(data, pts))
}

/// `num_samples` is per channel; `pcm` holds `num_samples * channels`
/// interleaved values.
///
/// # Safety
/// `pcm` must be null or point to that many readable floats.
#[no_mangle]
pub unsafe extern "C" fn rtmp_send_audio(
    handle: *mut BridgeHandle,
    pcm: *const f32,
    num_samples: c_int,
    pts: i64,
) -> c_int {
    let Some(session) = (unsafe { session(handle) }) else {
        return ErrorKind::InvalidParams.code();
    };
    let Ok(samples) = usize::try_from(num_samples) else {
        return code(session.record(
            "rtmp_send_audio",
            Err(BridgeError::invalid_params(format!("num_samples {}", num_samples))),
        ));
    };
    let channels = session
        .config()
        .map_or(0, |config| config.audio_channels() as usize);
    let data = if pcm.is_null() {
        &[][..]
    } else {
        unsafe { std::slice::from_raw_parts(pcm, samples * channels) }
    };
    code(session.send_audio(data, samples, pts))
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_disconnect(handle: *mut BridgeHandle) -> c_int {
    match unsafe { session(handle) } {
        Some(session) => code(session.disconnect()),
        None => ErrorKind::InvalidParams.code(),
    }
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_cleanup(handle: *mut BridgeHandle) -> c_int {
    match unsafe { session(handle) } {
        Some(session) => code(session.cleanup()),
        None => ErrorKind::InvalidParams.code(),
    }
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_get_state(handle: *const BridgeHandle) -> c_int {
    match unsafe { session(handle) } {
        Some(session) => session.state().as_i32(),
        None => ErrorKind::InvalidParams.code(),
    }
}

/// The returned string stays valid until the next `rtmp_get_error` call on the
/// same handle or its destruction.
///
/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_get_error(handle: *const BridgeHandle) -> *const c_char {
    let Some(handle) = (unsafe { handle.as_ref() }) else {
        return c"invalid handle".as_ptr();
    };
    let message = handle.session.last_error().replace('\0', " ");
    let mut slot = handle
        .error
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *slot = CString::new(message).unwrap_or_default();
    slot.as_ptr()
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_get_bytes_sent(handle: *const BridgeHandle) -> i64 {
    unsafe { session(handle) }.map_or(0, |s| i64::try_from(s.bytes_sent()).unwrap_or(i64::MAX))
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_get_frames_sent(handle: *const BridgeHandle) -> c_int {
    unsafe { session(handle) }.map_or(0, |s| clamp_int(s.frames_sent()))
}

/// # Safety
/// `handle` must be null or a live pointer from [`rtmp_session_create`].
#[no_mangle]
pub unsafe extern "C" fn rtmp_get_dropped_frames(handle: *const BridgeHandle) -> c_int {
    unsafe { session(handle) }.map_or(0, |s| clamp_int(s.dropped_frames()))
}

#[no_mangle]
pub extern "C" fn rtmp_is_stub() -> c_int {
    0
}

#[no_mangle]
pub extern "C" fn rtmp_get_build_info() -> *const c_char {
    BUILD_INFO.as_ptr()
}
