// ============================================================================
// Session Tests
// ============================================================================

use std::sync::Arc;

use super::Session;
use crate::{
    backend::mock::{AUDIO_PACKET_SIZE, MockBackend, MockState, Shared, VIDEO_PACKET_SIZE},
    config::SessionConfig,
    error::ErrorKind,
    packet::StreamKind,
    state::SessionState,
};

const URL: &str = "rtmp://host/stream";

fn config() -> SessionConfig {
    SessionConfig::new(64, 48, 30, 2000).with_audio(44100, 2, 128)
}

fn frame(config: &SessionConfig) -> Vec<u8> {
    vec![0x80; config.frame_len()]
}

fn new_session() -> (Session<MockBackend>, Shared) {
    let backend = MockBackend::default();
    let state = backend.state();
    (Session::new(backend), state)
}

fn streaming() -> (Session<MockBackend>, Shared) {
    let (session, state) = new_session();
    session.initialize(config()).unwrap();
    session.connect(URL).unwrap();
    session.start_streaming().unwrap();
    (session, state)
}

fn assert_released(state: &Shared) {
    let state = state.lock().unwrap();
    assert_eq!(state.live_outputs, 0);
    assert_eq!(state.live_video, 0);
    assert_eq!(state.live_audio, 0);
}

// ------------------------------------------------------------------------
// Lifecycle
// ------------------------------------------------------------------------

#[test]
fn test_full_scenario() {
    let (session, _state) = new_session();
    let config = SessionConfig::new(640, 480, 30, 2000)
        .with_keyframe_interval(2)
        .with_audio(44100, 2, 128);

    session.initialize(config.clone()).unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    session.connect(URL).unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session.start_streaming().unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    session.send_video_frame(&frame(&config), 0).unwrap();
    assert_eq!(session.frames_sent(), 1);
    session.disconnect().unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert!(session.bytes_sent() > 0);
}

#[test]
fn test_initialize_accepts_positive_fields() {
    let (session, _state) = new_session();
    session.initialize(config()).unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.config(), Some(config()));

    // optional audio fields fall back to defaults
    let (session, _state) = new_session();
    session
        .initialize(SessionConfig::new(1280, 720, 60, 4500))
        .unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
}

#[test]
fn test_initialize_rejects_zero_fields() {
    let bad = [
        SessionConfig::new(0, 48, 30, 2000),
        SessionConfig::new(64, 0, 30, 2000),
        SessionConfig::new(64, 48, 0, 2000),
        SessionConfig::new(64, 48, 30, 0),
        config().with_keyframe_interval(0),
        SessionConfig::new(64, 48, 30, 2000).with_audio(0, 2, 128),
        SessionConfig::new(64, 48, 30, 2000).with_audio(44100, 0, 128),
        SessionConfig::new(64, 48, 30, 2000).with_audio(44100, 2, 0),
    ];
    for config in bad {
        let (session, _state) = new_session();
        let err = session.initialize(config.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams, "{:?}", config);
        assert_eq!(session.state(), SessionState::Idle);
    }

    // a rejected re-initialization keeps the previous config
    let (session, _state) = new_session();
    session.initialize(config()).unwrap();
    let err = session
        .initialize(SessionConfig::new(64, 48, 0, 2000))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.config(), Some(config()));
}

#[test]
fn test_out_of_order_transitions_fail() {
    let (session, state) = new_session();
    let not_connected = |result: crate::Result<()>| {
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotConnected);
    };

    not_connected(session.connect(URL));
    not_connected(session.start_streaming());
    not_connected(session.stop_streaming());
    not_connected(session.disconnect());
    not_connected(session.cleanup());
    assert_eq!(session.state(), SessionState::Idle);

    session.initialize(config()).unwrap();
    not_connected(session.start_streaming());
    not_connected(session.stop_streaming());
    not_connected(session.disconnect());
    assert_eq!(session.state(), SessionState::Initialized);

    session.connect(URL).unwrap();
    not_connected(session.connect(URL));
    not_connected(session.stop_streaming());
    assert_eq!(session.state(), SessionState::Connected);
    assert_eq!(state.lock().unwrap().outputs_created, 1);
}

#[test]
fn test_stop_keeps_connection_open() {
    let (session, state) = streaming();
    session.stop_streaming().unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    session.start_streaming().unwrap();
    session.send_video_frame(&frame(&config()), 0).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.outputs_created, 1);
    assert_eq!(state.trailers, 0);
    assert_eq!(state.live_video, 1);
}

#[test]
fn test_reinitialize_while_streaming_tears_down() {
    let (session, state) = streaming();
    session.send_video_frame(&frame(&config()), 0).unwrap();
    assert_eq!(session.frames_sent(), 1);

    session.initialize(config()).unwrap();
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.bytes_sent(), 0);
    assert_eq!(session.dropped_frames(), 0);
    assert!(!session.audio_enabled());
    assert_released(&state);
    assert_eq!(state.lock().unwrap().trailers, 1);

    // and the fresh session connects again
    session.connect(URL).unwrap();
    assert_eq!(session.state(), SessionState::Connected);
}

#[test]
fn test_reconnect_uses_fresh_instances() {
    let (session, state) = streaming();
    session.disconnect().unwrap();
    assert_released(&state);

    session.connect(URL).unwrap();
    session.start_streaming().unwrap();
    session.send_video_frame(&frame(&config()), 0).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.outputs_created, 2);
    assert_eq!(state.video_created, 2);
    assert_eq!(state.audio_created, 2);
    assert_eq!(state.live_outputs, 1);
    assert_eq!(state.live_video, 1);
    assert_eq!(state.live_audio, 1);
}

#[test]
fn test_cleanup_returns_to_idle() {
    let (session, state) = streaming();
    session.send_video_frame(&frame(&config()), 0).unwrap();

    session.cleanup().unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.config(), None);
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.bytes_sent(), 0);
    assert_eq!(state.lock().unwrap().trailers, 1);
    assert_released(&state);

    let err = session.connect(URL).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);
}

#[test]
fn test_drop_while_streaming_finishes_stream() {
    let (session, state) = streaming();
    session.send_video_frame(&frame(&config()), 0).unwrap();
    drop(session);

    assert_eq!(state.lock().unwrap().trailers, 1);
    assert_released(&state);
}

#[test]
fn test_uptime_tracks_connection() {
    let (session, _state) = new_session();
    session.initialize(config()).unwrap();
    assert!(session.uptime().is_none());
    session.connect(URL).unwrap();
    assert!(session.uptime().is_some());
    session.disconnect().unwrap();
    assert!(session.uptime().is_none());
}

// ------------------------------------------------------------------------
// Connect
// ------------------------------------------------------------------------

#[test]
fn test_connect_writes_header_without_duration() {
    let (session, state) = new_session();
    session.initialize(config()).unwrap();
    session.connect(URL).unwrap();

    let state = state.lock().unwrap();
    assert_eq!(state.urls, vec![URL.to_string()]);
    assert_eq!(state.opens, 1);
    assert_eq!(
        state.header_options,
        vec![("flvflags".to_string(), "no_duration_filesize".to_string())]
    );
}

#[test]
fn test_connect_rejects_empty_url() {
    let (session, state) = new_session();
    session.initialize(config()).unwrap();
    let err = session.connect("").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(state.lock().unwrap().outputs_created, 0);
}

#[test]
fn test_connect_failures_unwind() {
    let cases: [(fn(&mut MockState), ErrorKind); 5] = [
        (|s: &mut MockState| s.fail_output = true, ErrorKind::InitFailed),
        (|s: &mut MockState| s.fail_video = true, ErrorKind::InitFailed),
        (|s: &mut MockState| s.fail_video_alloc = true, ErrorKind::AllocFailed),
        (|s: &mut MockState| s.fail_open = true, ErrorKind::ConnectFailed),
        (|s: &mut MockState| s.fail_header = true, ErrorKind::ConnectFailed),
    ];
    for (knob, kind) in cases {
        let (session, state) = new_session();
        session.initialize(config()).unwrap();
        knob(&mut state.lock().unwrap());

        let err = session.connect(URL).unwrap_err();
        assert_eq!(err.kind(), kind);
        assert_eq!(session.state(), SessionState::Initialized);
        assert!(!session.last_error().is_empty());
        assert_released(&state);

        // the failure is not sticky
        *state.lock().unwrap() = Default::default();
        session.connect(URL).unwrap();
        assert_eq!(session.state(), SessionState::Connected);
    }
}

#[test]
fn test_header_failure_closes_transport() {
    let (session, state) = new_session();
    session.initialize(config()).unwrap();
    state.lock().unwrap().fail_header = true;
    session.connect(URL).unwrap_err();

    let state = state.lock().unwrap();
    assert_eq!(state.opens, 1);
    assert_eq!(state.closes, 1);
}

#[test]
fn test_audio_failure_degrades_to_video_only() {
    let (session, state) = new_session();
    session.initialize(config()).unwrap();
    state.lock().unwrap().fail_audio = true;
    session.connect(URL).unwrap();
    assert_eq!(session.state(), SessionState::Connected);
    assert!(!session.audio_enabled());
    assert!(session.last_error().is_empty());

    // no-op in Connected and in Streaming, whatever the input
    session.send_audio(&[0.0; 4], 2, 0).unwrap();
    session.start_streaming().unwrap();
    session.send_audio(&[0.0; 2048], 1024, 0).unwrap();
    session.send_audio(&[], 0, 10).unwrap();
    assert_eq!(session.bytes_sent(), 0);
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.dropped_frames(), 0);

    session.send_video_frame(&frame(&config()), 0).unwrap();
    assert_eq!(session.frames_sent(), 1);
    let state = state.lock().unwrap();
    assert!(state.written_of(StreamKind::Audio).is_empty());
    assert!(state.audio_frames.is_empty());
}

// ------------------------------------------------------------------------
// Video
// ------------------------------------------------------------------------

#[test]
fn test_send_video_before_start_fails() {
    let (session, state) = new_session();
    let config = config();
    let err = session.send_video_frame(&frame(&config), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    session.initialize(config.clone()).unwrap();
    let err = session.send_video_frame(&frame(&config), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    session.connect(URL).unwrap();
    let err = session.send_video_frame(&frame(&config), 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.bytes_sent(), 0);
    assert_eq!(state.lock().unwrap().converted, 0);
}

#[test]
fn test_send_video_rejects_wrong_size() {
    let (session, state) = streaming();
    let len = config().frame_len();
    for size in [0, len - 1, len + 1, len * 2] {
        let err = session.send_video_frame(&vec![0u8; size], 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }
    assert_eq!(state.lock().unwrap().converted, 0);
    assert!(state.lock().unwrap().video_frames.is_empty());
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.state(), SessionState::Streaming);
}

#[test]
fn test_frames_sent_counts_calls_not_packets() {
    let (session, state) = streaming();
    let frame = frame(&config());

    state.lock().unwrap().packets_per_frame = 0;
    session.send_video_frame(&frame, 0).unwrap();
    assert_eq!(session.frames_sent(), 1);
    assert_eq!(session.bytes_sent(), 0);

    state.lock().unwrap().packets_per_frame = 3;
    session.send_video_frame(&frame, 33).unwrap();
    assert_eq!(session.frames_sent(), 2);
    assert_eq!(session.bytes_sent(), 3 * VIDEO_PACKET_SIZE as u64);
}

#[test]
fn test_buffered_encoder_output_is_flushed_on_disconnect() {
    let (session, state) = streaming();
    state.lock().unwrap().video_delay = 2;
    let frame = frame(&config());
    for i in 0..3 {
        session.send_video_frame(&frame, i * 33).unwrap();
    }
    assert_eq!(session.frames_sent(), 3);
    assert_eq!(state.lock().unwrap().written_of(StreamKind::Video).len(), 1);

    session.disconnect().unwrap();
    let state = state.lock().unwrap();
    assert_eq!(state.written_of(StreamKind::Video).len(), 3);
    assert_eq!(state.trailers, 1);
    assert_eq!(state.closes, 1);
}

#[test]
fn test_flush_keeps_writing_after_failed_write() {
    let (session, state) = streaming();
    state.lock().unwrap().video_delay = 3;
    let frame = frame(&config());
    for i in 0..3 {
        session.send_video_frame(&frame, i * 33).unwrap();
    }
    assert!(state.lock().unwrap().written.is_empty());

    state.lock().unwrap().fail_writes = 1;
    let err = session.disconnect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SendFailed);
    assert_eq!(session.state(), SessionState::Initialized);
    assert_eq!(session.dropped_frames(), 1);
    assert_eq!(session.frames_sent(), 3);
    assert_eq!(session.bytes_sent(), 2 * VIDEO_PACKET_SIZE as u64);
    {
        let state = state.lock().unwrap();
        let pts: Vec<_> = state
            .written_of(StreamKind::Video)
            .iter()
            .map(|p| p.pts.unwrap())
            .collect();
        assert_eq!(pts, vec![33, 67]);
        assert_eq!(state.trailers, 1);
    }
    assert_released(&state);
}

#[test]
fn test_audio_tail_is_flushed_after_video_write_failure() {
    let (session, state) = streaming();
    state.lock().unwrap().video_delay = 1;
    session.send_video_frame(&frame(&config()), 0).unwrap();
    session.send_audio(&[0.0; 3000], 1500, 0).unwrap();

    state.lock().unwrap().fail_writes = 1;
    let err = session.disconnect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SendFailed);
    assert_eq!(session.dropped_frames(), 1);
    let state = state.lock().unwrap();
    assert!(state.written_of(StreamKind::Video).is_empty());
    assert_eq!(state.written_of(StreamKind::Audio).len(), 2);
    assert_eq!(state.trailers, 1);
}

#[test]
fn test_write_failure_drops_frame_and_keeps_session() {
    let (session, state) = streaming();
    let frame = frame(&config());

    state.lock().unwrap().fail_writes = 1;
    let err = session.send_video_frame(&frame, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SendFailed);
    assert_eq!(session.dropped_frames(), 1);
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.bytes_sent(), 0);
    assert_eq!(session.state(), SessionState::Streaming);

    session.send_video_frame(&frame, 33).unwrap();
    assert_eq!(session.frames_sent(), 1);
    assert_eq!(session.dropped_frames(), 1);
}

#[test]
fn test_write_failure_stops_draining_that_frame() {
    let (session, state) = streaming();
    {
        let mut state = state.lock().unwrap();
        state.packets_per_frame = 3;
        state.fail_writes = 1;
    }
    session.send_video_frame(&frame(&config()), 0).unwrap_err();
    assert_eq!(session.dropped_frames(), 1);
    assert!(state.lock().unwrap().written.is_empty());
}

#[test]
fn test_encoder_failures_are_encode_failed() {
    let (session, state) = streaming();
    let frame = frame(&config());

    state.lock().unwrap().fail_convert = true;
    let err = session.send_video_frame(&frame, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailed);

    {
        let mut state = state.lock().unwrap();
        state.fail_convert = false;
        state.fail_video_send = true;
    }
    let err = session.send_video_frame(&frame, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailed);
    assert_eq!(session.frames_sent(), 0);
    assert_eq!(session.dropped_frames(), 0);
}

#[test]
fn test_video_timestamps_are_rescaled() {
    let (session, state) = streaming();
    let frame = frame(&config());
    for pts in [0, 33, 66, 100] {
        session.send_video_frame(&frame, pts).unwrap();
    }

    let state = state.lock().unwrap();
    // codec ticks at 1/30
    assert_eq!(state.video_frames, vec![0, 1, 2, 3]);
    // container stream at 1/1000
    let pts: Vec<_> = state
        .written_of(StreamKind::Video)
        .iter()
        .map(|p| p.pts.unwrap())
        .collect();
    assert_eq!(pts, vec![0, 33, 67, 100]);
}

#[test]
fn test_colliding_timestamps_stay_increasing() {
    let (session, state) = streaming();
    let frame = frame(&config());
    for pts in [0, 10, 20, 5] {
        session.send_video_frame(&frame, pts).unwrap();
    }
    assert_eq!(state.lock().unwrap().video_frames, vec![0, 1, 2, 3]);
}

#[test]
fn test_concurrent_senders_serialize() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Session<MockBackend>>();

    let (session, state) = streaming();
    let session = Arc::new(session);
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let session = session.clone();
            std::thread::spawn(move || {
                let frame = frame(&config());
                for i in 0..25 {
                    session.send_video_frame(&frame, (t * 25 + i) * 33).unwrap();
                    session.stats();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(session.frames_sent(), 100);
    assert_eq!(state.lock().unwrap().written.len(), 100);
}

// ------------------------------------------------------------------------
// Audio
// ------------------------------------------------------------------------

#[test]
fn test_send_audio_needs_connection_and_skips_while_paused() {
    let (session, state) = new_session();
    let pcm = [0.0f32; 2048];
    let err = session.send_audio(&pcm, 1024, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    session.initialize(config()).unwrap();
    let err = session.send_audio(&pcm, 1024, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConnected);

    session.connect(URL).unwrap();
    assert!(session.audio_enabled());
    let last_error = session.last_error();
    session.send_audio(&pcm, 1024, 0).unwrap();

    session.start_streaming().unwrap();
    session.send_audio(&pcm, 1024, 0).unwrap();
    session.stop_streaming().unwrap();
    session.send_audio(&pcm, 1024, 23).unwrap();
    session.send_audio(&[], 0, 46).unwrap();

    assert_eq!(session.last_error(), last_error);
    assert_eq!(session.state(), SessionState::Connected);
    // only the block sent while streaming reached the encoder
    assert_eq!(state.lock().unwrap().audio_frames, vec![(1024, 0)]);
}

#[test]
fn test_send_audio_validates_input() {
    let (session, state) = streaming();
    let err = session.send_audio(&[0.0; 2048], 0, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    // two channels need 2 * 1024 values
    let err = session.send_audio(&[0.0; 2047], 1024, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidParams);
    assert!(state.lock().unwrap().audio_frames.is_empty());

    // extra values past the block are ignored
    session.send_audio(&[0.0; 4096], 1024, 0).unwrap();
    assert_eq!(state.lock().unwrap().audio_frames.len(), 1);
}

#[test]
fn test_audio_carries_partial_frames() {
    let (session, state) = streaming();
    let block = vec![0.25f32; 441 * 2];
    for i in 0..3 {
        session.send_audio(&block, 441, i * 10).unwrap();
    }
    {
        let state = state.lock().unwrap();
        // 1323 samples in, one 1024 frame out, 299 carried
        assert_eq!(state.audio_frames, vec![(1024, 0)]);
        assert_eq!(state.written_of(StreamKind::Audio).len(), 1);
    }
    assert_eq!(session.bytes_sent(), AUDIO_PACKET_SIZE as u64);
    assert_eq!(session.frames_sent(), 0);

    session.disconnect().unwrap();
    let state = state.lock().unwrap();
    // the carried tail is padded into a final frame
    assert_eq!(state.audio_frames, vec![(1024, 0), (1024, 1024)]);
    let pts: Vec<_> = state
        .written_of(StreamKind::Audio)
        .iter()
        .map(|p| p.pts.unwrap())
        .collect();
    assert_eq!(pts, vec![0, 23]);
}

#[test]
fn test_audio_accepts_extreme_timestamps() {
    let (session, state) = streaming();
    session.send_audio(&[0.0; 2048], 1024, i64::MAX).unwrap();
    session.send_audio(&[0.0; 2048], 1024, i64::MAX).unwrap();
    session.send_audio(&[0.0; 2048], 1024, i64::MIN).unwrap();
    assert_eq!(session.state(), SessionState::Streaming);

    let state = state.lock().unwrap();
    assert_eq!(state.audio_frames.len(), 3);
    assert!(state.audio_frames.iter().all(|&(_, pts)| pts == i64::MAX));
}

#[test]
fn test_audio_failures_leave_video_stats() {
    let (session, state) = streaming();
    session.send_video_frame(&frame(&config()), 0).unwrap();
    let before = session.stats();

    state.lock().unwrap().fail_writes = 1;
    let err = session.send_audio(&[0.0; 2048], 1024, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SendFailed);

    state.lock().unwrap().fail_audio_send = true;
    let err = session.send_audio(&[0.0; 2048], 1024, 23).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EncodeFailed);

    assert_eq!(session.stats(), before);
    assert_eq!(session.state(), SessionState::Streaming);
}

// ------------------------------------------------------------------------
// Teardown and errors
// ------------------------------------------------------------------------

#[test]
fn test_disconnect_failure_still_releases() {
    let (session, state) = streaming();
    state.lock().unwrap().fail_trailer = true;
    let err = session.disconnect().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SendFailed);
    assert_eq!(session.state(), SessionState::Initialized);
    assert_released(&state);
    // transport closed even though the trailer failed
    assert_eq!(state.lock().unwrap().closes, 1);
}

#[test]
fn test_last_error_tracks_failures() {
    let (session, _state) = new_session();
    assert!(session.last_error().is_empty());

    session.connect(URL).unwrap_err();
    assert!(session.last_error().contains("connect"));
    assert!(session.last_error().contains("idle"));

    // successes do not clear it, initialize does
    session.initialize(config()).unwrap();
    assert!(session.last_error().is_empty());
    session.send_video_frame(&[0u8; 3], 0).unwrap_err();
    let detail = session.last_error();
    session.connect(URL).unwrap();
    assert_eq!(session.last_error(), detail);
}
