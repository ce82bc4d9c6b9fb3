use core::sync::atomic::{AtomicU32, Ordering};

use esp_println::println;

static NET_CONNECT_ATTEMPTS: AtomicU32 = AtomicU32::new(0);
static NET_CONNECT_FAILURES: AtomicU32 = AtomicU32::new(0);
static NET_DISCONNECTS: AtomicU32 = AtomicU32::new(0);
static CAMERA_INIT_ATTEMPTS: AtomicU32 = AtomicU32::new(0);
static CAMERA_INIT_FALLBACKS: AtomicU32 = AtomicU32::new(0);
static CAMERA_TUNING_REJECTS: AtomicU32 = AtomicU32::new(0);
static STREAM_ACCEPTS: AtomicU32 = AtomicU32::new(0);
static STREAM_ACCEPT_ERRORS: AtomicU32 = AtomicU32::new(0);
static STREAM_AUTH_FAILURES: AtomicU32 = AtomicU32::new(0);
static STREAM_FRAMES_SENT: AtomicU32 = AtomicU32::new(0);
static STREAM_BYTES_SENT: AtomicU32 = AtomicU32::new(0);
static STREAM_INVALID_FRAMES: AtomicU32 = AtomicU32::new(0);
static STREAM_CAPTURE_FAILURES: AtomicU32 = AtomicU32::new(0);
static STREAM_CLIENT_DISCONNECTS: AtomicU32 = AtomicU32::new(0);
static STREAM_SESSIONS_FAILED: AtomicU32 = AtomicU32::new(0);

fn bump(counter: &AtomicU32) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn record_net_connect_attempt() {
    bump(&NET_CONNECT_ATTEMPTS);
}

pub(crate) fn record_net_connect_failure() {
    bump(&NET_CONNECT_FAILURES);
}

pub(crate) fn record_net_disconnect() {
    bump(&NET_DISCONNECTS);
}

pub(crate) fn record_camera_init_attempt() {
    bump(&CAMERA_INIT_ATTEMPTS);
}

pub(crate) fn record_camera_init_fallback() {
    bump(&CAMERA_INIT_FALLBACKS);
}

pub(crate) fn record_camera_tuning_reject() {
    bump(&CAMERA_TUNING_REJECTS);
}

pub(crate) fn record_stream_accept() {
    bump(&STREAM_ACCEPTS);
}

pub(crate) fn record_stream_accept_error() {
    bump(&STREAM_ACCEPT_ERRORS);
}

pub(crate) fn record_stream_auth_failure() {
    bump(&STREAM_AUTH_FAILURES);
}

pub(crate) fn record_stream_frame(bytes: usize) {
    bump(&STREAM_FRAMES_SENT);
    STREAM_BYTES_SENT.fetch_add(bytes as u32, Ordering::Relaxed);
}

pub(crate) fn record_stream_invalid_frame() {
    bump(&STREAM_INVALID_FRAMES);
}

pub(crate) fn record_stream_capture_failure() {
    bump(&STREAM_CAPTURE_FAILURES);
}

pub(crate) fn record_stream_client_disconnect() {
    bump(&STREAM_CLIENT_DISCONNECTS);
}

pub(crate) fn record_stream_session_failed() {
    bump(&STREAM_SESSIONS_FAILED);
}

pub(crate) fn log_snapshot() {
    println!(
        "telemetry: net attempts={} failures={} disconnects={}",
        NET_CONNECT_ATTEMPTS.load(Ordering::Relaxed),
        NET_CONNECT_FAILURES.load(Ordering::Relaxed),
        NET_DISCONNECTS.load(Ordering::Relaxed),
    );
    println!(
        "telemetry: camera init_attempts={} fallbacks={} tuning_rejects={}",
        CAMERA_INIT_ATTEMPTS.load(Ordering::Relaxed),
        CAMERA_INIT_FALLBACKS.load(Ordering::Relaxed),
        CAMERA_TUNING_REJECTS.load(Ordering::Relaxed),
    );
    println!(
        "telemetry: stream accepts={} accept_errors={} auth_failures={} frames={} bytes={} invalid={} capture_failures={} client_disconnects={} sessions_failed={}",
        STREAM_ACCEPTS.load(Ordering::Relaxed),
        STREAM_ACCEPT_ERRORS.load(Ordering::Relaxed),
        STREAM_AUTH_FAILURES.load(Ordering::Relaxed),
        STREAM_FRAMES_SENT.load(Ordering::Relaxed),
        STREAM_BYTES_SENT.load(Ordering::Relaxed),
        STREAM_INVALID_FRAMES.load(Ordering::Relaxed),
        STREAM_CAPTURE_FAILURES.load(Ordering::Relaxed),
        STREAM_CLIENT_DISCONNECTS.load(Ordering::Relaxed),
        STREAM_SESSIONS_FAILED.load(Ordering::Relaxed),
    );
}
