use embassy_time::Duration;

use super::super::camera::{sensor_fallback_ladder, SensorConfig, SensorTuning, LADDER_LEN};
use super::super::types::{CaptureFailurePolicy, StreamCredentials, WifiCredentials};

// Startup gate for the first association + DHCP lease; past this the device
// is unreachable and restarts rather than waiting forever.
const LINK_STARTUP_TIMEOUT_SECS: u64 = 30;
// Cooldown between reconnect attempts once the link has dropped.
const LINK_RECONNECT_COOLDOWN_SECS: u64 = 3;

// Bring-up attempts per ladder rung before degrading the sensor config.
const INIT_ATTEMPTS_PER_CONFIG: u8 = 3;
const INIT_RETRY_DELAY_MS: u64 = 1_000;
// The sensor needs a moment after a successful init before the first grab
// returns stable JPEG data.
const INIT_SETTLE_DELAY_MS: u64 = 1_000;

const STREAM_PORT: u16 = 80;
// Consecutive capture failures tolerated inside one session.
const STREAM_FAILURE_BUDGET: u8 = 3;
const STREAM_FRAME_PACING_MS: u64 = 30;
const STREAM_CAPTURE_RETRY_DELAY_MS: u64 = 150;

/// Everything the firmware needs at startup, assembled once and handed to
/// the runtime instead of being compiled into the call sites.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DeviceConfig {
    pub(crate) wifi: Option<WifiCredentials>,
    pub(crate) link: LinkPolicy,
    pub(crate) sensor_ladder: [SensorConfig; LADDER_LEN],
    pub(crate) init: InitPolicy,
    pub(crate) tuning: SensorTuning,
    pub(crate) stream: StreamConfig,
}

impl DeviceConfig {
    pub(crate) fn assemble(
        wifi: Option<WifiCredentials>,
        stream_credentials: StreamCredentials,
    ) -> Self {
        Self {
            wifi,
            link: LinkPolicy::defaults(),
            sensor_ladder: sensor_fallback_ladder(),
            init: InitPolicy::defaults(),
            tuning: SensorTuning::defaults(),
            stream: StreamConfig::defaults(stream_credentials),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct LinkPolicy {
    pub(crate) startup_timeout: Duration,
    pub(crate) reconnect_cooldown: Duration,
}

impl LinkPolicy {
    pub(crate) const fn defaults() -> Self {
        Self {
            startup_timeout: Duration::from_secs(LINK_STARTUP_TIMEOUT_SECS),
            reconnect_cooldown: Duration::from_secs(LINK_RECONNECT_COOLDOWN_SECS),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct InitPolicy {
    pub(crate) attempts_per_config: u8,
    pub(crate) retry_delay: Duration,
    pub(crate) settle_delay: Duration,
}

impl InitPolicy {
    pub(crate) const fn defaults() -> Self {
        Self {
            attempts_per_config: INIT_ATTEMPTS_PER_CONFIG,
            retry_delay: Duration::from_millis(INIT_RETRY_DELAY_MS),
            settle_delay: Duration::from_millis(INIT_SETTLE_DELAY_MS),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct StreamConfig {
    pub(crate) port: u16,
    pub(crate) credentials: StreamCredentials,
    pub(crate) failure_budget: u8,
    pub(crate) frame_pacing: Duration,
    pub(crate) capture_retry_delay: Duration,
    pub(crate) on_capture_exhausted: CaptureFailurePolicy,
}

impl StreamConfig {
    pub(crate) const fn defaults(credentials: StreamCredentials) -> Self {
        Self {
            port: STREAM_PORT,
            credentials,
            failure_budget: STREAM_FAILURE_BUDGET,
            frame_pacing: Duration::from_millis(STREAM_FRAME_PACING_MS),
            capture_retry_delay: Duration::from_millis(STREAM_CAPTURE_RETRY_DELAY_MS),
            on_capture_exhausted: CaptureFailurePolicy::EndSession,
        }
    }
}

pub(crate) fn compiled_wifi_credentials() -> Option<WifiCredentials> {
    let ssid = option_env!("KESTREL_WIFI_SSID").or(option_env!("SSID"))?;
    let password = option_env!("KESTREL_WIFI_PASSWORD")
        .or(option_env!("PASSWORD"))
        .unwrap_or("");
    WifiCredentials::from_parts(ssid.as_bytes(), password.as_bytes()).ok()
}

pub(crate) fn compiled_stream_credentials() -> StreamCredentials {
    let uid = option_env!("KESTREL_STREAM_UID").unwrap_or("david");
    let secret = option_env!("KESTREL_STREAM_PWD").unwrap_or("Dev");
    StreamCredentials::from_parts(uid.as_bytes(), secret.as_bytes())
        // Out-of-range env overrides fall back to the stock pair, which fits.
        .or_else(|_| StreamCredentials::from_parts(b"david", b"Dev"))
        .expect("stock stream credentials fit")
}
