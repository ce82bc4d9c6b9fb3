mod base;
mod wifi;

pub(crate) use base::{CaptureFailurePolicy, LinkState, StreamCredentials};
pub(crate) use wifi::{WifiCredentials, WIFI_PASSWORD_MAX, WIFI_SSID_MAX};
