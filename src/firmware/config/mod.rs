mod settings;
mod store;

pub(crate) use settings::{
    compiled_stream_credentials, compiled_wifi_credentials, DeviceConfig, InitPolicy, LinkPolicy,
    StreamConfig,
};
pub(crate) use store::CredentialStore;
