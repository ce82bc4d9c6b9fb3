pub(crate) const WIFI_SSID_MAX: usize = 32;
pub(crate) const WIFI_PASSWORD_MAX: usize = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct WifiCredentials {
    pub(crate) ssid: [u8; WIFI_SSID_MAX],
    pub(crate) ssid_len: u8,
    pub(crate) password: [u8; WIFI_PASSWORD_MAX],
    pub(crate) password_len: u8,
}

impl WifiCredentials {
    pub(crate) fn from_parts(ssid: &[u8], password: &[u8]) -> Result<Self, &'static str> {
        if ssid.is_empty() || ssid.len() > WIFI_SSID_MAX || password.len() > WIFI_PASSWORD_MAX {
            return Err("invalid wifi credentials length");
        }
        let mut result = Self {
            ssid: [0u8; WIFI_SSID_MAX],
            ssid_len: ssid.len() as u8,
            password: [0u8; WIFI_PASSWORD_MAX],
            password_len: password.len() as u8,
        };
        result.ssid[..ssid.len()].copy_from_slice(ssid);
        result.password[..password.len()].copy_from_slice(password);
        Ok(result)
    }

    pub(crate) fn ssid_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.ssid[..self.ssid_len as usize]).ok()
    }

    pub(crate) fn password_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.password[..self.password_len as usize]).ok()
    }
}
