/// Wireless link condition as observed by the connectivity supervisor.
/// The supervisor is the only writer; everyone else reads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl LinkState {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }
}

/// What a session escalates to when its capture failure budget runs out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CaptureFailurePolicy {
    /// Terminate only the affected session; the server keeps accepting.
    EndSession,
    /// Treat sustained capture failure as a device-level fault.
    RestartDevice,
}

pub(crate) const STREAM_UID_MAX: usize = 32;
pub(crate) const STREAM_SECRET_MAX: usize = 32;

/// Expected client credential pair, fixed after startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StreamCredentials {
    uid: [u8; STREAM_UID_MAX],
    uid_len: u8,
    secret: [u8; STREAM_SECRET_MAX],
    secret_len: u8,
}

impl StreamCredentials {
    pub(crate) fn from_parts(uid: &[u8], secret: &[u8]) -> Result<Self, &'static str> {
        if uid.is_empty() || uid.len() > STREAM_UID_MAX || secret.len() > STREAM_SECRET_MAX {
            return Err("invalid stream credential length");
        }
        let mut result = Self {
            uid: [0u8; STREAM_UID_MAX],
            uid_len: uid.len() as u8,
            secret: [0u8; STREAM_SECRET_MAX],
            secret_len: secret.len() as u8,
        };
        result.uid[..uid.len()].copy_from_slice(uid);
        result.secret[..secret.len()].copy_from_slice(secret);
        Ok(result)
    }

    pub(crate) fn uid(&self) -> &[u8] {
        &self.uid[..self.uid_len as usize]
    }

    pub(crate) fn secret(&self) -> &[u8] {
        &self.secret[..self.secret_len as usize]
    }
}
