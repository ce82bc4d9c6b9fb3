use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::super::types::StreamCredentials;

// Enough for base64 of uid:secret at their maximum lengths.
const BASIC_DECODE_MAX: usize = 96;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AuthScheme {
    /// Credentials embedded in the request path: `GET /<uid>/<secret>`.
    Path,
    /// Standard `Authorization: Basic` header.
    Basic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct AuthFailure {
    /// Whether the 401 should carry a `WWW-Authenticate` challenge. A
    /// well-formed path pair that simply mismatched gets no challenge.
    pub(crate) advertise_basic: bool,
}

/// Check a request against the expected credential pair. An
/// `Authorization` header, when present, is authoritative; otherwise the
/// path is consulted. Both path segments must be present and non-empty:
/// a bare `/` or a lone uid never matches.
pub(crate) fn authenticate(
    target: &str,
    head: &str,
    expected: &StreamCredentials,
) -> Result<AuthScheme, AuthFailure> {
    if let Some(value) = header_value(head, "authorization") {
        return authenticate_basic(value, expected);
    }
    authenticate_path(target, expected)
}

fn authenticate_basic(
    value: &str,
    expected: &StreamCredentials,
) -> Result<AuthScheme, AuthFailure> {
    let rejected = AuthFailure {
        advertise_basic: true,
    };

    let mut parts = value.split_ascii_whitespace();
    let scheme = parts.next().ok_or(rejected)?;
    let encoded = parts.next().ok_or(rejected)?;
    if !scheme.eq_ignore_ascii_case("basic") || parts.next().is_some() {
        return Err(rejected);
    }

    let mut decoded = [0u8; BASIC_DECODE_MAX];
    let len = STANDARD
        .decode_slice(encoded.as_bytes(), &mut decoded)
        .map_err(|_| rejected)?;
    let pair = &decoded[..len];
    let split = pair.iter().position(|&b| b == b':').ok_or(rejected)?;
    let (uid, secret) = (&pair[..split], &pair[split + 1..]);

    if credentials_match(uid, secret, expected) {
        Ok(AuthScheme::Basic)
    } else {
        Err(rejected)
    }
}

fn authenticate_path(target: &str, expected: &StreamCredentials) -> Result<AuthScheme, AuthFailure> {
    let path = target.split('?').next().unwrap_or(target);
    let Some(path) = path.strip_prefix('/') else {
        return Err(AuthFailure {
            advertise_basic: true,
        });
    };

    let mut segments = path.split('/');
    let uid = segments.next().unwrap_or("");
    let secret = segments.next().unwrap_or("");
    // Empty or missing segments must never match, and trailing material
    // (including a bare trailing slash) is not a credential pair.
    if uid.is_empty() || secret.is_empty() || segments.next().is_some() {
        return Err(AuthFailure {
            advertise_basic: true,
        });
    }

    if credentials_match(uid.as_bytes(), secret.as_bytes(), expected) {
        Ok(AuthScheme::Path)
    } else {
        Err(AuthFailure {
            advertise_basic: false,
        })
    }
}

fn credentials_match(uid: &[u8], secret: &[u8], expected: &StreamCredentials) -> bool {
    // Non-short-circuiting so both halves are always compared.
    fixed_time_eq(uid, expected.uid()) & fixed_time_eq(secret, expected.secret())
}

fn fixed_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b) {
        acc |= x ^ y;
    }
    acc == 0
}

fn header_value<'a>(head: &'a str, wanted_name: &str) -> Option<&'a str> {
    for line in head.lines().skip(1) {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        if name.eq_ignore_ascii_case(wanted_name) {
            return Some(value.trim());
        }
    }
    None
}
