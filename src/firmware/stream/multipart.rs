use embedded_io_async::Write;

// Response head for an accepted stream, sent ahead of the first part. The
// no-cache block keeps intermediaries and browsers from buffering a live
// stream.
pub(crate) const STREAM_RESPONSE_HEADER: &[u8] = b"HTTP/1.1 200 OK\r\n\
Content-Type: multipart/x-mixed-replace; boundary=frame\r\n\
Connection: keep-alive\r\n\
Cache-Control: no-cache, no-store, max-age=0, must-revalidate\r\n\
Expires: Thu, Jan 01 1970 00:00:00 GMT\r\n\
Pragma: no-cache\r\n\
\r\n";

pub(crate) const WWW_AUTHENTICATE_BASIC: &[u8] = b"WWW-Authenticate: Basic realm=\"Camera\"";

const PART_HEADER_PREFIX: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: ";
pub(crate) const PART_HEADER_MAX: usize = PART_HEADER_PREFIX.len() + 20 + 4;

/// Format one part header: boundary, type, exact byte length, blank line.
pub(crate) fn part_header(content_length: usize, out: &mut [u8; PART_HEADER_MAX]) -> usize {
    let mut len = PART_HEADER_PREFIX.len();
    out[..len].copy_from_slice(PART_HEADER_PREFIX);
    len += format_decimal(content_length, &mut out[len..]);
    out[len..len + 4].copy_from_slice(b"\r\n\r\n");
    len + 4
}

/// Emit one frame as the three ordered writes of the wire format: part
/// header, raw payload, trailing CRLF.
pub(crate) async fn write_part<W: Write>(socket: &mut W, payload: &[u8]) -> Result<(), W::Error> {
    let mut header = [0u8; PART_HEADER_MAX];
    let header_len = part_header(payload.len(), &mut header);
    socket.write_all(&header[..header_len]).await?;
    socket.write_all(payload).await?;
    socket.write_all(b"\r\n").await
}

/// Short non-stream response (401/405/500/...). Best effort: a peer that is
/// already gone is not an error worth propagating here.
pub(crate) async fn write_status_response<W: Write>(
    socket: &mut W,
    status: &[u8],
    extra_header: Option<&[u8]>,
    body: &[u8],
) {
    let mut content_length = [0u8; 20];
    let digits = format_decimal(body.len(), &mut content_length);

    let _ = socket.write_all(b"HTTP/1.1 ").await;
    let _ = socket.write_all(status).await;
    let _ = socket.write_all(b"\r\n").await;
    if let Some(header) = extra_header {
        let _ = socket.write_all(header).await;
        let _ = socket.write_all(b"\r\n").await;
    }
    let _ = socket
        .write_all(b"Connection: close\r\nContent-Length: ")
        .await;
    let _ = socket.write_all(&content_length[..digits]).await;
    let _ = socket.write_all(b"\r\n\r\n").await;
    let _ = socket.write_all(body).await;
}

fn format_decimal(value: usize, out: &mut [u8]) -> usize {
    let mut digits = [0u8; 20];
    let mut idx = digits.len();
    let mut remaining = value;
    loop {
        idx -= 1;
        digits[idx] = b'0' + (remaining % 10) as u8;
        remaining /= 10;
        if remaining == 0 {
            break;
        }
    }
    let len = digits.len() - idx;
    out[..len].copy_from_slice(&digits[idx..]);
    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_header_is_byte_exact() {
        let mut out = [0u8; PART_HEADER_MAX];
        let len = part_header(1000, &mut out);
        assert_eq!(
            &out[..len],
            b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 1000\r\n\r\n".as_slice()
        );
    }

    #[test]
    fn part_header_handles_small_and_zero_lengths() {
        let mut out = [0u8; PART_HEADER_MAX];
        let len = part_header(0, &mut out);
        assert!(out[..len].ends_with(b"Content-Length: 0\r\n\r\n"));
        let len = part_header(7, &mut out);
        assert!(out[..len].ends_with(b"Content-Length: 7\r\n\r\n"));
    }

    #[test]
    fn stream_header_advertises_the_frame_boundary() {
        let header = core::str::from_utf8(STREAM_RESPONSE_HEADER).unwrap();
        assert!(header.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(header.contains("multipart/x-mixed-replace; boundary=frame"));
        assert!(header.ends_with("\r\n\r\n"));
    }
}
