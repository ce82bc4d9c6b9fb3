use embassy_time::{Duration, Timer};
use embedded_io_async::{Read, Write};
use esp_println::println;

use super::super::camera::{CaptureError, FrameSource, Sensor};
use super::super::config::StreamConfig;
use super::super::telemetry;
use super::auth::{authenticate, AuthScheme};
use super::machine::{SessionEngine, SessionEvent, SessionPhase};
use super::multipart::{
    write_part, write_status_response, STREAM_RESPONSE_HEADER, WWW_AUTHENTICATE_BASIC,
};
use super::server::shutdown_requested;

const REQUEST_HEAD_MAX: usize = 1024;

/// How one per-connection session ended; the server decides what, if
/// anything, to do about it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SessionEnd {
    /// Client closed the connection mid-stream. Normal termination.
    ClientGone,
    Unauthorized,
    BadRequest,
    /// Consecutive capture failures exhausted the budget.
    CaptureExhausted,
    Shutdown,
}

enum HeadError {
    TooLarge,
    Closed,
}

/// Drive one accepted connection through the session states:
/// authenticate, then stream parts until the client leaves, the capture
/// path stays broken, or shutdown is requested.
pub(crate) async fn run_session<S, T>(
    socket: &mut T,
    source: &mut FrameSource<S>,
    config: &StreamConfig,
) -> SessionEnd
where
    S: Sensor,
    T: Read + Write,
{
    let mut engine = SessionEngine::new(config.failure_budget);
    let mut head_buf = [0u8; REQUEST_HEAD_MAX];

    let head_len = match read_request_head(socket, &mut head_buf).await {
        Ok(len) => len,
        Err(HeadError::TooLarge) => {
            write_status_response(socket, b"413 Payload Too Large", None, b"request too large")
                .await;
            let _ = engine.apply(SessionEvent::CredentialsRejected);
            return SessionEnd::BadRequest;
        }
        Err(HeadError::Closed) => {
            let _ = engine.apply(SessionEvent::WriteFailed);
            return SessionEnd::ClientGone;
        }
    };

    let Ok(head) = core::str::from_utf8(&head_buf[..head_len]) else {
        write_status_response(socket, b"400 Bad Request", None, b"malformed request").await;
        let _ = engine.apply(SessionEvent::CredentialsRejected);
        return SessionEnd::BadRequest;
    };
    let Some((method, target)) = parse_request_line(head) else {
        write_status_response(socket, b"400 Bad Request", None, b"malformed request line").await;
        let _ = engine.apply(SessionEvent::CredentialsRejected);
        return SessionEnd::BadRequest;
    };
    if method != "GET" {
        write_status_response(socket, b"405 Method Not Allowed", None, b"stream is GET only")
            .await;
        let _ = engine.apply(SessionEvent::CredentialsRejected);
        return SessionEnd::BadRequest;
    }

    match authenticate(target, head, &config.credentials) {
        Ok(scheme) => {
            let label = match scheme {
                AuthScheme::Path => "path",
                AuthScheme::Basic => "basic",
            };
            println!("stream: client authenticated via {}", label);
            let _ = engine.apply(SessionEvent::CredentialsAccepted);
        }
        Err(failure) => {
            telemetry::record_stream_auth_failure();
            let _ = engine.apply(SessionEvent::CredentialsRejected);
            let challenge = failure.advertise_basic.then_some(WWW_AUTHENTICATE_BASIC);
            write_status_response(socket, b"401 Unauthorized", challenge, b"unauthorized").await;
            return SessionEnd::Unauthorized;
        }
    }

    stream_frames(socket, source, config, &mut engine).await
}

async fn stream_frames<S, T>(
    socket: &mut T,
    source: &mut FrameSource<S>,
    config: &StreamConfig,
    engine: &mut SessionEngine,
) -> SessionEnd
where
    S: Sensor,
    T: Read + Write,
{
    // The 200/multipart head rides with the first part, so a session that
    // never produces a frame can still answer with a clean 500.
    let mut response_header_sent = false;

    loop {
        if shutdown_requested() {
            let _ = engine.apply(SessionEvent::ShutdownRequested);
            return SessionEnd::Shutdown;
        }

        match source.acquire() {
            Ok(frame) => {
                let payload_len = frame.len();
                let write_result = {
                    let payload = frame.bytes();
                    async {
                        if !response_header_sent {
                            socket.write_all(STREAM_RESPONSE_HEADER).await?;
                        }
                        write_part(socket, payload).await
                    }
                    .await
                };
                // The guard goes back to the pool here, write outcome
                // notwithstanding; holding it any longer starves capture.
                drop(frame);

                match write_result {
                    Ok(()) => {
                        response_header_sent = true;
                        telemetry::record_stream_frame(payload_len);
                        let _ = engine.apply(SessionEvent::FrameStreamed);
                        pause(config.frame_pacing).await;
                    }
                    Err(_) => {
                        telemetry::record_stream_client_disconnect();
                        let _ = engine.apply(SessionEvent::WriteFailed);
                        println!(
                            "stream: client gone after {} frames",
                            engine.frames_streamed()
                        );
                        return SessionEnd::ClientGone;
                    }
                }
            }
            Err(CaptureError::Invalid) => {
                telemetry::record_stream_invalid_frame();
                let _ = engine.apply(SessionEvent::FrameInvalid);
            }
            Err(CaptureError::NotReady) => {
                telemetry::record_stream_capture_failure();
                if engine.apply(SessionEvent::CaptureFailed) == SessionPhase::Failed {
                    telemetry::record_stream_session_failed();
                    println!(
                        "stream: capture failed {} times in a row; ending session",
                        engine.consecutive_failures()
                    );
                    if engine.frames_streamed() == 0 {
                        write_status_response(
                            socket,
                            b"500 Internal Server Error",
                            None,
                            b"capture unavailable",
                        )
                        .await;
                    }
                    return SessionEnd::CaptureExhausted;
                }
                pause(config.capture_retry_delay).await;
            }
        }
    }
}

async fn read_request_head<R: Read>(socket: &mut R, buf: &mut [u8]) -> Result<usize, HeadError> {
    let mut filled = 0usize;
    loop {
        if filled == buf.len() {
            return Err(HeadError::TooLarge);
        }
        let n = socket
            .read(&mut buf[filled..])
            .await
            .map_err(|_| HeadError::Closed)?;
        if n == 0 {
            return Err(HeadError::Closed);
        }
        filled += n;
        if let Some(end) = find_header_end(&buf[..filled]) {
            return Ok(end);
        }
    }
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

fn parse_request_line(head: &str) -> Option<(&str, &str)> {
    let first_line = head.lines().next()?;
    let mut parts = first_line.split_ascii_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    let _version = parts.next()?;
    Some((method, target))
}

async fn pause(delay: Duration) {
    if delay.as_ticks() != 0 {
        Timer::after(delay).await;
    }
}
