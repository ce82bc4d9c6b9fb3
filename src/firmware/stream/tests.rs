use core::cmp::min;

use embassy_futures::block_on;
use embedded_io_async::{ErrorKind, Read, Write};

use super::super::camera::sensor::{FrameInfo, PixelFormat, SensorError, TuningParam};
use super::super::camera::{CaptureError, FrameSource, Sensor, SensorConfig};
use super::super::config::StreamConfig;
use super::super::types::StreamCredentials;
use super::server::{request_shutdown, reset_shutdown_for_tests};
use super::session::{run_session, SessionEnd};

const OUT_CAP: usize = 8192;

#[derive(Debug)]
struct SocketError;

impl embedded_io_async::Error for SocketError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::BrokenPipe
    }
}

/// In-memory socket: serves one scripted request, records writes, and can
/// be told to start failing after a given number of successful writes.
struct MockSocket {
    request: &'static [u8],
    written: [u8; OUT_CAP],
    written_len: usize,
    writes_before_error: Option<u32>,
    write_calls: u32,
}

impl MockSocket {
    fn new(request: &'static [u8]) -> Self {
        Self {
            request,
            written: [0u8; OUT_CAP],
            written_len: 0,
            writes_before_error: None,
            write_calls: 0,
        }
    }

    fn failing_after(request: &'static [u8], successful_writes: u32) -> Self {
        let mut socket = Self::new(request);
        socket.writes_before_error = Some(successful_writes);
        socket
    }

    fn written(&self) -> &[u8] {
        &self.written[..self.written_len]
    }
}

impl embedded_io_async::ErrorType for MockSocket {
    type Error = SocketError;
}

impl Read for MockSocket {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        if self.request.is_empty() {
            // Nothing more arrives on this connection.
            core::future::pending::<()>().await;
        }
        let n = min(buf.len(), self.request.len());
        buf[..n].copy_from_slice(&self.request[..n]);
        self.request = &self.request[n..];
        Ok(n)
    }
}

impl Write for MockSocket {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, SocketError> {
        self.write_calls += 1;
        if let Some(limit) = self.writes_before_error {
            if self.write_calls > limit {
                return Err(SocketError);
            }
        }
        assert!(self.written_len + buf.len() <= OUT_CAP, "mock socket overflow");
        self.written[self.written_len..self.written_len + buf.len()].copy_from_slice(buf);
        self.written_len += buf.len();
        Ok(buf.len())
    }
}

const FRAME_MAX: usize = 1200;

/// Sensor fed from a script of capture outcomes. Panics on any buffer-pool
/// misuse and counts checkouts so tests can assert the pairing invariant.
struct ScriptedSensor {
    script: &'static [Result<usize, CaptureError>],
    cursor: usize,
    payload: [u8; FRAME_MAX],
    current_len: usize,
    in_flight: bool,
    acquires: u32,
    releases: u32,
}

impl ScriptedSensor {
    fn new(script: &'static [Result<usize, CaptureError>]) -> Self {
        Self {
            script,
            cursor: 0,
            payload: [0u8; FRAME_MAX],
            current_len: 0,
            in_flight: false,
            acquires: 0,
            releases: 0,
        }
    }
}

impl Sensor for ScriptedSensor {
    fn init(&mut self, _config: &SensorConfig) -> Result<(), SensorError> {
        Ok(())
    }

    fn deinit(&mut self) {}

    fn acquire_frame(&mut self) -> Result<FrameInfo, CaptureError> {
        assert!(!self.in_flight, "second frame handed out while one is in flight");
        if self.cursor >= self.script.len() {
            return Err(CaptureError::NotReady);
        }
        let step = self.script[self.cursor];
        self.cursor += 1;
        match step {
            Ok(len) => {
                self.acquires += 1;
                self.in_flight = true;
                self.current_len = len;
                for (index, byte) in self.payload[..len].iter_mut().enumerate() {
                    *byte = (self.acquires as usize + index) as u8;
                }
                Ok(FrameInfo {
                    len,
                    format: PixelFormat::Jpeg,
                    sequence: self.acquires,
                })
            }
            Err(err) => Err(err),
        }
    }

    fn frame_bytes(&self) -> &[u8] {
        &self.payload[..self.current_len]
    }

    fn release_frame(&mut self) {
        assert!(self.in_flight, "release without an in-flight frame");
        self.in_flight = false;
        self.releases += 1;
    }

    fn set_param(&mut self, _param: TuningParam, _value: i8) -> bool {
        true
    }
}

fn test_config() -> StreamConfig {
    let mut config = StreamConfig::defaults(
        StreamCredentials::from_parts(b"david", b"Dev").unwrap(),
    );
    // No pacing in tests; the loop must stand on its own outcomes.
    config.frame_pacing = embassy_time::Duration::from_ticks(0);
    config.capture_retry_delay = embassy_time::Duration::from_ticks(0);
    config
}

const AUTH_REQUEST: &[u8] = b"GET /david/Dev HTTP/1.1\r\nHost: cam\r\n\r\n";

/// Step through the multipart body checking each part is exactly
/// `--frame` / type / length header, payload bytes, trailing CRLF.
fn check_parts(mut body: &[u8], expected_lens: &[usize], first_seq: u32) {
    for (offset, &len) in expected_lens.iter().enumerate() {
        let mut header = [0u8; super::multipart::PART_HEADER_MAX];
        let header_len = super::multipart::part_header(len, &mut header);
        assert!(
            body.starts_with(&header[..header_len]),
            "part {offset} header mismatch"
        );
        body = &body[header_len..];

        let seq = first_seq + offset as u32;
        for (index, &byte) in body[..len].iter().enumerate() {
            assert_eq!(byte, (seq as usize + index) as u8, "part {offset} payload corrupt");
        }
        body = &body[len..];
        assert!(body.starts_with(b"\r\n"), "part {offset} missing trailing CRLF");
        body = &body[2..];
    }
    assert!(body.is_empty(), "unexpected trailing bytes after last part");
}

#[test]
fn three_frames_then_client_disconnect_closes_cleanly() {
    // Frames of 1000, 950 and 1010 bytes stream out; the client drops the
    // connection on the fourth part's header write.
    static SCRIPT: &[Result<usize, CaptureError>] = &[Ok(1000), Ok(950), Ok(1010), Ok(1000)];
    // Writes: response header, then three writes per part.
    let mut socket = MockSocket::failing_after(AUTH_REQUEST, 1 + 3 * 3);
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::ClientGone);

    let sensor = source.sensor_ref();
    assert_eq!(sensor.acquires, 4);
    assert_eq!(sensor.releases, 4, "every checked-out buffer must go back");
    assert!(!sensor.in_flight);

    let written = socket.written();
    assert!(written.starts_with(super::multipart::STREAM_RESPONSE_HEADER));
    let body = &written[super::multipart::STREAM_RESPONSE_HEADER.len()..];
    check_parts(body, &[1000, 950, 1010], 1);
}

#[test]
fn wrong_credentials_get_401_and_no_frames() {
    let mut socket = MockSocket::new(b"GET /david/nope HTTP/1.1\r\n\r\n");
    let mut source = FrameSource::new(ScriptedSensor::new(&[Ok(1000)]));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::Unauthorized);
    assert!(socket.written().starts_with(b"HTTP/1.1 401 Unauthorized\r\n"));
    assert_eq!(source.sensor_ref().acquires, 0);
}

#[test]
fn missing_credentials_advertise_basic_auth() {
    let mut socket = MockSocket::new(b"GET / HTTP/1.1\r\n\r\n");
    let mut source = FrameSource::new(ScriptedSensor::new(&[]));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::Unauthorized);
    let written = socket.written();
    assert!(written.starts_with(b"HTTP/1.1 401 Unauthorized\r\n"));
    assert!(contains(written, b"WWW-Authenticate: Basic realm=\"Camera\""));
}

#[test]
fn basic_auth_header_streams_without_path_credentials() {
    // One full part goes out; the client drops on the second part's header.
    static SCRIPT: &[Result<usize, CaptureError>] = &[Ok(640), Ok(640)];
    let mut socket = MockSocket::failing_after(
        b"GET / HTTP/1.1\r\nAuthorization: Basic ZGF2aWQ6RGV2\r\n\r\n",
        1 + 3,
    );
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::ClientGone);
    let written = socket.written();
    assert!(written.starts_with(super::multipart::STREAM_RESPONSE_HEADER));
    check_parts(
        &written[super::multipart::STREAM_RESPONSE_HEADER.len()..],
        &[640],
        1,
    );
}

#[test]
fn non_get_method_is_rejected() {
    let mut socket = MockSocket::new(b"POST /david/Dev HTTP/1.1\r\n\r\n");
    let mut source = FrameSource::new(ScriptedSensor::new(&[]));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::BadRequest);
    assert!(socket.written().starts_with(b"HTTP/1.1 405 Method Not Allowed\r\n"));
}

#[test]
fn capture_exhaustion_before_first_frame_yields_500() {
    static SCRIPT: &[Result<usize, CaptureError>] = &[
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
    ];
    let mut socket = MockSocket::new(AUTH_REQUEST);
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::CaptureExhausted);
    assert!(socket.written().starts_with(b"HTTP/1.1 500 Internal Server Error\r\n"));
    assert_eq!(source.sensor_ref().releases, 0);
}

#[test]
fn capture_exhaustion_after_streaming_closes_without_500() {
    static SCRIPT: &[Result<usize, CaptureError>] = &[
        Ok(500),
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
    ];
    let mut socket = MockSocket::new(AUTH_REQUEST);
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::CaptureExhausted);
    let written = socket.written();
    assert!(!contains(written, b"500 Internal Server Error"));
    check_parts(
        &written[super::multipart::STREAM_RESPONSE_HEADER.len()..],
        &[500],
        1,
    );
    assert_eq!(source.sensor_ref().releases, 1);
}

#[test]
fn invalid_frames_are_skipped_without_emitting_bytes() {
    // An empty frame, then a real one; only the real one hits the wire,
    // and the client drops on the third checkout's part header.
    static SCRIPT: &[Result<usize, CaptureError>] = &[Ok(0), Ok(512), Ok(512)];
    let mut socket = MockSocket::failing_after(AUTH_REQUEST, 1 + 3);
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::ClientGone);

    let sensor = source.sensor_ref();
    assert_eq!(sensor.acquires, 3);
    assert_eq!(sensor.releases, 3);
    let written = socket.written();
    assert!(written.starts_with(super::multipart::STREAM_RESPONSE_HEADER));
    // The second checkout carries sequence 2, and is the only part.
    check_parts(
        &written[super::multipart::STREAM_RESPONSE_HEADER.len()..],
        &[512],
        2,
    );
}

#[test]
fn consecutive_failures_interleaved_with_success_stay_within_budget() {
    static SCRIPT: &[Result<usize, CaptureError>] = &[
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
        Ok(300),
        Err(CaptureError::NotReady),
        Err(CaptureError::NotReady),
        Ok(300),
    ];
    let mut socket = MockSocket::failing_after(AUTH_REQUEST, 1 + 3 + 3);
    let mut source = FrameSource::new(ScriptedSensor::new(SCRIPT));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    // Script runs dry after the second frame; the mock then reports
    // NotReady until the budget closes the session.
    assert_eq!(end, SessionEnd::CaptureExhausted);
    assert_eq!(source.sensor_ref().acquires, 2);
    assert_eq!(source.sensor_ref().releases, 2);
}

#[test]
fn shutdown_request_ends_an_authenticated_session() {
    request_shutdown();
    let mut socket = MockSocket::new(AUTH_REQUEST);
    let mut source = FrameSource::new(ScriptedSensor::new(&[Ok(1000)]));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    reset_shutdown_for_tests();

    assert_eq!(end, SessionEnd::Shutdown);
    assert_eq!(source.sensor_ref().acquires, 0);
}

#[test]
fn oversized_request_head_is_bounced() {
    static BIG: [u8; 2048] = [b'A'; 2048];
    let mut socket = MockSocket::new(&BIG);
    let mut source = FrameSource::new(ScriptedSensor::new(&[]));
    let config = test_config();

    let end = block_on(run_session(&mut socket, &mut source, &config));
    assert_eq!(end, SessionEnd::BadRequest);
    assert!(socket.written().starts_with(b"HTTP/1.1 413 Payload Too Large\r\n"));
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}
