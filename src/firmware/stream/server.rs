use core::sync::atomic::{AtomicBool, Ordering};

use embassy_net::{tcp::TcpSocket, IpListenEndpoint, Stack};
use embassy_time::{with_timeout, Duration, Timer};
use esp_println::println;
use static_cell::StaticCell;

use super::super::camera::{FrameSource, Sensor};
use super::super::config::StreamConfig;
use super::super::retry::{RetryBudget, RetryVerdict};
use super::super::telemetry;
use super::super::types::CaptureFailurePolicy;
use super::session::{run_session, SessionEnd};

const SOCKET_RX_BUF: usize = 2048;
const SOCKET_TX_BUF: usize = 4096;
// An unresponsive peer is cut loose after this long without progress.
const SOCKET_TIMEOUT_SECS: u64 = 20;
// Repeated accept failures mean exhausted network resources, which do not
// self-heal; past this budget the caller restarts the device.
const ACCEPT_FAILURE_BUDGET: u8 = 5;
const ACCEPT_RETRY_DELAY_MS: u64 = 500;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Ask the server and any live session to wind down at the next frame
/// boundary. Sessions release their frame buffer before exiting.
pub(crate) fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub(super) fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

#[cfg(test)]
pub(super) fn reset_shutdown_for_tests() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StartError {
    /// The accept path failed repeatedly; listening is not recoverable.
    AcceptExhausted,
    /// Capture stayed broken through a whole session and policy says the
    /// device, not just the session, is at fault.
    CaptureStalled,
}

impl StartError {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::AcceptExhausted => "stream accept path exhausted",
            Self::CaptureStalled => "capture stalled across a session",
        }
    }
}

/// Accept loop: one registered route, one connection serviced at a time,
/// each handed to a fresh session against the shared frame source.
/// Returns `Ok(())` only on a requested shutdown.
pub(crate) async fn run_stream_server<S: Sensor>(
    stack: Stack<'static>,
    source: &mut FrameSource<S>,
    config: &StreamConfig,
) -> Result<(), StartError> {
    static RX_BUFFER: StaticCell<[u8; SOCKET_RX_BUF]> = StaticCell::new();
    static TX_BUFFER: StaticCell<[u8; SOCKET_TX_BUF]> = StaticCell::new();
    let rx_buffer = RX_BUFFER.init([0u8; SOCKET_RX_BUF]);
    let tx_buffer = TX_BUFFER.init([0u8; SOCKET_TX_BUF]);

    stack.wait_config_up().await;
    if let Some(v4) = stack.config_v4() {
        let uid = core::str::from_utf8(config.credentials.uid()).unwrap_or("<uid>");
        let secret = core::str::from_utf8(config.credentials.secret()).unwrap_or("<pwd>");
        println!(
            "stream: ready at http://{}:{}/{}/{}",
            v4.address.address(),
            config.port,
            uid,
            secret
        );
    }

    let mut accept_budget = RetryBudget::new(
        ACCEPT_FAILURE_BUDGET,
        Duration::from_millis(ACCEPT_RETRY_DELAY_MS),
    );

    loop {
        if shutdown_requested() {
            return Ok(());
        }

        let mut socket = TcpSocket::new(stack, &mut rx_buffer[..], &mut tx_buffer[..]);
        socket.set_timeout(Some(Duration::from_secs(SOCKET_TIMEOUT_SECS)));

        let accepted = socket
            .accept(IpListenEndpoint {
                addr: None,
                port: config.port,
            })
            .await;
        if let Err(err) = accepted {
            telemetry::record_stream_accept_error();
            println!("stream: accept err={:?}", err);
            match accept_budget.record_failure() {
                RetryVerdict::Retry { delay } => Timer::after(delay).await,
                RetryVerdict::Exhausted => return Err(StartError::AcceptExhausted),
            }
            continue;
        }

        accept_budget.reset();
        telemetry::record_stream_accept();
        if let Some(remote) = socket.remote_endpoint() {
            println!("stream: request from {}", remote);
        }

        let end = run_session(&mut socket, source, config).await;
        println!("stream: session ended: {:?}", end);

        let _ = with_timeout(Duration::from_millis(250), socket.flush()).await;
        socket.close();

        if end == SessionEnd::CaptureExhausted
            && config.on_capture_exhausted == CaptureFailurePolicy::RestartDevice
        {
            return Err(StartError::CaptureStalled);
        }
    }
}
