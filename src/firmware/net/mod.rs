mod supervisor;

use embassy_net::{Runner, Stack, StackResources};
use esp_hal::rng::Rng;
use esp_println::println;
use esp_radio::wifi::{InternalWifiError, WifiController, WifiDevice, WifiError};
use static_cell::StaticCell;

use super::config::LinkPolicy;
use super::types::WifiCredentials;

pub(crate) use supervisor::wait_link_up;

const WIFI_RX_QUEUE_SIZE: usize = 3;
const WIFI_TX_QUEUE_SIZE: usize = 2;
const WIFI_STATIC_RX_BUF_NUM: u8 = 4;
const WIFI_DYNAMIC_RX_BUF_NUM: u16 = 8;
const WIFI_DYNAMIC_TX_BUF_NUM: u16 = 8;
const WIFI_RX_BA_WIN: u8 = 3;

pub(crate) struct NetRuntime {
    pub(crate) controller: WifiController<'static>,
    pub(crate) runner: Runner<'static, WifiDevice<'static>>,
    pub(crate) stack: Stack<'static>,
}

/// Bring up the radio and the TCP/IP stack. Nothing here associates yet;
/// that is the supervisor task's job.
pub(crate) fn setup(
    wifi: esp_hal::peripherals::WIFI<'static>,
) -> Result<NetRuntime, &'static str> {
    static RADIO_CTRL: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();
    static STACK_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();

    let radio_ctrl = esp_radio::init().map_err(|err| {
        println!("net: esp_radio::init err={:?}", err);
        "radio init failed"
    })?;
    let radio_ctrl = RADIO_CTRL.init(radio_ctrl);
    let (controller, ifaces) = esp_radio::wifi::new(radio_ctrl, wifi, wifi_runtime_config())
        .map_err(|err| match err {
            WifiError::InvalidArguments => "wifi init failed: invalid_args",
            WifiError::Unsupported => "wifi init failed: unsupported",
            WifiError::NotInitialized => "wifi init failed: not_initialized",
            WifiError::InternalError(InternalWifiError::NoMem) => "wifi init failed: no_mem",
            _ => "wifi init failed: other",
        })?;

    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    let (stack, runner) = embassy_net::new(
        ifaces.sta,
        embassy_net::Config::dhcpv4(Default::default()),
        STACK_RESOURCES.init(StackResources::<3>::new()),
        seed,
    );

    Ok(NetRuntime {
        controller,
        runner,
        stack,
    })
}

fn wifi_runtime_config() -> esp_radio::wifi::Config {
    esp_radio::wifi::Config::default()
        .with_rx_queue_size(WIFI_RX_QUEUE_SIZE)
        .with_tx_queue_size(WIFI_TX_QUEUE_SIZE)
        .with_static_rx_buf_num(WIFI_STATIC_RX_BUF_NUM)
        .with_dynamic_rx_buf_num(WIFI_DYNAMIC_RX_BUF_NUM)
        .with_dynamic_tx_buf_num(WIFI_DYNAMIC_TX_BUF_NUM)
        .with_ampdu_rx_enable(false)
        .with_ampdu_tx_enable(false)
        .with_rx_ba_win(WIFI_RX_BA_WIN)
}

#[embassy_executor::task]
pub(crate) async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
pub(crate) async fn supervisor_task(
    controller: WifiController<'static>,
    stack: Stack<'static>,
    credentials: Option<WifiCredentials>,
    policy: LinkPolicy,
) {
    supervisor::run(controller, stack, credentials, policy).await;
}
