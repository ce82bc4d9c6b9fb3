use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::select::{select, Either};
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::watch::Watch;
use embassy_time::{with_timeout, Duration, Timer};
use esp_println::println;
use esp_radio::wifi::{
    event::{self, EventExt},
    AuthMethod, ClientConfig, ModeConfig, WifiController, WifiEvent,
};

use super::super::config::LinkPolicy;
use super::super::telemetry;
use super::super::types::{LinkState, WifiCredentials};

static LINK_STATE: Watch<CriticalSectionRawMutex, LinkState, 2> = Watch::new();
static WIFI_EVENT_LOGGER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Current link condition. Written only by the supervisor task.
pub(crate) fn link_state() -> LinkState {
    LINK_STATE.try_get().unwrap_or(LinkState::Disconnected)
}

fn advance(to: LinkState, trigger: &str) {
    let from = link_state();
    if from != to {
        println!("net: {} -> {} ({})", from.as_str(), to.as_str(), trigger);
    }
    LINK_STATE.sender().send(to);
}

/// Block the caller until the stack holds an address or `timeout` runs out,
/// returning the link state it observed. Anything but `Connected` is fatal
/// for startup: the device is unreachable and should be restarted, not
/// waited on indefinitely.
pub(crate) async fn wait_link_up(stack: Stack<'static>, timeout: Duration) -> LinkState {
    match with_timeout(timeout, stack.wait_config_up()).await {
        Ok(()) => LinkState::Connected,
        Err(_) => link_state(),
    }
}

/// Self-healing association loop: configure, start, connect, then sit on
/// the disconnect event and go around again. Failures here are absorbed
/// and retried without bound; only the startup gate above puts a deadline
/// on the link.
pub(super) async fn run(
    mut controller: WifiController<'static>,
    stack: Stack<'static>,
    credentials: Option<WifiCredentials>,
    policy: LinkPolicy,
) {
    install_wifi_event_logger();

    let Some(credentials) = credentials else {
        println!("net: no wifi credentials provisioned; link stays down");
        return;
    };
    let Some(mode) = mode_config_from_credentials(&credentials) else {
        println!("net: wifi credentials are not valid utf-8; link stays down");
        return;
    };

    let mut config_applied = false;
    loop {
        if !config_applied {
            if let Err(err) = controller.set_config(&mode) {
                println!("net: station config err={:?}", err);
                Timer::after(policy.reconnect_cooldown).await;
                continue;
            }
            config_applied = true;
        }

        match controller.is_started() {
            Ok(true) => {}
            Ok(false) => {
                if let Err(err) = controller.start_async().await {
                    println!("net: wifi start err={:?}", err);
                    Timer::after(policy.reconnect_cooldown).await;
                    continue;
                }
            }
            Err(err) => {
                println!("net: wifi status err={:?}", err);
                Timer::after(policy.reconnect_cooldown).await;
                continue;
            }
        }

        advance(LinkState::Connecting, "connect");
        telemetry::record_net_connect_attempt();
        match controller.connect_async().await {
            Ok(()) => {
                // Associated; the address still has to arrive over DHCP.
                match select(
                    stack.wait_config_up(),
                    controller.wait_for_event(WifiEvent::StaDisconnected),
                )
                .await
                {
                    Either::First(()) => {
                        if let Some(v4) = stack.config_v4() {
                            println!("net: address acquired {}", v4.address.address());
                        }
                        advance(LinkState::Connected, "address_acquired");
                        controller.wait_for_event(WifiEvent::StaDisconnected).await;
                        telemetry::record_net_disconnect();
                        advance(LinkState::Disconnected, "disconnected");
                    }
                    Either::Second(_) => {
                        telemetry::record_net_disconnect();
                        advance(LinkState::Disconnected, "disconnected_before_address");
                    }
                }
                Timer::after(policy.reconnect_cooldown).await;
            }
            Err(err) => {
                telemetry::record_net_connect_failure();
                println!("net: connect err={:?}", err);
                advance(LinkState::Disconnected, "connect_failed");
                let _ = controller.disconnect_async().await;
                Timer::after(policy.reconnect_cooldown).await;
            }
        }
    }
}

fn mode_config_from_credentials(credentials: &WifiCredentials) -> Option<ModeConfig> {
    let ssid = credentials.ssid_str()?;
    let password = credentials.password_str()?;
    let auth_method = if password.is_empty() {
        AuthMethod::None
    } else {
        AuthMethod::Wpa2Personal
    };
    let client = ClientConfig::default()
        .with_ssid(ssid.into())
        .with_password(password.into())
        .with_auth_method(auth_method);
    Some(ModeConfig::Client(client))
}

fn install_wifi_event_logger() {
    if !cfg!(debug_assertions) {
        return;
    }
    if WIFI_EVENT_LOGGER_INSTALLED.swap(true, Ordering::Relaxed) {
        return;
    }

    event::StaStart::update_handler(|_| {
        println!("net: event sta_start");
    });

    event::StaConnected::update_handler(|event| {
        let ssid_len = (event.ssid_len() as usize).min(event.ssid().len());
        let ssid = core::str::from_utf8(&event.ssid()[..ssid_len]).unwrap_or("<non_utf8>");
        println!(
            "net: event sta_connected ssid={} channel={}",
            ssid,
            event.channel()
        );
    });

    event::StaDisconnected::update_handler(|event| {
        let reason = event.reason();
        println!(
            "net: event sta_disconnected reason={} ({}) rssi={}",
            reason,
            disconnect_reason_label(reason),
            event.rssi()
        );
    });
}

fn disconnect_reason_label(reason: u8) -> &'static str {
    match reason {
        200 => "beacon_timeout",
        201 => "no_ap_found",
        202 => "auth_fail",
        203 => "assoc_fail",
        204 => "handshake_timeout",
        205 => "connection_fail",
        210 => "no_ap_found_compatible_security",
        211 => "no_ap_found_authmode_threshold",
        212 => "no_ap_found_rssi_threshold",
        _ => "other",
    }
}
