use embassy_net::Stack;
use embassy_time::{Duration, Timer};
use esp_hal::{
    gpio::{Input, InputConfig, Pull},
    i2c::master::{Config as I2cConfig, I2c},
    lcd_cam::{
        cam::{Camera, Config as CamConfig},
        LcdCam,
    },
    time::Rate,
    timer::timg::TimerGroup,
};
use esp_println::println;
use static_cell::StaticCell;

use super::camera::{
    apply_tuning, initialize, FrameSource, Ov2640, FRAME_BUF_LEN, SENSOR_PINS,
};
use super::config::{
    compiled_stream_credentials, compiled_wifi_credentials, CredentialStore, DeviceConfig,
};
use super::net;
use super::stream;
use super::telemetry;
use super::types::LinkState;

const SCCB_FREQ_KHZ: u32 = 100;
const DMA_STREAM_CHUNK: usize = 1024;

/// Firmware entry: bring the board up, assemble the injected configuration,
/// wire the camera and radio, then hand control to the executor.
pub fn run() -> ! {
    let peripherals = esp_hal::init(esp_hal::Config::default());
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);
    // The radio stack allocates from this heap.
    esp_alloc::heap_allocator!(size: 96 * 1024);

    let mut credential_store = CredentialStore::new(peripherals.FLASH);
    let stored = credential_store.load();
    let compiled = compiled_wifi_credentials();
    if stored.is_none() {
        if let Some(compiled) = compiled.as_ref() {
            credential_store.save(compiled);
            println!("store: persisted compiled wifi credentials");
        }
    } else {
        println!("store: using persisted wifi credentials");
    }
    let config = DeviceConfig::assemble(stored.or(compiled), compiled_stream_credentials());

    let net = match net::setup(peripherals.WIFI) {
        Ok(net) => net,
        Err(err) => restart(err),
    };

    // DVP wiring; must stay in lockstep with SENSOR_PINS.
    println!(
        "camera: pins xclk={} pclk={} vsync={} href={} sda={} scl={} d0-d7={:?}",
        SENSOR_PINS.xclk,
        SENSOR_PINS.pclk,
        SENSOR_PINS.vsync,
        SENSOR_PINS.href,
        SENSOR_PINS.sda,
        SENSOR_PINS.scl,
        SENSOR_PINS.data
    );
    let i2c_cfg = I2cConfig::default().with_frequency(Rate::from_khz(SCCB_FREQ_KHZ));
    let sccb = I2c::new(peripherals.I2C0, i2c_cfg)
        .expect("failed to init I2C0 for SCCB")
        .with_sda(peripherals.GPIO4)
        .with_scl(peripherals.GPIO5);

    let lcd_cam = LcdCam::new(peripherals.LCD_CAM);
    let cam_cfg = CamConfig::default().with_frequency(Rate::from_mhz(20));
    let camera = Camera::new(lcd_cam.cam, peripherals.DMA_CH0, cam_cfg)
        .expect("failed to init DVP capture")
        .with_master_clock(peripherals.GPIO15)
        .with_pixel_clock(peripherals.GPIO13)
        .with_vsync(peripherals.GPIO6)
        .with_h_enable(peripherals.GPIO7)
        .with_data0(peripherals.GPIO11)
        .with_data1(peripherals.GPIO9)
        .with_data2(peripherals.GPIO8)
        .with_data3(peripherals.GPIO10)
        .with_data4(peripherals.GPIO12)
        .with_data5(peripherals.GPIO18)
        .with_data6(peripherals.GPIO17)
        .with_data7(peripherals.GPIO16);
    let dma_buf = esp_hal::dma_rx_stream_buffer!(32 * 1024, DMA_STREAM_CHUNK);

    static FRAME_BUF: StaticCell<[u8; FRAME_BUF_LEN]> = StaticCell::new();
    let frame_buf = FRAME_BUF.init([0u8; FRAME_BUF_LEN]);
    let sensor = Ov2640::new(sccb, camera, dma_buf, frame_buf);

    // BOOT button doubles as a maintenance stop for the stream server.
    let stop_button = Input::new(
        peripherals.GPIO0,
        InputConfig::default().with_pull(Pull::Up),
    );

    static EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();
    let executor = EXECUTOR.init(esp_rtos::embassy::Executor::new());
    executor.run(move |spawner| {
        spawner.must_spawn(net::net_task(net.runner));
        spawner.must_spawn(net::supervisor_task(
            net.controller,
            net.stack,
            config.wifi,
            config.link,
        ));
        spawner.must_spawn(stop_button_task(stop_button));
        spawner.must_spawn(main_task(net.stack, sensor, config));
    })
}

/// Startup sequence and serving loop: gate on link-up, walk the sensor
/// bring-up ladder once, then serve until shutdown or a fatal error.
#[embassy_executor::task]
async fn main_task(stack: Stack<'static>, sensor: Ov2640<'static>, config: DeviceConfig) {
    let mut sensor = sensor;

    if config.wifi.is_none() {
        println!("boot: set KESTREL_WIFI_SSID/KESTREL_WIFI_PASSWORD or provision the store");
        return;
    }

    match net::wait_link_up(stack, config.link.startup_timeout).await {
        LinkState::Connected => {}
        state => {
            println!("boot: link is {} after startup timeout", state.as_str());
            restart("link not up at startup");
        }
    }

    let winning = match initialize(&mut sensor, &config.sensor_ladder, config.init).await {
        Ok(winning) => winning,
        Err(err) => restart(err.as_str()),
    };
    let (width, height) = winning.frame_size.dimensions();
    println!("boot: sensor ready {}x{} @ {}Hz", width, height, winning.xclk_hz);

    apply_tuning(&mut sensor, &config.tuning);
    Timer::after(config.init.settle_delay).await;

    let mut source = FrameSource::new(sensor);
    match stream::run_stream_server(stack, &mut source, &config.stream).await {
        Ok(()) => {
            println!("stream: server stopped");
            telemetry::log_snapshot();
            loop {
                Timer::after(Duration::from_secs(3600)).await;
            }
        }
        Err(err) => restart(err.as_str()),
    }
}

#[embassy_executor::task]
async fn stop_button_task(mut button: Input<'static>) {
    button.wait_for_falling_edge().await;
    println!("boot: stop requested via button");
    stream::request_shutdown();
}

/// The only response to a fatal startup failure: a full restart. An
/// embedded target has no exit status; the reset is the observable action.
fn restart(reason: &str) -> ! {
    println!("boot: restarting: {}", reason);
    telemetry::log_snapshot();
    esp_hal::system::software_reset()
}
