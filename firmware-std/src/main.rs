//! MotionLog — ESP-IDF std firmware
//!
//! Every module gets its own FreeRTOS-backed std thread that calls `update`
//! at the module's period. Modules talk only through the shared bus; a
//! module whose setup fails is logged and left out, the rest keep running.

mod ble;
mod mpu;

use std::thread;
use std::time::Duration;

use esp_idf_svc::hal::delay::FreeRtos;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, OutputPin, PinDriver};
use esp_idf_svc::hal::i2c::{I2cConfig, I2cDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::hal::units::Hertz;
use static_cell::StaticCell;

use motionlog::board;
use motionlog::bus::MessageBus;
use motionlog::comm::BluetoothBridge;
use motionlog::indicator::Indicator;
use motionlog::module::{Module, Services};
use motionlog::protocol::VERSION;
use motionlog::recorder::{Recorder, RecorderConfig};
use motionlog::sensor::SensorFeed;

use ble::BleLink;
use mpu::Mpu6050;

type LedPin = PinDriver<'static, AnyOutputPin, Output>;

// ── Shared singletons ────────────────────────────────────────────────

static BUS: MessageBus = MessageBus::new();
static SERVICES: EspServices = EspServices;
static BLE_LINK: BleLink = BleLink::new();

static BRIDGE: StaticCell<BluetoothBridge<&'static BleLink>> = StaticCell::new();
static FEED: StaticCell<SensorFeed<Mpu6050>> = StaticCell::new();
static INDICATOR: StaticCell<Indicator<LedPin>> = StaticCell::new();
static RECORDER: StaticCell<Recorder> = StaticCell::new();

/// RTC_CNTL_BROWN_OUT_REG (ESP32 only, not S2/S3)
const RTC_CNTL_BROWN_OUT_REG: usize = 0x3FF4_80D4;

struct EspServices;

impl Services for EspServices {
    fn uptime_ms(&self) -> u32 {
        let micros = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        ((micros / 1000) & 0xFFFF_FFFF) as u32
    }

    fn delay_ms(&self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}

fn main() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    if board::DISABLE_BROWNOUT {
        // The camera board browns out on BLE TX bursts from weak supplies.
        unsafe { core::ptr::write_volatile(RTC_CNTL_BROWN_OUT_REG as *mut u32, 0) };
    }

    log::info!("MotionLog v{} starting on {} (std)", VERSION, board::BOARD_NAME);

    let peripherals = Peripherals::take()?;

    #[cfg(feature = "esp32cam")]
    let (sda, scl, led) = (
        peripherals.pins.gpio14,
        peripherals.pins.gpio15,
        peripherals.pins.gpio2,
    );
    #[cfg(feature = "devkit")]
    let (sda, scl, led) = (
        peripherals.pins.gpio21,
        peripherals.pins.gpio22,
        peripherals.pins.gpio2,
    );
    log::info!(
        "I2C on SDA {} / SCL {}, LED on GPIO{}",
        board::I2C_SDA_PIN,
        board::I2C_SCL_PIN,
        board::LED_PIN
    );

    // ── Transport ────────────────────────────────────────────────────

    BLE_LINK.start(board::BLE_NAME)?;
    let bridge = BRIDGE.init(BluetoothBridge::new(&BLE_LINK));
    bridge.bind(&BUS, &SERVICES);
    start(bridge, 4096)?;

    // ── Sensor feed ──────────────────────────────────────────────────

    let i2c_config = I2cConfig::new().baudrate(Hertz(board::I2C_FREQ_HZ));
    let sensor = I2cDriver::new(peripherals.i2c0, sda, scl, &i2c_config)
        .map_err(anyhow::Error::from)
        .and_then(Mpu6050::new);
    match sensor {
        Ok(sensor) => {
            let feed = FEED.init(SensorFeed::new(sensor));
            feed.bind(&BUS, &SERVICES);
            let feed: &'static SensorFeed<Mpu6050> = feed;
            if start(feed, 4096)? {
                feed.start_capture();
            }
        }
        Err(e) => log::error!("Failed to setup MPU application: {:?}", e),
    }

    // ── Indicator ────────────────────────────────────────────────────

    let pin = PinDriver::output(led.downgrade_output())?;
    let indicator = INDICATOR.init(Indicator::new(pin));
    indicator.bind(&BUS, &SERVICES);
    start(indicator, 4096)?;

    // ── Recorder ─────────────────────────────────────────────────────

    let recorder = RECORDER.init(Recorder::new(RecorderConfig::default()));
    recorder.bind(&BUS, &SERVICES);
    start(recorder, 8192)?;

    log::info!("All modules running");

    loop {
        thread::sleep(Duration::from_secs(1));
    }
}

/// Set up `module` and spawn its update thread. Returns `false` when setup
/// fails; only thread creation errors are propagated.
fn start(module: &'static dyn Module, stack_size: usize) -> anyhow::Result<bool> {
    let name = module.name();
    if !module.setup() {
        log::error!("Failed to setup {} module", name);
        return Ok(false);
    }

    let period = Duration::from_millis(u64::from(module.period_ms()));
    thread::Builder::new()
        .name(name.into())
        .stack_size(stack_size)
        .spawn(move || loop {
            module.update();
            thread::sleep(period);
        })?;
    log::info!("{} thread spawned ({} ms)", name, module.period_ms());
    Ok(true)
}
