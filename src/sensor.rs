/// Motion samples, sensor frames and the periodic sensor feed.
///
/// The feed reads one six-channel sample per update and publishes it on
/// `sensor/data` as a 28-byte frame: a `u32` millisecond timestamp followed
/// by `ax, ay, az, gx, gy, gz` as `f32`, all little-endian.
///
/// Register-level sensor access lives behind [`MotionSensor`]; the platform
/// crate provides the real driver.
use core::sync::atomic::{AtomicBool, Ordering};

use crate::bus::MessageBus;
use crate::defaults::SENSOR_PERIOD_MS;
use crate::module::{Module, Services};
use crate::protocol::topics;

/// Size of the frame timestamp header
pub const TIMESTAMP_LEN: usize = 4;

/// Number of channels in a sample
pub const CHANNELS: usize = 6;

/// Minimum `sensor/data` payload length
pub const FRAME_LEN: usize = TIMESTAMP_LEN + CHANNELS * 4;

/// One six-channel motion reading: linear acceleration then angular rate.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

impl Sample {
    pub const fn new(ax: f32, ay: f32, az: f32, gx: f32, gy: f32, gz: f32) -> Self {
        Self {
            ax,
            ay,
            az,
            gx,
            gy,
            gz,
        }
    }

    /// Channels in wire order
    pub fn channels(&self) -> [f32; CHANNELS] {
        [self.ax, self.ay, self.az, self.gx, self.gy, self.gz]
    }

    /// Decode the sample carried by a `sensor/data` frame.
    ///
    /// The timestamp is skipped. Returns `None` for frames shorter than
    /// [`FRAME_LEN`]; trailing bytes beyond it are ignored.
    pub fn from_frame(frame: &[u8]) -> Option<Self> {
        if frame.len() < FRAME_LEN {
            return None;
        }
        let channel = |index: usize| {
            let offset = TIMESTAMP_LEN + index * 4;
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&frame[offset..offset + 4]);
            f32::from_le_bytes(raw)
        };
        Some(Self::new(
            channel(0),
            channel(1),
            channel(2),
            channel(3),
            channel(4),
            channel(5),
        ))
    }
}

/// Timestamp of a frame, if it is long enough to carry one.
pub fn frame_timestamp(frame: &[u8]) -> Option<u32> {
    let raw: [u8; TIMESTAMP_LEN] = frame.get(..TIMESTAMP_LEN)?.try_into().ok()?;
    Some(u32::from_le_bytes(raw))
}

/// Encode a sample as a `sensor/data` frame.
pub fn encode_frame(timestamp_ms: u32, sample: &Sample) -> [u8; FRAME_LEN] {
    let mut frame = [0u8; FRAME_LEN];
    frame[..TIMESTAMP_LEN].copy_from_slice(&timestamp_ms.to_le_bytes());
    for (index, value) in sample.channels().iter().enumerate() {
        let offset = TIMESTAMP_LEN + index * 4;
        frame[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    frame
}

/// Source of motion samples.
///
/// Implementations own their bus (I2C, SPI) and must synchronize
/// internally; `read` is only ever called from the feed's own context.
pub trait MotionSensor: Sync {
    /// Read one sample, or `None` if the device did not answer.
    fn read(&self) -> Option<Sample>;
}

/// Periodic publisher of sensor frames
pub struct SensorFeed<S: MotionSensor> {
    sensor: S,
    bus: Option<&'static MessageBus>,
    services: Option<&'static dyn Services>,
    initialized: AtomicBool,
    capturing: AtomicBool,
}

impl<S: MotionSensor> SensorFeed<S> {
    pub const NAME: &'static str = "SensorFeed";

    pub const fn new(sensor: S) -> Self {
        Self {
            sensor,
            bus: None,
            services: None,
            initialized: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        }
    }

    /// Begin publishing a frame on every update
    pub fn start_capture(&self) {
        if !self.capturing.swap(true, Ordering::AcqRel) {
            log::info!("[{}] Capture started", Self::NAME);
        }
    }

    pub fn stop_capture(&self) {
        if self.capturing.swap(false, Ordering::AcqRel) {
            log::info!("[{}] Capture stopped", Self::NAME);
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::Acquire)
    }
}

impl<S: MotionSensor> Module for SensorFeed<S> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn period_ms(&self) -> u32 {
        SENSOR_PERIOD_MS
    }

    fn bind(&mut self, bus: &'static MessageBus, services: &'static dyn Services) {
        self.bus = Some(bus);
        self.services = Some(services);
    }

    fn setup(&'static self) -> bool {
        if self.bus.is_none() || self.services.is_none() {
            log::error!("[{}] ERROR: Missing collaborators", Self::NAME);
            return false;
        }
        if self.initialized.swap(true, Ordering::AcqRel) {
            log::error!("[{}] Setup called twice", Self::NAME);
            return false;
        }
        // Publisher only: nothing to subscribe to.
        log::info!("[{}] Setup complete", Self::NAME);
        true
    }

    fn update(&self) {
        if !self.initialized.load(Ordering::Acquire) || !self.is_capturing() {
            return;
        }
        let (Some(bus), Some(services)) = (self.bus, self.services) else {
            return;
        };

        match self.sensor.read() {
            Some(sample) => {
                let frame = encode_frame(services.uptime_ms(), &sample);
                bus.publish(topics::SENSOR_DATA, &frame);
            }
            None => log::debug!("[{}] Sensor read failed", Self::NAME),
        }
    }

    fn teardown(&self) {
        self.capturing.store(false, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
    }
}
