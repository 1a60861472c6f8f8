//! MPU-6050 six-axis IMU over I2C.

use std::sync::Mutex;

use esp_idf_svc::hal::delay::BLOCK;
use esp_idf_svc::hal::i2c::I2cDriver;

use motionlog::sensor::{MotionSensor, Sample};

const ADDRESS: u8 = 0x68;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;
const REG_ACCEL_XOUT_H: u8 = 0x3B;

/// ±2 g full scale
const ACCEL_LSB_PER_G: f32 = 16384.0;
/// ±250 °/s full scale
const GYRO_LSB_PER_DPS: f32 = 131.0;
const STANDARD_GRAVITY: f32 = 9.80665;

pub struct Mpu6050 {
    i2c: Mutex<I2cDriver<'static>>,
}

impl Mpu6050 {
    /// Wake the device out of sleep and check it answers.
    pub fn new(mut i2c: I2cDriver<'static>) -> anyhow::Result<Self> {
        i2c.write(ADDRESS, &[REG_PWR_MGMT_1, 0x00], BLOCK)?;

        let mut who = [0u8; 1];
        i2c.write_read(ADDRESS, &[REG_WHO_AM_I], &mut who, BLOCK)?;
        log::info!("MPU-6050 found (WHO_AM_I=0x{:02X})", who[0]);

        Ok(Self {
            i2c: Mutex::new(i2c),
        })
    }
}

impl MotionSensor for Mpu6050 {
    /// Acceleration in m/s², angular rate in rad/s.
    fn read(&self) -> Option<Sample> {
        let mut raw = [0u8; 14];
        {
            let mut i2c = self.i2c.lock().ok()?;
            i2c.write_read(ADDRESS, &[REG_ACCEL_XOUT_H], &mut raw, BLOCK)
                .ok()?;
        }

        // accel x,y,z | temperature | gyro x,y,z, big-endian i16 each
        let word = |i: usize| i16::from_be_bytes([raw[i], raw[i + 1]]) as f32;
        let accel = |i: usize| word(i) / ACCEL_LSB_PER_G * STANDARD_GRAVITY;
        let gyro = |i: usize| (word(i) / GYRO_LSB_PER_DPS).to_radians();

        Some(Sample::new(
            accel(0),
            accel(2),
            accel(4),
            gyro(8),
            gyro(10),
            gyro(12),
        ))
    }
}
