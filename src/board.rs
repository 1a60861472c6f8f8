/// Hardware abstraction for supported boards.
///
/// Each board module defines pin assignments and capabilities
/// selected at compile time via feature flags.

#[cfg(feature = "board-esp32cam")]
mod hw {
    pub const LED_PIN: u8 = 2;
    pub const I2C_SDA_PIN: u8 = 14;
    pub const I2C_SCL_PIN: u8 = 15;
    pub const I2C_FREQ_HZ: u32 = 400_000;
    pub const DISABLE_BROWNOUT: bool = true;
    pub const BLE_NAME: &str = "ESP32-CAM-TAF";
    pub const BOARD_NAME: &str = "esp32cam";
}

#[cfg(all(feature = "board-devkit", not(feature = "board-esp32cam")))]
mod hw {
    pub const LED_PIN: u8 = 2;
    pub const I2C_SDA_PIN: u8 = 21;
    pub const I2C_SCL_PIN: u8 = 22;
    pub const I2C_FREQ_HZ: u32 = 400_000;
    pub const DISABLE_BROWNOUT: bool = false;
    pub const BLE_NAME: &str = "MotionLog";
    pub const BOARD_NAME: &str = "esp32_devkit";
}

#[cfg(not(any(feature = "board-esp32cam", feature = "board-devkit")))]
mod hw {
    pub const BLE_NAME: &str = "MotionLog";
    pub const BOARD_NAME: &str = "unknown";
}

pub use hw::*;
