//! MotionLog library — portable motion-recorder core.
//!
//! A phone connects over a BLE serial link, sends `START`, `STOP` or `DATA`,
//! and receives the captured six-axis motion samples back as CSV. This crate
//! holds everything above the radio and the sensor registers: the
//! publish/subscribe [`bus`], the [`module`] lifecycle, the transport bridge
//! ([`comm`]), the sensor feed ([`sensor`]), the recording engine
//! ([`recorder`]) and the status LED ([`indicator`]). It is `no_std` with no
//! allocator and runs its tests on any host with `cargo test`.
//!
//! The platform binary (`firmware-std`) supplies a [`comm::SerialLink`], a
//! [`sensor::MotionSensor`], an output pin and [`module::Services`], then
//! runs each module's `update` on its own thread.

#![cfg_attr(not(test), no_std)]

pub mod board;
pub mod bus;
pub mod comm;
pub mod defaults;
pub mod indicator;
pub mod module;
pub mod protocol;
pub mod recorder;
pub mod sensor;
