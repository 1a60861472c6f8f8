/// Communication layer: bridges the wireless serial link to the bus.
///
/// The peer sends short text commands terminated by `\n` or `\r`; each
/// update cycle reads at most [`MAX_READ_LEN`] bytes and publishes the
/// extracted command on `command`. Connection edges are published on
/// `connected` / `disconnected`, and anything published on `transmit` is
/// written back to the peer.
///
/// Commands are not reassembled across reads: bytes after the first line
/// terminator in a read are discarded, and a read without terminator is
/// taken whole.
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::bus::{MessageBus, Subscriber};
use crate::defaults::{MAX_READ_LEN, TRANSPORT_PERIOD_MS};
use crate::module::{self, Module, Services};
use crate::protocol::{is_printable, topics};

/// Buffer type for one extracted command line
pub type CommandLine = Vec<u8, MAX_READ_LEN>;

/// BLE serial service UUIDs (Nordic UART layout)
pub mod ble_uuids {
    pub const SERVICE: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";
    /// RX characteristic, peer writes commands
    pub const RX_CHAR: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";
    /// TX characteristic, notifications to the peer
    pub const TX_CHAR: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";
}

/// Maximum BLE notification payload (MTU-3)
pub const BLE_MAX_NOTIFY: usize = 20;

/// Byte-stream link to the remote peer (BLE serial, UART, ...).
///
/// Implementations synchronize internally: reads and connection polls come
/// from the bridge's own context, writes may come from any publisher.
pub trait SerialLink: Sync {
    /// Whether a peer is currently attached
    fn is_connected(&self) -> bool;

    /// Read available bytes into `buf` without blocking; returns the count.
    fn read(&self, buf: &mut [u8]) -> usize;

    /// Write `data`; returns the number of bytes accepted.
    fn write(&self, data: &[u8]) -> usize;
}

/// Link state as reported to diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    NotInitialized,
    Connected,
    Disconnected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::NotInitialized => "NOT_INITIALIZED",
            ConnectionStatus::Connected => "CONNECTED",
            ConnectionStatus::Disconnected => "DISCONNECTED",
        }
    }
}

/// Transport adapter module
pub struct BluetoothBridge<L: SerialLink> {
    link: L,
    bus: Option<&'static MessageBus>,
    services: Option<&'static dyn Services>,
    initialized: AtomicBool,
    last_connected: AtomicBool,
}

const SUBSCRIPTIONS: &[&str] = &[topics::TRANSMIT];

impl<L: SerialLink> BluetoothBridge<L> {
    pub const NAME: &'static str = "Bluetooth";

    pub const fn new(link: L) -> Self {
        Self {
            link,
            bus: None,
            services: None,
            initialized: AtomicBool::new(false),
            last_connected: AtomicBool::new(false),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        if !self.initialized.load(Ordering::Acquire) {
            ConnectionStatus::NotInitialized
        } else if self.link.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    /// Send one text line; a trailing newline is added when missing.
    pub fn send_text(&self, text: &str) -> bool {
        if !self.link.is_connected() {
            log::warn!("[{}] send_text: not connected", Self::NAME);
            return false;
        }
        self.write_line(text.as_bytes())
    }

    /// Send raw bytes unchanged.
    pub fn send_bytes(&self, data: &[u8]) -> bool {
        if !self.link.is_connected() {
            log::warn!("[{}] send_bytes: not connected", Self::NAME);
            return false;
        }
        self.write_all(data)
    }

    fn write_line(&self, line: &[u8]) -> bool {
        if !self.write_all(line) {
            return false;
        }
        if line.last() == Some(&b'\n') {
            return true;
        }
        self.write_all(b"\n")
    }

    fn write_all(&self, data: &[u8]) -> bool {
        let written = self.link.write(data);
        if written < data.len() {
            log::warn!(
                "[{}] Short write: {} of {} bytes",
                Self::NAME,
                written,
                data.len()
            );
            return false;
        }
        true
    }

    /// Publish connection edges. Only changes are published.
    fn poll_connection(&self, bus: &MessageBus) {
        let connected = self.link.is_connected();
        if self.last_connected.swap(connected, Ordering::AcqRel) == connected {
            return;
        }

        log::info!(
            "[{}] Connection status changed: {}",
            Self::NAME,
            if connected { "CONNECTED" } else { "DISCONNECTED" }
        );
        if connected {
            bus.publish(topics::CONNECTED, &[1]);
        } else {
            bus.publish(topics::DISCONNECTED, &[0]);
        }
    }

    /// Read one chunk from the link and publish the command it carries.
    fn poll_commands(&self, bus: &MessageBus) {
        let mut buf = [0u8; MAX_READ_LEN];
        let read = self.link.read(&mut buf).min(MAX_READ_LEN);
        if read == 0 {
            return;
        }

        let command = extract_command(&buf[..read]);
        if command.is_empty() {
            log::debug!("[{}] No valid command in {} bytes", Self::NAME, read);
            return;
        }

        log::info!(
            "[{}] Publishing command '{}' ({} bytes)",
            Self::NAME,
            core::str::from_utf8(&command).unwrap_or("<binary>"),
            command.len()
        );
        bus.publish(topics::COMMAND, &command);
    }

    fn on_transmit(&self, data: &[u8]) {
        if data.is_empty() {
            log::debug!("[{}] Transmit: no data to send", Self::NAME);
            return;
        }
        if !self.link.is_connected() {
            log::warn!("[{}] Cannot transmit - not connected", Self::NAME);
            return;
        }

        if is_text_payload(data) {
            self.write_line(data);
        } else {
            self.write_all(data);
        }
    }
}

impl<L: SerialLink + 'static> Subscriber for BluetoothBridge<L> {
    fn on_message(&self, topic: &str, payload: &[u8]) {
        if topic == topics::TRANSMIT {
            self.on_transmit(payload);
        }
    }
}

impl<L: SerialLink + 'static> Module for BluetoothBridge<L> {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn period_ms(&self) -> u32 {
        TRANSPORT_PERIOD_MS
    }

    fn bind(&mut self, bus: &'static MessageBus, services: &'static dyn Services) {
        self.bus = Some(bus);
        self.services = Some(services);
    }

    fn setup(&'static self) -> bool {
        let (Some(bus), Some(_)) = (self.bus, self.services) else {
            log::error!("[{}] ERROR: Missing layer dependencies", Self::NAME);
            return false;
        };
        if self.initialized.load(Ordering::Acquire) {
            log::error!("[{}] Setup called twice", Self::NAME);
            return false;
        }
        if !module::subscribe_all(bus, Self::NAME, SUBSCRIPTIONS, self) {
            return false;
        }

        self.initialized.store(true, Ordering::Release);
        log::info!("[{}] Setup complete", Self::NAME);
        true
    }

    fn update(&self) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        let Some(bus) = self.bus else {
            return;
        };

        self.poll_connection(bus);
        self.poll_commands(bus);
    }

    fn teardown(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus {
            module::unsubscribe_all(bus, Self::NAME, SUBSCRIPTIONS);
        }
        log::info!("[{}] Cleaned up", Self::NAME);
    }
}

// ── Command extraction ─────────────────────────────────────────────────

/// Extract the command carried by one read.
///
/// With a `\n` or `\r` present, the command is the printable bytes before
/// the first terminator. Without one, the whole read is the command,
/// trimmed of surrounding whitespace. An empty result means "no command".
pub fn extract_command(data: &[u8]) -> CommandLine {
    let mut command = CommandLine::new();
    match data.iter().position(|&b| b == b'\n' || b == b'\r') {
        Some(end) => {
            for &byte in data[..end].iter().filter(|&&b| is_printable(b)) {
                // `data` is at most one read long, so this always fits.
                let _ = command.push(byte);
            }
        }
        None => {
            let _ = command.extend_from_slice(trim_whitespace(data));
        }
    }
    command
}

/// Whether `data` should go out as a text line rather than raw bytes.
///
/// Any byte from 0x20 up counts as text, so UTF-8 and DEL pass; only the
/// other control characters mark a payload as binary.
pub fn is_text_payload(data: &[u8]) -> bool {
    data.iter().all(|&b| b >= 0x20 || b == b'\n' || b == b'\r')
}

fn trim_whitespace(data: &[u8]) -> &[u8] {
    let start = data
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(data.len());
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &data[start..end]
}
