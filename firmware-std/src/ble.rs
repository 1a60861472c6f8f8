//! BLE serial link on NimBLE.
//!
//! Exposes a Nordic-UART-style service: the peer writes commands to the RX
//! characteristic and receives responses as TX notifications, chunked to
//! [`BLE_MAX_NOTIFY`] bytes.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{BLEAdvertisementData, BLECharacteristic, BLEDevice, NimbleProperties};
use heapless::Deque;

use motionlog::comm::{ble_uuids, SerialLink, BLE_MAX_NOTIFY};

/// Inbound bytes buffered between RX writes and bridge reads
const INBOUND_CAP: usize = 256;

pub struct BleLink {
    clients: AtomicU8,
    inbound: Mutex<Deque<u8, INBOUND_CAP>>,
    tx: Mutex<Option<Arc<NimbleMutex<BLECharacteristic>>>>,
}

impl BleLink {
    pub const fn new() -> Self {
        Self {
            clients: AtomicU8::new(0),
            inbound: Mutex::new(Deque::new()),
            tx: Mutex::new(None),
        }
    }

    /// Create the GATT service and start advertising as `name`.
    pub fn start(&'static self, name: &str) -> anyhow::Result<()> {
        let ble_device = BLEDevice::take();
        let server = ble_device.get_server();

        // NimBLE restarts advertising on disconnect.
        server.on_connect(move |_server, desc| {
            log::info!("BLE client connected: {}", desc.address());
            self.clients.fetch_add(1, Ordering::AcqRel);
        });
        server.on_disconnect(move |desc, _reason| {
            log::info!("BLE client disconnected: {}", desc.address());
            let _ = self
                .clients
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        });

        let service_uuid = BleUuid::from_uuid128_string(ble_uuids::SERVICE)
            .map_err(|e| anyhow!("invalid service UUID: {:?}", e))?;
        let rx_uuid = BleUuid::from_uuid128_string(ble_uuids::RX_CHAR)
            .map_err(|e| anyhow!("invalid RX UUID: {:?}", e))?;
        let tx_uuid = BleUuid::from_uuid128_string(ble_uuids::TX_CHAR)
            .map_err(|e| anyhow!("invalid TX UUID: {:?}", e))?;

        let service = server.create_service(service_uuid);
        let tx_char = service
            .lock()
            .create_characteristic(tx_uuid, NimbleProperties::NOTIFY);
        let rx_char = service.lock().create_characteristic(
            rx_uuid,
            NimbleProperties::WRITE | NimbleProperties::WRITE_NO_RSP,
        );

        rx_char.lock().on_write(move |args| {
            let Ok(mut inbound) = self.inbound.lock() else {
                return;
            };
            for &byte in args.recv_data() {
                if inbound.push_back(byte).is_err() {
                    log::warn!("BLE inbound buffer full, dropping input");
                    break;
                }
            }
        });

        *self.tx.lock().map_err(|_| anyhow!("TX lock poisoned"))? = Some(tx_char);

        let mut adv_data = BLEAdvertisementData::new();
        adv_data.name(name).add_service_uuid(service_uuid);
        ble_device
            .get_advertising()
            .lock()
            .set_data(&mut adv_data)
            .map_err(|e| anyhow!("BLE advertising data failed: {:?}", e))?;
        ble_device
            .get_advertising()
            .lock()
            .start()
            .map_err(|e| anyhow!("BLE advertising start failed: {:?}", e))?;
        log::info!("BLE advertising as '{}'", name);
        Ok(())
    }
}

impl SerialLink for &'static BleLink {
    fn is_connected(&self) -> bool {
        self.clients.load(Ordering::Acquire) > 0
    }

    fn read(&self, buf: &mut [u8]) -> usize {
        let Ok(mut inbound) = self.inbound.lock() else {
            return 0;
        };
        let mut len = 0;
        while len < buf.len() {
            let Some(byte) = inbound.pop_front() else {
                break;
            };
            buf[len] = byte;
            len += 1;
        }
        len
    }

    fn write(&self, data: &[u8]) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let Ok(guard) = self.tx.lock() else {
            return 0;
        };
        let Some(tx_char) = guard.as_ref() else {
            return 0;
        };
        for chunk in data.chunks(BLE_MAX_NOTIFY) {
            tx_char.lock().set_value(chunk).notify();
        }
        data.len()
    }
}
