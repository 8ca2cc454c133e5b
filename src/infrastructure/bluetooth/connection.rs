//! BLE Connection Module
//!
//! Finds the gun by address, connects and locates the data characteristic.

use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::link::{
    LinkConnector, LinkError, NotificationStream, PeripheralLink,
};
use crate::infrastructure::bluetooth::protocol::{self, ENABLE_NOTIFICATION};
use btleplug::api::{
    BDAddr, Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How often the peripheral list is checked while scanning
const SCAN_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Characteristic carrying frames in and acks out
    pub data_char_uuid: Uuid,
    /// Give up on a connection attempt if the gun is not seen within this time
    pub scan_timeout: Duration,
}

impl ConnectionConfig {
    pub fn from_settings(settings: &Settings) -> Result<Self, LinkError> {
        Ok(Self {
            data_char_uuid: protocol::parse_uuid(&settings.data_characteristic_uuid)?,
            scan_timeout: Duration::from_millis(settings.scan_timeout_ms),
        })
    }
}

/// Connects to the gun through the first Bluetooth adapter.
pub struct BleConnector {
    // Keeps the platform session alive for the adapter
    _manager: Manager,
    adapter: Adapter,
    config: ConnectionConfig,
}

impl BleConnector {
    pub async fn new(config: ConnectionConfig) -> Result<Self, LinkError> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(LinkError::NoAdapter)?;

        match adapter.adapter_info().await {
            Ok(name) => info!("Using Bluetooth adapter {}", name),
            Err(e) => warn!("Could not query adapter info: {}", e),
        }

        if config.data_char_uuid != protocol::DATA_CHAR_UUID {
            info!("Using custom data characteristic {}", config.data_char_uuid);
        }

        Ok(Self {
            _manager: manager,
            adapter,
            config,
        })
    }

    /// Scan until a peripheral with `address` shows up or the scan times out.
    async fn find_peripheral(&self, address: BDAddr) -> Result<Peripheral, LinkError> {
        self.adapter.start_scan(ScanFilter::default()).await?;

        let adapter = &self.adapter;
        let found = poll_then_stop(
            self.config.scan_timeout,
            move || async move {
                let peripherals = adapter.peripherals().await?;
                Ok::<_, LinkError>(peripherals.into_iter().find(|p| p.address() == address))
            },
            move || async move {
                if let Err(e) = adapter.stop_scan().await {
                    warn!("Failed to stop scan: {}", e);
                }
            },
        )
        .await?;

        found.ok_or_else(|| LinkError::DeviceNotFound(address.to_string()))
    }

    async fn data_characteristic(&self, peripheral: &Peripheral) -> Result<Characteristic, LinkError> {
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();
        debug!("Found {} characteristics", characteristics.len());

        characteristics
            .into_iter()
            .find(|c| c.uuid == self.config.data_char_uuid)
            .ok_or(LinkError::CharacteristicNotFound(self.config.data_char_uuid))
    }
}

/// Call `lookup` every [`SCAN_POLL_INTERVAL`] until it finds something or
/// `timeout` passes. `stop` runs once on every exit, including a failed lookup.
async fn poll_then_stop<T, L, LF, S, SF>(
    timeout: Duration,
    mut lookup: L,
    stop: S,
) -> Result<Option<T>, LinkError>
where
    L: FnMut() -> LF,
    LF: Future<Output = Result<Option<T>, LinkError>>,
    S: FnOnce() -> SF,
    SF: Future<Output = ()>,
{
    let deadline = Instant::now() + timeout;
    let result = async {
        loop {
            if let Some(found) = lookup().await? {
                return Ok(Some(found));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(SCAN_POLL_INTERVAL).await;
        }
    }
    .await;

    stop().await;
    result
}

impl LinkConnector for BleConnector {
    type Link = BleLink;

    async fn connect(&self, address: &str) -> Result<BleLink, LinkError> {
        let address = protocol::parse_address(address)?;
        info!("Connecting to light gun {}", address);

        // Step 1: Find the gun
        let peripheral = self.find_peripheral(address).await?;

        // Step 2: Connect
        peripheral.connect().await?;
        info!("Device connected: {}", address);

        // Step 3: Locate the data characteristic
        let characteristic = match self.data_characteristic(&peripheral).await {
            Ok(c) => c,
            Err(e) => {
                if let Err(disconnect_err) = peripheral.disconnect().await {
                    warn!("Disconnect after failed setup: {}", disconnect_err);
                }
                return Err(e);
            }
        };

        let write_type = if characteristic
            .properties
            .contains(CharPropFlags::WRITE_WITHOUT_RESPONSE)
        {
            WriteType::WithoutResponse
        } else {
            WriteType::WithResponse
        };
        info!("Found data characteristic {}", characteristic.uuid);

        Ok(BleLink {
            peripheral,
            characteristic,
            write_type,
        })
    }
}

pub struct BleLink {
    peripheral: Peripheral,
    characteristic: Characteristic,
    write_type: WriteType,
}

impl PeripheralLink for BleLink {
    async fn enable_notifications(&mut self) -> Result<NotificationStream, LinkError> {
        info!("Enabling notifications...");

        // Open the stream before subscribing so no early frame is missed
        let uuid = self.characteristic.uuid;
        let notifications = self.peripheral.notifications().await?;

        self.peripheral
            .write(&self.characteristic, &ENABLE_NOTIFICATION, self.write_type)
            .await?;
        self.peripheral.subscribe(&self.characteristic).await?;
        info!("Notifications enabled successfully");

        let stream = notifications
            .filter_map(move |n| async move { (n.uuid == uuid).then_some(n.value) });
        Ok(Box::pin(stream))
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.peripheral
            .write(&self.characteristic, payload, self.write_type)
            .await?;
        Ok(())
    }

    async fn close(self) {
        if let Err(e) = self.peripheral.unsubscribe(&self.characteristic).await {
            warn!("Unsubscribe failed: {}", e);
        }
        if let Err(e) = self.peripheral.disconnect().await {
            warn!("Disconnect failed: {}", e);
        }
        info!("Link closed");
    }
}
