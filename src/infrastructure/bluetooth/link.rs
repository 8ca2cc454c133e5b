//! Peripheral link capability
//!
//! The supervisor only sees these traits, so the reconnect loop can be driven
//! by an in-memory link in tests.

use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use uuid::Uuid;

/// Raw notification payloads from the data characteristic, in arrival order.
/// The stream ends when the peripheral disconnects.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("no Bluetooth adapter available")]
    NoAdapter,
    #[error("invalid device address: {0}")]
    InvalidAddress(String),
    #[error("invalid characteristic UUID: {0}")]
    InvalidUuid(String),
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),
    #[error("Bluetooth error: {0}")]
    Ble(#[from] btleplug::Error),
}

/// An open connection to the gun.
pub trait PeripheralLink: Send {
    /// Turn on notifications for the data characteristic.
    fn enable_notifications(
        &mut self,
    ) -> impl Future<Output = Result<NotificationStream, LinkError>> + Send;

    fn write(&mut self, payload: &[u8]) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Unsubscribe and disconnect. Failures are logged, not returned.
    fn close(self) -> impl Future<Output = ()> + Send;
}

pub trait LinkConnector: Send + Sync {
    type Link: PeripheralLink;

    fn connect(&self, address: &str) -> impl Future<Output = Result<Self::Link, LinkError>> + Send;
}
