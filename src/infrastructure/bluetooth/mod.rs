//! Bluetooth Module
//!
//! Provides the BLE link to the light gun.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                  ConnectionSupervisor                    │
//! │  (connect / watchdog / reconnect, acks out, frames in)   │
//! └─────────────────────┬───────────────────────────────────┘
//!                       │ LinkConnector / PeripheralLink
//!         ┌─────────────┼─────────────┐
//!         │             │             │
//!         ▼             ▼             ▼
//! ┌────────────┐  ┌────────────┐  ┌───────────┐
//! │    Link    │  │ Connection │  │ Protocol  │
//! │            │  │            │  │           │
//! │ - traits   │  │ - scanning │  │ - UUIDs   │
//! │ - errors   │  │ - GATT     │  │ - acks    │
//! │            │  │ (btleplug) │  │ - address │
//! └────────────┘  └────────────┘  └───────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Characteristic UUID, notification enable bytes, ack payloads
//! - [`link`] - Link capability traits and [`link::LinkError`]
//! - [`connection`] - btleplug-backed connector
//! - [`supervisor`] - Connection lifecycle and frame delivery

pub mod connection;
pub mod link;
pub mod protocol;
pub mod supervisor;

pub use connection::{BleConnector, ConnectionConfig};
pub use supervisor::{ConnectionSupervisor, LinkState};
