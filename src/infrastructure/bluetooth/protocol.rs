//! Light Gun Wire Protocol
//!
//! The gun exposes a single serial-style characteristic. It notifies
//! `;`-terminated ASCII frames and accepts one-byte acknowledgements on the
//! same characteristic.

use crate::domain::models::Ack;
use crate::infrastructure::bluetooth::link::LinkError;
use btleplug::api::BDAddr;
use uuid::Uuid;

/// HM-10 style serial characteristic carrying frames in and acks out
pub const DATA_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ffe1_0000_1000_8000_00805f9b34fb);

/// Written to the data characteristic before subscribing; the gun starts
/// streaming frames once it sees it.
pub const ENABLE_NOTIFICATION: [u8; 2] = 0x0001u16.to_le_bytes();

/// Bytes written to the data characteristic for `ack`
pub fn ack_payload(ack: Ack) -> [u8; 1] {
    [ack.as_byte()]
}

pub fn parse_uuid(uuid_str: &str) -> Result<Uuid, LinkError> {
    Uuid::parse_str(uuid_str).map_err(|_| LinkError::InvalidUuid(uuid_str.to_string()))
}

pub fn parse_address(address: &str) -> Result<BDAddr, LinkError> {
    address
        .parse::<BDAddr>()
        .map_err(|_| LinkError::InvalidAddress(address.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid() {
        let uuid = parse_uuid("0000ffe1-0000-1000-8000-00805f9b34fb").unwrap();
        assert_eq!(uuid, DATA_CHAR_UUID);
        assert!(matches!(
            parse_uuid("ffe1"),
            Err(LinkError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_parse_address() {
        let addr = parse_address("3C:A5:08:0A:62:A9").unwrap();
        assert_eq!(addr.into_inner(), [0x3C, 0xA5, 0x08, 0x0A, 0x62, 0xA9]);
        assert!(matches!(
            parse_address("not-an-address"),
            Err(LinkError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_enable_notification_is_little_endian() {
        assert_eq!(ENABLE_NOTIFICATION, [0x01, 0x00]);
    }

    #[test]
    fn test_ack_payload() {
        assert_eq!(ack_payload(Ack::Initialized), *b"Z");
        assert_eq!(ack_payload(Ack::Stabilized), *b"Y");
        assert_eq!(ack_payload(Ack::Calibrated), *b"X");
    }
}
