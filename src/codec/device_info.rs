//! Device-info payload codec.
//!
//! The payload of a device-info frame (announcement or query answer) is
//! exactly one CAN payload:
//! ```text
//! ┌──────┬──────┬──────┬────────────────────┐
//! │ Type │ HW   │ SW   │ Short identifier   │
//! │ 1 B  │ 1 B  │ 1 B  │ 5 bytes            │
//! └──────┴──────┴──────┴────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use sib_client::codec::{DeviceInfo, DeviceType, ShortIdentifier};
//!
//! let info = DeviceInfo::new(DeviceType::Debugging, 1, 1, ShortIdentifier::from_str("ABCDE").unwrap());
//! assert_eq!(&info.encode(), b"\x04\x01\x01ABCDE");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SibError};

/// Length of a short identifier in bytes.
pub const SHORT_IDENTIFIER_LEN: usize = 5;

/// Length of an encoded device-info payload.
pub const DEVICE_INFO_LEN: usize = 3 + SHORT_IDENTIFIER_LEN;

/// Kind of device announcing itself on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Generic,
    Controller,
    Sensor,
    Actuator,
    Debugging,
}

impl DeviceType {
    /// Wire value.
    #[inline]
    pub fn code(self) -> u8 {
        match self {
            DeviceType::Generic => 0,
            DeviceType::Controller => 1,
            DeviceType::Sensor => 2,
            DeviceType::Actuator => 3,
            DeviceType::Debugging => 4,
        }
    }
}

impl TryFrom<u8> for DeviceType {
    type Error = SibError;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(DeviceType::Generic),
            1 => Ok(DeviceType::Controller),
            2 => Ok(DeviceType::Sensor),
            3 => Ok(DeviceType::Actuator),
            4 => Ok(DeviceType::Debugging),
            other => Err(SibError::UnknownDeviceType(other)),
        }
    }
}

/// Five-byte device identifier carried in announcements.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortIdentifier([u8; SHORT_IDENTIFIER_LEN]);

impl ShortIdentifier {
    /// Create from raw bytes. Must be exactly 5 bytes.
    pub fn new(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SHORT_IDENTIFIER_LEN] = bytes
            .try_into()
            .map_err(|_| SibError::InvalidIdentifier(bytes.len()))?;
        Ok(Self(arr))
    }

    /// Create from text. Must be exactly 5 bytes once UTF-8 encoded.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self> {
        Self::new(s.as_bytes())
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SHORT_IDENTIFIER_LEN] {
        &self.0
    }
}

impl fmt::Debug for ShortIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortIdentifier({})", self)
    }
}

impl fmt::Display for ShortIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

/// Identity and revision information a device announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceInfo {
    pub device_type: DeviceType,
    pub hw_revision: u8,
    pub sw_revision: u8,
    pub short_identifier: ShortIdentifier,
}

impl DeviceInfo {
    /// Create device info. Revisions wider than a byte keep their low 8 bits.
    pub fn new(
        device_type: DeviceType,
        hw_revision: u32,
        sw_revision: u32,
        short_identifier: ShortIdentifier,
    ) -> Self {
        Self {
            device_type,
            hw_revision: hw_revision as u8,
            sw_revision: sw_revision as u8,
            short_identifier,
        }
    }

    /// Encode to the 8-byte payload.
    pub fn encode(&self) -> [u8; DEVICE_INFO_LEN] {
        let mut buf = [0u8; DEVICE_INFO_LEN];
        buf[0] = self.device_type.code();
        buf[1] = self.hw_revision;
        buf[2] = self.sw_revision;
        buf[3..].copy_from_slice(self.short_identifier.as_bytes());
        buf
    }

    /// Decode an 8-byte payload.
    ///
    /// # Errors
    ///
    /// `MalformedFrame` if the payload is not exactly 8 bytes,
    /// `UnknownDeviceType` if the type byte is not in the table.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != DEVICE_INFO_LEN {
            return Err(SibError::MalformedFrame(format!(
                "device info needs {} bytes, got {}",
                DEVICE_INFO_LEN,
                payload.len()
            )));
        }
        Ok(Self {
            device_type: DeviceType::try_from(payload[0])?,
            hw_revision: payload[1],
            sw_revision: payload[2],
            short_identifier: ShortIdentifier::new(&payload[3..])?,
        })
    }
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} '{}' (hw {}, sw {})",
            self.device_type, self.short_identifier, self.hw_revision, self.sw_revision
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_example_identity() {
        let info = DeviceInfo::new(
            DeviceType::Debugging,
            1,
            1,
            ShortIdentifier::from_str("ABCDE").unwrap(),
        );
        assert_eq!(info.encode(), [0x04, 0x01, 0x01, b'A', b'B', b'C', b'D', b'E']);
    }

    #[test]
    fn test_revisions_truncated() {
        let info = DeviceInfo::new(
            DeviceType::Sensor,
            0x1_02,
            0xABCD,
            ShortIdentifier::new(b"12345").unwrap(),
        );
        assert_eq!(info.hw_revision, 0x02);
        assert_eq!(info.sw_revision, 0xCD);
    }

    #[test]
    fn test_short_identifier_length() {
        assert!(matches!(
            ShortIdentifier::from_str("ABCD"),
            Err(SibError::InvalidIdentifier(4))
        ));
        assert!(matches!(
            ShortIdentifier::new(b"ABCDEF"),
            Err(SibError::InvalidIdentifier(6))
        ));
        assert_eq!(ShortIdentifier::from_str("ABCDE").unwrap().to_string(), "ABCDE");
    }

    #[test]
    fn test_decode() {
        let info = DeviceInfo::decode(b"\x02\x07\x09node1").unwrap();
        assert_eq!(info.device_type, DeviceType::Sensor);
        assert_eq!(info.hw_revision, 7);
        assert_eq!(info.sw_revision, 9);
        assert_eq!(info.short_identifier.as_bytes(), b"node1");
    }

    #[test]
    fn test_decode_rejects_bad_payloads() {
        assert!(matches!(
            DeviceInfo::decode(b"\x02\x07"),
            Err(SibError::MalformedFrame(_))
        ));
        assert!(matches!(
            DeviceInfo::decode(b"\x09\x07\x09node1"),
            Err(SibError::UnknownDeviceType(9))
        ));
    }

    #[test]
    fn test_device_type_codes() {
        for code in 0..=4u8 {
            assert_eq!(DeviceType::try_from(code).unwrap().code(), code);
        }
        assert!(DeviceType::try_from(5).is_err());
    }
}
