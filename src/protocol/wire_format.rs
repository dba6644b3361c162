//! Arbitration field encoding and decoding.
//!
//! Implements the 29-bit extended identifier layout:
//! ```text
//! ┌──────┬───────┬──────────┬──────────┬──────────┐
//! │ Mode │ Addr1 │ Addr2    │ Reserved │ Sender   │
//! │ 2 bit│ 3 bit │ 8 bits   │ 8 bits   │ 8 bits   │
//! │28..27│26..24 │ 23..16   │ 15..8    │ 7..0     │
//! └──────┴───────┴──────────┴──────────┴──────────┘
//! ```
//!
//! In TA modes `addr1`/`addr2` are the main/sub topic; in PA mode they are
//! the command and the target physical address. The reserved byte is written
//! as zero and ignored on decode.
//!
//! CAN arbitration favours numerically smaller identifiers, so the mode
//! values are ordered `HighTa < MediumTa < Pa < LowTa`.

use std::fmt;

use crate::error::{Result, SibError};

/// Largest value representable in a 29-bit extended identifier.
pub const MAX_ARBITRATION_ID: u32 = 0x1FFF_FFFF;

/// Maximum classic CAN payload.
pub const MAX_PAYLOAD_SIZE: usize = 8;

/// Bit offset of the mode field.
pub const MODE_SHIFT: u32 = 27;
/// Bit offset of addr1 (main topic / command).
pub const ADDR1_SHIFT: u32 = 24;
/// Bit offset of addr2 (sub topic / target PA).
pub const ADDR2_SHIFT: u32 = 16;

const MODE_MASK: u32 = 0b11;
const ADDR1_MASK: u32 = 0b111;
const BYTE_MASK: u32 = 0xFF;

/// Addressing mode, doubling as frame priority for topic frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mode {
    /// Topic address, high priority (`0b00`).
    HighTa,
    /// Topic address, medium priority (`0b01`).
    MediumTa,
    /// Physical address / device control (`0b10`).
    Pa,
    /// Topic address, low priority (`0b11`).
    LowTa,
}

impl Mode {
    /// Decode the 2-bit mode field. All four values are assigned.
    #[inline]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Mode::HighTa,
            0b01 => Mode::MediumTa,
            0b10 => Mode::Pa,
            _ => Mode::LowTa,
        }
    }

    /// The 2-bit wire value.
    #[inline]
    pub fn bits(self) -> u8 {
        match self {
            Mode::HighTa => 0b00,
            Mode::MediumTa => 0b01,
            Mode::Pa => 0b10,
            Mode::LowTa => 0b11,
        }
    }

    /// Check if this is one of the topic-addressed modes.
    #[inline]
    pub fn is_topic(self) -> bool {
        !matches!(self, Mode::Pa)
    }

    /// Priority tier for topic modes, `None` for PA mode.
    #[inline]
    pub fn priority(self) -> Option<Priority> {
        match self {
            Mode::HighTa => Some(Priority::High),
            Mode::MediumTa => Some(Priority::Medium),
            Mode::LowTa => Some(Priority::Low),
            Mode::Pa => None,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::HighTa => "HighTA",
            Mode::MediumTa => "MediumTA",
            Mode::Pa => "PA",
            Mode::LowTa => "LowTA",
        };
        f.write_str(name)
    }
}

/// Priority of a topic-addressed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    /// Topic mode carrying this priority on the wire.
    #[inline]
    pub fn mode(self) -> Mode {
        match self {
            Priority::High => Mode::HighTa,
            Priority::Medium => Mode::MediumTa,
            Priority::Low => Mode::LowTa,
        }
    }
}

/// PA-mode command (3 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(u8);

impl Command {
    /// Device-info query / announcement.
    pub const DEVICE_INFO: Command = Command(0x00);

    /// Create a command. Values above 7 are rejected.
    pub fn new(raw: u8) -> Result<Self> {
        if raw as u32 > ADDR1_MASK {
            return Err(SibError::InvalidCommand(raw));
        }
        Ok(Self(raw))
    }

    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Check if this is the device-info command.
    #[inline]
    pub fn is_device_info(self) -> bool {
        self == Self::DEVICE_INFO
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}

/// Decoded arbitration fields, before interpretation by mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArbitrationId {
    /// Addressing mode.
    pub mode: Mode,
    /// Main topic or command (3 bits).
    pub addr1: u8,
    /// Sub topic or target PA.
    pub addr2: u8,
    /// Physical address of the sending device.
    pub sender: u8,
}

impl ArbitrationId {
    /// Pack into the 29-bit identifier. `addr1` is masked to 3 bits.
    #[inline]
    pub fn encode(&self) -> u32 {
        ((self.mode.bits() as u32) << MODE_SHIFT)
            | ((self.addr1 as u32 & ADDR1_MASK) << ADDR1_SHIFT)
            | ((self.addr2 as u32) << ADDR2_SHIFT)
            | self.sender as u32
    }

    /// Unpack a 29-bit identifier. Reserved bits 15..8 are ignored.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the value has bits set above bit 28.
    pub fn decode(id: u32) -> Result<Self> {
        if id > MAX_ARBITRATION_ID {
            return Err(SibError::MalformedFrame(format!(
                "arbitration id {:#x} exceeds 29 bits",
                id
            )));
        }
        Ok(Self {
            mode: Mode::from_bits(((id >> MODE_SHIFT) & MODE_MASK) as u8),
            addr1: ((id >> ADDR1_SHIFT) & ADDR1_MASK) as u8,
            addr2: ((id >> ADDR2_SHIFT) & BYTE_MASK) as u8,
            sender: (id & BYTE_MASK) as u8,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_bits_roundtrip() {
        for bits in 0..4u8 {
            assert_eq!(Mode::from_bits(bits).bits(), bits);
        }
        assert_eq!(Mode::Pa.bits(), 0b10);
    }

    #[test]
    fn test_mode_priority() {
        assert_eq!(Mode::HighTa.priority(), Some(Priority::High));
        assert_eq!(Mode::Pa.priority(), None);
        assert!(Mode::LowTa.is_topic());
        assert!(!Mode::Pa.is_topic());
        assert_eq!(Priority::Medium.mode(), Mode::MediumTa);
    }

    #[test]
    fn test_field_positions() {
        let id = ArbitrationId {
            mode: Mode::Pa,
            addr1: 0b101,
            addr2: 0xAB,
            sender: 0xCD,
        }
        .encode();

        assert_eq!(id >> 27, 0b10);
        assert_eq!((id >> 24) & 0b111, 0b101);
        assert_eq!((id >> 16) & 0xFF, 0xAB);
        assert_eq!((id >> 8) & 0xFF, 0, "reserved byte must be zero");
        assert_eq!(id & 0xFF, 0xCD);
        assert!(id <= MAX_ARBITRATION_ID);
    }

    #[test]
    fn test_decode_ignores_reserved_byte() {
        let clean = ArbitrationId::decode(0x0A0C_0032).unwrap();
        let noisy = ArbitrationId::decode(0x0A0C_FF32).unwrap();
        assert_eq!(clean, noisy);
    }

    #[test]
    fn test_decode_rejects_wide_id() {
        let result = ArbitrationId::decode(0x2000_0000);
        assert!(matches!(result, Err(SibError::MalformedFrame(_))));
    }

    #[test]
    fn test_command_range() {
        assert!(Command::new(7).is_ok());
        assert!(matches!(Command::new(8), Err(SibError::InvalidCommand(8))));
        assert!(Command::DEVICE_INFO.is_device_info());
        assert_eq!(Command::new(3).unwrap().to_string(), "0x03");
    }
}
