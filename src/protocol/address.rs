//! Physical and topic addresses.
//!
//! A [`PhysicalAddress`] identifies one device on the bus and packs into a
//! single byte:
//! ```text
//! ┌────────┬──────────────┐
//! │ Line   │ Device       │
//! │ 2 bits │ 6 bits       │
//! │ a..d   │ 0..63        │
//! └────────┴──────────────┘
//! ```
//!
//! A [`TopicAddress`] names a logical subject (main group + sub channel) and is
//! only carried by TA-mode frames.
//!
//! # Example
//!
//! ```
//! use sib_client::protocol::{PhysicalAddress, TopicAddress};
//!
//! let pa = PhysicalAddress::new('b', 50).unwrap();
//! assert_eq!(pa.to_byte(), (1 << 6) | 50);
//! assert_eq!(pa.to_string(), "b50");
//!
//! let ta = TopicAddress::new(3, 12).unwrap();
//! assert_eq!(ta.to_raw(), 0x30C);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SibError};

/// Highest device number on a line.
pub const MAX_DEVICE: u8 = 63;

/// Highest main-topic number (3 bits).
pub const MAX_MAIN_TOPIC: u8 = 7;

/// Highest packed topic value (`main << 8 | sub`, 11 bits).
pub const MAX_RAW_TOPIC: u16 = 0x7FF;

/// Bus line a device is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Line {
    A,
    B,
    C,
    D,
}

impl Line {
    /// Two-bit line index (a = 0 .. d = 3).
    #[inline]
    pub fn index(self) -> u8 {
        match self {
            Line::A => 0,
            Line::B => 1,
            Line::C => 2,
            Line::D => 3,
        }
    }

    /// Line for a two-bit index. Only the low two bits are used.
    #[inline]
    pub fn from_index(index: u8) -> Self {
        match index & 0b11 {
            0 => Line::A,
            1 => Line::B,
            2 => Line::C,
            _ => Line::D,
        }
    }

    /// Lower-case letter for this line.
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            Line::A => 'a',
            Line::B => 'b',
            Line::C => 'c',
            Line::D => 'd',
        }
    }
}

impl TryFrom<char> for Line {
    type Error = SibError;

    fn try_from(c: char) -> Result<Self> {
        match c.to_ascii_lowercase() {
            'a' => Ok(Line::A),
            'b' => Ok(Line::B),
            'c' => Ok(Line::C),
            'd' => Ok(Line::D),
            other => Err(SibError::InvalidAddress(format!(
                "line '{}' is outside a-d",
                other
            ))),
        }
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Unique address of a device on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhysicalAddress {
    line: Line,
    device: u8,
}

impl PhysicalAddress {
    /// Create an address from a line letter (`a`..`d`) and device number (0-63).
    pub fn new(line: char, device: u8) -> Result<Self> {
        Self::from_parts(Line::try_from(line)?, device)
    }

    /// Create an address from a typed line and device number (0-63).
    pub fn from_parts(line: Line, device: u8) -> Result<Self> {
        if device > MAX_DEVICE {
            return Err(SibError::InvalidAddress(format!(
                "device {} is outside 0-{}",
                device, MAX_DEVICE
            )));
        }
        Ok(Self { line, device })
    }

    /// Decode the packed byte form. Every byte is a valid address.
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            line: Line::from_index(byte >> 6),
            device: byte & MAX_DEVICE,
        }
    }

    /// Packed byte form: `(line_index << 6) | device`.
    #[inline]
    pub fn to_byte(self) -> u8 {
        (self.line.index() << 6) | self.device
    }

    #[inline]
    pub fn line(self) -> Line {
        self.line
    }

    #[inline]
    pub fn device(self) -> u8 {
        self.device
    }
}

impl fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.line, self.device)
    }
}

/// Parses `b50`, `b.50`, `B:50` or `b 50`.
impl FromStr for PhysicalAddress {
    type Err = SibError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut chars = s.chars();
        let line = chars
            .next()
            .ok_or_else(|| SibError::InvalidAddress("empty physical address".to_string()))?;
        let rest = chars
            .as_str()
            .trim_start_matches(|c: char| c == '.' || c == ':' || c.is_whitespace());
        let device: u8 = rest.parse().map_err(|_| {
            SibError::InvalidAddress(format!("'{}' is not a physical address", s))
        })?;
        Self::new(line, device)
    }
}

impl TryFrom<String> for PhysicalAddress {
    type Error = SibError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PhysicalAddress> for String {
    fn from(pa: PhysicalAddress) -> Self {
        pa.to_string()
    }
}

impl From<PhysicalAddress> for u8 {
    fn from(pa: PhysicalAddress) -> Self {
        pa.to_byte()
    }
}

/// Logical subject address used by TA-mode frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicAddress {
    main: u8,
    sub: u8,
}

impl TopicAddress {
    /// Create a topic address. `main` must be 0-7.
    pub fn new(main: u8, sub: u8) -> Result<Self> {
        if main > MAX_MAIN_TOPIC {
            return Err(SibError::InvalidAddress(format!(
                "main topic {} is outside 0-{}",
                main, MAX_MAIN_TOPIC
            )));
        }
        Ok(Self { main, sub })
    }

    /// Create from the packed 11-bit form `(main << 8) | sub`.
    pub fn from_raw(raw: u16) -> Result<Self> {
        if raw > MAX_RAW_TOPIC {
            return Err(SibError::InvalidAddress(format!(
                "topic {:#x} does not fit in 11 bits",
                raw
            )));
        }
        Self::new((raw >> 8) as u8, raw as u8)
    }

    /// Packed 11-bit form `(main << 8) | sub`.
    #[inline]
    pub fn to_raw(self) -> u16 {
        ((self.main as u16) << 8) | self.sub as u16
    }

    #[inline]
    pub fn main(self) -> u8 {
        self.main
    }

    #[inline]
    pub fn sub(self) -> u8 {
        self.sub
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main, self.sub)
    }
}
