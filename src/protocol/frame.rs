//! Frame struct with typed accessors.
//!
//! A [`Frame`] is the decoded unit of the protocol: addressing mode, the two
//! address fields, the sender PA and up to 8 payload bytes. Frames are built
//! with [`Frame::for_topic`] or [`Frame::for_physical_address`], or obtained
//! from the wire with [`Frame::decode`]. Fields are private so every frame
//! in circulation satisfies the layout invariants.
//!
//! # Example
//!
//! ```
//! use sib_client::protocol::{Frame, Priority, TopicAddress};
//! use bytes::Bytes;
//!
//! let topic = TopicAddress::new(3, 12).unwrap();
//! let frame = Frame::for_topic(Priority::High, topic, 0x72, Bytes::from_static(b"\x15"));
//!
//! let (id, payload) = frame.encode().unwrap();
//! assert_eq!(Frame::decode(id, &payload).unwrap(), frame);
//! ```

use std::fmt;

use bytes::Bytes;

use super::address::TopicAddress;
use super::wire_format::{ArbitrationId, Command, Mode, Priority, MAX_PAYLOAD_SIZE};
use crate::error::{Result, SibError};

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    mode: Mode,
    addr1: u8,
    addr2: u8,
    sender: u8,
    payload: Bytes,
}

impl Frame {
    /// Build a topic-addressed frame at the given priority.
    pub fn for_topic(priority: Priority, topic: TopicAddress, sender: u8, payload: Bytes) -> Self {
        Self {
            mode: priority.mode(),
            addr1: topic.main(),
            addr2: topic.sub(),
            sender,
            payload,
        }
    }

    /// Build a device-control frame addressed to `target`.
    pub fn for_physical_address(command: Command, target: u8, sender: u8, payload: Bytes) -> Self {
        Self {
            mode: Mode::Pa,
            addr1: command.value(),
            addr2: target,
            sender,
            payload,
        }
    }

    /// Decode a frame from its arbitration id and payload.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the payload exceeds 8 bytes or the id is
    /// wider than 29 bits.
    pub fn decode(id: u32, payload: &[u8]) -> Result<Self> {
        check_payload(payload.len())?;
        let arb = ArbitrationId::decode(id)?;
        Ok(Self {
            mode: arb.mode,
            addr1: arb.addr1,
            addr2: arb.addr2,
            sender: arb.sender,
            payload: Bytes::copy_from_slice(payload),
        })
    }

    /// Decode a frame, taking ownership of an existing payload buffer.
    pub fn decode_bytes(id: u32, payload: Bytes) -> Result<Self> {
        check_payload(payload.len())?;
        let arb = ArbitrationId::decode(id)?;
        Ok(Self {
            mode: arb.mode,
            addr1: arb.addr1,
            addr2: arb.addr2,
            sender: arb.sender,
            payload,
        })
    }

    /// Encode to `(arbitration id, payload)`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFrame` if the payload exceeds 8 bytes. The payload
    /// is never truncated.
    pub fn encode(&self) -> Result<(u32, Bytes)> {
        check_payload(self.payload.len())?;
        Ok((self.arbitration_id(), self.payload.clone()))
    }

    /// The 29-bit arbitration id for this frame.
    #[inline]
    pub fn arbitration_id(&self) -> u32 {
        ArbitrationId {
            mode: self.mode,
            addr1: self.addr1,
            addr2: self.addr2,
            sender: self.sender,
        }
        .encode()
    }

    #[inline]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Main topic (TA modes) or command (PA mode).
    #[inline]
    pub fn addr1(&self) -> u8 {
        self.addr1
    }

    /// Sub topic (TA modes) or target PA (PA mode).
    #[inline]
    pub fn addr2(&self) -> u8 {
        self.addr2
    }

    /// Physical address byte of the sender.
    #[inline]
    pub fn sender(&self) -> u8 {
        self.sender
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Topic address for TA-mode frames.
    pub fn topic(&self) -> Option<TopicAddress> {
        if !self.mode.is_topic() {
            return None;
        }
        TopicAddress::new(self.addr1, self.addr2).ok()
    }

    /// Command for PA-mode frames.
    pub fn command(&self) -> Option<Command> {
        if self.mode != Mode::Pa {
            return None;
        }
        Command::new(self.addr1).ok()
    }

    /// Target PA byte for PA-mode frames.
    #[inline]
    pub fn target(&self) -> Option<u8> {
        (self.mode == Mode::Pa).then_some(self.addr2)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mode.is_topic() {
            write!(
                f,
                "Frame(mode={}, topic={}/{}, sender={:#04x}, data={:02x?})",
                self.mode, self.addr1, self.addr2, self.sender, &self.payload[..]
            )
        } else {
            write!(
                f,
                "Frame(mode={}, command={:#04x}, target={:#04x}, sender={:#04x}, data={:02x?})",
                self.mode, self.addr1, self.addr2, self.sender, &self.payload[..]
            )
        }
    }
}

fn check_payload(len: usize) -> Result<()> {
    if len > MAX_PAYLOAD_SIZE {
        return Err(SibError::MalformedFrame(format!(
            "payload of {} bytes exceeds maximum {}",
            len, MAX_PAYLOAD_SIZE
        )));
    }
    Ok(())
}

/// Encode a frame (standalone function).
#[inline]
pub fn encode_frame(frame: &Frame) -> Result<(u32, Bytes)> {
    frame.encode()
}

/// Decode a frame (standalone function).
#[inline]
pub fn decode_frame(id: u32, payload: &[u8]) -> Result<Frame> {
    Frame::decode(id, payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(main: u8, sub: u8) -> TopicAddress {
        TopicAddress::new(main, sub).unwrap()
    }

    #[test]
    fn test_roundtrip_boundaries() {
        let payloads: [&[u8]; 2] = [b"", b"\x00\x01\x02\x03\x04\x05\x06\x07"];
        for priority in [Priority::High, Priority::Medium, Priority::Low] {
            for (main, sub) in [(0, 0), (7, 255), (0, 255), (7, 0)] {
                for sender in [0u8, 255] {
                    for payload in payloads {
                        let frame = Frame::for_topic(
                            priority,
                            topic(main, sub),
                            sender,
                            Bytes::copy_from_slice(payload),
                        );
                        let (id, data) = frame.encode().unwrap();
                        assert_eq!(Frame::decode(id, &data).unwrap(), frame);
                    }
                }
            }
        }
    }

    #[test]
    fn test_roundtrip_physical_address() {
        for command in 0..=7u8 {
            let frame = Frame::for_physical_address(
                Command::new(command).unwrap(),
                0xFF,
                0x00,
                Bytes::from_static(b"\x04\x01\x01ABCDE"),
            );
            let (id, data) = frame.encode().unwrap();
            let decoded = Frame::decode(id, &data).unwrap();
            assert_eq!(decoded, frame);
            assert_eq!(decoded.command().unwrap().value(), command);
            assert_eq!(decoded.target(), Some(0xFF));
        }
    }

    #[test]
    fn test_priority_ordering() {
        let t = topic(3, 12);
        let id = |p| Frame::for_topic(p, t, 0x72, Bytes::new()).arbitration_id();

        assert!(id(Priority::High) < id(Priority::Medium));
        assert!(id(Priority::Medium) < id(Priority::Low));
    }

    #[test]
    fn test_encode_rejects_long_payload() {
        let frame = Frame::for_topic(
            Priority::Low,
            topic(1, 1),
            1,
            Bytes::from_static(b"123456789"),
        );
        assert!(matches!(frame.encode(), Err(SibError::MalformedFrame(_))));
    }

    #[test]
    fn test_decode_rejects_long_payload() {
        let result = Frame::decode(0, &[0u8; 9]);
        assert!(matches!(result, Err(SibError::MalformedFrame(_))));

        let result = Frame::decode_bytes(0, Bytes::from_static(&[0u8; 9]));
        assert!(matches!(result, Err(SibError::MalformedFrame(_))));
    }

    #[test]
    fn test_accessors_by_mode() {
        let ta = Frame::for_topic(Priority::Medium, topic(3, 12), 9, Bytes::new());
        assert_eq!(ta.topic(), Some(topic(3, 12)));
        assert!(ta.command().is_none());
        assert!(ta.target().is_none());

        let pa = Frame::for_physical_address(Command::DEVICE_INFO, 0x72, 9, Bytes::new());
        assert!(pa.topic().is_none());
        assert_eq!(pa.command(), Some(Command::DEVICE_INFO));
        assert_eq!(pa.target(), Some(0x72));
        assert_eq!(pa.sender(), 9);
    }

    #[test]
    fn test_display() {
        let frame = Frame::for_topic(Priority::High, topic(3, 12), 0x72, Bytes::from_static(b"\x01"));
        assert_eq!(
            frame.to_string(),
            "Frame(mode=HighTA, topic=3/12, sender=0x72, data=[01])"
        );
    }

    #[test]
    fn test_standalone_functions() {
        let frame = Frame::for_topic(Priority::Low, topic(2, 200), 5, Bytes::from_static(b"ab"));
        let (id, data) = encode_frame(&frame).unwrap();
        assert_eq!(decode_frame(id, &data).unwrap(), frame);
    }
}
