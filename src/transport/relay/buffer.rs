//! Message buffer for accumulating partial relay reads.
//!
//! socketcand speaks an ASCII protocol where every message is enclosed in
//! angle brackets, e.g. `< frame 1A0C0072 1700000000.000000 0102 >`. TCP
//! delivers these in arbitrary chunks, so bytes are accumulated in a
//! `BytesMut` and complete messages are extracted as they close.
//!
//! # Example
//!
//! ```
//! use sib_client::transport::{RelayBuffer, RelayMessage};
//!
//! let mut buffer = RelayBuffer::new();
//! assert!(buffer.push(b"< h").unwrap().is_empty());
//! assert_eq!(buffer.push(b"i >").unwrap(), vec![RelayMessage::Hi]);
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::{Result, SibError};
use crate::protocol::MAX_PAYLOAD_SIZE;

/// Longest message accepted before the stream is considered corrupt.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// One parsed relay message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    /// Server greeting.
    Hi,
    /// Positive acknowledgement of the last command.
    Ok,
    /// A received CAN frame.
    Frame { arbitration_id: u32, payload: Bytes },
    /// Server-reported error.
    Error(String),
    /// Anything else (echo replies, statistics, ...).
    Other(String),
}

impl RelayMessage {
    /// Parse the text between `<` and `>`.
    pub fn parse(body: &str) -> Result<Self> {
        let mut tokens = body.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Ok(RelayMessage::Other(String::new()));
        };
        match keyword {
            "hi" => Ok(RelayMessage::Hi),
            "ok" => Ok(RelayMessage::Ok),
            "error" => Ok(RelayMessage::Error(tokens.collect::<Vec<_>>().join(" "))),
            "frame" => {
                let id = tokens
                    .next()
                    .ok_or_else(|| malformed(body, "missing identifier"))?;
                let arbitration_id =
                    u32::from_str_radix(id, 16).map_err(|_| malformed(body, "bad identifier"))?;
                // Timestamp is not used.
                let _ = tokens.next();
                let data: String = tokens.collect();
                let payload = parse_hex(&data).ok_or_else(|| malformed(body, "bad data"))?;
                if payload.len() > MAX_PAYLOAD_SIZE {
                    return Err(malformed(body, "payload exceeds 8 bytes"));
                }
                Ok(RelayMessage::Frame {
                    arbitration_id,
                    payload: Bytes::from(payload),
                })
            }
            _ => Ok(RelayMessage::Other(body.trim().to_string())),
        }
    }
}

/// Render a `send` command for one extended frame.
pub fn format_send(arbitration_id: u32, payload: &[u8]) -> String {
    let mut line = format!("< send {:08X} {}", arbitration_id, payload.len());
    for byte in payload {
        line.push_str(&format!(" {:02X}", byte));
    }
    line.push_str(" >");
    line
}

fn parse_hex(data: &str) -> Option<Vec<u8>> {
    if data.len() % 2 != 0 {
        return None;
    }
    (0..data.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(data.get(i..i + 2)?, 16).ok())
        .collect()
}

fn malformed(body: &str, reason: &str) -> SibError {
    SibError::MalformedFrame(format!("relay message '{}': {}", body.trim(), reason))
}

/// Buffer for accumulating incoming bytes and extracting complete messages.
pub struct RelayBuffer {
    buffer: BytesMut,
}

impl RelayBuffer {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Push data into the buffer and extract all complete messages.
    ///
    /// Bytes outside `< ... >` are discarded.
    ///
    /// # Errors
    ///
    /// Returns error if a message grows beyond [`MAX_MESSAGE_SIZE`] without
    /// closing; the buffer is cleared so the caller may resynchronize.
    /// Complete messages that fail to parse are logged and skipped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<RelayMessage>> {
        self.buffer.extend_from_slice(data);

        let mut messages = Vec::new();
        while let Some(body) = self.try_extract_one()? {
            match RelayMessage::parse(&body) {
                Ok(message) => messages.push(message),
                Err(e) => tracing::warn!("Skipping relay message: {}", e),
            }
        }
        Ok(messages)
    }

    fn try_extract_one(&mut self) -> Result<Option<String>> {
        let Some(start) = self.buffer.iter().position(|&b| b == b'<') else {
            self.buffer.clear();
            return Ok(None);
        };
        if start > 0 {
            let _ = self.buffer.split_to(start);
        }

        let Some(end) = self.buffer.iter().position(|&b| b == b'>') else {
            if self.buffer.len() > MAX_MESSAGE_SIZE {
                self.buffer.clear();
                return Err(SibError::MalformedFrame(format!(
                    "relay message exceeds {} bytes",
                    MAX_MESSAGE_SIZE
                )));
            }
            return Ok(None);
        };

        let raw = self.buffer.split_to(end + 1);
        Ok(Some(String::from_utf8_lossy(&raw[1..end]).into_owned()))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for RelayBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame() {
        let msg = RelayMessage::parse(" frame 120C0072 1700000000.123456 0102AB ").unwrap();
        assert_eq!(
            msg,
            RelayMessage::Frame {
                arbitration_id: 0x120C_0072,
                payload: Bytes::from_static(&[0x01, 0x02, 0xAB]),
            }
        );
    }

    #[test]
    fn test_parse_frame_without_data() {
        let msg = RelayMessage::parse(" frame 10000005 1.0 ").unwrap();
        assert_eq!(
            msg,
            RelayMessage::Frame {
                arbitration_id: 0x1000_0005,
                payload: Bytes::new(),
            }
        );
    }

    #[test]
    fn test_parse_frame_with_spaced_data() {
        let msg = RelayMessage::parse(" frame 5 1.0 01 02 ").unwrap();
        assert!(matches!(msg, RelayMessage::Frame { ref payload, .. } if payload.as_ref() == [1, 2]));
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(RelayMessage::parse(" frame ").is_err());
        assert!(RelayMessage::parse(" frame XYZ 1.0 00 ").is_err());
        assert!(RelayMessage::parse(" frame 5 1.0 0 ").is_err());
        assert!(RelayMessage::parse(" frame 5 1.0 000102030405060708 ").is_err());
    }

    #[test]
    fn test_parse_control_messages() {
        assert_eq!(RelayMessage::parse(" hi ").unwrap(), RelayMessage::Hi);
        assert_eq!(RelayMessage::parse(" ok ").unwrap(), RelayMessage::Ok);
        assert_eq!(
            RelayMessage::parse(" error could not open bus ").unwrap(),
            RelayMessage::Error("could not open bus".to_string())
        );
        assert_eq!(
            RelayMessage::parse(" echo ").unwrap(),
            RelayMessage::Other("echo".to_string())
        );
    }

    #[test]
    fn test_format_send() {
        assert_eq!(
            format_send(0x120C_0072, &[0x04, 0x01]),
            "< send 120C0072 2 04 01 >"
        );
        assert_eq!(format_send(0x5, &[]), "< send 00000005 0 >");
    }

    #[test]
    fn test_multiple_messages_in_one_push() {
        let mut buffer = RelayBuffer::new();
        let messages = buffer.push(b"< hi >< ok >< frame 1 0.0 FF >").unwrap();

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0], RelayMessage::Hi);
        assert_eq!(messages[1], RelayMessage::Ok);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = RelayBuffer::new();
        let mut all = Vec::new();
        for byte in b"< frame 10000072 0.5 2A >" {
            all.extend(buffer.push(&[*byte]).unwrap());
        }

        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0],
            RelayMessage::Frame {
                arbitration_id: 0x1000_0072,
                payload: Bytes::from_static(b"\x2a"),
            }
        );
    }

    #[test]
    fn test_garbage_between_messages_dropped() {
        let mut buffer = RelayBuffer::new();
        let messages = buffer.push(b"\r\n< hi >\n\n< o").unwrap();
        assert_eq!(messages, vec![RelayMessage::Hi]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_bad_frame_skipped() {
        let mut buffer = RelayBuffer::new();
        let messages = buffer.push(b"< frame ZZ 0.0 01 >< ok >").unwrap();
        assert_eq!(messages, vec![RelayMessage::Ok]);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut buffer = RelayBuffer::new();
        let mut data = b"< ".to_vec();
        data.extend(std::iter::repeat(b'a').take(MAX_MESSAGE_SIZE + 1));

        assert!(buffer.push(&data).is_err());
        assert!(buffer.is_empty());
    }
}
