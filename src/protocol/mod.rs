//! Protocol module - addressing, arbitration layout, and frame types.
//!
//! This module implements the SIB framing carried in CAN extended identifiers:
//! - Physical and topic addresses with validated constructors
//! - 29-bit arbitration field encoding/decoding
//! - Frame struct with typed accessors and named builders

mod address;
mod frame;
mod wire_format;

pub use address::{Line, PhysicalAddress, TopicAddress, MAX_DEVICE, MAX_MAIN_TOPIC, MAX_RAW_TOPIC};
pub use frame::{decode_frame, encode_frame, Frame};
pub use wire_format::{
    ArbitrationId, Command, Mode, Priority, ADDR1_SHIFT, ADDR2_SHIFT, MAX_ARBITRATION_ID,
    MAX_PAYLOAD_SIZE, MODE_SHIFT,
};

/// Target byte used for boot announcements.
pub const BROADCAST_PA: u8 = 0xFF;

/// Target byte used for periodic beacons.
pub const UNSPECIFIED_PA: u8 = 0x00;
