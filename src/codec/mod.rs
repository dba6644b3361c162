//! Codec module - payload encodings carried inside frames.
//!
//! - [`DeviceInfo`] - the 8-byte identity record used by announcements and
//!   device-info query answers
//!
//! # Example
//!
//! ```
//! use sib_client::codec::{DeviceInfo, DeviceType, ShortIdentifier};
//!
//! let id = ShortIdentifier::from_str("ABCDE").unwrap();
//! let info = DeviceInfo::new(DeviceType::Debugging, 1, 1, id);
//! let decoded = DeviceInfo::decode(&info.encode()).unwrap();
//! assert_eq!(decoded, info);
//! ```

mod device_info;

pub use device_info::{
    DeviceInfo, DeviceType, ShortIdentifier, DEVICE_INFO_LEN, SHORT_IDENTIFIER_LEN,
};
