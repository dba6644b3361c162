//! Directory module - devices, entities, and frame routing.
//!
//! Provides:
//! - [`Directory`] - maps physical addresses to devices and routes frames
//! - [`Device`] / [`Entity`] - stateful receivers of topic-addressed data
//!
//! The directory is purely in-memory. It is filled by explicit registration
//! and by device-info announcements observed on the bus, and devices stay
//! until explicitly deregistered.
//!
//! # Example
//!
//! ```
//! use sib_client::directory::{Device, Directory, Entity};
//! use sib_client::protocol::{PhysicalAddress, TopicAddress};
//!
//! let mut directory = Directory::new(PhysicalAddress::new('b', 50).unwrap());
//!
//! let living_room = PhysicalAddress::new('a', 10).unwrap();
//! let temp = TopicAddress::new(2, 1).unwrap();
//! directory.register_device(
//!     Device::new(living_room).with_entity(Entity::new("temperature", [temp])),
//! );
//! assert_eq!(directory.len(), 1);
//! ```

mod device;
mod registry;

pub use device::{Device, Entity};
pub use registry::{Directory, Route, SharedDirectory};
