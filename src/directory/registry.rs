//! Device registry and frame router.
//!
//! The directory maps physical addresses to [`Device`]s and decides where a
//! decoded frame goes:
//! - TA-mode frames fan out to every entity (on any device) subscribed to
//!   the frame's topic
//! - PA-mode frames are device control; only those targeting the owning
//!   session's own address are handed back as a [`Route::Command`]
//!
//! # Example
//!
//! ```
//! use sib_client::directory::{Device, Directory, Entity, Route};
//! use sib_client::protocol::{Frame, PhysicalAddress, Priority, TopicAddress};
//! use bytes::Bytes;
//!
//! let own = PhysicalAddress::new('b', 50).unwrap();
//! let mut directory = Directory::new(own);
//!
//! let topic = TopicAddress::new(3, 12).unwrap();
//! let lamp = PhysicalAddress::new('a', 1).unwrap();
//! directory.register_device(Device::new(lamp).with_entity(Entity::new("lamp", [topic])));
//!
//! let frame = Frame::for_topic(Priority::High, topic, 0x01, Bytes::from_static(b"\x01"));
//! assert!(matches!(directory.route(&frame), Route::Topic { .. }));
//! assert_eq!(directory.entity_state(lamp, "lamp").unwrap().as_ref(), b"\x01");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::Device;
use crate::codec::DeviceInfo;
use crate::protocol::{Command, Frame, PhysicalAddress};

/// Directory shared between a session and its dispatch task.
pub type SharedDirectory = Arc<Mutex<Directory>>;

/// Where a routed frame ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Topic frame; lists every `(device, entity)` whose state was replaced.
    Topic {
        updated: Vec<(PhysicalAddress, String)>,
    },
    /// PA frame targeting our own address.
    Command {
        command: Command,
        requester: u8,
        payload: Bytes,
    },
    /// PA frame for some other device.
    NotForUs { target: u8 },
}

/// In-memory registry of devices keyed by physical address.
#[derive(Debug)]
pub struct Directory {
    own_address: PhysicalAddress,
    devices: HashMap<PhysicalAddress, Device>,
}

impl Directory {
    /// Create an empty directory for a session at `own_address`.
    pub fn new(own_address: PhysicalAddress) -> Self {
        Self {
            own_address,
            devices: HashMap::new(),
        }
    }

    /// Wrap in the lock the session shares with its dispatch task.
    pub fn into_shared(self) -> SharedDirectory {
        Arc::new(Mutex::new(self))
    }

    #[inline]
    pub fn own_address(&self) -> PhysicalAddress {
        self.own_address
    }

    /// Insert or replace the device at its address. Never fails.
    ///
    /// Returns the device previously registered there, if any.
    pub fn register_device(&mut self, device: Device) -> Option<Device> {
        tracing::debug!("Registering device {}", device.address());
        self.devices.insert(device.address(), device)
    }

    /// Remove the device at `address`.
    pub fn deregister_device(&mut self, address: PhysicalAddress) -> Option<Device> {
        let removed = self.devices.remove(&address);
        if removed.is_some() {
            tracing::debug!("Deregistered device {}", address);
        }
        removed
    }

    /// Record device info announced by `address`, creating the device if
    /// unknown. Entities of a known device are kept.
    ///
    /// Returns `true` if the device was not in the directory before.
    pub fn observe_device_info(&mut self, address: PhysicalAddress, info: DeviceInfo) -> bool {
        let mut discovered = false;
        self.devices
            .entry(address)
            .or_insert_with(|| {
                discovered = true;
                Device::new(address)
            })
            .set_info(info);
        discovered
    }

    /// Route a decoded frame.
    ///
    /// Topic frames update matching entities in place. PA frames are only
    /// resolved to a target; the caller handles commands.
    pub fn route(&mut self, frame: &Frame) -> Route {
        match frame.command() {
            None => {
                let Some(topic) = frame.topic() else {
                    return Route::Topic { updated: vec![] };
                };
                let data = frame.payload_bytes();
                let mut updated = Vec::new();
                for device in self.devices.values_mut() {
                    let address = device.address();
                    for name in device.update_topic(&topic, &data) {
                        updated.push((address, name));
                    }
                }
                tracing::trace!("Topic {} updated {} entities", topic, updated.len());
                Route::Topic { updated }
            }
            Some(command) => {
                let target = frame.addr2();
                if PhysicalAddress::from_byte(target) != self.own_address {
                    return Route::NotForUs { target };
                }
                Route::Command {
                    command,
                    requester: frame.sender(),
                    payload: frame.payload_bytes(),
                }
            }
        }
    }

    pub fn device(&self, address: PhysicalAddress) -> Option<&Device> {
        self.devices.get(&address)
    }

    pub fn device_mut(&mut self, address: PhysicalAddress) -> Option<&mut Device> {
        self.devices.get_mut(&address)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Current state of `entity` on the device at `address`.
    pub fn entity_state(&self, address: PhysicalAddress, entity: &str) -> Option<Bytes> {
        self.devices
            .get(&address)?
            .entity(entity)?
            .state()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
