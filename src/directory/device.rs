//! Devices and the entities they own.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;

use crate::codec::DeviceInfo;
use crate::protocol::{PhysicalAddress, TopicAddress};

/// A named, stateful receiver of topic-addressed data.
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    topics: HashSet<TopicAddress>,
    state: Option<Bytes>,
}

impl Entity {
    /// Create an entity subscribed to the given topics.
    pub fn new<I>(name: impl Into<String>, topics: I) -> Self
    where
        I: IntoIterator<Item = TopicAddress>,
    {
        Self {
            name: name.into(),
            topics: topics.into_iter().collect(),
            state: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add another topic subscription.
    pub fn subscribe(&mut self, topic: TopicAddress) {
        self.topics.insert(topic);
    }

    /// Check if this entity listens on `topic`.
    #[inline]
    pub fn is_subscribed(&self, topic: &TopicAddress) -> bool {
        self.topics.contains(topic)
    }

    pub fn topics(&self) -> impl Iterator<Item = &TopicAddress> {
        self.topics.iter()
    }

    /// Most recent payload routed to this entity, if any.
    #[inline]
    pub fn state(&self) -> Option<&Bytes> {
        self.state.as_ref()
    }

    /// Replace the state. Last write wins.
    pub fn update_state(&mut self, data: Bytes) {
        self.state = Some(data);
    }
}

/// Directory entry for one physical address.
#[derive(Debug, Clone)]
pub struct Device {
    address: PhysicalAddress,
    entities: HashMap<String, Entity>,
    info: Option<DeviceInfo>,
}

impl Device {
    /// Create an empty device.
    pub fn new(address: PhysicalAddress) -> Self {
        Self {
            address,
            entities: HashMap::new(),
            info: None,
        }
    }

    /// Add an entity, builder style.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.add_entity(entity);
        self
    }

    /// Add or replace an entity by name.
    pub fn add_entity(&mut self, entity: Entity) -> Option<Entity> {
        self.entities.insert(entity.name.clone(), entity)
    }

    /// Remove an entity by name.
    pub fn remove_entity(&mut self, name: &str) -> Option<Entity> {
        self.entities.remove(name)
    }

    #[inline]
    pub fn address(&self) -> PhysicalAddress {
        self.address
    }

    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    pub fn entity_mut(&mut self, name: &str) -> Option<&mut Entity> {
        self.entities.get_mut(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Last device info this device announced, if seen.
    #[inline]
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub(crate) fn set_info(&mut self, info: DeviceInfo) {
        self.info = Some(info);
    }

    /// Push `data` to every entity subscribed to `topic`.
    ///
    /// Returns the names of updated entities.
    pub(crate) fn update_topic(&mut self, topic: &TopicAddress, data: &Bytes) -> Vec<String> {
        self.entities
            .values_mut()
            .filter(|e| e.is_subscribed(topic))
            .map(|e| {
                e.update_state(data.clone());
                e.name.clone()
            })
            .collect()
    }
}
