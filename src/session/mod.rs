//! Session builder and runtime.
//!
//! The [`SessionBuilder`] collects the device identity, the transport
//! connector and optional pre-registered devices. The [`Session`] manages the
//! lifecycle:
//! 1. Acquire the transport from the connector
//! 2. Register the receive callback and spawn the dispatch and writer tasks
//! 3. Send the boot announcement to the broadcast PA
//! 4. Beacon to the unspecified PA every announce interval
//!
//! Inbound frames are decoded and routed through the [`Directory`]. Device
//! info queries addressed to our own PA are answered with our device info.
//!
//! # Example
//!
//! ```
//! use sib_client::{DeviceType, PhysicalAddress, Session, SessionState};
//! use sib_client::transport::VirtualBus;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> sib_client::Result<()> {
//! let bus = VirtualBus::new();
//! let mut session = Session::builder()
//!     .physical_address(PhysicalAddress::new('b', 50)?)
//!     .device_type(DeviceType::Debugging)
//!     .hw_revision(1)
//!     .sw_revision(1)
//!     .short_identifier("ABCDE")
//!     .connector(bus.clone())
//!     .build()?;
//!
//! session.start().await?;
//! assert_eq!(session.state(), SessionState::Running);
//! assert_eq!(bus.history().len(), 1);
//!
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

mod announce;
mod state;

pub use state::SessionState;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec::{DeviceInfo, DeviceType, ShortIdentifier, DEVICE_INFO_LEN};
use crate::config::{SibConfig, TransportConfig, DEFAULT_ANNOUNCE_INTERVAL, MAX_ANNOUNCE_INTERVAL};
use crate::directory::{Device, Directory, Route, SharedDirectory};
use crate::error::{Result, SibError};
use crate::events::{EventSink, SessionEvent, SharedEventSink, TracingSink};
use crate::protocol::{Command, Frame, PhysicalAddress, Priority, TopicAddress, BROADCAST_PA};
use crate::transport::{CanTransport, Connector, ReceiveCallback};
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Who we are on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Identity {
    pub(crate) address: PhysicalAddress,
    pub(crate) info: DeviceInfo,
}

impl Identity {
    /// Our device-info frame addressed to `target`.
    pub(crate) fn info_frame(&self, target: u8) -> Frame {
        Frame::for_physical_address(
            Command::DEVICE_INFO,
            target,
            self.address.to_byte(),
            Bytes::copy_from_slice(&self.info.encode()),
        )
    }
}

/// Builder for configuring and creating a [`Session`].
pub struct SessionBuilder {
    physical_address: Option<PhysicalAddress>,
    device_type: DeviceType,
    hw_revision: u32,
    sw_revision: u32,
    short_identifier: Vec<u8>,
    announce_interval: Duration,
    events: SharedEventSink,
    devices: Vec<Device>,
    connector: Option<Arc<dyn Connector>>,
    writer_config: WriterConfig,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            physical_address: None,
            device_type: DeviceType::Generic,
            hw_revision: 0,
            sw_revision: 0,
            short_identifier: Vec::new(),
            announce_interval: DEFAULT_ANNOUNCE_INTERVAL,
            events: Arc::new(TracingSink),
            devices: Vec::new(),
            connector: None,
            writer_config: WriterConfig::default(),
        }
    }

    /// Builder pre-filled from a loaded configuration.
    pub fn from_config(config: &SibConfig) -> Self {
        Self::new()
            .physical_address(config.physical_address)
            .device_type(config.device_type)
            .hw_revision(config.hw_revision)
            .sw_revision(config.sw_revision)
            .short_identifier(&config.short_identifier)
            .announce_interval(config.announce_interval())
            .transport_config(config.transport.clone())
    }

    pub fn physical_address(mut self, address: PhysicalAddress) -> Self {
        self.physical_address = Some(address);
        self
    }

    pub fn device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    /// Hardware revision. Only the low 8 bits are announced.
    pub fn hw_revision(mut self, revision: u32) -> Self {
        self.hw_revision = revision;
        self
    }

    /// Software revision. Only the low 8 bits are announced.
    pub fn sw_revision(mut self, revision: u32) -> Self {
        self.sw_revision = revision;
        self
    }

    /// Short identifier; must be exactly 5 bytes.
    pub fn short_identifier(mut self, identifier: impl AsRef<[u8]>) -> Self {
        self.short_identifier = identifier.as_ref().to_vec();
        self
    }

    /// Interval between periodic beacons.
    ///
    /// Default: 10 seconds
    pub fn announce_interval(mut self, interval: Duration) -> Self {
        self.announce_interval = interval;
        self
    }

    /// Install an event sink. Default: [`TracingSink`].
    pub fn event_sink(mut self, sink: impl EventSink) -> Self {
        self.events = Arc::new(sink);
        self
    }

    /// Register a device in the directory before the session starts.
    pub fn device(mut self, device: Device) -> Self {
        self.devices.push(device);
        self
    }

    /// Connector used to acquire the transport on `start()`.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Acquire the transport described by `config` on `start()`.
    pub fn transport_config(self, config: TransportConfig) -> Self {
        self.connector(config)
    }

    /// Set the outbound queue capacity.
    ///
    /// Default: 256
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Validate the identity and create the session.
    ///
    /// # Errors
    ///
    /// `InvalidIdentifier` if the short identifier is not 5 bytes. `Config`
    /// if the address or connector is missing, or the interval is zero or
    /// above [`MAX_ANNOUNCE_INTERVAL`].
    pub fn build(self) -> Result<Session> {
        let address = self
            .physical_address
            .ok_or_else(|| SibError::Config("physical address must be set".to_string()))?;
        let short_identifier = ShortIdentifier::new(&self.short_identifier)?;
        let connector = self
            .connector
            .ok_or_else(|| SibError::Config("a transport connector must be set".to_string()))?;
        if self.announce_interval.is_zero() {
            return Err(SibError::Config(
                "announce interval must be greater than zero".to_string(),
            ));
        }
        if self.announce_interval > MAX_ANNOUNCE_INTERVAL {
            return Err(SibError::Config(format!(
                "announce interval must not exceed {:?}",
                MAX_ANNOUNCE_INTERVAL
            )));
        }

        let identity = Identity {
            address,
            info: DeviceInfo::new(
                self.device_type,
                self.hw_revision,
                self.sw_revision,
                short_identifier,
            ),
        };

        let mut directory = Directory::new(address);
        for device in self.devices {
            directory.register_device(device);
        }

        Ok(Session {
            identity,
            announce_interval: self.announce_interval,
            connector,
            directory: directory.into_shared(),
            events: self.events,
            writer_config: self.writer_config,
            state: SessionState::Uninitialized,
            runtime: None,
        })
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Resources held while the session runs.
struct Runtime {
    transport: Arc<dyn CanTransport>,
    writer: WriterHandle,
    writer_task: JoinHandle<()>,
    dispatch_task: JoinHandle<()>,
    announce_task: JoinHandle<()>,
}

/// One device's connection to the bus.
pub struct Session {
    identity: Identity,
    announce_interval: Duration,
    connector: Arc<dyn Connector>,
    directory: SharedDirectory,
    events: SharedEventSink,
    writer_config: WriterConfig,
    state: SessionState,
    runtime: Option<Runtime>,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Acquire the transport, start receiving and announce ourselves.
    ///
    /// A failed boot announcement is logged; the session still runs.
    ///
    /// # Errors
    ///
    /// `TransportUnavailable` if the transport cannot be acquired, leaving
    /// the session `Uninitialized`. `InvalidState` unless `Uninitialized`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Uninitialized {
            return Err(SibError::InvalidState {
                operation: "start",
                state: self.state,
            });
        }
        self.set_state(SessionState::Starting);

        let transport = match self.acquire_transport().await {
            Ok(transport) => transport,
            Err(e) => {
                tracing::error!("Failed to start session {}: {}", self.identity.address, e);
                self.set_state(SessionState::Uninitialized);
                return Err(e);
            }
        };

        let (writer, writer_task) =
            spawn_writer_task(transport.clone(), self.events.clone(), self.writer_config.clone());
        let (inbound, dispatch_task) = spawn_dispatch_task(Dispatcher {
            identity: self.identity,
            directory: self.directory.clone(),
            writer: writer.clone(),
            events: self.events.clone(),
        });

        let callback: ReceiveCallback = Arc::new(move |arbitration_id, payload| {
            let _ = inbound.send((arbitration_id, payload));
        });
        if let Err(e) = transport.on_receive(callback) {
            dispatch_task.abort();
            let _ = dispatch_task.await;
            drop(writer);
            let _ = writer_task.await;
            let _ = transport.shutdown().await;
            self.set_state(SessionState::Uninitialized);
            return Err(SibError::TransportUnavailable(format!(
                "receive registration failed: {}",
                e
            )));
        }

        if let Err(e) = writer.send(self.identity.info_frame(BROADCAST_PA)).await {
            tracing::warn!("Boot announcement failed: {}", e);
        }

        let announce_task =
            announce::spawn_announcer(writer.clone(), self.identity, self.announce_interval);

        self.runtime = Some(Runtime {
            transport,
            writer,
            writer_task,
            dispatch_task,
            announce_task,
        });
        self.set_state(SessionState::Running);
        tracing::info!(
            "Session {} running, announcing every {:?}",
            self.identity.address,
            self.announce_interval
        );
        Ok(())
    }

    async fn acquire_transport(&self) -> Result<Arc<dyn CanTransport>> {
        self.connector.connect().await.map_err(|e| match e {
            SibError::TransportUnavailable(_) => e,
            other => SibError::TransportUnavailable(other.to_string()),
        })
    }

    /// Cancel the announcer, stop receiving and release the transport.
    ///
    /// Frames already queued are transmitted first. Calling `stop()` again,
    /// or on a session that never started, does nothing.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(runtime) = self.runtime.take() else {
            return Ok(());
        };

        runtime.announce_task.abort();
        let _ = runtime.announce_task.await;
        runtime.dispatch_task.abort();
        let _ = runtime.dispatch_task.await;

        drop(runtime.writer);
        if let Err(e) = runtime.writer_task.await {
            tracing::warn!("Writer task ended abnormally: {}", e);
        }

        let result = runtime.transport.shutdown().await;
        self.set_state(SessionState::Stopped);
        tracing::info!("Session {} stopped", self.identity.address);
        result
    }

    /// Send a frame and wait for the transmit result.
    ///
    /// # Errors
    ///
    /// `InvalidState` unless running, `MalformedFrame` for oversized
    /// payloads, or the transport's error.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        self.writer("send")?.send(frame).await
    }

    /// Publish `payload` on `topic` with our PA as sender.
    pub async fn send_topic(
        &self,
        priority: Priority,
        topic: TopicAddress,
        payload: impl Into<Bytes>,
    ) -> Result<()> {
        let frame = Frame::for_topic(priority, topic, self.identity.address.to_byte(), payload.into());
        self.send(frame).await
    }

    /// Ask the device at `target` for its device info.
    ///
    /// The answer arrives asynchronously and is recorded in the directory.
    pub async fn query_device_info(&self, target: PhysicalAddress) -> Result<()> {
        let frame = Frame::for_physical_address(
            Command::DEVICE_INFO,
            target.to_byte(),
            self.identity.address.to_byte(),
            Bytes::new(),
        );
        self.send(frame).await
    }

    /// Our device-info frame addressed to `target`.
    pub fn device_info_frame(&self, target: u8) -> Frame {
        self.identity.info_frame(target)
    }

    #[inline]
    pub fn physical_address(&self) -> PhysicalAddress {
        self.identity.address
    }

    #[inline]
    pub fn device_info(&self) -> DeviceInfo {
        self.identity.info
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Shared handle to the directory.
    pub fn directory(&self) -> SharedDirectory {
        self.directory.clone()
    }

    pub fn register_device(&self, device: Device) -> Option<Device> {
        self.directory.lock().register_device(device)
    }

    pub fn deregister_device(&self, address: PhysicalAddress) -> Option<Device> {
        self.directory.lock().deregister_device(address)
    }

    /// Current state of `entity` on the device at `address`.
    pub fn entity_state(&self, address: PhysicalAddress, entity: &str) -> Option<Bytes> {
        self.directory.lock().entity_state(address, entity)
    }

    fn writer(&self, operation: &'static str) -> Result<&WriterHandle> {
        match &self.runtime {
            Some(runtime) if self.state.is_running() => Ok(&runtime.writer),
            _ => Err(SibError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    fn set_state(&mut self, to: SessionState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            self.events.emit(&SessionEvent::StateChanged { from, to });
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            tracing::debug!("Session {} dropped while running", self.identity.address);
            runtime.announce_task.abort();
            runtime.dispatch_task.abort();
        }
    }
}

/// Inbound path: decode, route, answer.
struct Dispatcher {
    identity: Identity,
    directory: SharedDirectory,
    writer: WriterHandle,
    events: SharedEventSink,
}

type Inbound = mpsc::UnboundedSender<(u32, Bytes)>;

fn spawn_dispatch_task(dispatcher: Dispatcher) -> (Inbound, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<(u32, Bytes)>();
    let task = tokio::spawn(async move {
        while let Some((arbitration_id, payload)) = rx.recv().await {
            dispatcher.dispatch(arbitration_id, payload);
        }
    });
    (tx, task)
}

impl Dispatcher {
    fn dispatch(&self, arbitration_id: u32, payload: Bytes) {
        let frame = match Frame::decode_bytes(arbitration_id, payload) {
            Ok(frame) => frame,
            Err(e) => {
                self.events.emit(&SessionEvent::DecodeFailed {
                    arbitration_id,
                    error: e.to_string(),
                });
                return;
            }
        };
        self.events.emit(&SessionEvent::FrameReceived(frame.clone()));

        let route = self.directory.lock().route(&frame);
        match route {
            Route::Topic { updated } => {
                for (device, entity) in updated {
                    self.events
                        .emit(&SessionEvent::EntityUpdated { device, entity });
                }
            }
            Route::NotForUs { .. } => {
                if frame.command().is_some_and(Command::is_device_info) {
                    self.observe_device_info(&frame);
                }
            }
            Route::Command {
                command,
                requester,
                payload,
            } => self.handle_command(&frame, command, requester, &payload),
        }
    }

    fn handle_command(&self, frame: &Frame, command: Command, requester: u8, payload: &[u8]) {
        if !command.is_device_info() {
            self.events.emit(&SessionEvent::CommandIgnored {
                command: command.value(),
                sender: requester,
            });
            return;
        }
        if requester == self.identity.address.to_byte() {
            tracing::trace!("Ignoring own device info frame");
            return;
        }
        if payload.len() == DEVICE_INFO_LEN {
            // An answer to our own query.
            self.observe_device_info(frame);
            return;
        }

        tracing::debug!(
            "Answering device info query from {}",
            PhysicalAddress::from_byte(requester)
        );
        // Queued only; the writer reports the transmit outcome as an event.
        if let Err(e) = self.writer.try_send_detached(self.identity.info_frame(requester)) {
            tracing::warn!("Device info reply to {:#04x} not queued: {}", requester, e);
        }
    }

    fn observe_device_info(&self, frame: &Frame) {
        if frame.sender() == self.identity.address.to_byte() {
            return;
        }
        let info = match DeviceInfo::decode(frame.payload()) {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("Ignoring device info from {:#04x}: {}", frame.sender(), e);
                return;
            }
        };
        let address = PhysicalAddress::from_byte(frame.sender());
        let discovered = self.directory.lock().observe_device_info(address, info);
        if discovered {
            self.events
                .emit(&SessionEvent::DeviceDiscovered { address, info });
        }
    }
}
