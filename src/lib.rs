//! # sib-client
//!
//! Rust client for the Smart Integration Bus (SIB) protocol.
//!
//! SIB carries home-automation addressing in the 29-bit extended identifier
//! of CAN frames. Devices have a physical address (line `a`-`d`, device
//! 0-63) and publish state on topic addresses (main 0-7, sub 0-255) at one of
//! three priorities.
//!
//! ## Architecture
//!
//! - **Codec** ([`protocol`], [`codec`]): arbitration id and payload layouts
//! - **Directory** ([`directory`]): devices and entities fed by topic frames
//! - **Session** ([`session`]): lifecycle, announcements, PA command handling
//! - **Transport** ([`transport`]): in-memory bus, socketcand relay, SocketCAN
//!
//! ## Example
//!
//! ```no_run
//! use sib_client::{DeviceType, PhysicalAddress, Priority, Session, TopicAddress};
//! use sib_client::config::TransportConfig;
//!
//! #[tokio::main]
//! async fn main() -> sib_client::Result<()> {
//!     let mut session = Session::builder()
//!         .physical_address(PhysicalAddress::new('b', 50)?)
//!         .device_type(DeviceType::Debugging)
//!         .hw_revision(1)
//!         .sw_revision(1)
//!         .short_identifier("ABCDE")
//!         .transport_config(TransportConfig::network_relay("can0", "192.168.20.103", "29536"))
//!         .build()?;
//!
//!     session.start().await?;
//!     session
//!         .send_topic(Priority::High, TopicAddress::new(3, 12)?, vec![0x01])
//!         .await?;
//!     session.stop().await
//! }
//! ```

pub mod codec;
pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod writer;

pub use codec::{DeviceInfo, DeviceType, ShortIdentifier};
pub use config::{InterfaceKind, SibConfig, TransportConfig};
pub use directory::{Device, Directory, Entity};
pub use error::{Result, SibError};
pub use events::{EventSink, SessionEvent};
pub use protocol::{Frame, PhysicalAddress, Priority, TopicAddress};
pub use session::{Session, SessionBuilder, SessionState};
